//! Textual node syntax shared by trees and pattern templates
//!
//! ```text
//! node  := [field ':'] head ['[' key '=' value (',' key '=' value)* ']']
//!          ['(' node (',' node)* ')']
//! head  := Ident | 'ANY' | 'ANYWHERE' | '*' | 'NOT-' Ident | '!' Ident
//! value := int | float | true | false | "text" | @scope.slot
//! ```
//!
//! The parser only produces a raw shape; trees and templates each give the
//! head and field labels their own meaning.

use crate::error::{Error, Result};
use crate::tree::{SlotRef, Value};

/// Parsed, uninterpreted node
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode {
    pub field: Option<String>,
    pub head: String,
    pub values: Vec<(String, Value)>,
    pub children: Vec<RawNode>,
}

/// Parse one node expression, rejecting trailing input
pub fn parse_node(input: &str) -> Result<RawNode> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let node = parser.node()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(node)
}

/// Parse a value literal
pub fn parse_value(literal: &str) -> Result<Value> {
    let text = literal.trim();
    if text.is_empty() {
        return Err(Error::Parse("empty value".into()));
    }
    match text {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Some(rest) = text.strip_prefix('@') {
        let (scope, slot) = rest
            .split_once('.')
            .ok_or_else(|| Error::Parse(format!("slot reference '{}' needs @scope.slot", text)))?;
        if scope.is_empty() || slot.is_empty() {
            return Err(Error::Parse(format!("slot reference '{}' is incomplete", text)));
        }
        return Ok(Value::Slot(SlotRef::new(scope, slot)));
    }
    if text.starts_with('"') {
        return unquote(text).map(Value::Text);
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Ok(Value::Float(f));
    }
    Err(Error::Parse(format!("cannot parse value '{}'", text)))
}

fn unquote(text: &str) -> Result<String> {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .ok_or_else(|| Error::Parse(format!("unterminated string {}", text)))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => return Err(Error::Parse("dangling escape".into())),
            }
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn error(&self, msg: &str) -> Error {
        Error::Parse(format!("{} at offset {}", msg, self.pos))
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn ident(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.error("expected identifier"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn head(&mut self) -> Result<String> {
        match self.peek() {
            Some('*') => {
                self.pos += 1;
                Ok("ANYWHERE".to_string())
            }
            Some('!') => {
                self.pos += 1;
                Ok(format!("NOT-{}", self.ident()?))
            }
            _ => self.ident(),
        }
    }

    fn node(&mut self) -> Result<RawNode> {
        let mut field = None;
        let mut head = self.head()?;
        if self.eat(':') {
            field = Some(head);
            head = self.head()?;
        }

        let mut values = Vec::new();
        if self.eat('[') {
            if !self.eat(']') {
                loop {
                    let key = self.ident()?;
                    self.expect('=')?;
                    let literal = self.literal()?;
                    values.push((key, parse_value(&literal)?));
                    if self.eat(']') {
                        break;
                    }
                    self.expect(',')?;
                }
            }
        }

        let mut children = Vec::new();
        if self.eat('(') {
            if !self.eat(')') {
                loop {
                    children.push(self.node()?);
                    if self.eat(')') {
                        break;
                    }
                    self.expect(',')?;
                }
            }
        }

        Ok(RawNode {
            field,
            head,
            values,
            children,
        })
    }

    /// Raw text of one value literal, up to the next unquoted ',' or ']'
    fn literal(&mut self) -> Result<String> {
        self.skip_ws();
        let start = self.pos;
        let mut quoted = false;
        let mut escaped = false;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            if quoted {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    quoted = false;
                }
            } else if c == '"' {
                quoted = true;
            } else if c == ',' || c == ']' {
                break;
            }
            self.pos += 1;
        }
        if quoted {
            return Err(self.error("unterminated string"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_nested_with_fields_and_values() {
        let node = parse_node("Add(left: Const[value=1], right: Neg(Const[value=-2]))").unwrap();
        assert_eq!(node.head, "Add");
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].field.as_deref(), Some("left"));
        assert_eq!(node.children[0].values, vec![("value".to_string(), Value::Int(1))]);
        assert_eq!(
            node.children[1].children[0].values,
            vec![("value".to_string(), Value::Int(-2))]
        );
    }

    #[test]
    fn test_parse_wildcards() {
        let node = parse_node("*(Loop(ANY, !Const))").unwrap();
        assert_eq!(node.head, "ANYWHERE");
        let lp = &node.children[0];
        assert_eq!(lp.head, "Loop");
        assert_eq!(lp.children[0].head, "ANY");
        assert_eq!(lp.children[1].head, "NOT-Const");
    }

    #[test]
    fn test_parse_value_literals() {
        assert_eq!(parse_value("true").unwrap(), Value::Bool(true));
        assert_eq!(parse_value("2.5").unwrap(), Value::Float(2.5));
        assert_eq!(parse_value("\"a,b\"").unwrap(), Value::Text("a,b".into()));
        assert_eq!(
            parse_value("@main.x").unwrap(),
            Value::Slot(SlotRef::new("main", "x"))
        );
        assert!(parse_value("bare").is_err());
    }

    #[test]
    fn test_quoted_value_may_contain_delimiters() {
        let node = parse_node("Print[text=\"a]b,c\"]").unwrap();
        assert_eq!(node.values[0].1, Value::Text("a]b,c".into()));
    }

    #[test]
    fn test_rejects_trailing_input() {
        assert!(parse_node("Add(Const) Const").is_err());
        assert!(parse_node("Add(Const").is_err());
    }
}
