//! Pattern templates
//!
//! A template is tree-shaped like a [`TreeNode`], but any node may be a
//! wildcard:
//!
//! - `ANY` matches whatever symbol sits at that position
//! - `ANYWHERE` (`*`) matches when its single child matches at this
//!   position or at any descendant
//! - `NOT-Sym` (`!Sym`) matches any symbol except `Sym`
//!
//! Children of a template node must occur in order among the children of
//! the matched node; unrelated children may sit between them. A child
//! labelled `field: ...` only matches children under that field.

use crate::error::{Error, Result};
use crate::grammar::{identifier_regex, Grammar};
use crate::syntax::{self, RawNode};
use crate::tree::{NodePath, TreeNode, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Head test of a template node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Matcher {
    Symbol(String),
    AnyChild,
    Anywhere,
    Not(String),
}

impl Matcher {
    fn parse(head: &str) -> Self {
        match head {
            "ANY" | "ANY-CHILD" => Matcher::AnyChild,
            "ANYWHERE" => Matcher::Anywhere,
            _ => match head.strip_prefix("NOT-") {
                Some(inner) => Matcher::Not(inner.to_string()),
                None => Matcher::Symbol(head.to_string()),
            },
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Symbol(s) => f.write_str(s),
            Matcher::AnyChild => f.write_str("ANY"),
            Matcher::Anywhere => f.write_str("ANYWHERE"),
            Matcher::Not(s) => write!(f, "NOT-{}", s),
        }
    }
}

/// One node of a template
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    pub matcher: Matcher,
    pub field: Option<String>,
    pub values: BTreeMap<String, Value>,
    pub children: Vec<TemplateNode>,
}

impl TemplateNode {
    pub fn is_anywhere(&self) -> bool {
        self.matcher == Matcher::Anywhere
    }

    /// Head test against a symbol id. `ANYWHERE` accepts everything here;
    /// its child is tested separately.
    pub fn head_accepts(&self, symbol: &str) -> bool {
        match &self.matcher {
            Matcher::Symbol(s) => s == symbol,
            Matcher::Not(s) => s != symbol,
            Matcher::AnyChild | Matcher::Anywhere => true,
        }
    }

    pub fn values_match(&self, values: &BTreeMap<String, Value>) -> bool {
        self.values.iter().all(|(k, v)| values.get(k) == Some(v))
    }

    /// Whether a child under `field` may be matched by this template node
    pub fn admits_field(&self, field: &str) -> bool {
        self.field.as_deref().is_none_or(|f| f == field)
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&TemplateNode> {
        let mut node = self;
        for &i in path {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    /// Full match anchored at `node`
    pub fn matches_at(&self, node: &TreeNode) -> bool {
        if self.is_anywhere() {
            return match self.children.first() {
                None => true,
                Some(inner) => node.walk().into_iter().any(|(_, n)| inner.matches_at(n)),
            };
        }
        if !self.head_accepts(&node.symbol) || !self.values_match(&node.values) {
            return false;
        }
        self.children_match(node, 0, 0)
    }

    /// Ordered subsequence match of `self.children[from..]` over
    /// `node.children[start..]`
    pub fn children_match(&self, node: &TreeNode, from: usize, start: usize) -> bool {
        let mut want = from;
        for child in node.children.iter().skip(start) {
            let Some(t) = self.children.get(want) else {
                break;
            };
            if t.admits_field(&child.field) && t.matches_at(&child.node) {
                want += 1;
            }
        }
        want >= self.children.len()
    }

    fn from_raw(raw: RawNode) -> Self {
        Self {
            matcher: Matcher::parse(&raw.head),
            field: raw.field,
            values: raw.values.into_iter().collect(),
            children: raw.children.into_iter().map(Self::from_raw).collect(),
        }
    }

    fn validate(&self, grammar: &Grammar, parent: Option<&str>, template: &str) -> Result<()> {
        let malformed = |msg: String| Error::MalformedTemplate(format!("{}: {}", template, msg));

        if let (Some(field), Some(parent)) = (&self.field, parent) {
            let symbol = grammar.require(parent)?;
            if symbol.param_named(field).is_none() {
                return Err(malformed(format!("{} has no child field '{}'", parent, field)));
            }
        }

        let own = match &self.matcher {
            Matcher::Symbol(s) | Matcher::Not(s) => {
                if !grammar.contains(s) {
                    return Err(malformed(format!("unknown symbol '{}'", s)));
                }
                Some(s.as_str())
            }
            Matcher::AnyChild | Matcher::Anywhere => None,
        };

        if let Matcher::Symbol(s) = &self.matcher {
            let symbol = grammar.require(s)?;
            for (key, value) in &self.values {
                match symbol.terminal_named(key) {
                    Some(t) if t.kind.accepts(value) => {}
                    Some(_) => return Err(malformed(format!("{}.{} cannot hold {}", s, key, value))),
                    None => return Err(malformed(format!("{} has no terminal '{}'", s, key))),
                }
            }
            if self.children.len() > symbol.max_arity().unwrap_or(usize::MAX) {
                return Err(malformed(format!("{} cannot have {} children", s, self.children.len())));
            }
        }

        if self.is_anywhere() {
            if self.children.len() > 1 {
                return Err(malformed("ANYWHERE takes at most one child".into()));
            }
            if !self.values.is_empty() {
                return Err(malformed("ANYWHERE cannot carry values".into()));
            }
        }

        let labelled = self.children.iter().filter(|c| c.field.is_some()).count();
        if labelled != 0 && labelled != self.children.len() {
            return Err(malformed(format!(
                "children of {} must be all labelled or all unlabelled",
                self.matcher
            )));
        }

        // ANYWHERE children inherit the parent for field checks
        let scope = if self.is_anywhere() { parent } else { own };
        for child in &self.children {
            child.validate(grammar, scope, template)?;
        }
        Ok(())
    }
}

impl fmt::Display for TemplateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: ", field)?;
        }
        write!(f, "{}", self.matcher)?;
        if !self.values.is_empty() {
            let values: Vec<String> = self.values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, "[{}]", values.join(", "))?;
        }
        if !self.children.is_empty() {
            let children: Vec<String> = self.children.iter().map(ToString::to_string).collect();
            write!(f, "({})", children.join(", "))?;
        }
        Ok(())
    }
}

/// Desired or forbidden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    Pattern,
    Antipattern,
}

/// A validated template
#[derive(Debug, Clone, PartialEq)]
pub struct PatternTemplate {
    pub id: String,
    pub kind: TemplateKind,
    pub root: TemplateNode,
    /// Activation chance; only meaningful for patterns
    pub chance: f64,
}

impl PatternTemplate {
    /// Parse and validate a template against the grammar
    pub fn parse(id: &str, kind: TemplateKind, shape: &str, grammar: &Grammar) -> Result<Self> {
        if !identifier_regex()?.is_match(id) {
            return Err(Error::MalformedTemplate(format!("invalid template id '{}'", id)));
        }
        let raw = syntax::parse_node(shape)
            .map_err(|e| Error::MalformedTemplate(format!("{}: {}", id, e)))?;
        let mut root = TemplateNode::from_raw(raw);
        if root.field.is_some() {
            return Err(Error::MalformedTemplate(format!("{}: the root cannot carry a field label", id)));
        }
        root.validate(grammar, None, id)?;

        // Anchoring happens at every node anyway, so a leading star adds
        // nothing to an antipattern
        if kind == TemplateKind::Antipattern {
            while root.is_anywhere() && root.children.len() == 1 {
                let mut inner = root.children.remove(0);
                inner.field = None;
                root = inner;
            }
        }

        Ok(Self {
            id: id.to_string(),
            kind,
            root,
            chance: 1.0,
        })
    }

    pub fn with_chance(mut self, chance: f64) -> Self {
        self.chance = chance;
        self
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&TemplateNode> {
        self.root.node_at(path)
    }

    /// Every node where the template matches when anchored there
    pub fn find_matches(&self, tree: &TreeNode) -> Vec<NodePath> {
        tree.walk()
            .into_iter()
            .filter(|(_, node)| self.root.matches_at(node))
            .map(|(path, _)| path)
            .collect()
    }

    pub fn matches_anywhere(&self, tree: &TreeNode) -> bool {
        tree.walk().into_iter().any(|(_, node)| self.root.matches_at(node))
    }
}

/// Number of (antipattern, anchor) matches in `tree`
pub fn count_violations<'a>(antipatterns: impl IntoIterator<Item = &'a PatternTemplate>, tree: &TreeNode) -> usize {
    antipatterns
        .into_iter()
        .map(|t| t.find_matches(tree).len())
        .sum()
}
