//! Generic tree form
//!
//! Every generated program is a [`TreeNode`]: a symbol id, named terminal
//! values and an ordered vector of tagged children. Parents are never
//! referenced from children; positions inside a tree are addressed with
//! [`NodePath`] instead.

use crate::error::{Error, Result};
use crate::grammar::Grammar;
use crate::syntax::{self, RawNode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Addressable storage location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct SlotRef {
    pub scope: String,
    pub slot: String,
}

impl SlotRef {
    pub fn new(scope: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            slot: slot.into(),
        }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}.{}", self.scope, self.slot)
    }
}

/// Typed terminal value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Slot(SlotRef),
    Text(String),
}

impl Value {
    pub fn as_slot(&self) -> Option<&SlotRef> {
        match self {
            Value::Slot(slot) => Some(slot),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Slot(slot) => write!(f, "{}", slot),
            Value::Text(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        other => write!(f, "{}", other)?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// Position of a node, as child indices from the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of edges from the root
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Depth of the addressed node, counting the root as 1
    pub fn depth(&self) -> usize {
        self.0.len() + 1
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// True for strict ancestors only
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// True for this path and everything below it
    pub fn covers(&self, other: &NodePath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Trace key: `""` for the root, `.0.1` below it
    pub fn key(&self) -> String {
        self.0.iter().map(|i| format!(".{}", i)).collect()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.key())
        }
    }
}

/// Tagged child edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Child {
    /// Parameter name of the parent symbol
    pub field: String,
    /// Index within that parameter (non-zero only for array parameters)
    #[serde(default)]
    pub position: usize,
    pub node: TreeNode,
}

/// One node of a generated program
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TreeNode {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Child>,
    /// Cached content hash; never read back from serialized input
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub(crate) hash: Option<String>,
}

impl PartialEq for TreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.values == other.values
            && self.children == other.children
    }
}

impl TreeNode {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            values: BTreeMap::new(),
            children: Vec::new(),
            hash: None,
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Append a child under `field`, numbering it after existing children
    /// of the same field
    pub fn with_child(mut self, field: impl Into<String>, node: TreeNode) -> Self {
        self.push_child(field, node);
        self
    }

    pub fn push_child(&mut self, field: impl Into<String>, node: TreeNode) {
        let field = field.into();
        let position = self.children.iter().filter(|c| c.field == field).count();
        self.children.push(Child {
            field,
            position,
            node,
        });
        self.hash = None;
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child_nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.children.iter().map(|c| &c.node)
    }

    /// Depth of the tree; a single leaf has depth 1
    pub fn depth(&self) -> usize {
        1 + self.child_nodes().map(TreeNode::depth).max().unwrap_or(0)
    }

    /// Number of nodes
    pub fn size(&self) -> usize {
        1 + self.child_nodes().map(TreeNode::size).sum::<usize>()
    }

    /// Largest child count of any node
    pub fn max_width(&self) -> usize {
        self.child_nodes()
            .map(TreeNode::max_width)
            .max()
            .unwrap_or(0)
            .max(self.children.len())
    }

    pub fn get(&self, path: &NodePath) -> Option<&TreeNode> {
        let mut node = self;
        for &i in path.indices() {
            node = &node.children.get(i)?.node;
        }
        Some(node)
    }

    /// Edge leading to `path`, `None` for the root
    pub fn edge(&self, path: &NodePath) -> Option<&Child> {
        let parent = self.get(&path.parent()?)?;
        parent.children.get(path.last()?)
    }

    /// Mutable access to the node at `path`. Cached hashes along the way
    /// are dropped since the caller may change the subtree.
    pub fn get_mut(&mut self, path: &NodePath) -> Option<&mut TreeNode> {
        let mut node = self;
        for &i in path.indices() {
            node.hash = None;
            node = &mut node.children.get_mut(i)?.node;
        }
        node.hash = None;
        Some(node)
    }

    /// Replace the subtree at `path`, returning the old one. The edge
    /// (field and position) is kept.
    pub fn replace_at(&mut self, path: &NodePath, replacement: TreeNode) -> Result<TreeNode> {
        let target = self
            .get_mut(path)
            .ok_or_else(|| Error::Other(format!("no node at {}", path)))?;
        Ok(std::mem::replace(target, replacement))
    }

    /// All paths in pre-order
    pub fn paths(&self) -> Vec<NodePath> {
        self.walk().into_iter().map(|(p, _)| p).collect()
    }

    /// Pre-order traversal with paths
    pub fn walk(&self) -> Vec<(NodePath, &TreeNode)> {
        let mut out = Vec::new();
        let mut stack = vec![(NodePath::root(), self)];
        while let Some((path, node)) = stack.pop() {
            for (i, child) in node.children.iter().enumerate().rev() {
                stack.push((path.child(i), &child.node));
            }
            out.push((path, node));
        }
        out
    }

    /// Build a tree from the textual form. Unlabelled children take the
    /// parent symbol's parameter names in order; with a grammar that
    /// lacks the symbol the field defaults to the child index.
    pub fn parse(text: &str, grammar: Option<&Grammar>) -> Result<TreeNode> {
        let raw = syntax::parse_node(text)?;
        Self::from_raw(raw, grammar)
    }

    fn from_raw(raw: RawNode, grammar: Option<&Grammar>) -> Result<TreeNode> {
        let mut node = TreeNode::new(raw.head.clone());
        for (key, value) in raw.values {
            node.values.insert(key, value);
        }
        let labels = grammar
            .and_then(|g| g.symbol(&raw.head))
            .map(|s| s.child_labels(raw.children.len()));
        for (i, child) in raw.children.into_iter().enumerate() {
            let field = match (&child.field, &labels) {
                (Some(f), _) => f.clone(),
                (None, Some(labels)) => labels
                    .get(i)
                    .cloned()
                    .ok_or_else(|| Error::Parse(format!("{} has too many children", raw.head)))?,
                (None, None) => i.to_string(),
            };
            node.push_child(field, Self::from_raw(child, grammar)?);
        }
        Ok(node)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_norway::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_norway::from_str(yaml)?)
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)?;
        if !self.values.is_empty() {
            f.write_str("[")?;
            for (i, (k, v)) in self.values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}={}", k, v)?;
            }
            f.write_str("]")?;
        }
        if !self.children.is_empty() {
            f.write_str("(")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", child.field, child.node)?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> TreeNode {
        TreeNode::new("Add")
            .with_child("left", TreeNode::new("Const").with_value("value", Value::Int(1)))
            .with_child(
                "right",
                TreeNode::new("Neg")
                    .with_child("arg", TreeNode::new("Const").with_value("value", Value::Int(2))),
            )
    }

    #[test]
    fn test_shape_metrics() {
        let tree = sample();
        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.size(), 4);
        assert_eq!(tree.max_width(), 2);
    }

    #[test]
    fn test_walk_is_preorder() {
        let keys: Vec<String> = sample().paths().iter().map(NodePath::key).collect();
        assert_eq!(keys, vec!["", ".0", ".1", ".1.0"]);
    }

    #[test]
    fn test_replace_keeps_edge() {
        let mut tree = sample();
        let path = NodePath::from_indices(vec![1]);
        let old = tree
            .replace_at(&path, TreeNode::new("Const").with_value("value", Value::Int(5)))
            .unwrap();
        assert_eq!(old.symbol, "Neg");
        assert_eq!(tree.edge(&path).unwrap().field, "right");
        assert_eq!(tree.depth(), 2);
    }

    #[test]
    fn test_text_round_trip() {
        let tree = sample();
        let text = tree.to_string();
        assert_eq!(
            text,
            "Add(left: Const[value=1], right: Neg(arg: Const[value=2]))"
        );
        assert_eq!(TreeNode::parse(&text, None).unwrap(), tree);
    }

    #[test]
    fn test_json_round_trip_preserves_value_kinds() {
        let tree = TreeNode::new("Mix")
            .with_value("f", Value::Float(1.0))
            .with_value("i", Value::Int(1))
            .with_value("s", Value::Slot(SlotRef::new("main", "x")))
            .with_value("t", Value::Text("hi".into()));
        let back = TreeNode::from_json(&tree.to_json().unwrap()).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_array_positions() {
        let block = TreeNode::new("Block")
            .with_child("body", TreeNode::new("Nop"))
            .with_child("body", TreeNode::new("Nop"));
        let positions: Vec<usize> = block.children.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[test]
    fn test_path_relations() {
        let root = NodePath::root();
        let a = root.child(1);
        let b = a.child(0);
        assert!(root.is_ancestor_of(&b));
        assert!(a.is_ancestor_of(&b));
        assert!(!b.is_ancestor_of(&b));
        assert!(b.covers(&b));
        assert_eq!(b.parent(), Some(a));
        assert_eq!(b.depth(), 3);
    }
}
