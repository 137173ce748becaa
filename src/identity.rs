//! Tree identity: content hashing, containment and copies
//!
//! A node's hash is a SHA-256 digest over its own part (symbol id and the
//! sorted terminal values) followed by the digests of its children in
//! order. Field names do not take part, so two trees with the same shape
//! and values hash identically wherever they sit.

use crate::tree::TreeNode;
use sha2::{Digest, Sha256};

/// Digest of the node's own part: symbol id plus sorted terminal values
pub fn self_digest(node: &TreeNode) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(node.symbol.as_bytes());
    hasher.update([0u8]);
    // BTreeMap iterates in key order
    for (key, value) in &node.values {
        hasher.update(key.as_bytes());
        hasher.update([b'=']);
        hasher.update(value.to_string().as_bytes());
        hasher.update([0u8]);
    }
    hasher.finalize().into()
}

fn digest(node: &TreeNode) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(self_digest(node));
    for child in &node.children {
        match child.node.hash.as_deref().and_then(|h| hex::decode(h).ok()) {
            Some(bytes) => hasher.update(&bytes),
            None => hasher.update(digest(&child.node)),
        }
    }
    hasher.finalize().into()
}

/// Content hash without touching caches; cached child hashes are reused
pub fn content_hash(node: &TreeNode) -> String {
    match &node.hash {
        Some(h) => h.clone(),
        None => hex::encode(digest(node)),
    }
}

/// Same shape, same values, same child order
pub fn structurally_equal(a: &TreeNode, b: &TreeNode) -> bool {
    content_hash(a) == content_hash(b)
}

/// Copy of a node without its children
pub fn shallow_copy(node: &TreeNode) -> TreeNode {
    let mut copy = TreeNode::new(node.symbol.clone());
    copy.values = node.values.clone();
    copy
}

impl TreeNode {
    /// Cached content hash, computed bottom-up on first use
    pub fn hash(&mut self) -> &str {
        if self.hash.is_none() {
            for child in &mut self.children {
                child.node.hash();
            }
            self.hash = Some(hex::encode(digest(self)));
        }
        self.hash.as_deref().unwrap_or_default()
    }

    pub fn cached_hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    /// Discard every cached hash and recompute the whole tree
    pub fn rehash(&mut self) -> &str {
        self.clear_hashes();
        self.hash()
    }

    /// Recompute the hashes of all descendants, leaving this node's cache
    /// empty
    pub fn rehash_children(&mut self) {
        for child in &mut self.children {
            child.node.rehash();
        }
        self.hash = None;
    }

    /// Recompute the root hash and drop every cached hash below it
    pub fn purge(&mut self) -> String {
        let root = hex::encode(digest(&*self));
        self.clear_hashes();
        self.hash = Some(root.clone());
        root
    }

    pub fn clear_hashes(&mut self) {
        self.hash = None;
        for child in &mut self.children {
            child.node.clear_hashes();
        }
    }
}

fn same_self(a: &TreeNode, b: &TreeNode) -> bool {
    a.symbol == b.symbol && a.values == b.values
}

/// `sub` matches anchored at `node`; at every level the children of `sub`
/// must occur in order among the children of `node`, other children may
/// interleave
pub fn matches_interleaved(sub: &TreeNode, node: &TreeNode) -> bool {
    if !same_self(sub, node) {
        return false;
    }
    let mut pending = sub.child_nodes().peekable();
    for candidate in node.child_nodes() {
        match pending.peek() {
            Some(want) if matches_interleaved(want, candidate) => {
                pending.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    pending.peek().is_none()
}

/// Anchored match at the root of `tree` where at every level the
/// children of `sub` must occur as one contiguous run
pub fn direct_contains(tree: &TreeNode, sub: &TreeNode) -> bool {
    if !same_self(sub, tree) {
        return false;
    }
    let want: Vec<&TreeNode> = sub.child_nodes().collect();
    let have: Vec<&TreeNode> = tree.child_nodes().collect();
    if want.is_empty() {
        return true;
    }
    if want.len() > have.len() {
        return false;
    }
    have.windows(want.len()).any(|window| {
        window
            .iter()
            .zip(&want)
            .all(|(h, w)| direct_contains(h, w))
    })
}

/// `sub` occurs somewhere in `tree`, children possibly interleaved
pub fn contains(tree: &TreeNode, sub: &TreeNode) -> bool {
    let target = content_hash(sub);
    tree.walk()
        .into_iter()
        .any(|(_, node)| content_hash(node) == target || matches_interleaved(sub, node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Value;

    fn t(text: &str) -> TreeNode {
        TreeNode::parse(text, None).unwrap()
    }

    #[test]
    fn test_hash_ignores_field_names() {
        let a = t("Add(left: Const[value=1], right: Const[value=2])");
        let b = t("Add(x: Const[value=1], y: Const[value=2])");
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_hash_sensitive_to_order_and_values() {
        let a = t("Add(Const[value=1], Const[value=2])");
        let b = t("Add(Const[value=2], Const[value=1])");
        let c = t("Add(Const[value=1], Const[value=3])");
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash(&c));
    }

    #[test]
    fn test_value_kinds_hash_differently() {
        let int = TreeNode::new("C").with_value("v", Value::Int(1));
        let float = TreeNode::new("C").with_value("v", Value::Float(1.0));
        let text = TreeNode::new("C").with_value("v", Value::Text("1".into()));
        assert_ne!(content_hash(&int), content_hash(&float));
        assert_ne!(content_hash(&int), content_hash(&text));
    }

    #[test]
    fn test_cached_hash_matches_fresh() {
        let mut tree = t("Add(Const[value=1], Neg(Const[value=2]))");
        let fresh = content_hash(&tree);
        assert_eq!(tree.hash(), fresh);
        assert!(tree.children[1].node.cached_hash().is_some());
    }

    #[test]
    fn test_stored_hashes_are_not_trusted() {
        let one = TreeNode::from_json(r#"{"symbol":"Const","values":{"value":1},"hash":"deadbeef"}"#).unwrap();
        let two = TreeNode::from_json(r#"{"symbol":"Const","values":{"value":2},"hash":"deadbeef"}"#).unwrap();
        assert!(one.cached_hash().is_none());
        assert_ne!(content_hash(&one), "deadbeef");
        assert!(!structurally_equal(&one, &two));
        assert!(!contains(&one, &two));

        let nested = "symbol: Neg\nchildren:\n  - field: arg\n    node:\n      symbol: Const\n      values: { value: 2 }\n      hash: deadbeef\n";
        let loaded = TreeNode::from_yaml(nested).unwrap();
        assert_eq!(content_hash(&loaded), content_hash(&t("Neg(Const[value=2])")));
    }

    #[test]
    fn test_cached_hash_survives_round_trip() {
        let mut tree = t("Add(Const[value=1], Neg(Const[value=2]))");
        let hash = tree.hash().to_string();
        let mut loaded = TreeNode::from_json(&tree.to_json().unwrap()).unwrap();
        assert!(loaded.cached_hash().is_none());
        assert_eq!(loaded.hash(), hash);
    }

    #[test]
    fn test_purge_keeps_only_root() {
        let mut tree = t("Add(Const[value=1], Neg(Const[value=2]))");
        tree.hash();
        let root = tree.purge();
        assert_eq!(tree.cached_hash(), Some(root.as_str()));
        assert!(tree.children.iter().all(|c| c.node.cached_hash().is_none()));
        assert_eq!(root, content_hash(&t("Add(Const[value=1], Neg(Const[value=2]))")));
    }

    #[test]
    fn test_rehash_children_leaves_root_empty() {
        let mut tree = t("Add(Const[value=1], Const[value=2])");
        tree.rehash_children();
        assert!(tree.cached_hash().is_none());
        assert!(tree.children[0].node.cached_hash().is_some());
    }

    #[test]
    fn test_mutation_invalidates_path() {
        let mut tree = t("Add(Const[value=1], Neg(Const[value=2]))");
        let before = tree.hash().to_string();
        let path = crate::tree::NodePath::from_indices(vec![1, 0]);
        tree.replace_at(&path, t("Const[value=3]")).unwrap();
        assert_ne!(tree.hash(), before);
        assert_eq!(tree.hash(), content_hash(&t("Add(Const[value=1], Neg(Const[value=3]))")));
    }

    #[test]
    fn test_contains_with_interleaving() {
        let tree = t("Root(Block(A, B, C))");
        assert!(contains(&tree, &t("Block(A, C)")));
        assert!(!contains(&tree, &t("Block(C, A)")));
        assert!(contains(&tree, &t("B")));
        assert!(!contains(&tree, &t("D")));
    }

    #[test]
    fn test_direct_contains_requires_contiguous_anchored_run() {
        let tree = t("Block(A, B, C)");
        assert!(direct_contains(&tree, &t("Block(A, B)")));
        assert!(direct_contains(&tree, &t("Block(B, C)")));
        assert!(!direct_contains(&tree, &t("Block(A, C)")));
        assert!(!direct_contains(&t("Root(Block(A, B))"), &t("Block(A, B)")));
    }

    #[test]
    fn test_shallow_copy_drops_children() {
        let node = t("Add[op=1](Const, Const)");
        let copy = shallow_copy(&node);
        assert!(copy.is_leaf());
        assert_eq!(copy.values, node.values);
    }
}
