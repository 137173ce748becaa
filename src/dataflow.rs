//! Data-flow guard
//!
//! Tracks which storage slots have been written before a point of a tree.
//! Evaluation order is pre-order, except that a write becomes visible only
//! once its own subtree is complete (the stored value is computed first).
//! Reads of function arguments are always satisfied.

use crate::grammar::{Grammar, SymbolKind};
use crate::tree::{NodePath, SlotRef, TreeNode};
use std::collections::{BTreeMap, BTreeSet};

/// Written slots keyed by scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Availability {
    slots: BTreeMap<String, BTreeSet<String>>,
}

impl Availability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, slot: &SlotRef) {
        self.slots
            .entry(slot.scope.clone())
            .or_default()
            .insert(slot.slot.clone());
    }

    pub fn contains(&self, slot: &SlotRef) -> bool {
        self.slots
            .get(&slot.scope)
            .is_some_and(|s| s.contains(&slot.slot))
    }

    pub fn extend(&mut self, other: &Availability) {
        for (scope, slots) in &other.slots {
            self.slots
                .entry(scope.clone())
                .or_default()
                .extend(slots.iter().cloned());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(BTreeSet::is_empty)
    }

    pub fn slots(&self) -> Vec<SlotRef> {
        self.slots
            .iter()
            .flat_map(|(scope, slots)| slots.iter().map(move |s| SlotRef::new(scope.clone(), s.clone())))
            .collect()
    }

    pub fn scope(&self, scope: &str) -> Option<&BTreeSet<String>> {
        self.slots.get(scope)
    }

    pub fn signature(&self) -> String {
        self.slots()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A read with no preceding write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiedRead {
    pub path: NodePath,
    pub slot: SlotRef,
}

pub struct DataFlowGuard<'a> {
    grammar: &'a Grammar,
}

impl<'a> DataFlowGuard<'a> {
    pub fn new(grammar: &'a Grammar) -> Self {
        Self { grammar }
    }

    fn slot_of(&self, node: &TreeNode, kind: SymbolKind) -> Option<SlotRef> {
        let symbol = self.grammar.symbol(&node.symbol)?;
        if !symbol.is(kind) {
            return None;
        }
        let terminal = symbol.slot_terminal()?;
        node.values.get(&terminal.name)?.as_slot().cloned()
    }

    /// Slot read by `node`, unless it reads an argument
    pub fn read_slot(&self, node: &TreeNode) -> Option<SlotRef> {
        self.slot_of(node, SymbolKind::Read)
    }

    pub fn write_slot(&self, node: &TreeNode) -> Option<SlotRef> {
        self.slot_of(node, SymbolKind::Write)
    }

    /// Every write inside a subtree
    pub fn writes_in(&self, tree: &TreeNode) -> Availability {
        let mut out = Availability::new();
        for (_, node) in tree.walk() {
            if let Some(slot) = self.write_slot(node) {
                out.add(&slot);
            }
        }
        out
    }

    /// Slots written before `up_to` is reached. Writes of the nodes
    /// enclosing `up_to` are not complete yet and do not count.
    pub fn available_items(&self, tree: &TreeNode, up_to: Option<&NodePath>) -> Availability {
        let mut state = Availability::new();
        self.visit(tree, &NodePath::root(), up_to, &mut state, &mut Vec::new());
        state
    }

    /// Reads without a preceding write in the same scope. The subtree at
    /// `boundary` is about to be replaced and is ignored entirely.
    pub fn unsatisfied_items(&self, tree: &TreeNode, boundary: Option<&NodePath>) -> Vec<UnsatisfiedRead> {
        let mut state = Availability::new();
        let mut missing = Vec::new();
        self.scan(tree, &NodePath::root(), boundary, &mut state, &mut missing);
        missing
    }

    /// Returns false once `stop` has been reached
    fn visit(
        &self,
        node: &TreeNode,
        path: &NodePath,
        stop: Option<&NodePath>,
        state: &mut Availability,
        missing: &mut Vec<UnsatisfiedRead>,
    ) -> bool {
        if stop == Some(path) {
            return false;
        }
        if let Some(slot) = self.read_slot(node) {
            if !state.contains(&slot) {
                missing.push(UnsatisfiedRead {
                    path: path.clone(),
                    slot,
                });
            }
        }
        for (i, child) in node.children.iter().enumerate() {
            if !self.visit(&child.node, &path.child(i), stop, state, missing) {
                return false;
            }
        }
        if let Some(slot) = self.write_slot(node) {
            state.add(&slot);
        }
        true
    }

    fn scan(
        &self,
        node: &TreeNode,
        path: &NodePath,
        skip: Option<&NodePath>,
        state: &mut Availability,
        missing: &mut Vec<UnsatisfiedRead>,
    ) {
        if skip == Some(path) {
            return;
        }
        if let Some(slot) = self.read_slot(node) {
            if !state.contains(&slot) {
                missing.push(UnsatisfiedRead {
                    path: path.clone(),
                    slot,
                });
            }
        }
        for (i, child) in node.children.iter().enumerate() {
            self.scan(&child.node, &path.child(i), skip, state, missing);
        }
        if let Some(slot) = self.write_slot(node) {
            state.add(&slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::tests::arithmetic;
    use pretty_assertions::assert_eq;

    const PROGRAM: &str = "Program(\
        Assign[slot=@main.x](Const[value=1]), \
        Assign[slot=@main.y](Read[slot=@main.x]), \
        Assign[slot=@main.x](Read[slot=@main.y]), \
        result: Read[slot=@main.x])";

    #[test]
    fn test_available_before_point() {
        let g = arithmetic();
        let tree = TreeNode::parse(PROGRAM, Some(&g)).unwrap();
        let guard = DataFlowGuard::new(&g);

        let at_second = guard.available_items(&tree, Some(&NodePath::from_indices(vec![1])));
        assert_eq!(at_second.slots(), vec![SlotRef::new("main", "x")]);

        // the enclosing write of y is not complete inside its own value
        let inside = guard.available_items(&tree, Some(&NodePath::from_indices(vec![1, 0])));
        assert_eq!(inside.slots(), vec![SlotRef::new("main", "x")]);

        let all = guard.available_items(&tree, None);
        assert_eq!(all.slots().len(), 2);
    }

    #[test]
    fn test_all_reads_satisfied() {
        let g = arithmetic();
        let tree = TreeNode::parse(PROGRAM, Some(&g)).unwrap();
        assert!(DataFlowGuard::new(&g).unsatisfied_items(&tree, None).is_empty());
    }

    #[test]
    fn test_self_referencing_write_is_unsatisfied() {
        let g = arithmetic();
        let tree = TreeNode::parse(
            "Program(Assign[slot=@main.x](Read[slot=@main.x]), result: Const[value=1])",
            Some(&g),
        )
        .unwrap();
        let missing = DataFlowGuard::new(&g).unsatisfied_items(&tree, None);
        assert_eq!(
            missing,
            vec![UnsatisfiedRead {
                path: NodePath::from_indices(vec![0, 0]),
                slot: SlotRef::new("main", "x"),
            }]
        );
    }

    #[test]
    fn test_boundary_subtree_is_ignored() {
        let g = arithmetic();
        let tree = TreeNode::parse(PROGRAM, Some(&g)).unwrap();
        let guard = DataFlowGuard::new(&g);
        // removing the first write leaves the read of x in the second unsatisfied
        let missing = guard.unsatisfied_items(&tree, Some(&NodePath::from_indices(vec![0])));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].path, NodePath::from_indices(vec![1, 0]));
    }

    #[test]
    fn test_writes_in_subtree() {
        let g = arithmetic();
        let tree = TreeNode::parse(PROGRAM, Some(&g)).unwrap();
        let writes = DataFlowGuard::new(&g).writes_in(&tree);
        assert!(writes.contains(&SlotRef::new("main", "y")));
        assert!(!writes.contains(&SlotRef::new("main", "z")));
    }
}
