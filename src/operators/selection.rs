//! Splice-point selectors

use crate::tree::{NodePath, TreeNode};
use rand::{Rng, RngCore};
use std::fmt;

pub trait TreeSelector: Send + Sync + fmt::Debug {
    /// Whether the subtree may be picked at all
    fn accepts(&self, _node: &TreeNode) -> bool {
        true
    }

    /// Uniform pick among the accepted `choices`
    fn select(&self, tree: &TreeNode, choices: &[NodePath], rng: &mut dyn RngCore) -> Option<NodePath> {
        let eligible: Vec<&NodePath> = choices
            .iter()
            .filter(|p| tree.get(p).is_some_and(|n| self.accepts(n)))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        Some(eligible[rng.gen_range(0..eligible.len())].clone())
    }

    /// Pick among every node of the tree
    fn select_subtree(&self, tree: &TreeNode, rng: &mut dyn RngCore) -> Option<NodePath> {
        self.select(tree, &tree.paths(), rng)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl TreeSelector for RandomSelector {}

/// Only subtrees no deeper and no wider than the limits; 0 disables a limit
#[derive(Debug, Clone, Copy)]
pub struct DepthWidthRestrictedSelector {
    pub max_depth: usize,
    pub max_width: usize,
}

impl Default for DepthWidthRestrictedSelector {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_width: 0,
        }
    }
}

impl DepthWidthRestrictedSelector {
    pub fn new(max_depth: usize, max_width: usize) -> Self {
        Self { max_depth, max_width }
    }
}

impl TreeSelector for DepthWidthRestrictedSelector {
    fn accepts(&self, node: &TreeNode) -> bool {
        (self.max_depth == 0 || node.depth() <= self.max_depth) && (self.max_width == 0 || node.max_width() <= self.max_width)
    }
}

/// Only subtrees of at most `max_size` nodes
#[derive(Debug, Clone, Copy)]
pub struct SizeRestrictedSelector {
    pub max_size: usize,
}

impl Default for SizeRestrictedSelector {
    fn default() -> Self {
        Self { max_size: 1 }
    }
}

impl SizeRestrictedSelector {
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl TreeSelector for SizeRestrictedSelector {
    fn accepts(&self, node: &TreeNode) -> bool {
        node.size() <= self.max_size
    }
}
