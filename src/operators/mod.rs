//! Genetic operators
//!
//! Every operator picks a splice point, asks the [`MasterStrategy`] for a
//! replacement (or takes one from a second parent) and only splices when
//! the result is at least as clean as the input:
//!
//! - `single_node`: swap one symbol, re-homing its children
//! - `subtree`: regenerate everything below a point
//! - `additive`: derive a new individual from an existing one
//! - `crossover`: random-point and pattern-adhering recombination
//! - `selection`: pluggable splice-point selectors

pub mod additive;
pub mod crossover;
pub mod selection;
pub mod single_node;
pub mod subtree;

pub use additive::AdditiveMutator;
pub use crossover::{PatternAdheringCrossover, RandomPointCrossover};
pub use selection::{DepthWidthRestrictedSelector, RandomSelector, SizeRestrictedSelector, TreeSelector};
pub use single_node::SingleNodeMutator;
pub use subtree::SubtreeMutator;

use crate::dataflow::DataFlowGuard;
use crate::error::Result;
use crate::strategy::MasterStrategy;
use crate::tree::TreeNode;
use rand::RngCore;
use std::fmt;

pub trait Mutator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// A mutated copy of `tree`; the input is never modified
    fn mutate(&self, tree: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode>;
}

pub trait Crossover: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// A child of `left` carrying a subtree of `right`
    fn breed(&self, left: &TreeNode, right: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode>;

    /// Like [`breed`](Self::breed), falling back to a copy of `left`
    fn breed_or_keep(&self, left: &TreeNode, right: &TreeNode, rng: &mut dyn RngCore) -> TreeNode {
        match self.breed(left, right, rng) {
            Ok(child) => child,
            Err(e) => {
                log::debug!("{}: keeping left parent ({})", self.name(), e);
                left.clone()
            }
        }
    }
}

/// Hard-constraint state of a tree before an operator touches it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub violations: usize,
    pub unsatisfied_reads: usize,
}

impl Baseline {
    pub fn of(master: &MasterStrategy, tree: &TreeNode) -> Self {
        Self {
            violations: master.engine().violations(tree),
            unsatisfied_reads: DataFlowGuard::new(master.grammar()).unsatisfied_items(tree, None).len(),
        }
    }

    /// Whether `candidate` may replace the tree this baseline was taken
    /// from: grammar-valid, within depth and weight, and no new antipattern
    /// matches or unsatisfied reads
    pub fn admits(&self, master: &MasterStrategy, candidate: &TreeNode) -> bool {
        let creation = master.creation();
        if candidate.depth() > creation.max_depth {
            return false;
        }
        if master.grammar().check_tree(candidate).is_err() {
            return false;
        }
        if creation.weight_bounded() && master.weights().weight(candidate) > creation.max_weight {
            return false;
        }
        let after = Self::of(master, candidate);
        after.violations <= self.violations && after.unsatisfied_reads <= self.unsatisfied_reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, TemplateEntry};
    use crate::grammar::tests::arithmetic;
    use std::sync::Arc;

    #[test]
    fn test_baseline_rejects_new_violation() {
        let mut config = EngineConfig::default();
        config.patterns.antipatterns = vec![TemplateEntry::new("no-literal-sum", "Add(Const, Const)")];
        let master = MasterStrategy::new(Arc::new(arithmetic()), &config).unwrap();
        let clean = TreeNode::parse("Add(Const[value=1], Neg(Const[value=2]))", Some(master.grammar())).unwrap();
        let dirty = TreeNode::parse("Add(Const[value=1], Const[value=2])", Some(master.grammar())).unwrap();
        let baseline = Baseline::of(&master, &clean);
        assert_eq!(baseline.violations, 0);
        assert!(baseline.admits(&master, &clean));
        assert!(!baseline.admits(&master, &dirty));
        assert!(Baseline::of(&master, &dirty).admits(&master, &dirty));
    }
}
