//! Additive creation: a new individual derived from an existing one

use super::{Mutator, SubtreeMutator};
use crate::config::MutationConfig;
use crate::error::Result;
use crate::strategy::MasterStrategy;
use crate::tree::TreeNode;
use rand::RngCore;
use std::sync::Arc;

/// Seeds populations around a known program: every call mutates the
/// original exactly once through the inner mutator
#[derive(Debug)]
pub struct AdditiveMutator {
    inner: Box<dyn Mutator>,
}

impl AdditiveMutator {
    pub fn new(master: Arc<MasterStrategy>, config: &MutationConfig) -> Self {
        Self {
            inner: Box::new(SubtreeMutator::new(master, config)),
        }
    }

    pub fn with_inner(inner: Box<dyn Mutator>) -> Self {
        Self { inner }
    }

    /// A fresh individual derived from `original`
    pub fn derive(&self, original: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode> {
        self.inner.mutate(original, rng)
    }
}

impl Mutator for AdditiveMutator {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn mutate(&self, tree: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode> {
        self.derive(tree, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::grammar::tests::arithmetic;
    use crate::identity::content_hash;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_derive_leaves_original_untouched() {
        let config = EngineConfig::default();
        let master = Arc::new(MasterStrategy::new(Arc::new(arithmetic()), &config).unwrap());
        let additive = AdditiveMutator::new(Arc::clone(&master), &config.mutation);
        let original = TreeNode::parse("Add(Neg(Const[value=1]), Const[value=2])", Some(master.grammar())).unwrap();
        let before = content_hash(&original);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..10 {
            let derived = additive.derive(&original, &mut rng).unwrap();
            master.grammar().check_tree(&derived).unwrap();
        }
        assert_eq!(content_hash(&original), before);
    }
}
