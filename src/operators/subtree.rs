//! Subtree mutation: everything below a point is regenerated

use super::{Baseline, Mutator, RandomSelector, TreeSelector};
use crate::config::{CreationConfiguration, MutationConfig};
use crate::error::{Error, Result};
use crate::strategy::{MasterStrategy, Strategy};
use crate::tree::{NodePath, TreeNode};
use rand::{Rng, RngCore};
use std::sync::Arc;

/// Prefers points already flagged as failed (antipattern anchors,
/// unsatisfied reads); otherwise any point. Each attempt starts from a
/// fresh copy of the input.
#[derive(Debug)]
pub struct SubtreeMutator {
    master: Arc<MasterStrategy>,
    selector: Box<dyn TreeSelector>,
    config: MutationConfig,
}

impl SubtreeMutator {
    pub fn new(master: Arc<MasterStrategy>, config: &MutationConfig) -> Self {
        Self {
            master,
            selector: Box::new(RandomSelector),
            config: config.clone(),
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn TreeSelector>) -> Self {
        self.selector = selector;
        self
    }

    /// Levels granted below a point with `remaining` levels left. Large
    /// budgets are cut down at random, since regenerated subtrees otherwise
    /// grow to the limit.
    pub fn narrow_depth(&self, remaining: usize, rng: &mut dyn RngCore) -> usize {
        let floor = self.config.narrow_floor;
        if remaining > self.config.depth_cap {
            rng.gen_range(floor..=self.config.depth_cap.max(floor))
        } else if remaining > floor {
            rng.gen_range(floor..=remaining)
        } else {
            remaining
        }
    }

    /// Width granted to a subtree whose parent has `siblings` children
    pub fn narrow_width(&self, max_width: usize, siblings: usize, rng: &mut dyn RngCore) -> usize {
        let floor = self.config.narrow_floor;
        let width = (max_width + 1).saturating_sub(siblings).min(max_width);
        if width > self.config.width_cap {
            rng.gen_range(floor..=self.config.width_cap.saturating_sub(2).max(floor))
        } else if width > floor {
            rng.gen_range(floor..=width)
        } else {
            width.max(1)
        }
    }

    /// Candidate points: failed ones when there are any
    fn choices(&self, tree: &TreeNode) -> Vec<NodePath> {
        let loaded = self.master.load_requirements(tree, &self.master.context());
        let failed: Vec<NodePath> = loaded
            .into_iter()
            .filter(|(_, l)| l.failed)
            .map(|(p, _)| p)
            .collect();
        if failed.is_empty() {
            tree.paths()
        } else {
            failed
        }
    }

    fn attempt(&self, mut tree: TreeNode, baseline: &Baseline, rng: &mut dyn RngCore) -> Option<TreeNode> {
        let path = self.selector.select(&tree, &self.choices(&tree), rng)?;
        let creation = *self.master.creation();
        let budget = if creation.weight_bounded() {
            let weights = self.master.weights();
            creation.max_weight - (weights.weight(&tree) - weights.weight(tree.get(&path)?))
        } else {
            creation.max_weight
        };

        let replacement = match path.parent() {
            None => {
                let ty = self.master.expected_type(&tree, &path)?;
                let config = CreationConfiguration { max_weight: budget, ..creation };
                self.master.generate_type(&ty, &config, rng).ok()?
            }
            Some(parent) => {
                let remaining = creation.max_depth.saturating_sub(path.len());
                let depth = path.len() + self.narrow_depth(remaining, rng);
                let siblings = tree.get(&parent)?.children.len();
                let width = self.narrow_width(creation.max_width, siblings, rng);
                self.master
                    .create_at(&tree, &path, CreationConfiguration::new(depth, width, budget), rng)?
            }
        };
        tree.replace_at(&path, replacement).ok()?;
        baseline.admits(&self.master, &tree).then_some(tree)
    }
}

impl Mutator for SubtreeMutator {
    fn name(&self) -> &'static str {
        "subtree"
    }

    fn mutate(&self, tree: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode> {
        let baseline = Baseline::of(&self.master, tree);
        for attempt in 0..self.config.retries {
            if let Some(mutated) = self.attempt(tree.clone(), &baseline, rng) {
                log::debug!("subtree mutation succeeded on attempt {}", attempt + 1);
                return Ok(mutated);
            }
        }
        log::warn!("subtree mutation failed in all {} attempts", self.config.retries);
        Err(Error::MutationExhausted {
            operator: self.name(),
            attempts: self.config.retries,
        })
    }
}
