//! Strategy engine
//!
//! Strategies decide, for a construction request, whether and how a
//! subtree can be materialized:
//!
//! - `terminal`: leaf values per terminal kind (constants, slots)
//! - `subtree`: one non-terminal symbol, recursing into its children
//! - `selector`: picks among several strategies that can serve a request
//! - `master`: the entry point, one selector per type plus pattern
//!   activation, feasibility caching and splice-point reconstruction
//! - `chooser`: random, biased and degree-of-freedom choice policies

pub mod chooser;
pub mod master;
pub mod selector;
pub mod subtree;
pub mod terminal;

pub use chooser::{BiasedChooser, Candidate, Chooser, DegreeOfFreedomChooser, RandomChooser};
pub use master::MasterStrategy;
pub use selector::SelectorStrategy;
pub use subtree::SubtreeStrategy;
pub use terminal::{TerminalStrategies, TerminalStrategy};

use crate::config::CreationConfiguration;
use crate::dataflow::Availability;
use crate::grammar::Grammar;
use crate::requirement::{LoadedRequirements, RequirementEngine, RequirementInformation};
use crate::tree::{NodePath, TreeNode};
use crate::weight::WeightModel;
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// One construction request
#[derive(Debug, Clone)]
pub struct CreationInformation {
    /// Type the new subtree must return
    pub expected: String,
    /// Depth of the node to build; the root of a tree sits at 0
    pub depth: usize,
    /// `max_depth` is absolute, `max_weight` is this subtree's budget
    pub config: CreationConfiguration,
    pub requirements: RequirementInformation,
    /// Slots written before this position
    pub available: Availability,
    /// Symbols that may not be placed here
    pub excluded: BTreeSet<String>,
    /// First node of the request
    pub at_root: bool,
}

impl CreationInformation {
    pub fn new(expected: impl Into<String>, config: CreationConfiguration) -> Self {
        Self {
            expected: expected.into(),
            depth: 0,
            config,
            requirements: RequirementInformation::new(),
            available: Availability::new(),
            excluded: BTreeSet::new(),
            at_root: true,
        }
    }

    /// Levels left below and including this node
    pub fn remaining_depth(&self) -> usize {
        self.config.max_depth.saturating_sub(self.depth)
    }

    /// Request for a child of the node built from `self`
    pub fn for_child(&self, expected: &str, max_weight: f64, requirements: RequirementInformation, available: Availability) -> Self {
        Self {
            expected: expected.to_string(),
            depth: self.depth + 1,
            config: CreationConfiguration {
                max_weight,
                ..self.config
            },
            requirements,
            available,
            excluded: BTreeSet::new(),
            at_root: false,
        }
    }

    /// Cache key: everything that influences feasibility
    pub fn signature(&self) -> String {
        let weight = if self.config.weight_bounded() {
            format!("{:.3}", self.config.max_weight)
        } else {
            "inf".to_string()
        };
        format!(
            "{}|d{}/{}|w{}|{}|{}|{}|[{}]",
            self.expected,
            self.depth,
            self.config.max_depth,
            self.config.max_width,
            weight,
            self.requirements.signature(),
            self.available.signature(),
            self.excluded.iter().cloned().collect::<Vec<_>>().join(",")
        )
    }
}

/// Shared, read-only collaborators of one construction
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub grammar: &'a Grammar,
    pub weights: &'a WeightModel,
    pub engine: &'a RequirementEngine,
    pub terminals: &'a TerminalStrategies,
    /// Lightest complete subtree per symbol
    pub min_weights: &'a HashMap<String, f64>,
    /// Strategy children are requested from
    pub root: &'a dyn Strategy,
}

impl fmt::Debug for StrategyContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyContext")
            .field("root", &self.root.name())
            .finish_non_exhaustive()
    }
}

impl StrategyContext<'_> {
    pub fn min_weight(&self, symbol: &str) -> f64 {
        self.min_weights.get(symbol).copied().unwrap_or(f64::INFINITY)
    }

    /// Lightest subtree able to fill a slot of type `ty`
    pub fn min_weight_of_type(&self, ty: &str) -> f64 {
        self.grammar
            .candidates(ty)
            .iter()
            .map(|s| self.min_weight(&s.id))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Common contract of every generation strategy
pub trait Strategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Cheap feasibility check: budgets, symbol applicability and the
    /// requirements of this node alone
    fn can_create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation>;

    /// Feasibility including a one-level lookahead on the children
    fn can_create_verbose(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        self.can_create(info, ctx)
    }

    /// Materialize one candidate; `None` when construction failed
    fn create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> Option<TreeNode>;

    /// Requirements per node of an already built tree
    fn load_requirements(&self, tree: &TreeNode, ctx: &StrategyContext<'_>) -> BTreeMap<NodePath, LoadedRequirements> {
        ctx.engine.load(ctx.grammar, tree)
    }
}
