// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # treegp — constrained genetic-programming trees
//!
//! Builds, mutates and recombines program trees of a typed grammar while
//! honouring depth, width and weight limits, structural antipatterns that
//! must never appear, patterns that should appear now and then, and data
//! flow between storage writes and reads.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use treegp::*;
//! use rand::{rngs::StdRng, SeedableRng};
//! use std::sync::Arc;
//!
//! let grammar = Arc::new(Grammar::load("arith.yaml".as_ref())?);
//! let config = EngineConfig::from_yaml(r#"
//!   creation: { max_depth: 6, max_width: 4 }
//!   patterns:
//!     antipatterns:
//!       - { id: no-literal-sum, shape: "Add(Const, Const)" }
//! "#)?;
//!
//! let master = Arc::new(MasterStrategy::new(grammar, &config)?);
//! let mut rng = StdRng::seed_from_u64(7);
//! let tree = master.generate(&mut rng)?;
//!
//! let mutated = SubtreeMutator::new(Arc::clone(&master), &config.mutation).mutate(&tree, &mut rng)?;
//! println!("{} -> {}", tree, mutated);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! grammar ──► weight ──► requirement (templates) ──► strategy ──► operators
//!    │                        │                         │
//!    └── tree / identity ─────┴── dataflow ─────────────┘
//! ```
//!
//! - [`grammar`]: symbols, types, storage and derived bounds
//! - [`tree`], [`identity`]: the generic tree, paths and content hashes
//! - [`weight`]: per-symbol cost and subtree aggregation
//! - [`template`], [`requirement`]: pattern templates and the obligations
//!   they put on construction
//! - [`dataflow`]: which storage slots are written before a point
//! - [`strategy`]: constrained construction
//! - [`operators`]: mutation and crossover
//! - [`provider`], [`population`]: seams to execution engines and seeding

// Model
pub mod config;
pub mod error;
pub mod grammar;
pub mod identity;
pub mod syntax;
pub mod tree;
pub mod weight;

// Constraints
pub mod dataflow;
pub mod requirement;
pub mod template;

// Construction and variation
pub mod operators;
pub mod population;
pub mod provider;
pub mod strategy;

// Re-exports
pub use config::{
    CacheConfig, CreationConfiguration, CrossoverConfig, EngineConfig, MutationConfig, PatternConfig, TemplateEntry,
    WeightConfig,
};
pub use dataflow::{Availability, DataFlowGuard, UnsatisfiedRead};
pub use error::{Error, Result};
pub use grammar::{FieldKind, Grammar, GrammarFile, ParamDescriptor, Symbol, SymbolKind, TerminalDescriptor, TerminalKind};
pub use identity::{content_hash, structurally_equal};
pub use operators::{
    AdditiveMutator, Crossover, DepthWidthRestrictedSelector, Mutator, PatternAdheringCrossover, RandomPointCrossover,
    RandomSelector, SingleNodeMutator, SizeRestrictedSelector, SubtreeMutator, TreeSelector,
};
pub use population::{random_population, seed_population};
pub use provider::{materialize, wrap, CachedEvaluator, Describe, Evaluator, NodeFactory};
pub use requirement::{Requirement, RequirementEngine, RequirementInformation, RequirementKind};
pub use strategy::{CreationInformation, MasterStrategy, Strategy};
pub use template::{PatternTemplate, TemplateKind};
pub use tree::{Child, NodePath, SlotRef, TreeNode, Value};
pub use weight::{ExecutionTrace, WeightModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
