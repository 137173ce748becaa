//! CLI command implementations
//!
//! - `variation`: generate, mutate, crossover
//! - `inspect`: hash, weight, validate
//! - `config`: schema output
//! - `util`: shared argument and file helpers

pub mod config;
pub mod inspect;
pub mod util;
pub mod variation;

pub use config::cmd_schema;
pub use inspect::{cmd_hash, cmd_validate, cmd_weight};
pub use variation::{cmd_crossover, cmd_generate, cmd_mutate};
