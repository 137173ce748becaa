//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use treegp::{EngineConfig, Grammar, MasterStrategy, TemplateEntry};

/// Integer expressions plus statements over two storage slots
pub const ARITH: &str = r#"
root: Int
storage:
  main: [x, y]
symbols:
  - id: Add
    returns: Int
    params:
      - { name: left, accepts: Int }
      - { name: right, accepts: Int }
    weight: 2
  - id: Const
    returns: Int
    terminals:
      - { name: value, kind: int, range: [0, 9] }
    weight: 1
  - id: Neg
    returns: Int
    params:
      - { name: arg, accepts: Int }
    weight: 1
  - id: Read
    returns: Int
    kinds: [read]
    terminals:
      - { name: slot, kind: slot }
    weight: 1
  - id: Assign
    returns: Stmt
    kinds: [write]
    params:
      - { name: value, accepts: Int }
    terminals:
      - { name: slot, kind: slot }
    weight: 1
  - id: Seq
    returns: Program
    params:
      - { name: body, accepts: Stmt, array: true, min: 1, max: 3 }
      - { name: result, accepts: Int }
    weight: 1
"#;

/// Only `Add` and `Const`
pub const ADD_CONST: &str = r#"
root: Int
symbols:
  - id: Add
    returns: Int
    params:
      - { name: left, accepts: Int }
      - { name: right, accepts: Int }
    weight: 2
  - id: Const
    returns: Int
    terminals:
      - { name: value, kind: int, range: [0, 9] }
    weight: 1
"#;

/// Sums of leaves carrying two terminals each
pub const PAIRS: &str = r#"
root: Int
symbols:
  - id: Add
    returns: Int
    params:
      - { name: left, accepts: Int }
      - { name: right, accepts: Int }
    weight: 2
  - id: Pair
    returns: Int
    terminals:
      - { name: flag, kind: bool }
      - { name: value, kind: int, range: [0, 1] }
    weight: 1
"#;

pub fn grammar(yaml: &str) -> Arc<Grammar> {
    Arc::new(Grammar::from_yaml(yaml).expect("fixture grammar"))
}

pub fn config(max_depth: usize, antipatterns: &[&str]) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.creation.max_depth = max_depth;
    config.patterns.antipatterns = antipatterns
        .iter()
        .enumerate()
        .map(|(i, shape)| TemplateEntry::new(format!("anti-{}", i), *shape))
        .collect();
    config
}

pub fn master(yaml: &str, config: &EngineConfig) -> Arc<MasterStrategy> {
    Arc::new(MasterStrategy::new(grammar(yaml), config).expect("fixture master"))
}
