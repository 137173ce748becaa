//! Engine configuration
//!
//! A single YAML document configures construction budgets, weight
//! heuristics, the active pattern/antipattern templates, operator retry
//! limits and cache sizes. Every field is optional.
//!
//! ```yaml
//! creation:
//!   max_depth: 6
//!   max_width: 4
//! patterns:
//!   antipatterns:
//!     - id: no_const_add
//!       shape: "Add(Const, Const)"
//! seed: 42
//! ```

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EngineConfig {
    /// Budgets for one construction request
    #[serde(default)]
    pub creation: CreationConfiguration,

    /// Weight heuristics
    #[serde(default)]
    pub weights: WeightConfig,

    /// Pattern and antipattern templates
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Mutation retry and narrowing limits
    #[serde(default)]
    pub mutation: MutationConfig,

    /// Crossover retry limits
    #[serde(default)]
    pub crossover: CrossoverConfig,

    /// Cache sizes
    #[serde(default)]
    pub cache: CacheConfig,

    /// RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl EngineConfig {
    /// Parse configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_norway::from_str(yaml)?;
        config.creation.check()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_yaml(&content).map_err(|e| {
            Error::Other(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_norway::to_string(self)?)
    }
}

/// Max depth, max width and max cumulative weight for one construction
/// request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreationConfiguration {
    /// Maximum tree depth; a single leaf has depth 1
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Maximum number of children of any node
    #[serde(default = "default_max_width")]
    pub max_width: usize,

    /// Maximum cumulative weight, unbounded when absent
    #[serde(default = "default_max_weight", skip_serializing_if = "is_unbounded")]
    pub max_weight: f64,
}

fn default_max_depth() -> usize {
    5
}

fn default_max_width() -> usize {
    5
}

fn default_max_weight() -> f64 {
    f64::MAX
}

fn is_unbounded(weight: &f64) -> bool {
    *weight >= f64::MAX
}

impl Default for CreationConfiguration {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_width: default_max_width(),
            max_weight: default_max_weight(),
        }
    }
}

impl CreationConfiguration {
    pub fn new(max_depth: usize, max_width: usize, max_weight: f64) -> Self {
        Self {
            max_depth,
            max_width,
            max_weight,
        }
    }

    /// Whether a weight limit is in effect
    pub fn weight_bounded(&self) -> bool {
        !is_unbounded(&self.max_weight)
    }

    fn check(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err("creation.max_depth must be at least 1".into());
        }
        if self.max_width == 0 {
            return Err("creation.max_width must be at least 1".into());
        }
        if self.max_weight.is_nan() || self.max_weight < 0.0 {
            return Err("creation.max_weight must be a non-negative number".into());
        }
        Ok(())
    }
}

/// Weight model heuristics
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WeightConfig {
    /// Weight profile selected from the grammar's weight tables
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Assumed iteration count of loop bodies
    #[serde(default = "default_loop_iterations")]
    pub loop_iterations: f64,

    /// Multiplier applied to branch children after averaging
    #[serde(default = "default_condition_cost")]
    pub condition_cost: f64,
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_loop_iterations() -> f64 {
    10.0
}

fn default_condition_cost() -> f64 {
    1.1
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            loop_iterations: default_loop_iterations(),
            condition_cost: default_condition_cost(),
        }
    }
}

/// One authored template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TemplateEntry {
    /// Unique template id
    pub id: String,

    /// Template shape, e.g. `Add(Const, Const)` or `ANYWHERE(Loop)`
    pub shape: String,

    /// Activation chance override (patterns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chance: Option<f64>,
}

impl TemplateEntry {
    pub fn new(id: impl Into<String>, shape: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            shape: shape.into(),
            chance: None,
        }
    }
}

/// Pattern configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PatternConfig {
    /// Probability that a pattern activates at an eligible position
    #[serde(default = "default_activation_chance")]
    pub activation_chance: f64,

    /// Forbidden shapes
    #[serde(default)]
    pub antipatterns: Vec<TemplateEntry>,

    /// Desired shapes
    #[serde(default)]
    pub patterns: Vec<TemplateEntry>,
}

fn default_activation_chance() -> f64 {
    0.33
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            activation_chance: default_activation_chance(),
            antipatterns: Vec::new(),
            patterns: Vec::new(),
        }
    }
}

/// Mutation limits
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MutationConfig {
    /// Attempts before a mutation is declared exhausted
    #[serde(default = "default_mutation_retries")]
    pub retries: usize,

    /// Remaining depth above which the budget is narrowed hard
    #[serde(default = "default_cap")]
    pub depth_cap: usize,

    /// Remaining width above which the budget is narrowed hard
    #[serde(default = "default_cap")]
    pub width_cap: usize,

    /// Smallest budget narrowing may produce
    #[serde(default = "default_narrow_floor")]
    pub narrow_floor: usize,
}

fn default_mutation_retries() -> usize {
    50
}

fn default_cap() -> usize {
    10
}

fn default_narrow_floor() -> usize {
    3
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            retries: default_mutation_retries(),
            depth_cap: default_cap(),
            width_cap: default_cap(),
            narrow_floor: default_narrow_floor(),
        }
    }
}

/// Crossover limits
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CrossoverConfig {
    /// Attempts of random-point crossover
    #[serde(default = "default_crossover_tries")]
    pub tries: usize,

    /// Attempts over violating points (pattern-adhering crossover)
    #[serde(default = "default_phase_tries")]
    pub hard_tries: usize,

    /// Attempts over fully satisfied points (pattern-adhering crossover)
    #[serde(default = "default_phase_tries")]
    pub backup_tries: usize,

    /// Re-select the left point when no right point fits the weight budget
    #[serde(default = "default_true")]
    pub weight_aware: bool,
}

fn default_crossover_tries() -> usize {
    10
}

fn default_phase_tries() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            tries: default_crossover_tries(),
            hard_tries: default_phase_tries(),
            backup_tries: default_phase_tries(),
            weight_aware: true,
        }
    }
}

/// Bounded cache sizes
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfig {
    /// Entries kept by the strategy feasibility cache
    #[serde(default = "default_feasibility_entries")]
    pub feasibility_entries: usize,

    /// Entries kept by the evaluation cache
    #[serde(default = "default_evaluation_entries")]
    pub evaluation_entries: usize,
}

fn default_feasibility_entries() -> usize {
    4096
}

fn default_evaluation_entries() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feasibility_entries: default_feasibility_entries(),
            evaluation_entries: default_evaluation_entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(config.creation.max_depth, 5);
        assert_eq!(config.creation.max_width, 5);
        assert!(!config.creation.weight_bounded());
        assert_eq!(config.weights.loop_iterations, 10.0);
        assert_eq!(config.weights.condition_cost, 1.1);
        assert_eq!(config.patterns.activation_chance, 0.33);
        assert_eq!(config.mutation.retries, 50);
        assert_eq!(config.crossover.hard_tries, 5);
        assert_eq!(config.crossover.backup_tries, 5);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
creation:
  max_depth: 3
  max_weight: 40
patterns:
  antipatterns:
    - id: no_const_add
      shape: "Add(Const, Const)"
seed: 7
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.creation.max_depth, 3);
        assert_eq!(config.creation.max_width, 5);
        assert_eq!(config.creation.max_weight, 40.0);
        assert!(config.creation.weight_bounded());
        assert_eq!(config.patterns.antipatterns.len(), 1);
        assert_eq!(config.patterns.antipatterns[0].shape, "Add(Const, Const)");
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_rejects_zero_depth() {
        assert!(EngineConfig::from_yaml("creation:\n  max_depth: 0\n").is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_unbounded_weight() {
        let config = EngineConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert!(!yaml.contains("max_weight"));
        let back = EngineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back.creation, config.creation);
    }
}
