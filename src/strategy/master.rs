//! Master strategy: entry point of every construction

use super::selector::FeasibilityCache;
use super::{CreationInformation, SelectorStrategy, Strategy, StrategyContext, SubtreeStrategy, TerminalStrategies};
use crate::config::{CreationConfiguration, EngineConfig};
use crate::dataflow::DataFlowGuard;
use crate::error::{Error, Result};
use crate::grammar::{Grammar, Symbol};
use crate::requirement::{LoadedRequirements, Requirement, RequirementEngine, RequirementInformation};
use crate::template::{Matcher, PatternTemplate};
use crate::tree::{NodePath, TreeNode};
use crate::weight::WeightModel;
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Fresh attempts of a whole construction before giving up
const GENERATION_ATTEMPTS: usize = 10;

/// One selector per type over the grammar's symbols, pattern activation at
/// every construction point and a shared feasibility cache
#[derive(Debug)]
pub struct MasterStrategy {
    grammar: Arc<Grammar>,
    weights: WeightModel,
    engine: RequirementEngine,
    terminals: TerminalStrategies,
    min_weights: HashMap<String, f64>,
    subtrees: HashMap<String, Arc<SubtreeStrategy>>,
    selectors: HashMap<String, SelectorStrategy>,
    cache: Arc<FeasibilityCache>,
    creation: CreationConfiguration,
}

impl MasterStrategy {
    /// Build from an engine configuration; templates are parsed and
    /// validated against the grammar
    pub fn new(grammar: Arc<Grammar>, config: &EngineConfig) -> Result<Self> {
        let engine = RequirementEngine::from_config(&config.patterns, &grammar)?;
        let weights = WeightModel::new(&grammar, &config.weights);
        Ok(Self::with_parts(grammar, weights, engine, config))
    }

    pub fn with_parts(grammar: Arc<Grammar>, weights: WeightModel, mut engine: RequirementEngine, config: &EngineConfig) -> Self {
        let mut subtrees: HashMap<String, SubtreeStrategy> = grammar
            .symbols()
            .iter()
            .map(|s| (s.id.clone(), SubtreeStrategy::new(s.id.clone())))
            .collect();

        let compiled: Vec<(String, String, String, String)> = engine
            .antipatterns()
            .iter()
            .filter_map(|t| Self::restriction(&grammar, t))
            .collect();
        for (id, parent, param, child) in compiled {
            if let Some(strategy) = subtrees.get_mut(&parent) {
                log::debug!("antipattern '{}' restricts {}.{} to exclude {}", id, parent, param, child);
                strategy.restrict(param, child);
                engine.mark_compiled(&id);
            }
        }

        let subtrees: HashMap<String, Arc<SubtreeStrategy>> = subtrees.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        let cache = Arc::new(FeasibilityCache::new(config.cache.feasibility_entries));
        let selectors = Self::types(&grammar)
            .into_iter()
            .map(|ty| {
                let options: Vec<Arc<dyn Strategy>> = grammar
                    .candidates(&ty)
                    .iter()
                    .filter_map(|s| subtrees.get(&s.id))
                    .map(|s| Arc::clone(s) as Arc<dyn Strategy>)
                    .collect();
                let selector = SelectorStrategy::new(format!("type:{}", ty), options).with_cache(Arc::clone(&cache));
                (ty, selector)
            })
            .collect();

        let min_weights = weights.minimal_weights(&grammar);
        let terminals = TerminalStrategies::for_grammar(&grammar);
        Self {
            grammar,
            weights,
            engine,
            terminals,
            min_weights,
            subtrees,
            selectors,
            cache,
            creation: config.creation,
        }
    }

    /// A two-node antipattern `P(C)` without values becomes a candidate
    /// restriction on the parameter of `P` it addresses
    fn restriction(grammar: &Grammar, template: &PatternTemplate) -> Option<(String, String, String, String)> {
        let root = &template.root;
        let Matcher::Symbol(parent) = &root.matcher else {
            return None;
        };
        if !root.values.is_empty() || root.children.len() != 1 {
            return None;
        }
        let child = &root.children[0];
        let Matcher::Symbol(excluded) = &child.matcher else {
            return None;
        };
        if !child.values.is_empty() || !child.children.is_empty() {
            return None;
        }
        let symbol = grammar.symbol(parent)?;
        let param = match &child.field {
            Some(field) => symbol.param_named(field)?,
            None if symbol.params.len() == 1 => &symbol.params[0],
            None => return None,
        };
        Some((template.id.clone(), parent.clone(), param.name.clone(), excluded.clone()))
    }

    /// Every type a request can name
    fn types(grammar: &Grammar) -> BTreeSet<String> {
        let mut types = BTreeSet::new();
        for symbol in grammar.symbols() {
            types.insert(symbol.returns.clone());
            types.extend(symbol.params.iter().map(|p| p.accepts.clone()));
        }
        for (ty, supers) in &grammar.file().types {
            types.insert(ty.clone());
            types.extend(supers.iter().cloned());
        }
        types.extend(grammar.root_type().map(str::to_string));
        types
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn grammar_arc(&self) -> Arc<Grammar> {
        Arc::clone(&self.grammar)
    }

    pub fn weights(&self) -> &WeightModel {
        &self.weights
    }

    pub fn engine(&self) -> &RequirementEngine {
        &self.engine
    }

    pub fn creation(&self) -> &CreationConfiguration {
        &self.creation
    }

    pub fn cache(&self) -> &FeasibilityCache {
        &self.cache
    }

    pub fn min_weights(&self) -> &HashMap<String, f64> {
        &self.min_weights
    }

    pub fn context(&self) -> StrategyContext<'_> {
        StrategyContext {
            grammar: &self.grammar,
            weights: &self.weights,
            engine: &self.engine,
            terminals: &self.terminals,
            min_weights: &self.min_weights,
            root: self,
        }
    }

    /// A fresh program of the grammar's root type
    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<TreeNode> {
        let root = self
            .grammar
            .root_type()
            .ok_or_else(|| Error::GrammarInvalid("grammar declares no root type".into()))?
            .to_string();
        self.generate_type(&root, &self.creation, rng)
    }

    /// A fresh tree of type `ty` within `config`
    pub fn generate_type(&self, ty: &str, config: &CreationConfiguration, rng: &mut dyn RngCore) -> Result<TreeNode> {
        let ctx = self.context();
        for attempt in 0..GENERATION_ATTEMPTS {
            let info = CreationInformation::new(ty, *config);
            if let Some(tree) = self.create(&info, &ctx, rng) {
                log::debug!("generated {} ({} nodes) on attempt {}", ty, tree.size(), attempt + 1);
                return Ok(tree);
            }
        }
        Err(Error::InfeasibleConstruction(format!(
            "no {} within depth {}, width {} after {} attempts",
            ty, config.max_depth, config.max_width, GENERATION_ATTEMPTS
        )))
    }

    /// Type expected at `path`: the parameter type under the parent, the
    /// current return type at the root
    pub fn expected_type(&self, tree: &TreeNode, path: &NodePath) -> Option<String> {
        let Some(parent_path) = path.parent() else {
            return self.grammar.symbol(&tree.symbol).map(|s| s.returns.clone());
        };
        let parent = tree.get(&parent_path)?;
        let edge = tree.edge(path)?;
        let symbol = self.grammar.symbol(&parent.symbol)?;
        symbol.param_named(&edge.field).map(|p| p.accepts.clone())
    }

    /// Request describing a regeneration of the subtree at `path`:
    /// ancestor requirements, writes before the point and restrictions of
    /// the parent's parameter. `config.max_depth` stays absolute.
    pub fn request_at(&self, tree: &TreeNode, path: &NodePath, config: CreationConfiguration) -> Option<CreationInformation> {
        let expected = self.expected_type(tree, path)?;
        let mut info = CreationInformation::new(expected, config);
        info.depth = path.len();
        info.requirements = self.engine.requirements_at(&self.grammar, tree, path);
        info.available = DataFlowGuard::new(&self.grammar).available_items(tree, Some(path));
        if let (Some(parent_path), Some(edge)) = (path.parent(), tree.edge(path)) {
            let excluded = tree
                .get(&parent_path)
                .and_then(|p| self.subtrees.get(&p.symbol))
                .and_then(|s| s.restrictions(&edge.field));
            if let Some(excluded) = excluded {
                info.excluded = excluded.clone();
            }
        }
        Some(info)
    }

    /// A replacement subtree for `path` that keeps every hard constraint of
    /// the surrounding tree
    pub fn create_at(&self, tree: &TreeNode, path: &NodePath, config: CreationConfiguration, rng: &mut dyn RngCore) -> Option<TreeNode> {
        let info = self.request_at(tree, path, config)?;
        self.create(&info, &self.context(), rng)
    }

    /// Whether a replacement could exist at `path` at all
    pub fn can_create_at(&self, tree: &TreeNode, path: &NodePath, config: CreationConfiguration) -> bool {
        self.request_at(tree, path, config)
            .is_some_and(|info| self.can_create(&info, &self.context()).is_some())
    }

    /// Candidate symbols for a request, after exclusions
    fn heads(&self, info: &CreationInformation) -> Vec<&Symbol> {
        self.grammar
            .candidates(&info.expected)
            .into_iter()
            .filter(|s| !info.excluded.contains(&s.id))
            .collect()
    }

    /// Roll pattern activation for one request
    fn activate(&self, info: &CreationInformation, rng: &mut dyn RngCore) -> Option<Requirement> {
        if self.engine.patterns().is_empty() {
            return None;
        }
        self.engine.activate(&self.heads(info), info.at_root, rng)
    }
}

impl Strategy for MasterStrategy {
    fn name(&self) -> &str {
        "master"
    }

    fn can_create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        self.selectors.get(&info.expected)?.can_create(info, ctx)
    }

    fn can_create_verbose(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        self.selectors.get(&info.expected)?.can_create_verbose(info, ctx)
    }

    fn create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> Option<TreeNode> {
        let selector = self.selectors.get(&info.expected)?;
        match self.activate(info, rng) {
            Some(pattern) => {
                let mut activated = info.clone();
                activated.requirements.add(pattern);
                selector
                    .create(&activated, ctx, rng)
                    // a pattern never makes a request infeasible
                    .or_else(|| selector.create(info, ctx, rng))
            }
            None => selector.create(info, ctx, rng),
        }
    }

    /// Template requirements plus reads with no preceding write: such a
    /// node carries an open data-write requirement and counts as failed
    fn load_requirements(&self, tree: &TreeNode, ctx: &StrategyContext<'_>) -> BTreeMap<NodePath, LoadedRequirements> {
        let mut loaded = ctx.engine.load(ctx.grammar, tree);
        for read in DataFlowGuard::new(ctx.grammar).unsatisfied_items(tree, None) {
            let entry = loaded.entry(read.path).or_default();
            entry.info.add(Requirement::data_write(read.slot));
            entry.failed = true;
        }
        loaded
    }
}
