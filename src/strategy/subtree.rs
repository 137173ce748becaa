//! Non-terminal symbol strategy

use super::{CreationInformation, Strategy, StrategyContext};
use crate::dataflow::DataFlowGuard;
use crate::grammar::Symbol;
use crate::requirement::{Evaluation, RequirementInformation};
use crate::tree::{TreeNode, Value};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::{BTreeSet, HashMap};

/// Builds one symbol: arity, terminal values, then each child in order
#[derive(Debug, Clone)]
pub struct SubtreeStrategy {
    symbol: String,
    name: String,
    /// Symbols a parameter may not take, per parameter
    restricted: HashMap<String, BTreeSet<String>>,
}

impl SubtreeStrategy {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            name: format!("subtree:{}", symbol),
            symbol,
            restricted: HashMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Keep `excluded` out of every child placed in `param`
    pub fn restrict(&mut self, param: impl Into<String>, excluded: impl Into<String>) {
        self.restricted.entry(param.into()).or_default().insert(excluded.into());
    }

    pub fn restrictions(&self, param: &str) -> Option<&BTreeSet<String>> {
        self.restricted.get(param)
    }

    /// Children the symbol could receive under the width budget
    fn capacity(symbol: &Symbol, info: &CreationInformation) -> usize {
        if symbol.params.is_empty() {
            return 0;
        }
        symbol.max_arity().unwrap_or(usize::MAX).min(info.config.max_width)
    }

    /// Budgets, type and the node's own requirements
    fn feasible<'c>(&self, info: &CreationInformation, ctx: &StrategyContext<'c>) -> Option<(&'c Symbol, Evaluation)> {
        let symbol = ctx.grammar.symbol(&self.symbol)?;
        if info.excluded.contains(&symbol.id) || !ctx.grammar.is_assignable(&symbol.returns, &info.expected) {
            return None;
        }
        let bounds = ctx.grammar.bounds(&symbol.id)?;
        if bounds.min_depth > info.remaining_depth() || symbol.min_arity() > info.config.max_width {
            return None;
        }
        if info.config.weight_bounded() && ctx.min_weight(&symbol.id) > info.config.max_weight {
            return None;
        }
        let eval = ctx.engine.evaluate(symbol, &info.requirements, Self::capacity(symbol, info));
        if eval.blocked {
            return None;
        }
        for terminal in &symbol.terminals {
            let forbidden: Vec<&Value> = eval
                .forbidden_values
                .iter()
                .filter(|(k, _)| *k == terminal.name)
                .map(|(_, v)| v)
                .collect();
            if !ctx.terminals.can_fill(terminal, symbol, info, &forbidden) {
                return None;
            }
        }
        Some((symbol, eval))
    }

    /// Field label and accepted type of every child, arrays sized at random
    /// within the width budget. Arrays shrink while the lightest possible
    /// children would already exceed the weight budget.
    fn choose_labels(&self, symbol: &Symbol, info: &CreationInformation, ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> Option<Vec<(String, String)>> {
        let min_total = symbol.min_arity();
        if min_total > info.config.max_width {
            return None;
        }
        let mut spare = info.config.max_width - min_total;
        let mut counts = Vec::with_capacity(symbol.params.len());
        for param in &symbol.params {
            if !param.array {
                counts.push(1);
                continue;
            }
            let room = param.max.map_or(usize::MAX, |m| m.saturating_sub(param.min)).min(spare);
            let extra = if room == 0 { 0 } else { rng.gen_range(0..=room) };
            spare -= extra;
            counts.push(param.min + extra);
        }

        if info.config.weight_bounded() {
            let own = ctx.weights.symbol_weight(&symbol.id);
            loop {
                let mins: Vec<f64> = symbol
                    .params
                    .iter()
                    .zip(&counts)
                    .flat_map(|(p, &n)| std::iter::repeat_n(ctx.min_weight_of_type(&p.accepts), n))
                    .collect();
                if own + ctx.weights.aggregate(&symbol.id, &mins) <= info.config.max_weight {
                    break;
                }
                let shrinkable = symbol
                    .params
                    .iter()
                    .zip(counts.iter_mut())
                    .find(|(p, n)| p.array && **n > p.min);
                match shrinkable {
                    Some((_, n)) => *n -= 1,
                    None => break,
                }
            }
        }

        Some(
            symbol
                .params
                .iter()
                .zip(counts)
                .flat_map(|(p, n)| std::iter::repeat_n((p.name.clone(), p.accepts.clone()), n))
                .collect(),
        )
    }

    /// Weight left for the child in `index` once earlier siblings weigh
    /// `used` and later ones are reserved at their lightest
    fn child_budget(info: &CreationInformation, own: f64, factor: f64, used: f64, reserved: f64) -> f64 {
        if !info.config.weight_bounded() {
            return info.config.max_weight;
        }
        let left = info.config.max_weight - own;
        (left / factor - used - reserved).min(left)
    }
}

impl Strategy for SubtreeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn can_create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        self.feasible(info, ctx).map(|(_, eval)| eval.info)
    }

    /// Also checks that every child slot of the smallest arity has a
    /// candidate surviving the requirements handed to it
    fn can_create_verbose(&self, info: &CreationInformation, ctx: &StrategyContext<'_>) -> Option<RequirementInformation> {
        let (symbol, eval) = self.feasible(info, ctx)?;
        let result = eval.info.clone();
        if symbol.params.is_empty() {
            return Some(result);
        }
        let labels: Vec<(String, String)> = symbol
            .params
            .iter()
            .flat_map(|p| std::iter::repeat_n((p.name.clone(), p.accepts.clone()), p.required()))
            .collect();
        // lookahead only; the draw does not influence construction
        let mut rng = StdRng::seed_from_u64(0);
        let mut plan = ctx.engine.plan(eval, labels.iter().map(|(f, _)| f.clone()).collect(), &mut rng);
        let child_depth = info.depth + 1;
        for (i, (field, ty)) in labels.iter().enumerate() {
            let requirements = plan.child_requirements(i, &mut rng);
            let excluded = self.restricted.get(field);
            let served = ctx.grammar.candidates(ty).into_iter().any(|c| {
                if excluded.is_some_and(|e| e.contains(&c.id)) {
                    return false;
                }
                let fits_depth = ctx
                    .grammar
                    .min_subtree_depth(&c.id)
                    .is_some_and(|d| child_depth + d <= info.config.max_depth);
                fits_depth && !ctx.engine.evaluate(c, &requirements, c.max_arity().unwrap_or(info.config.max_width)).blocked
            });
            if !served {
                log::trace!("{}: no candidate for '{}' at depth {}", self.name, field, child_depth);
                return None;
            }
        }
        Some(result)
    }

    fn create(&self, info: &CreationInformation, ctx: &StrategyContext<'_>, rng: &mut dyn RngCore) -> Option<TreeNode> {
        let (symbol, _) = self.feasible(info, ctx)?;
        let labels = self.choose_labels(symbol, info, ctx, rng)?;
        let eval = ctx.engine.evaluate(symbol, &info.requirements, labels.len());
        if eval.blocked {
            return None;
        }
        let mut plan = ctx.engine.plan(eval, labels.iter().map(|(f, _)| f.clone()).collect(), rng);

        let mut node = TreeNode::new(symbol.id.clone());
        for terminal in &symbol.terminals {
            let forbidden = plan.forbidden_for(&terminal.name, &node.values);
            let required = plan
                .required_values()
                .iter()
                .find(|(k, _)| *k == terminal.name)
                .map(|(_, v)| v);
            let value = ctx.terminals.value_for(terminal, symbol, info, required, &forbidden, rng)?;
            node.values.insert(terminal.name.clone(), value);
        }
        plan.settle_values(&node.values);

        let own = ctx.weights.symbol_weight(&symbol.id);
        let factor = ctx.weights.child_factor(&symbol.id, labels.len()).max(f64::EPSILON);
        let lightest: Vec<f64> = labels.iter().map(|(_, ty)| ctx.min_weight_of_type(ty)).collect();
        let guard = DataFlowGuard::new(ctx.grammar);
        let mut available = info.available.clone();
        let mut used = 0.0;

        for (i, (field, ty)) in labels.iter().enumerate() {
            let reserved: f64 = lightest[i + 1..].iter().sum();
            let budget = Self::child_budget(info, own, factor, used, reserved);
            if budget < lightest[i] {
                return None;
            }
            let requirements = plan.child_requirements(i, rng);
            let mut child_info = info.for_child(ty, budget, requirements, available.clone());
            if let Some(excluded) = self.restricted.get(field) {
                child_info.excluded = excluded.clone();
            }
            let child = ctx.root.create(&child_info, ctx, rng)?;
            if !plan.observe(i, &child) {
                log::trace!("{}: child '{}' completed an antipattern", self.name, field);
                return None;
            }
            available.extend(&guard.writes_in(&child));
            used += ctx.weights.weight(&child);
            node.push_child(field.clone(), child);
        }

        let outcome = plan.finish();
        if !outcome.fulfills_all() {
            log::trace!("{}: {} soft requirement(s) unmet", self.name, outcome.unmet());
        }
        if ctx.engine.violated_at(&node) {
            return None;
        }
        if info.config.weight_bounded() && ctx.weights.weight(&node) > info.config.max_weight {
            return None;
        }
        Some(node)
    }
}
