//! Weight model: approximate execution cost of a tree
//!
//! A node weighs its own table weight plus the aggregated weight of its
//! children. Loops multiply the children by an assumed iteration count.
//! Branches divide by `children - 1` and apply the condition cost, since
//! only one body runs. Measured traces replace both guesses with actual
//! execution counts.

use crate::config::WeightConfig;
use crate::grammar::{Grammar, SymbolKind};
use crate::tree::{NodePath, TreeNode};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Execution counts per tree position, keyed like [`NodePath::key`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    counts: HashMap<String, u64>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &NodePath, count: u64) {
        *self.counts.entry(path.key()).or_insert(0) += count;
    }

    pub fn count(&self, path: &NodePath) -> u64 {
        self.counts.get(&path.key()).copied().unwrap_or(0)
    }

    pub fn from_counts(counts: HashMap<String, u64>) -> Self {
        Self { counts }
    }
}

/// Per-symbol weights with loop and branch heuristics
#[derive(Debug)]
pub struct WeightModel {
    table: HashMap<String, f64>,
    loops: HashSet<String>,
    branches: HashSet<String>,
    average: f64,
    loop_iterations: f64,
    condition_cost: f64,
    warned: AtomicBool,
}

impl WeightModel {
    /// Weights of `config.profile` with the configured heuristics
    pub fn new(grammar: &Grammar, config: &WeightConfig) -> Self {
        let table = grammar.weight_table(&config.profile);
        let mut model = Self::from_table(table, config.loop_iterations, config.condition_cost);
        for symbol in grammar.symbols() {
            if symbol.is(SymbolKind::Loop) {
                model.loops.insert(symbol.id.clone());
            }
            if symbol.is(SymbolKind::Branch) {
                model.branches.insert(symbol.id.clone());
            }
        }
        model
    }

    pub fn from_table(table: HashMap<String, f64>, loop_iterations: f64, condition_cost: f64) -> Self {
        let known: Vec<f64> = table.values().copied().filter(|w| *w > 0.0).collect();
        let average = if known.is_empty() {
            1.0
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        };
        Self {
            table,
            loops: HashSet::new(),
            branches: HashSet::new(),
            average,
            loop_iterations,
            condition_cost,
            warned: AtomicBool::new(false),
        }
    }

    pub fn mark_loop(mut self, symbol: impl Into<String>) -> Self {
        self.loops.insert(symbol.into());
        self
    }

    pub fn mark_branch(mut self, symbol: impl Into<String>) -> Self {
        self.branches.insert(symbol.into());
        self
    }

    /// Average over the known positive weights
    pub fn average(&self) -> f64 {
        self.average
    }

    /// Table weight of one symbol; unknown symbols weigh the average
    pub fn symbol_weight(&self, symbol: &str) -> f64 {
        match self.table.get(symbol) {
            Some(w) => *w,
            None => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    log::warn!(
                        "no weight for symbol '{}', using average weight {:.3} for unknown symbols",
                        symbol,
                        self.average
                    );
                }
                self.average
            }
        }
    }

    pub fn is_loop(&self, symbol: &str) -> bool {
        self.loops.contains(symbol)
    }

    pub fn is_branch(&self, symbol: &str) -> bool {
        self.branches.contains(symbol)
    }

    /// Factor applied to the summed weight of `symbol`'s children
    pub fn child_factor(&self, symbol: &str, child_count: usize) -> f64 {
        if self.is_loop(symbol) {
            self.loop_iterations
        } else if self.is_branch(symbol) && child_count > 1 {
            self.condition_cost / (child_count - 1) as f64
        } else {
            1.0
        }
    }

    /// Heuristic weight of a tree
    pub fn weight(&self, node: &TreeNode) -> f64 {
        let own = self.symbol_weight(&node.symbol);
        if node.is_leaf() {
            return own;
        }
        let child_weights: Vec<f64> = node.child_nodes().map(|c| self.weight(c)).collect();
        own + self.aggregate(&node.symbol, &child_weights)
    }

    /// Combined weight of a node's children. A branch never weighs less
    /// than its heaviest child.
    pub fn aggregate(&self, symbol: &str, child_weights: &[f64]) -> f64 {
        let sum: f64 = child_weights.iter().sum();
        let scaled = sum * self.child_factor(symbol, child_weights.len());
        if self.is_branch(symbol) {
            let heaviest = child_weights.iter().copied().fold(0.0, f64::max);
            scaled.max(heaviest)
        } else {
            scaled
        }
    }

    /// Weight from one measured trace: each position counts its symbol
    /// weight times its execution count. Untraced positions weigh nothing.
    pub fn traced_weight(&self, node: &TreeNode, trace: &ExecutionTrace) -> f64 {
        node.walk()
            .into_iter()
            .map(|(path, n)| trace.count(&path) as f64 * self.symbol_weight(&n.symbol))
            .sum()
    }

    /// Mean traced weight over several runs; falls back to the heuristic
    /// weight when no trace is available
    pub fn averaged_weight(&self, node: &TreeNode, traces: &[ExecutionTrace]) -> f64 {
        if traces.is_empty() {
            return self.weight(node);
        }
        traces.iter().map(|t| self.traced_weight(node, t)).sum::<f64>() / traces.len() as f64
    }

    /// Lightest complete subtree per symbol, by fixpoint over the grammar
    pub fn minimal_weights(&self, grammar: &Grammar) -> HashMap<String, f64> {
        let mut best: HashMap<String, f64> = HashMap::new();
        let mut changed = true;
        while changed {
            changed = false;
            for symbol in grammar.symbols() {
                let mut children = Vec::new();
                let mut complete = true;
                for param in &symbol.params {
                    let cheapest = grammar
                        .candidates(&param.accepts)
                        .iter()
                        .filter_map(|c| best.get(&c.id).copied())
                        .fold(f64::INFINITY, f64::min);
                    if param.required() > 0 && cheapest.is_infinite() {
                        complete = false;
                        break;
                    }
                    children.extend(std::iter::repeat_n(cheapest, param.required()));
                }
                if !complete {
                    continue;
                }
                let own = self.symbol_weight(&symbol.id);
                let total = if children.is_empty() {
                    own
                } else {
                    own + self.aggregate(&symbol.id, &children)
                };
                let entry = best.entry(symbol.id.clone()).or_insert(f64::INFINITY);
                if total < *entry {
                    *entry = total;
                    changed = true;
                }
            }
        }
        best
    }
}
