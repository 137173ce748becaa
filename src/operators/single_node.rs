//! Single-node mutation: one symbol is swapped for another of a compatible
//! type, keeping the original children where the new parameters take them

use super::{Baseline, Mutator, RandomSelector, TreeSelector};
use crate::config::MutationConfig;
use crate::error::{Error, Result};
use crate::grammar::Symbol;
use crate::requirement::RequirementInformation;
use crate::strategy::{Candidate, Chooser, MasterStrategy, RandomChooser, Strategy};
use crate::tree::{NodePath, TreeNode};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct SingleNodeMutator {
    master: Arc<MasterStrategy>,
    selector: Box<dyn TreeSelector>,
    chooser: Box<dyn Chooser>,
    retries: usize,
}

impl SingleNodeMutator {
    pub fn new(master: Arc<MasterStrategy>, config: &MutationConfig) -> Self {
        Self {
            master,
            selector: Box::new(RandomSelector),
            chooser: Box::new(RandomChooser),
            retries: config.retries.max(1),
        }
    }

    pub fn with_selector(mut self, selector: Box<dyn TreeSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_chooser(mut self, chooser: Box<dyn Chooser>) -> Self {
        self.chooser = chooser;
        self
    }

    /// Parameter of `symbol` taking each child of `point`, in order. `None`
    /// when some child fits no parameter.
    fn rehome(&self, symbol: &Symbol, point: &TreeNode) -> Option<Vec<String>> {
        let grammar = self.master.grammar();
        let mut filled: HashMap<&str, usize> = HashMap::new();
        let mut first = 0;
        let mut homes = Vec::with_capacity(point.children.len());
        for child in &point.children {
            let returns = &grammar.symbol(&child.node.symbol)?.returns;
            let (index, param) = symbol.params.iter().enumerate().skip(first).find(|(_, p)| {
                grammar.is_assignable(returns, &p.accepts)
                    && p.capacity().is_none_or(|cap| filled.get(p.name.as_str()).copied().unwrap_or(0) < cap)
            })?;
            *filled.entry(param.name.as_str()).or_default() += 1;
            first = if param.array { index } else { index + 1 };
            homes.push(param.name.clone());
        }
        Some(homes)
    }

    /// Replacement symbols for the node at `path` with their child homes
    pub fn options(&self, tree: &TreeNode, path: &NodePath) -> Vec<(&Symbol, Vec<String>)> {
        let grammar = self.master.grammar();
        let (Some(point), Some(info)) = (tree.get(path), self.master.request_at(tree, path, *self.master.creation())) else {
            return Vec::new();
        };
        grammar
            .candidates(&info.expected)
            .into_iter()
            .filter(|s| s.id != point.symbol && !info.excluded.contains(&s.id))
            .filter(|s| s.min_arity().max(point.children.len()) <= info.config.max_width)
            .filter_map(|s| self.rehome(s, point).map(|homes| (s, homes)))
            .collect()
    }

    /// Materialize `symbol` at `path`: moved children, kept or fresh
    /// terminal values, and fresh children for unfilled parameters
    fn build(&self, tree: &TreeNode, path: &NodePath, symbol: &Symbol, homes: &[String], rng: &mut dyn RngCore) -> Option<TreeNode> {
        let point = tree.get(path)?;
        let info = self.master.request_at(tree, path, *self.master.creation())?;
        let ctx = self.master.context();

        let mut node = TreeNode::new(symbol.id.clone());
        for terminal in &symbol.terminals {
            let value = match point.values.get(&terminal.name) {
                Some(v) if terminal.kind.accepts(v) => v.clone(),
                _ => ctx.terminals.value_for(terminal, symbol, &info, None, &[], rng)?,
            };
            node.values.insert(terminal.name.clone(), value);
        }

        for param in &symbol.params {
            let moved: Vec<&TreeNode> = point
                .children
                .iter()
                .zip(homes)
                .filter(|(_, home)| **home == param.name)
                .map(|(c, _)| &c.node)
                .collect();
            for child in &moved {
                node.push_child(param.name.clone(), (*child).clone());
            }
            for _ in moved.len()..param.required() {
                let child_info = info.for_child(&param.accepts, info.config.max_weight, RequirementInformation::new(), info.available.clone());
                let child = self.master.create(&child_info, &ctx, rng)?;
                node.push_child(param.name.clone(), child);
            }
        }
        Some(node)
    }
}

impl Mutator for SingleNodeMutator {
    fn name(&self) -> &'static str {
        "single-node"
    }

    fn mutate(&self, tree: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode> {
        let path = self
            .selector
            .select_subtree(tree, rng)
            .ok_or_else(|| Error::NoCompatibleReplacement("no selectable node".into()))?;
        let options = self.options(tree, &path);
        if options.is_empty() {
            let symbol = tree.get(&path).map(|n| n.symbol.as_str()).unwrap_or("?");
            return Err(Error::NoCompatibleReplacement(format!("{} at {}", symbol, path)));
        }
        let candidates: Vec<Candidate> = options
            .iter()
            .map(|(s, _)| Candidate::new(s.id.clone(), RequirementInformation::new()))
            .collect();

        let baseline = Baseline::of(&self.master, tree);
        for _ in 0..self.retries {
            let Some(pick) = self.chooser.choose(&candidates, rng) else {
                break;
            };
            let (symbol, homes) = &options[pick];
            let Some(replacement) = self.build(tree, &path, symbol, homes, rng) else {
                continue;
            };
            let mut mutated = tree.clone();
            mutated.replace_at(&path, replacement)?;
            if baseline.admits(&self.master, &mutated) {
                log::debug!("single-node: {} -> {} at {}", tree.get(&path).map(|n| n.symbol.as_str()).unwrap_or("?"), symbol.id, path);
                return Ok(mutated);
            }
        }
        Err(Error::MutationExhausted {
            operator: self.name(),
            attempts: self.retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::grammar::tests::arithmetic;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Debug)]
    struct RootSelector;

    impl TreeSelector for RootSelector {
        fn select_subtree(&self, _tree: &TreeNode, _rng: &mut dyn RngCore) -> Option<NodePath> {
            Some(NodePath::root())
        }
    }

    fn mutator() -> SingleNodeMutator {
        let master = MasterStrategy::new(Arc::new(arithmetic()), &EngineConfig::default()).unwrap();
        SingleNodeMutator::new(Arc::new(master), &MutationConfig::default())
    }

    #[test]
    fn test_children_are_rehomed() {
        let m = mutator();
        let tree = TreeNode::parse("Neg(Neg(Const[value=3]))", Some(m.master.grammar())).unwrap();
        let options = m.options(&tree, &NodePath::root());
        let ids: Vec<&str> = options.iter().map(|(s, _)| s.id.as_str()).collect();
        // Const and Read take no children
        assert_eq!(ids, vec!["Add"]);
        assert_eq!(options[0].1, vec!["left".to_string()]);
    }

    #[test]
    fn test_mutation_keeps_grammar_valid() {
        let m = mutator().with_selector(Box::new(RootSelector));
        let tree = TreeNode::parse("Neg(Const[value=3])", Some(m.master.grammar())).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let mutated = m.mutate(&tree, &mut rng).unwrap();
        assert_eq!(mutated.symbol, "Add");
        assert_eq!(mutated.children[0].node, tree.children[0].node);
        m.master.grammar().check_tree(&mutated).unwrap();
    }

    #[test]
    fn test_no_alternative_is_an_error() {
        let m = mutator().with_selector(Box::new(RootSelector));
        let tree = TreeNode::parse(
            "Program(Assign[slot=@main.x](Const[value=1]), result: Read[slot=@main.x])",
            Some(m.master.grammar()),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = m.mutate(&tree, &mut rng).unwrap_err();
        assert!(matches!(err, Error::NoCompatibleReplacement(_)));
    }
}
