//! Subtree crossover between two parents
//!
//! A splice takes a subtree of the right parent into a point of the left
//! one. It is safe when the subtree's type fits the parameter at the point,
//! the child stays within the depth and weight limits, and it neither adds
//! antipattern matches nor leaves reads without a write.

use super::{Baseline, Crossover, RandomSelector, TreeSelector};
use crate::config::CrossoverConfig;
use crate::error::{Error, Result};
use crate::strategy::{MasterStrategy, Strategy};
use crate::tree::{NodePath, TreeNode};
use rand::{Rng, RngCore};
use std::sync::Arc;

/// Weight left for a replacement at `path`, `None` when unbounded
fn remaining_weight(master: &MasterStrategy, tree: &TreeNode, path: &NodePath) -> Option<f64> {
    let creation = master.creation();
    if !creation.weight_bounded() {
        return None;
    }
    let weights = master.weights();
    let point = tree.get(path).map(|n| weights.weight(n)).unwrap_or(0.0);
    Some(creation.max_weight - (weights.weight(tree) - point))
}

/// Subtrees of `right` that fit at `point` of `left`
fn donor_points(master: &MasterStrategy, left: &TreeNode, point: &NodePath, right: &TreeNode) -> Vec<NodePath> {
    let grammar = master.grammar();
    let Some(expected) = master.expected_type(left, point) else {
        return Vec::new();
    };
    let budget = remaining_weight(master, left, point);
    let max_depth = master.creation().max_depth;
    right
        .walk()
        .into_iter()
        .filter(|(_, sub)| point.len() + sub.depth() <= max_depth)
        .filter(|(_, sub)| {
            grammar
                .symbol(&sub.symbol)
                .is_some_and(|s| grammar.is_assignable(&s.returns, &expected))
        })
        .filter(|(_, sub)| budget.is_none_or(|b| master.weights().weight(sub) <= b))
        .map(|(path, _)| path)
        .collect()
}

/// `left` with the subtree of `right` at `donor` placed at `point`, if the
/// result is admitted against `baseline`
fn splice(
    master: &MasterStrategy,
    baseline: &Baseline,
    left: &TreeNode,
    point: &NodePath,
    right: &TreeNode,
    donor: &NodePath,
) -> Option<TreeNode> {
    let mut child = left.clone();
    child.replace_at(point, right.get(donor)?.clone()).ok()?;
    baseline.admits(master, &child).then_some(child)
}

/// Swaps the subtree at a random point of the left parent for a fitting
/// subtree of the right parent
#[derive(Debug)]
pub struct RandomPointCrossover {
    master: Arc<MasterStrategy>,
    selector: Box<dyn TreeSelector>,
    config: CrossoverConfig,
}

impl RandomPointCrossover {
    pub fn new(master: Arc<MasterStrategy>, config: &CrossoverConfig) -> Self {
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

    /// A point of `left`. Weight-aware selection re-draws points whose
    /// surroundings leave no room for even an average node.
    fn left_point(&self, left: &TreeNode, rng: &mut dyn RngCore) -> Option<NodePath> {
        let point = self.selector.select_subtree(left, rng)?;
        if !self.config.weight_aware {
            return Some(point);
        }
        let average = self.master.weights().average();
        let roomy = |p: &NodePath| remaining_weight(&self.master, left, p).is_none_or(|w| w >= average);
        if roomy(&point) {
            return Some(point);
        }
        let choices: Vec<NodePath> = left.paths().into_iter().filter(|p| roomy(p)).collect();
        self.selector.select(left, &choices, rng).or(Some(point))
    }
}

impl Crossover for RandomPointCrossover {
    fn name(&self) -> &'static str {
        "random-point"
    }

    fn breed(&self, left: &TreeNode, right: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode> {
        let baseline = Baseline::of(&self.master, left);
        let mut point = self.left_point(left, rng);
        for attempt in 0..self.config.tries {
            if let Some(p) = &point {
                let donors = donor_points(&self.master, left, p, right);
                if let Some(donor) = self.selector.select(right, &donors, rng) {
                    if let Some(child) = splice(&self.master, &baseline, left, p, right, &donor) {
                        log::debug!("random-point crossover: {} <- {} on attempt {}", p, donor, attempt + 1);
                        return Ok(child);
                    }
                }
            }
            // half of the retries also move the left point
            if point.is_none() || rng.gen_bool(0.5) {
                point = self.left_point(left, rng);
            }
        }
        Err(Error::MutationExhausted {
            operator: self.name(),
            attempts: self.config.tries,
        })
    }
}

/// Crossover aimed at repairing the left parent: points that currently fail
/// a requirement are tried first, then points that satisfy all of theirs.
/// The root is never a splice point.
#[derive(Debug)]
pub struct PatternAdheringCrossover {
    master: Arc<MasterStrategy>,
    selector: Box<dyn TreeSelector>,
    config: CrossoverConfig,
}

impl PatternAdheringCrossover {
    pub fn new(master: Arc<MasterStrategy>, config: &CrossoverConfig) -> Self {
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

    /// Non-root points of `left`: failing ones (all of them when nothing
    /// fails) and those whose requirements are all fulfilled
    pub fn points(&self, left: &TreeNode) -> (Vec<NodePath>, Vec<NodePath>) {
        let loaded = self.master.load_requirements(left, &self.master.context());
        let mut failing = Vec::new();
        let mut fulfilled = Vec::new();
        for path in left.paths().into_iter().filter(|p| !p.is_root()) {
            match loaded.get(&path) {
                Some(l) if l.failed => failing.push(path),
                Some(l) if !l.info.fulfills_all() => {}
                _ => fulfilled.push(path),
            }
        }
        if failing.is_empty() {
            failing = left.paths().into_iter().filter(|p| !p.is_root()).collect();
        }
        (failing, fulfilled)
    }

    fn attempt(&self, baseline: &Baseline, left: &TreeNode, right: &TreeNode, points: &[NodePath], rng: &mut dyn RngCore) -> Option<TreeNode> {
        let point = self.selector.select(left, points, rng)?;
        let donors = donor_points(&self.master, left, &point, right);
        let donor = self.selector.select(right, &donors, rng)?;
        splice(&self.master, baseline, left, &point, right, &donor)
    }
}

impl Crossover for PatternAdheringCrossover {
    fn name(&self) -> &'static str {
        "pattern-adhering"
    }

    fn breed(&self, left: &TreeNode, right: &TreeNode, rng: &mut dyn RngCore) -> Result<TreeNode> {
        let baseline = Baseline::of(&self.master, left);
        let (failing, fulfilled) = self.points(left);
        for _ in 0..self.config.hard_tries {
            if let Some(child) = self.attempt(&baseline, left, right, &failing, rng) {
                return Ok(child);
            }
        }
        log::debug!("pattern-adhering crossover: falling back to fulfilled points");
        for _ in 0..self.config.backup_tries {
            if let Some(child) = self.attempt(&baseline, left, right, &fulfilled, rng) {
                return Ok(child);
            }
        }
        Err(Error::MutationExhausted {
            operator: self.name(),
            attempts: self.config.hard_tries + self.config.backup_tries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, TemplateEntry};
    use crate::grammar::tests::arithmetic;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn master(antipatterns: &[&str]) -> Arc<MasterStrategy> {
        let mut config = EngineConfig::default();
        config.patterns.antipatterns = antipatterns
            .iter()
            .enumerate()
            .map(|(i, s)| TemplateEntry::new(format!("a{}", i), *s))
            .collect();
        Arc::new(MasterStrategy::new(Arc::new(arithmetic()), &config).unwrap())
    }

    #[test]
    fn test_offspring_is_safe() {
        let m = master(&["Add(Const, Const)"]);
        let crossover = RandomPointCrossover::new(Arc::clone(&m), &CrossoverConfig::default());
        let mut rng = StdRng::seed_from_u64(31);
        let mut bred = 0;
        for _ in 0..30 {
            let left = m.generate(&mut rng).unwrap();
            let right = m.generate(&mut rng).unwrap();
            if let Ok(child) = crossover.breed(&left, &right, &mut rng) {
                bred += 1;
                m.grammar().check_tree(&child).unwrap();
                assert!(child.depth() <= m.creation().max_depth);
                assert_eq!(m.engine().violations(&child), 0, "{}", child);
            }
        }
        assert!(bred > 0);
    }

    #[test]
    fn test_donors_respect_type_and_depth() {
        let m = master(&[]);
        let left = TreeNode::parse("Program(Assign[slot=@main.x](Const[value=1]), result: Read[slot=@main.x])", Some(m.grammar())).unwrap();
        let right = TreeNode::parse("Block(Assign[slot=@main.y](Neg(Const[value=2])))", Some(m.grammar())).unwrap();
        let at_body = donor_points(&m, &left, &NodePath::from_indices(vec![0]), &right);
        assert_eq!(at_body, vec![NodePath::root(), NodePath::from_indices(vec![0])]);
        let at_value = donor_points(&m, &left, &NodePath::from_indices(vec![0, 0]), &right);
        assert_eq!(at_value, vec![NodePath::from_indices(vec![0, 0]), NodePath::from_indices(vec![0, 0, 0])]);
    }

    #[test]
    fn test_no_safe_splice_is_an_error() {
        let m = master(&[]);
        let left = TreeNode::parse("Program(Assign[slot=@main.x](Const[value=1]), result: Read[slot=@main.x])", Some(m.grammar())).unwrap();
        // every fitting point would gain an unwritten read
        let right = TreeNode::parse("Read[slot=@main.y]", Some(m.grammar())).unwrap();
        let mut rng = StdRng::seed_from_u64(4);

        let crossover = RandomPointCrossover::new(Arc::clone(&m), &CrossoverConfig::default());
        let err = crossover.breed(&left, &right, &mut rng).unwrap_err();
        assert!(matches!(err, Error::MutationExhausted { operator: "random-point", .. }));
        assert_eq!(crossover.breed_or_keep(&left, &right, &mut rng), left);

        let adhering = PatternAdheringCrossover::new(Arc::clone(&m), &CrossoverConfig::default());
        assert!(adhering.breed(&left, &right, &mut rng).is_err());
    }

    #[test]
    fn test_pattern_adhering_keeps_root() {
        let m = master(&["Add(Const, Const)"]);
        let crossover = PatternAdheringCrossover::new(Arc::clone(&m), &CrossoverConfig::default());
        let left = TreeNode::parse("Add(Const[value=1], Const[value=2])", Some(m.grammar())).unwrap();
        let right = TreeNode::parse("Const[value=7]", Some(m.grammar())).unwrap();
        let (failing, _) = crossover.points(&left);
        assert!(!failing.contains(&NodePath::root()));
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..10 {
            let child = crossover.breed(&left, &right, &mut rng).unwrap();
            assert_eq!(child.symbol, "Add");
            assert_eq!(m.engine().violations(&child), 1);
        }
    }

    #[test]
    fn test_pattern_adhering_repairs_violation() {
        let m = master(&["Add(Const, Const)"]);
        let crossover = PatternAdheringCrossover::new(Arc::clone(&m), &CrossoverConfig::default());
        let left = TreeNode::parse("Neg(Add(Const[value=1], Const[value=2]))", Some(m.grammar())).unwrap();
        let right = TreeNode::parse("Neg(Neg(Const[value=3]))", Some(m.grammar())).unwrap();
        let mut rng = StdRng::seed_from_u64(10);
        let mut repaired = false;
        for _ in 0..20 {
            let child = crossover.breed(&left, &right, &mut rng).unwrap();
            m.grammar().check_tree(&child).unwrap();
            repaired |= m.engine().violations(&child) == 0;
        }
        assert!(repaired);
    }
}
