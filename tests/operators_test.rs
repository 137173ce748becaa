//! Mutation and crossover over generated populations

mod common;

use common::{config, master, ARITH};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use treegp::{
    random_population, seed_population, AdditiveMutator, Crossover, DataFlowGuard, Error, Mutator,
    PatternAdheringCrossover, RandomPointCrossover, SingleNodeMutator, SizeRestrictedSelector, SubtreeMutator, TreeNode,
};

const LITERAL_SUM: &str = "Add(Const, Const)";

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_mutation_keeps_grammar_constraints(seed in any::<u64>()) {
        let cfg = config(5, &[LITERAL_SUM]);
        let m = master(ARITH, &cfg);
        let mut rng = StdRng::seed_from_u64(seed);
        let tree = m.generate_type("Program", m.creation(), &mut rng).unwrap();
        let mutators: Vec<Box<dyn Mutator>> = vec![
            Box::new(SingleNodeMutator::new(Arc::clone(&m), &cfg.mutation)),
            Box::new(SubtreeMutator::new(Arc::clone(&m), &cfg.mutation)),
        ];
        for mutator in &mutators {
            match mutator.mutate(&tree, &mut rng) {
                Ok(mutated) => {
                    prop_assert!(m.grammar().check_tree(&mutated).is_ok());
                    prop_assert!(mutated.depth() <= 5);
                    prop_assert_eq!(m.engine().violations(&mutated), 0);
                    prop_assert!(DataFlowGuard::new(m.grammar()).unsatisfied_items(&mutated, None).is_empty());
                }
                Err(Error::NoCompatibleReplacement(_)) | Err(Error::MutationExhausted { .. }) => {}
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn test_crossover_never_adds_violations(seed in any::<u64>()) {
        let cfg = config(5, &[LITERAL_SUM]);
        let m = master(ARITH, &cfg);
        let mut rng = StdRng::seed_from_u64(seed);
        let left = TreeNode::parse("Neg(Add(Add(Const[value=1], Const[value=2]), Neg(Const[value=3])))", Some(m.grammar())).unwrap();
        let right = m.generate(&mut rng).unwrap();
        let before = m.engine().violations(&left);
        let crossovers: Vec<Box<dyn Crossover>> = vec![
            Box::new(RandomPointCrossover::new(Arc::clone(&m), &cfg.crossover)),
            Box::new(PatternAdheringCrossover::new(Arc::clone(&m), &cfg.crossover)),
        ];
        for crossover in &crossovers {
            let child = crossover.breed_or_keep(&left, &right, &mut rng);
            prop_assert!(m.engine().violations(&child) <= before);
            prop_assert!(child.depth() <= 5);
            prop_assert!(m.grammar().check_tree(&child).is_ok());
        }
    }
}

#[test]
fn test_subtree_mutation_repairs_literal_sum() {
    let cfg = config(5, &[LITERAL_SUM]);
    let m = master(ARITH, &cfg);
    let dirty = TreeNode::parse("Add(Neg(Const[value=4]), Add(Const[value=1], Const[value=2]))", Some(m.grammar())).unwrap();
    assert_eq!(m.engine().violations(&dirty), 1);
    let mutator = SubtreeMutator::new(Arc::clone(&m), &cfg.mutation);
    let mut rng = StdRng::seed_from_u64(8);
    let mut repaired = 0;
    for _ in 0..20 {
        let mutated = mutator.mutate(&dirty, &mut rng).unwrap();
        assert!(m.engine().violations(&mutated) <= 1);
        if m.engine().violations(&mutated) == 0 {
            repaired += 1;
        }
    }
    assert!(repaired > 0);
}

#[test]
fn test_single_node_mutation_of_leaves() {
    let cfg = config(5, &[]);
    let m = master(ARITH, &cfg);
    let tree = TreeNode::parse("Add(Const[value=1], Neg(Const[value=2]))", Some(m.grammar())).unwrap();
    let mutator = SingleNodeMutator::new(Arc::clone(&m), &cfg.mutation).with_selector(Box::new(SizeRestrictedSelector::new(1)));
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..10 {
        match mutator.mutate(&tree, &mut rng) {
            Ok(mutated) => m.grammar().check_tree(&mutated).unwrap(),
            Err(e) => assert!(matches!(e, Error::NoCompatibleReplacement(_) | Error::MutationExhausted { .. })),
        }
    }
}

#[test]
fn test_populations() {
    let cfg = config(5, &[LITERAL_SUM]);
    let m = master(ARITH, &cfg);
    let random = random_population(&m, 16, 4, 99).unwrap();
    assert_eq!(random.len(), 16);
    assert!(random.iter().all(|t| m.engine().violations(t) == 0));

    let additive = AdditiveMutator::new(Arc::clone(&m), &cfg.mutation);
    let seeded = seed_population(&additive, &random[0], 6, 3, 1).unwrap();
    assert_eq!(seeded.len(), 6);
    for tree in &seeded {
        m.grammar().check_tree(tree).unwrap();
        assert_eq!(m.engine().violations(tree), 0);
    }
}
