//! Constrained construction end to end

mod common;

use common::{config, master, ADD_CONST, ARITH, PAIRS};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use treegp::{CreationConfiguration, DataFlowGuard, TreeNode, Value};

fn literal_sums(tree: &TreeNode) -> usize {
    tree.walk()
        .into_iter()
        .filter(|(_, n)| n.symbol == "Add" && n.children.len() == 2 && n.child_nodes().all(|c| c.symbol == "Const"))
        .count()
}

#[test]
fn test_add_const_depth_two() {
    let m = master(ADD_CONST, &config(2, &[]));
    let weights = m.weights();
    let mut rng = StdRng::seed_from_u64(2024);
    let mut sums = 0;
    for _ in 0..200 {
        let tree = m.generate(&mut rng).unwrap();
        assert!(tree.depth() <= 2, "{}", tree);
        if tree.symbol == "Add" {
            sums += 1;
            let children: f64 = tree.child_nodes().map(|c| weights.weight(c)).sum();
            assert_eq!(weights.weight(&tree), 2.0 + children);
            assert_eq!(weights.weight(&tree), 4.0);
        } else {
            assert_eq!(weights.weight(&tree), 1.0);
        }
    }
    assert!(sums > 0);
}

#[test]
fn test_literal_sum_antipattern_never_generated() {
    let m = master(ARITH, &config(4, &["Add(Const, Const)"]));
    let mut rng = StdRng::seed_from_u64(1000);
    for _ in 0..1000 {
        let tree = m.generate(&mut rng).unwrap();
        assert_eq!(literal_sums(&tree), 0, "{}", tree);
        assert_eq!(m.engine().violations(&tree), 0);
    }
}

#[test]
fn test_programs_only_read_written_slots() {
    let m = master(ARITH, &config(5, &[]));
    let guard = DataFlowGuard::new(m.grammar());
    let mut rng = StdRng::seed_from_u64(77);
    let mut reads = 0;
    for _ in 0..200 {
        let tree = m.generate_type("Program", m.creation(), &mut rng).unwrap();
        m.grammar().check_tree(&tree).unwrap();
        assert!(guard.unsatisfied_items(&tree, None).is_empty(), "{}", tree);
        reads += tree.walk().into_iter().filter(|(_, n)| n.symbol == "Read").count();
    }
    assert!(reads > 0);
}

#[test]
fn test_pattern_keeps_trees_valid() {
    let mut cfg = config(4, &["Add(Const, Const)"]);
    cfg.patterns.patterns = vec![treegp::TemplateEntry::new("negated-sum", "Neg(Add)")];
    cfg.patterns.activation_chance = 1.0;
    let m = master(ARITH, &cfg);
    let mut rng = StdRng::seed_from_u64(5);
    let mut found = 0;
    for _ in 0..200 {
        let tree = m.generate(&mut rng).unwrap();
        m.grammar().check_tree(&tree).unwrap();
        assert_eq!(literal_sums(&tree), 0);
        found += tree
            .walk()
            .into_iter()
            .filter(|(_, n)| n.symbol == "Neg" && n.child_nodes().any(|c| c.symbol == "Add"))
            .count();
    }
    assert!(found > 0);
}

#[test]
fn test_multi_value_antipattern_only_forbids_the_combination() {
    let m = master(PAIRS, &config(3, &["Pair[flag=true, value=1]"]));
    let mut rng = StdRng::seed_from_u64(31);
    let mut seen = BTreeSet::new();
    for _ in 0..300 {
        let tree = m.generate(&mut rng).unwrap();
        assert_eq!(m.engine().violations(&tree), 0, "{}", tree);
        for (_, node) in tree.walk() {
            if node.symbol == "Pair" {
                let flag = node.values["flag"] == Value::Bool(true);
                let one = node.values["value"] == Value::Int(1);
                seen.insert((flag, one));
            }
        }
    }
    assert!(!seen.contains(&(true, true)));
    assert!(seen.contains(&(true, false)));
    assert!(seen.contains(&(false, true)));

    let partial = TreeNode::parse("Add(Pair[flag=true, value=0], Pair[flag=false, value=1])", Some(m.grammar())).unwrap();
    assert!(m.engine().load(m.grammar(), &partial).values().all(|l| !l.failed));
    let full = TreeNode::parse("Add(Pair[flag=false, value=0], Pair[flag=true, value=1])", Some(m.grammar())).unwrap();
    assert_eq!(m.engine().load(m.grammar(), &full).values().filter(|l| l.failed).count(), 1);
}

proptest! {
    #[test]
    fn test_construction_bounds(
        max_depth in 1usize..6,
        max_width in 1usize..4,
        max_weight in 1.0f64..40.0,
        seed in any::<u64>(),
    ) {
        let m = master(ARITH, &config(max_depth, &["Add(Const, Const)"]));
        let creation = CreationConfiguration::new(max_depth, max_width, max_weight);
        let mut rng = StdRng::seed_from_u64(seed);
        // a Const always fits, so construction never fails here
        let tree = m.generate_type("Int", &creation, &mut rng).unwrap();
        prop_assert!(tree.depth() <= max_depth);
        prop_assert!(tree.max_width() <= max_width);
        prop_assert!(m.weights().weight(&tree) <= max_weight);
        prop_assert_eq!(m.engine().violations(&tree), 0);
    }
}
