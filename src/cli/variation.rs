//! Construction and variation commands: generate, mutate, crossover

use super::util::{flag_value, has_flag, load_config, load_grammar, load_tree, parse_number, positional, print_tree, rng};
use std::sync::Arc;
use treegp::*;

pub fn cmd_generate(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let Some(grammar_path) = pos.first() else {
        return Err("Usage: treegp generate <grammar.yaml> [--config cfg.yaml] [--type T] [--count N] [--seed N] [--json]".into());
    };
    let config = load_config(args)?;
    let master = MasterStrategy::new(Arc::new(load_grammar(grammar_path)?), &config)?;
    let count = parse_number::<usize>(args, "--count")?.unwrap_or(1);
    let json = has_flag(args, "--json");
    let mut rng = rng(&config);

    for _ in 0..count {
        let tree = match flag_value(args, "--type") {
            Some(ty) => master.generate_type(ty, master.creation(), &mut rng)?,
            None => master.generate(&mut rng)?,
        };
        print_tree(&tree, json)?;
    }
    Ok(())
}

pub fn cmd_mutate(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let [grammar_path, tree_path, ..] = pos.as_slice() else {
        return Err("Usage: treegp mutate <grammar.yaml> <tree> [--operator single|subtree|additive] [--config cfg.yaml] [--seed N] [--json]".into());
    };
    let config = load_config(args)?;
    let grammar = Arc::new(load_grammar(grammar_path)?);
    let tree = load_tree(tree_path, Some(&grammar))?;
    grammar.check_tree(&tree)?;
    let master = Arc::new(MasterStrategy::new(grammar, &config)?);

    let mutator: Box<dyn Mutator> = match flag_value(args, "--operator").unwrap_or("subtree") {
        "single" | "single-node" => Box::new(SingleNodeMutator::new(Arc::clone(&master), &config.mutation)),
        "subtree" => Box::new(SubtreeMutator::new(Arc::clone(&master), &config.mutation)),
        "additive" => Box::new(AdditiveMutator::new(Arc::clone(&master), &config.mutation)),
        other => return Err(format!("Unknown operator: {}. Use single, subtree or additive.", other).into()),
    };
    let mutated = mutator.mutate(&tree, &mut rng(&config))?;
    print_tree(&mutated, has_flag(args, "--json"))
}

pub fn cmd_crossover(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let [grammar_path, left_path, right_path, ..] = pos.as_slice() else {
        return Err("Usage: treegp crossover <grammar.yaml> <left> <right> [--pattern-adhering] [--keep] [--config cfg.yaml] [--seed N] [--json]".into());
    };
    let config = load_config(args)?;
    let grammar = Arc::new(load_grammar(grammar_path)?);
    let left = load_tree(left_path, Some(&grammar))?;
    let right = load_tree(right_path, Some(&grammar))?;
    let master = Arc::new(MasterStrategy::new(grammar, &config)?);

    let crossover: Box<dyn Crossover> = if has_flag(args, "--pattern-adhering") {
        Box::new(PatternAdheringCrossover::new(master, &config.crossover))
    } else {
        Box::new(RandomPointCrossover::new(master, &config.crossover))
    };
    let mut rng = rng(&config);
    let child = if has_flag(args, "--keep") {
        crossover.breed_or_keep(&left, &right, &mut rng)
    } else {
        crossover.breed(&left, &right, &mut rng)?
    };
    print_tree(&child, has_flag(args, "--json"))
}
