//! Inspection commands: hash, weight, validate

use super::util::{flag_value, load_config, load_grammar, load_tree, positional};
use treegp::*;

pub fn cmd_hash(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let Some(tree_path) = pos.first() else {
        return Err("Usage: treegp hash <tree>".into());
    };
    let mut tree = load_tree(tree_path, None)?;
    println!("{}", tree.hash());
    Ok(())
}

pub fn cmd_weight(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let [grammar_path, tree_path, ..] = pos.as_slice() else {
        return Err("Usage: treegp weight <grammar.yaml> <tree> [--profile P]".into());
    };
    let grammar = load_grammar(grammar_path)?;
    let tree = load_tree(tree_path, Some(&grammar))?;
    let mut config = WeightConfig::default();
    if let Some(profile) = flag_value(args, "--profile") {
        config.profile = profile.to_string();
    }
    let weights = WeightModel::new(&grammar, &config);
    println!("{}", weights.weight(&tree));
    Ok(())
}

pub fn cmd_validate(args: &[String]) -> Result<()> {
    let pos = positional(args);
    let Some(grammar_path) = pos.first() else {
        return Err("Usage: treegp validate <grammar.yaml> [--config cfg.yaml]".into());
    };
    let grammar = load_grammar(grammar_path)?;
    let config = load_config(args)?;
    let engine = RequirementEngine::from_config(&config.patterns, &grammar)?;

    println!("✓ Grammar: {} symbols", grammar.symbols().len());
    println!(
        "✓ Templates: {} antipatterns, {} patterns",
        engine.antipatterns().len(),
        engine.patterns().len()
    );
    Ok(())
}
