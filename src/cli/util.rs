//! CLI utility helpers

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use treegp::{EngineConfig, Error, Grammar, Result, TreeNode};

/// Options that take a value
const VALUED: &[&str] = &["--config", "--type", "--count", "--seed", "--operator", "--profile", "--workers"];

/// Value following `name`, if present
pub fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

pub fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

/// Arguments that are neither options nor option values
pub fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
        } else if VALUED.contains(&arg.as_str()) {
            skip = true;
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

/// Parse a numeric option, `None` when absent
pub fn parse_number<T: std::str::FromStr>(args: &[String], name: &str) -> Result<Option<T>> {
    flag_value(args, name)
        .map(|v| v.parse::<T>().map_err(|_| Error::Other(format!("invalid value for {}: {}", name, v))))
        .transpose()
}

/// Engine configuration from `--config` (defaults otherwise) with a
/// `--seed` override
pub fn load_config(args: &[String]) -> Result<EngineConfig> {
    let mut config = match flag_value(args, "--config") {
        Some(path) => EngineConfig::load(Path::new(path))?,
        None => EngineConfig::default(),
    };
    if let Some(seed) = parse_number::<u64>(args, "--seed")? {
        config.seed = Some(seed);
    }
    Ok(config)
}

pub fn load_grammar(path: &str) -> Result<Grammar> {
    Grammar::load(Path::new(path))
}

/// Tree from JSON, YAML or the textual form, chosen by extension
pub fn load_tree(path: &str, grammar: Option<&Grammar>) -> Result<TreeNode> {
    let content = fs::read_to_string(path).map_err(Error::Io)?;
    let extension = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension {
        "json" => TreeNode::from_json(&content),
        "yaml" | "yml" => TreeNode::from_yaml(&content),
        _ => TreeNode::parse(content.trim(), grammar),
    }
}

pub fn rng(config: &EngineConfig) -> StdRng {
    match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Print a tree as JSON or in its textual form
pub fn print_tree(tree: &TreeNode, json: bool) -> Result<()> {
    if json {
        println!("{}", tree.to_json()?);
    } else {
        println!("{}", tree);
    }
    Ok(())
}
