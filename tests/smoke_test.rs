//! Smoke test: files on disk, the library and the CLI binary together

mod common;

use common::ARITH;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use treegp::{content_hash, EngineConfig, Grammar, MasterStrategy, TreeNode};

const CONFIG: &str = r#"
creation:
  max_depth: 4
  max_width: 3
patterns:
  antipatterns:
    - { id: no-literal-sum, shape: "Add(Const, Const)" }
seed: 11
"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("arith.yaml"), ARITH).unwrap();
    fs::write(dir.path().join("engine.yaml"), CONFIG).unwrap();
    dir
}

#[test]
fn smoke_test_files_round_trip() {
    let dir = workspace();
    let grammar = Arc::new(Grammar::load(&dir.path().join("arith.yaml")).unwrap());
    let config = EngineConfig::load(&dir.path().join("engine.yaml")).unwrap();
    assert_eq!(config.creation.max_depth, 4);
    assert_eq!(config.seed, Some(11));

    let master = MasterStrategy::new(grammar, &config).unwrap();
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap());
    let tree = master.generate(&mut rng).unwrap();

    let path = dir.path().join("tree.json");
    fs::write(&path, tree.to_json().unwrap()).unwrap();
    let loaded = TreeNode::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(content_hash(&loaded), content_hash(&tree));

    let text = TreeNode::parse(&tree.to_string(), Some(master.grammar())).unwrap();
    assert_eq!(text, tree);
}

#[test]
fn smoke_test_cli() {
    let dir = workspace();
    let bin = env!("CARGO_BIN_EXE_treegp");
    let grammar = dir.path().join("arith.yaml");
    let config = dir.path().join("engine.yaml");

    let output = Command::new(bin)
        .arg("generate")
        .arg(&grammar)
        .arg("--config")
        .arg(&config)
        .args(["--count", "3", "--seed", "5"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let trees: Vec<&str> = stdout.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(trees.len(), 3);

    let tree_path = dir.path().join("tree.txt");
    fs::write(&tree_path, trees[0]).unwrap();
    let output = Command::new(bin).arg("hash").arg(&tree_path).output().unwrap();
    assert!(output.status.success());
    let hash = String::from_utf8(output.stdout).unwrap();
    let expected = content_hash(&TreeNode::parse(trees[0], None).unwrap());
    assert_eq!(hash.trim(), expected);

    let output = Command::new(bin).arg("validate").arg(&grammar).arg("--config").arg(&config).output().unwrap();
    assert!(output.status.success());

    let output = Command::new(bin).arg("frobnicate").output().unwrap();
    assert!(!output.status.success());
}
