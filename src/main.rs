//! treegp CLI - Command-line interface
//!
//! Commands:
//!   generate  - Build random trees of a grammar
//!   mutate    - Mutate an existing tree
//!   crossover - Recombine two trees
//!   hash      - Content hash of a tree
//!   weight    - Weight of a tree
//!   validate  - Check a grammar and its templates

mod cli;

use cli::*;
use std::process::ExitCode;
use treegp::{Result, VERSION};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result: Result<()> = match args[1].as_str() {
        "generate" => cmd_generate(&args[2..]),
        "mutate" => cmd_mutate(&args[2..]),
        "crossover" => cmd_crossover(&args[2..]),
        "hash" => cmd_hash(&args[2..]),
        "weight" => cmd_weight(&args[2..]),
        "validate" => cmd_validate(&args[2..]),
        "schema" => cmd_schema(&args[2..]),
        "version" | "--version" | "-v" => {
            println!("treegp {}", VERSION);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            Err("Unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"
treegp - Constrained genetic-programming trees

USAGE:
    treegp <COMMAND> [OPTIONS]

COMMANDS:
    generate <grammar.yaml>                    Build random trees
    mutate <grammar.yaml> <tree>               Mutate a tree
    crossover <grammar.yaml> <left> <right>    Recombine two trees
    hash <tree>                                Print the content hash
    weight <grammar.yaml> <tree>               Print the tree weight
    validate <grammar.yaml>                    Check grammar and templates
    schema [config|grammar|tree]               Print JSON schema
    version                                    Print version

OPTIONS:
    --config <cfg.yaml>     Engine configuration (limits, templates, retries)
    --seed <N>              RNG seed for reproducible output
    --type <T>              Type to generate (default: grammar root)
    --count <N>             Number of trees to generate (default: 1)
    --operator <op>         single, subtree or additive (default: subtree)
    --pattern-adhering      Repair-oriented crossover
    --keep                  Print the left parent when no safe crossover exists
    --profile <P>           Weight profile (default: default)
    --json                  JSON output

Trees are read from .json, .yaml or the textual form, e.g.
    Add(Const[value=1], Neg(Read[slot=@main.x]))

EXAMPLES:
    treegp generate arith.yaml --count 5 --seed 42
    treegp mutate arith.yaml tree.json --operator single --json
    treegp crossover arith.yaml a.json b.json --pattern-adhering
"#
    );
}
