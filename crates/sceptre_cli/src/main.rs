//! The sceptre command line.
//!
//! ```text
//! sceptre check model.pi             # run every query, human-readable
//! sceptre check model.pi --json      # machine-readable verdicts
//! sceptre translate model.pi         # show the generated rules
//! sceptre rules file.rules -q 'enc(a[], b[])'   # textual rule sets
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::info;

use sceptre_engine::QueryEngine;
use sceptre_translate::Translation;

#[derive(Parser)]
#[command(name = "sceptre", version, about = "Symbolic security-protocol analyser")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decide every `query attacker(…)` of a model.
    Check {
        /// The applied-pi source file.
        model: PathBuf,
        /// Emit one JSON object per query instead of prose.
        #[arg(long)]
        json: bool,
        /// Override the recommended elaboration depth.
        #[arg(long)]
        depth: Option<usize>,
    },
    /// Translate a model and print its initial states and rules.
    Translate {
        /// The applied-pi source file.
        model: PathBuf,
        /// Emit the translation report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run a query against a textual rule set (one rule per line).
    Rules {
        /// The rule file.
        rules: PathBuf,
        /// The queried message, in term syntax (e.g. `enc(a[], b[])`).
        #[arg(short, long)]
        query: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("sceptre: {}", message);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    match cli.command {
        Command::Check { model, json, depth } => check(&model, json, depth),
        Command::Translate { model, json } => translate_only(&model, json),
        Command::Rules { rules, query } => run_rules(&rules, &query),
    }
}

fn load_translation(model: &PathBuf) -> Result<Translation, String> {
    let source = fs::read_to_string(model)
        .map_err(|e| format!("cannot read {}: {}", model.display(), e))?;
    let network = sceptre_pi::parse_network(&source).map_err(|e| e.to_string())?;
    let resolved = sceptre_process::resolve(&network).map_err(|e| e.to_string())?;
    sceptre_translate::translate(&resolved).map_err(|e| e.to_string())
}

fn check(model: &PathBuf, json: bool, depth: Option<usize>) -> Result<ExitCode, String> {
    let translation = load_translation(model)?;
    if translation.queries.is_empty() {
        return Err("the model declares no query".to_string());
    }
    let mut any_attack = false;
    for query in translation.queries.clone() {
        info!("checking attacker({})", query);
        let mut engine = QueryEngine::for_translation(&translation, query.clone());
        if let Some(limit) = depth {
            engine = engine.with_elaboration_limit(limit);
        }
        let outcome = engine.run();
        any_attack |= outcome.attack.is_some();
        if json {
            let verdict = match &outcome.attack {
                Some(attack) => serde_json::json!({
                    "query": query.to_string(),
                    "attack": attack.report(),
                }),
                None => serde_json::json!({
                    "query": query.to_string(),
                    "attack": null,
                    "nessions_assessed": outcome.nessions_assessed,
                }),
            };
            println!("{}", verdict);
        } else {
            match &outcome.attack {
                Some(attack) => {
                    println!("attacker({}): ATTACK FOUND", query);
                    for clause in attack.chain() {
                        println!("    {}", clause);
                    }
                }
                None => println!(
                    "attacker({}): no attack ({} nessions assessed)",
                    query, outcome.nessions_assessed
                ),
            }
        }
    }
    Ok(if any_attack { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

fn translate_only(model: &PathBuf, json: bool) -> Result<ExitCode, String> {
    let translation = load_translation(model)?;
    if json {
        let report = translation.report();
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("cannot render the report: {}", e))?;
        println!("{}", rendered);
    } else {
        println!("initial states:");
        for state in &translation.initial_states {
            println!("    {}", state);
        }
        println!("rules ({}):", translation.rules.len());
        for rule in &translation.rules {
            println!("    {}", rule);
        }
        println!("recommended depth: {}", translation.recommended_depth);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_rules(path: &PathBuf, query: &str) -> Result<ExitCode, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let rules = sceptre_rules::parse_rules(&text).map_err(|e| e.to_string())?;
    // The query is a bare term: parse it through a synthetic fact.
    let parsed = sceptre_rules::parse_rule(&format!("-[ ]-> k({})", query))
        .map_err(|e| format!("query does not parse: {}", e))?;
    let message = parsed
        .result()
        .expect("a synthetic fact always concludes")
        .message
        .clone();
    let mut engine = QueryEngine::new(Vec::new(), message.clone(), rules, 4);
    let outcome = engine.run();
    match outcome.attack {
        Some(attack) => {
            println!("attacker({}): ATTACK FOUND", message);
            for clause in attack.chain() {
                println!("    {}", clause);
            }
            Ok(ExitCode::from(1))
        }
        None => {
            println!("attacker({}): no attack", message);
            Ok(ExitCode::SUCCESS)
        }
    }
}
