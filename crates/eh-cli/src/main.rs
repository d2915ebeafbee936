//! Elemhide CLI
//!
//! CLI tool for checking rule lists and explaining how single rules compile.

use std::fs;

use clap::{Parser, Subcommand};
use serde::Serialize;

use eh_compiler::{canonical, compile, tokenize};
use eh_core::Query;

#[derive(Parser)]
#[command(name = "eh-cli")]
#[command(about = "Elemhide rule compiler tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every rule in a list file and report failures
    Check {
        /// Input rule list file
        #[arg(short, long)]
        input: String,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show how one rule tokenizes and plans
    Explain {
        /// The rule to explain
        selector: String,

        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { input, verbose } => cmd_check(&input, verbose),
        Commands::Explain { selector, json } => cmd_explain(&selector, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_check(input: &str, verbose: bool) -> Result<(), String> {
    let content =
        fs::read_to_string(input).map_err(|e| format!("Failed to read '{input}': {e}"))?;

    let mut total = 0usize;
    let mut failed = 0usize;

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        total += 1;
        match compile(line) {
            Ok(query) => {
                if verbose {
                    println!("  [{}] ok ({} steps): {}", lineno + 1, query.len(), line);
                }
            }
            Err(e) => {
                failed += 1;
                println!("  [{}] FAILED: {} -- {}", lineno + 1, line, e);
            }
        }
    }

    println!("{} rules checked, {} failed", total, failed);
    if failed > 0 {
        return Err(format!("{failed} rule(s) failed to compile"));
    }
    Ok(())
}

#[derive(Serialize)]
struct Explanation<'a> {
    rule: &'a str,
    tokens: Vec<eh_compiler::IrToken>,
    canonical: String,
    plan: Vec<String>,
}

fn cmd_explain(selector: &str, json: bool) -> Result<(), String> {
    let tokens = tokenize(selector).map_err(|e| e.to_string())?;
    let query = compile(selector).map_err(|e| e.to_string())?;

    if json {
        let explanation = Explanation {
            rule: selector,
            canonical: canonical(&tokens),
            tokens,
            plan: plan_strings(&query),
        };
        let rendered =
            serde_json::to_string_pretty(&explanation).map_err(|e| e.to_string())?;
        println!("{rendered}");
        return Ok(());
    }

    println!("Rule:      {selector}");
    println!("Canonical: {}", canonical(&tokens));
    println!("Tokens:");
    for token in &tokens {
        println!("  {token}");
    }
    println!("Plan:");
    for step in plan_strings(&query) {
        println!("  {step}");
    }
    Ok(())
}

fn plan_strings(query: &Query) -> Vec<String> {
    query.iter().map(|s| s.to_string()).collect()
}
