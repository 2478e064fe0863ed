//! Diagnostics command.

use anyhow::Result;
use colored::Colorize;
use helldiver_core::graph::{GraphStore, Neo4jHttpStore};

use crate::config::Config;

pub async fn execute(config: &Config) -> Result<()> {
    println!("{}", "helldiver Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    print!("  Config file: ");
    let config_path = Config::config_path();
    if config_path.exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    print!("  Sessions directory: ");
    if config.paths.sessions_dir.exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ will be created".yellow());
    }

    print!("  Anthropic API key: ");
    if config.has_api_key() {
        println!("{}", "✓ set".green());
    } else {
        println!("{}", "✗ missing".red());
        issues.push("Set ANTHROPIC_API_KEY or llm.api_key in the config file".to_string());
    }

    print!("  Knowledge graph ({}): ", config.graph.neo4j.uri);
    let reachable = match Neo4jHttpStore::new(config.graph.neo4j.clone()) {
        Ok(store) => store.verify_connectivity().await,
        Err(e) => Err(e),
    };
    match reachable {
        Ok(()) => println!("{}", "✓ reachable".green()),
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push(
                "Cannot reach Neo4j; cycles are saved locally and can be committed later with `helldiver commit`"
                    .to_string(),
            );
        }
    }

    println!();
    println!("  {}", "Research workers:".cyan());
    for worker in &config.research.roster {
        println!("    {} ({})", worker.label, worker.id.dimmed());
    }
    if config.research.roster.is_empty() {
        issues.push("research.roster is empty".to_string());
    }

    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}
