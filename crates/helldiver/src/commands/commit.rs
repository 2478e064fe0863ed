//! Commit a saved cycle directory to the knowledge graph.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use helldiver_core::artifacts::load_cycle_artifacts;
use helldiver_core::cycle::saved_cycle_request;
use helldiver_core::graph::{ConnectionManager, EpisodeCommitter, Neo4jConnector};
use helldiver_core::CycleReport;

use super::interactive::print_report;
use crate::config::Config;
use crate::error::CliError;

pub async fn execute(
    cycle_dir: &Path,
    session_name: Option<String>,
    cycle_name: Option<String>,
    config: &Config,
) -> Result<()> {
    if !cycle_dir.is_dir() {
        return Err(CliError::NotACycle(cycle_dir.to_path_buf()).into());
    }

    let artifacts = load_cycle_artifacts(cycle_dir, &config.research.roster)
        .with_context(|| format!("Failed to read {}", cycle_dir.display()))?;

    let cycle_name = cycle_name.unwrap_or_else(|| default_cycle_name(cycle_dir));
    let session_name = session_name.unwrap_or_else(|| cycle_name.clone());
    let request = saved_cycle_request(&artifacts, &session_name, &cycle_name, &config.graph.group_id)?;

    println!("{} {}", "Committing".cyan().bold(), cycle_name.bold());

    let mut committer = EpisodeCommitter::new(
        ConnectionManager::new(Box::new(Neo4jConnector::new(config.graph.neo4j.clone()))),
        config.retry.clone(),
    );
    let commit = committer.commit(&request).await;
    let failed = !commit.is_success();

    print_report(&CycleReport {
        cycle_name,
        cycle_dir: cycle_dir.to_path_buf(),
        commit,
    });

    if failed {
        anyhow::bail!("Commit did not complete");
    }
    Ok(())
}

/// Cycle directories are named after the cycle with spaces replaced.
fn default_cycle_name(cycle_dir: &Path) -> String {
    cycle_dir
        .file_name()
        .map(|n| n.to_string_lossy().replace('_', " "))
        .unwrap_or_else(|| "Research".to_string())
}
