//! Resume a saved session.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use helldiver_core::{JsonSessionStore, SessionState, SessionStore};

use super::interactive::{Agent, LoopOutcome};
use crate::config::Config;

pub async fn execute(session_dir: &Path, config: &Config) -> Result<()> {
    let store = JsonSessionStore::new();
    let mut session = store
        .load(session_dir)
        .with_context(|| format!("Cannot resume {}", session_dir.display()))?;

    let mut agent = Agent::new(config)?;

    let state = session
        .reopen()
        .with_context(|| format!("Cannot resume {}", session_dir.display()))?;
    agent.save(&session)?;

    println!("{} {}", "Resuming".cyan().bold(), session.original_query.bold());
    println!(
        "{}",
        format!(
            "{} cycle(s) completed, {} pending refinement turn(s)",
            session.cycle_count,
            session.pending_refinement.len()
        )
        .dimmed()
    );

    if state == SessionState::Research {
        if session.pending_batch.is_some() {
            println!("{}", "Reattaching to the research batch in flight.".dimmed());
        }
        let query = session.query.clone();
        let context = session.tasking_summary.clone();
        agent.research(&mut session, &query, &context).await?;
    }

    if session.state == SessionState::Refinement && agent.refinement(&mut session).await? == LoopOutcome::NewSession {
        return super::run::execute(None, config).await;
    }
    Ok(())
}
