//! Start a new research session.

use anyhow::Result;
use colored::Colorize;
use helldiver_core::{Session, SessionState};

use super::interactive::{Agent, LoopOutcome, new_session_dir, read_line};
use crate::config::Config;

pub async fn execute(query: Option<String>, config: &Config) -> Result<()> {
    config.ensure_dirs()?;
    let mut agent = Agent::new(config)?;
    let mut query = query;

    loop {
        let initial = match query.take() {
            Some(q) if !q.trim().is_empty() => q.trim().to_string(),
            _ => read_line("What do you want to research?")?,
        };
        if initial.is_empty() {
            println!("{}", "No query given.".yellow());
            return Ok(());
        }

        let mut session = Session::new(new_session_dir(&config.paths.sessions_dir, &initial), &initial);
        std::fs::create_dir_all(session.dir())?;
        agent.save(&session)?;
        println!("{}", format!("Session: {}", session.dir().display()).dimmed());

        agent.tasking(&mut session).await?;

        let context = session.tasking_summary.clone();
        let topic = session.original_query.clone();
        agent.research(&mut session, &topic, &context).await?;

        if session.state != SessionState::Refinement
            || agent.refinement(&mut session).await? == LoopOutcome::Done
        {
            return Ok(());
        }
    }
}
