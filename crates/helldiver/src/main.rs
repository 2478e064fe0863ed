//! helldiver - interactive research agent
//!
//! Clarifies a question, fans it out to parallel research workers, refines
//! the findings in conversation and commits them to a knowledge graph.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;
mod config;
mod error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("helldiver=info".parse()?))
        .init();

    let cli = Cli::parse();

    let config = config::Config::load()?;

    match cli.command {
        Commands::Run { query } => commands::run::execute(query, &config).await,
        Commands::Resume { session_dir } => commands::resume::execute(&session_dir, &config).await,
        Commands::Commit {
            cycle_dir,
            session_name,
            cycle_name,
        } => commands::commit::execute(&cycle_dir, session_name, cycle_name, &config).await,
        Commands::Doctor => commands::doctor::execute(&config).await,
        Commands::Version => {
            println!("helldiver {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
