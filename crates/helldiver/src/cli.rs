//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Helldiver research agent
///
/// Clarify a question, research it with parallel workers, refine the
/// findings in conversation and commit them to a knowledge graph.
#[derive(Parser, Debug)]
#[command(name = "helldiver")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new interactive research session
    Run {
        /// Initial research query (prompted for if omitted)
        query: Option<String>,
    },

    /// Resume a saved session in refinement
    Resume {
        /// Session directory containing session.json
        session_dir: PathBuf,
    },

    /// Commit a saved research cycle to the knowledge graph
    Commit {
        /// Cycle directory with the audit files
        cycle_dir: PathBuf,

        /// Research session name recorded in episode provenance
        #[arg(long)]
        session_name: Option<String>,

        /// Cycle name used as the episode-name prefix (default: directory name)
        #[arg(long)]
        cycle_name: Option<String>,
    },

    /// Run diagnostics
    Doctor,

    /// Show version information
    Version,
}
