//! Error types for the helldiver CLI.

use std::path::PathBuf;

use thiserror::Error;

/// Conditions the CLI reports to the user directly.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("ANTHROPIC_API_KEY is not set (environment or config file)")]
    MissingApiKey,

    #[error("Not a cycle directory: {0}")]
    NotACycle(PathBuf),

    #[error("Input error: {0}")]
    Input(String),
}

impl From<dialoguer::Error> for CliError {
    fn from(e: dialoguer::Error) -> Self {
        CliError::Input(e.to_string())
    }
}
