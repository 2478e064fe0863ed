//! Error types for helldiver-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias using helldiver-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for helldiver operations
#[derive(Error, Debug)]
pub enum Error {
    // Session errors
    #[error("Cannot resume session at {path}: {reason}")]
    CannotResume { path: PathBuf, reason: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionState,
        to: SessionState,
    },

    // Collaborator errors
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    // Research errors
    #[error("Research batch {batch_id} failed: {reason}")]
    Batch { batch_id: String, reason: String },

    #[error("Research cancelled")]
    Cancelled,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a resume failure for a session directory
    pub fn cannot_resume(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CannotResume {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error came from a cancelled research run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// A research failure after which the remote batch may still be collected.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Llm(LlmError::Transport(_)))
    }
}

/// Errors raised by the text-generation collaborator.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Authentication failed")]
    Authentication,

    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Rate-limit class failures are the only ones worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.status().map(|s| s.as_u16()) == Some(429) {
            LlmError::RateLimited(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}

/// Errors raised by the graph-store collaborator.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GraphError {
    /// Rate-limit class failures are retried with backoff; everything else is final.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            // Extraction inside the backend may surface the LLM provider's 429 as text.
            Self::Rejected(msg) | Self::Protocol(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("rate limit") || lower.contains("429")
            }
            Self::Connection(_) => false,
        }
    }
}

impl From<reqwest::Error> for GraphError {
    fn from(e: reqwest::Error) -> Self {
        match e.status().map(|s| s.as_u16()) {
            Some(429) => GraphError::RateLimited(e.to_string()),
            Some(_) => GraphError::Rejected(e.to_string()),
            None => GraphError::Connection(e.to_string()),
        }
    }
}
