//! helldiver-core - Core library for the Helldiver research agent
//!
//! This crate provides everything below the interactive CLI:
//!
//! - **session**: Session lifecycle state machine and JSON persistence
//! - **research**: Parallel worker batches, critical review, narrative synthesis
//! - **distill**: Conversation distillation for graph ingestion
//! - **graph**: Connection health management and the episode-commit protocol
//! - **cycle**: One research cycle end to end
//! - **intent**: Pluggable intent classification
//! - **llm**: Text-generation and batch collaborators
//! - **retry**: Exponential backoff for rate-limited operations

pub mod artifacts;
pub mod cycle;
pub mod distill;
pub mod error;
pub mod graph;
pub mod intent;
pub mod llm;
pub mod prompts;
pub mod research;
pub mod retry;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use cycle::{CycleReport, CycleRunner};
pub use error::{Error, GraphError, LlmError, Result};
pub use graph::{CommitOutcome, CommitRequest, CommitStatus, EpisodeCommitter};
pub use session::{JsonSessionStore, Session, SessionState, SessionStore};
