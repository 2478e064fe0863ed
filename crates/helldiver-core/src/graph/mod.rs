//! Knowledge-graph persistence.
//!
//! The graph backend is reached through two narrow traits:
//!
//! - [`GraphStore`]: one live handle (index build, episode write, liveness)
//! - [`GraphConnector`]: creates fresh handles
//!
//! [`ConnectionManager`] owns the current handle and its health, and
//! [`EpisodeCommitter`] turns a cycle's artifacts into ordered episode writes.

mod commit;
mod connection;
pub mod neo4j;

pub use commit::{ArtifactError, CommitOutcome, CommitRequest, CommitStatus, EpisodeCommitter};
pub use connection::{ConnectionManager, ConnectionState};
pub use neo4j::{Neo4jConfig, Neo4jConnector, Neo4jHttpStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Default group identifier. One global group lets entities merge across sessions.
pub const DEFAULT_GROUP_ID: &str = "helldiver_research";

/// One episode write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub name: String,
    pub body: String,
    pub source_description: String,
    pub reference_time: DateTime<Utc>,
    pub group_id: String,
}

/// A live handle to the graph backend.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create indexes and constraints. Idempotent on the backend side.
    async fn build_indexes(&self) -> Result<(), GraphError>;

    async fn add_episode(&self, episode: &EpisodeRecord) -> Result<(), GraphError>;

    /// Round-trip to the backend, not just a handle check.
    async fn verify_connectivity(&self) -> Result<(), GraphError>;
}

/// Creates new graph handles.
#[async_trait]
pub trait GraphConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn GraphStore>, GraphError>;
}
