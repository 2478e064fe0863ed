use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{ConnectionManager, EpisodeRecord};
use crate::error::GraphError;
use crate::retry::RetryPolicy;
use crate::types::WorkerFinding;

const CRITIQUE_LABEL: &str = "Critical Analysis";
const REFINEMENT_LABEL: &str = "Refinement Context";

/// The artifacts of one research cycle, ready to commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitRequest {
    pub session_name: String,
    pub cycle_name: String,
    pub group_id: String,
    /// Worker findings in roster order. Written in this order.
    pub workers: Vec<WorkerFinding>,
    pub critique: String,
    /// Distilled refinement conversation. Written last.
    pub refinement: String,
}

impl CommitRequest {
    /// Number of artifacts that will be attempted.
    pub fn non_empty_artifacts(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_empty()).count()
            + usize::from(!self.critique.trim().is_empty())
            + usize::from(!self.refinement.trim().is_empty())
    }

    pub fn episode_name(&self, label: &str) -> String {
        format!("{} - {}", self.cycle_name, label)
    }

    /// Episodes for every non-empty artifact: workers, then critique, then refinement.
    pub fn episodes(&self, reference_time: DateTime<Utc>) -> Vec<EpisodeRecord> {
        let mut episodes = Vec::with_capacity(self.workers.len() + 2);

        for worker in self.workers.iter().filter(|w| !w.is_empty()) {
            episodes.push(self.record(
                &worker.label,
                worker.text.clone(),
                format!(
                    "This episode contains {} findings for the research question: \"{}\".",
                    worker.label.to_lowercase(),
                    self.cycle_name
                ),
                reference_time,
            ));
        }

        if !self.critique.trim().is_empty() {
            episodes.push(self.record(
                CRITIQUE_LABEL,
                self.critique.clone(),
                "This episode contains the critical review of the worker findings: \
                 evidence quality, contradictions, filtered noise and key insights."
                    .to_string(),
                reference_time,
            ));
        }

        if !self.refinement.trim().is_empty() {
            let body = format!(
                "Research Query: {}\nEpisode Type: {}\n\n\
                 DISTILLED CONTEXT (why this research was run):\n{}",
                self.cycle_name, REFINEMENT_LABEL, self.refinement
            );
            episodes.push(self.record(
                REFINEMENT_LABEL,
                body,
                "This episode captures the user's mental models, reframings, constraints, \
                 priorities and synthesis instructions behind this research."
                    .to_string(),
                reference_time,
            ));
        }

        episodes
    }

    fn record(
        &self,
        label: &str,
        body: String,
        context: String,
        reference_time: DateTime<Utc>,
    ) -> EpisodeRecord {
        let source_description = format!(
            "[METADATA]\nResearch Session: {}\nCycle: {}\nRole: {}\nGroup ID: {}\nTimestamp: {}\n\n[CONTEXT]\n{}",
            self.session_name,
            self.cycle_name,
            label,
            self.group_id,
            reference_time.to_rfc3339(),
            context
        );

        EpisodeRecord {
            name: self.episode_name(label),
            body,
            source_description,
            reference_time,
            group_id: self.group_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    /// At least one episode was committed.
    Success,
    Error,
}

/// A write that did not produce an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactError {
    pub episode: String,
    pub message: String,
    /// Attempts made, including retries.
    pub attempts: u32,
}

/// Result of committing one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub status: CommitStatus,
    pub episode_count: usize,
    /// Committed episode names, in write order.
    pub episodes: Vec<String>,
    pub errors: Vec<ArtifactError>,
    /// Set when the backend could not be reached; nothing was written.
    pub unavailable: Option<String>,
}

impl CommitOutcome {
    fn unavailable(reason: String) -> Self {
        Self {
            status: CommitStatus::Error,
            episode_count: 0,
            episodes: Vec::new(),
            errors: Vec::new(),
            unavailable: Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommitStatus::Success
    }
}

/// Writes cycle artifacts as graph episodes.
///
/// Writes are sequential. A failed write is recorded and the next artifact
/// is still attempted; only an unreachable backend stops the cycle, and it
/// does so before any write.
pub struct EpisodeCommitter {
    connection: ConnectionManager,
    retry: RetryPolicy,
}

impl EpisodeCommitter {
    pub fn new(connection: ConnectionManager, retry: RetryPolicy) -> Self {
        Self { connection, retry }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.connection
    }

    pub async fn commit(&mut self, request: &CommitRequest) -> CommitOutcome {
        let store = match self.connection.prepare().await {
            Ok(store) => store,
            Err(e) => {
                error!(cycle = %request.cycle_name, "Graph unavailable: {}", e);
                return CommitOutcome::unavailable(format!("Graph unavailable: {}", e));
            }
        };

        let episodes = request.episodes(Utc::now());
        info!(
            cycle = %request.cycle_name,
            episodes = episodes.len(),
            group_id = %request.group_id,
            "Committing cycle"
        );

        let mut committed = Vec::new();
        let mut errors = Vec::new();

        for episode in &episodes {
            let attempts = AtomicU32::new(0);
            let result = self
                .retry
                .run(
                    || {
                        attempts.fetch_add(1, Ordering::Relaxed);
                        store.add_episode(episode)
                    },
                    GraphError::is_rate_limited,
                )
                .await;

            match result {
                Ok(()) => {
                    info!(episode = %episode.name, "Episode committed");
                    committed.push(episode.name.clone());
                }
                Err(e) => {
                    let attempts = attempts.load(Ordering::Relaxed);
                    warn!(episode = %episode.name, attempts, "Episode failed: {}", e);
                    errors.push(ArtifactError {
                        episode: episode.name.clone(),
                        message: format!("Failed to commit {}: {}", episode.name, e),
                        attempts,
                    });
                }
            }
        }

        CommitOutcome {
            status: if committed.is_empty() {
                CommitStatus::Error
            } else {
                CommitStatus::Success
            },
            episode_count: committed.len(),
            episodes: committed,
            errors,
            unavailable: None,
        }
    }
}
