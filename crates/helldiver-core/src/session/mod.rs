//! Research session model and persistence.
//!
//! A session is one continuous user interaction: an initial research run
//! followed by any number of refinement conversations and deep-research
//! cycles.
//!
//! ## Lifecycle
//!
//! ```text
//! TASKING ──► RESEARCH ──► REFINEMENT ──► COMMIT ──► COMPLETE
//!                ▲  │          │  ▲          │
//!                │  │          │  └──────────┘  (commit failed)
//!                │  ▼          ▼
//!                │ COMPLETE  COMPLETE
//!                └─────────────┘  (deep research)
//! ```
//!
//! Every mutation is followed by a save so that terminating the process
//! loses at most the step in flight.

mod state;
mod store;

pub use state::SessionState;
pub use store::{JsonSessionStore, SESSION_FILE, SessionStore};

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::types::{ChatMessage, RefinementTurn, ResearchFindings};

/// A submitted research batch and the cycle it was submitted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBatch {
    pub batch_id: String,
    pub cycle_name: String,
    pub query: String,
}

/// One continuous research interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier, also the session directory name.
    pub id: String,

    /// What the user originally asked. Never changes.
    pub original_query: String,

    /// Current research focus. Deep research cycles replace it.
    pub query: String,

    pub state: SessionState,

    /// Number of completed research cycles.
    #[serde(default)]
    pub cycle_count: u32,

    /// Name of the most recent cycle, used as the episode-name prefix.
    #[serde(default)]
    pub cycle_name: String,

    /// Summary of the tasking conversation that defined the research.
    #[serde(default)]
    pub tasking_summary: String,

    #[serde(default)]
    pub tasking_history: Vec<ChatMessage>,

    /// Refinement turns since the last research cycle.
    #[serde(default)]
    pub pending_refinement: Vec<RefinementTurn>,

    #[serde(default)]
    pub narrative: String,

    #[serde(default)]
    pub findings: Option<ResearchFindings>,

    /// Remote batch submitted but not yet collected.
    #[serde(default)]
    pub pending_batch: Option<PendingBatch>,

    /// Cycle names whose commit reported at least one episode.
    #[serde(default)]
    pub committed_cycles: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Directory holding session.json and the cycle folders.
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Session {
    /// Create a session in TASKING state rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, query: impl Into<String>) -> Self {
        let dir = dir.into();
        let query = query.into();
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let now = Utc::now();

        Self {
            id,
            original_query: query.clone(),
            query,
            state: SessionState::Tasking,
            cycle_count: 0,
            cycle_name: String::new(),
            tasking_summary: String::new(),
            tasking_history: Vec::new(),
            pending_refinement: Vec::new(),
            narrative: String::new(),
            findings: None,
            pending_batch: None,
            committed_cycles: Vec::new(),
            created_at: now,
            updated_at: now,
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        self.state = self.state.transition(next)?;
        self.touch();
        Ok(())
    }

    /// Move a reloaded session into the state it continues in.
    ///
    /// Sessions with a finished cycle go back to REFINEMENT; a session that
    /// never completed research goes back to RESEARCH.
    pub fn reopen(&mut self) -> Result<SessionState> {
        self.state = self.state.resume(self.cycle_count > 0)?;
        self.touch();
        Ok(self.state)
    }

    /// The in-flight batch, if it was submitted for this cycle and query.
    pub fn batch_for(&self, cycle_name: &str, query: &str) -> Option<&PendingBatch> {
        self.pending_batch
            .as_ref()
            .filter(|b| b.cycle_name == cycle_name && b.query == query)
    }

    /// Forget the in-flight batch; its results will not be collected.
    pub fn abandon_batch(&mut self) {
        if let Some(batch) = self.pending_batch.take() {
            warn!(batch_id = %batch.batch_id, cycle = %batch.cycle_name, "Abandoning research batch");
            self.touch();
        }
    }

    pub fn add_tasking_message(&mut self, message: ChatMessage) {
        self.tasking_history.push(message);
        self.touch();
    }

    pub fn add_refinement_turn(
        &mut self,
        user_input: impl Into<String>,
        assistant_response: impl Into<String>,
    ) {
        self.pending_refinement
            .push(RefinementTurn::new(user_input, assistant_response));
        self.touch();
    }

    /// Drop pending refinement once it has been distilled into a cycle.
    pub fn clear_refinement(&mut self) {
        self.pending_refinement.clear();
        self.touch();
    }

    /// Record a finished research cycle.
    pub fn complete_cycle(
        &mut self,
        cycle_name: impl Into<String>,
        findings: ResearchFindings,
    ) {
        self.cycle_count += 1;
        self.cycle_name = cycle_name.into();
        self.narrative = findings.narrative.clone();
        self.findings = Some(findings);
        self.pending_batch = None;
        self.pending_refinement.clear();
        self.touch();
    }

    pub fn mark_committed(&mut self, cycle_name: &str) {
        if !self.committed_cycles.iter().any(|c| c == cycle_name) {
            self.committed_cycles.push(cycle_name.to_string());
        }
        self.touch();
    }

    /// Directory for a cycle's audit artifacts.
    pub fn cycle_dir(&self, cycle_name: &str) -> PathBuf {
        self.dir.join(crate::artifacts::dir_name(cycle_name))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
