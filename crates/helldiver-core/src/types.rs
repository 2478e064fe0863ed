//! Shared types for helldiver-core.
//!
//! These types are used by the session store, the research executor and the
//! episode-commit protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prompts;

// ─────────────────────────────────────────────────────────────────────────────
// Worker Roster
// ─────────────────────────────────────────────────────────────────────────────

/// One research worker: a role/persona run in parallel with the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Stable identifier, used as batch custom id and artifact file stem.
    pub id: String,
    /// Human label, used in episode names.
    pub label: String,
    /// Role instructions sent as the system prompt.
    pub instructions: String,
}

impl WorkerSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            instructions: instructions.into(),
        }
    }
}

/// The default three-worker roster. Worker count is a parameter, not an invariant.
pub fn default_roster() -> Vec<WorkerSpec> {
    vec![
        WorkerSpec::new(
            "academic_researcher",
            "Academic Research",
            prompts::ACADEMIC_RESEARCHER,
        ),
        WorkerSpec::new(
            "industry_intelligence",
            "Industry Intelligence",
            prompts::INDUSTRY_ANALYST,
        ),
        WorkerSpec::new("tool_analyzer", "Tool Analysis", prompts::TOOL_ANALYZER),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation Types
// ─────────────────────────────────────────────────────────────────────────────

/// Speaker of a tasking transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message of the tasking conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One user/assistant exchange during refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementTurn {
    pub user_input: String,
    pub assistant_response: String,
    pub timestamp: DateTime<Utc>,
}

impl RefinementTurn {
    pub fn new(user_input: impl Into<String>, assistant_response: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            assistant_response: assistant_response.into(),
            timestamp: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Research Output
// ─────────────────────────────────────────────────────────────────────────────

/// Text produced by one worker. Empty text means the worker produced nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFinding {
    pub worker_id: String,
    pub label: String,
    pub text: String,
}

impl WorkerFinding {
    pub fn new(worker: &WorkerSpec, text: impl Into<String>) -> Self {
        Self {
            worker_id: worker.id.clone(),
            label: worker.label.clone(),
            text: text.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Everything one research execution produced, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchFindings {
    pub workers: Vec<WorkerFinding>,
    pub critique: String,
    pub narrative: String,
}

impl ResearchFindings {
    /// Look up a worker's text by id.
    pub fn worker_text(&self, worker_id: &str) -> Option<&str> {
        self.workers
            .iter()
            .find(|w| w.worker_id == worker_id)
            .map(|w| w.text.as_str())
    }

    /// Number of workers that produced non-empty text.
    pub fn non_empty_workers(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_empty()).count()
    }
}
