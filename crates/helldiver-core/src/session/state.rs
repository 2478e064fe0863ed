use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a research session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Tasking,
    Research,
    Refinement,
    Commit,
    Complete,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tasking => "TASKING",
            Self::Research => "RESEARCH",
            Self::Refinement => "REFINEMENT",
            Self::Commit => "COMMIT",
            Self::Complete => "COMPLETE",
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Tasking, Research)
                | (Tasking, Complete)
                | (Research, Refinement)
                | (Research, Complete)
                | (Refinement, Research)
                | (Refinement, Commit)
                | (Refinement, Complete)
                | (Commit, Refinement)
                | (Commit, Complete)
        )
    }

    /// Validate a transition and return the new state.
    pub fn transition(self, next: SessionState) -> Result<SessionState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Target state when a saved session is reopened.
    ///
    /// Resuming is the only way back out of COMPLETE or COMMIT; a session
    /// with a finished cycle resumes in REFINEMENT, otherwise in RESEARCH.
    pub fn resume(self, has_cycle: bool) -> Result<SessionState> {
        use SessionState::*;
        let next = if has_cycle { Refinement } else { Research };
        let allowed = self == next
            || self.can_transition_to(next)
            || matches!((self, next), (Complete | Commit, Refinement) | (Complete, Research));
        if allowed {
            Ok(next)
        } else {
            Err(Error::InvalidTransition { from: self, to: next })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
