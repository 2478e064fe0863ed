use std::fs;
use std::path::Path;

use tracing::debug;

use super::Session;
use crate::error::{Error, Result};

/// File name of the persisted session inside its directory.
pub const SESSION_FILE: &str = "session.json";

/// Durable storage for sessions, keyed by session directory.
pub trait SessionStore: Send + Sync {
    /// Load a session. Missing or unreadable records are `Error::CannotResume`.
    fn load(&self, dir: &Path) -> Result<Session>;

    fn save(&self, session: &Session) -> Result<()>;
}

/// Stores each session as pretty-printed JSON in `<dir>/session.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSessionStore;

impl JsonSessionStore {
    pub fn new() -> Self {
        Self
    }
}

impl SessionStore for JsonSessionStore {
    fn load(&self, dir: &Path) -> Result<Session> {
        let path = dir.join(SESSION_FILE);
        if !path.exists() {
            return Err(Error::cannot_resume(dir, format!("no {} found", SESSION_FILE)));
        }

        let raw = fs::read_to_string(&path)
            .map_err(|e| Error::cannot_resume(dir, format!("unreadable {}: {}", SESSION_FILE, e)))?;
        let mut session: Session = serde_json::from_str(&raw)
            .map_err(|e| Error::cannot_resume(dir, format!("corrupt {}: {}", SESSION_FILE, e)))?;

        session.dir = dir.to_path_buf();
        debug!(session = %session.id, state = %session.state, "Loaded session");
        Ok(session)
    }

    fn save(&self, session: &Session) -> Result<()> {
        fs::create_dir_all(&session.dir)?;

        let path = session.dir.join(SESSION_FILE);
        let tmp = session.dir.join(format!("{}.tmp", SESSION_FILE));
        let json = serde_json::to_string_pretty(session)?;

        // Write-then-rename keeps the previous record intact if we die mid-write.
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!(session = %session.id, state = %session.state, "Saved session");
        Ok(())
    }
}
