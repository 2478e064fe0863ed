use std::fmt;

use tracing::{debug, info, warn};

use super::{GraphConnector, GraphStore};
use crate::error::GraphError;

/// Health of the graph handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handle held.
    Absent,
    /// Handle passed its last liveness check.
    Healthy,
    /// Handle failed its last liveness check and has been discarded.
    Stale,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Healthy => write!(f, "healthy"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Owns the graph handle and tracks whether indexes were built on it.
///
/// Every [`prepare`](Self::prepare) verifies liveness against the backend;
/// a failed check discards the handle and connects again. A new handle always
/// starts with `indexes_built == false`.
pub struct ConnectionManager {
    connector: Box<dyn GraphConnector>,
    handle: Option<Box<dyn GraphStore>>,
    state: ConnectionState,
    indexes_built: bool,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn GraphConnector>) -> Self {
        Self {
            connector,
            handle: None,
            state: ConnectionState::Absent,
            indexes_built: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn indexes_built(&self) -> bool {
        self.indexes_built
    }

    /// Return a verified handle with indexes built, connecting if needed.
    ///
    /// An `Err` means the backend is unavailable and nothing should be written.
    pub async fn prepare(&mut self) -> Result<&dyn GraphStore, GraphError> {
        self.ensure_live().await?;

        let Some(store) = self.handle.as_deref() else {
            return Err(GraphError::Connection("no graph handle".into()));
        };

        if !self.indexes_built {
            info!("Building graph indexes");
            store.build_indexes().await?;
            self.indexes_built = true;
            debug!("Graph indexes ready");
        }

        Ok(store)
    }

    /// Drop the current handle, if any.
    pub fn disconnect(&mut self) {
        self.handle = None;
        self.state = ConnectionState::Absent;
        self.indexes_built = false;
    }

    async fn ensure_live(&mut self) -> Result<(), GraphError> {
        if let Some(store) = self.handle.as_deref() {
            match store.verify_connectivity().await {
                Ok(()) => {
                    self.state = ConnectionState::Healthy;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Graph connection lost ({}), reconnecting", e);
                    self.handle = None;
                    self.state = ConnectionState::Stale;
                    self.indexes_built = false;
                }
            }
        }

        self.reconnect().await
    }

    async fn reconnect(&mut self) -> Result<(), GraphError> {
        let store = match self.connector.connect().await {
            Ok(store) => store,
            Err(e) => {
                warn!("Graph connection failed: {}", e);
                self.state = ConnectionState::Absent;
                return Err(e);
            }
        };

        if let Err(e) = store.verify_connectivity().await {
            warn!("New graph connection failed verification: {}", e);
            self.state = ConnectionState::Absent;
            return Err(e);
        }

        info!("Connected to graph backend");
        self.handle = Some(store);
        self.state = ConnectionState::Healthy;
        self.indexes_built = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeConnector};

    #[tokio::test]
    async fn test_connects_when_absent() {
        let backend = FakeBackend::default();
        let mut manager = ConnectionManager::new(Box::new(FakeConnector::new(&backend)));
        assert_eq!(manager.state(), ConnectionState::Absent);

        manager.prepare().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Healthy);
        assert!(manager.indexes_built());
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.index_builds(), 1);
    }

    #[tokio::test]
    async fn test_dead_handle_is_replaced() {
        let backend = FakeBackend::default();
        let mut manager = ConnectionManager::new(Box::new(FakeConnector::new(&backend)));
        manager.prepare().await.unwrap();

        backend.kill_current_handle();
        manager.prepare().await.unwrap();

        assert_eq!(manager.state(), ConnectionState::Healthy);
        assert_eq!(backend.connects(), 2);
        assert_eq!(backend.index_builds(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let backend = FakeBackend::default();
        backend.set_reachable(false);
        let mut manager = ConnectionManager::new(Box::new(FakeConnector::new(&backend)));

        let err = manager.prepare().await.err().unwrap();
        assert!(matches!(err, GraphError::Connection(_)));
        assert_eq!(manager.state(), ConnectionState::Absent);
        assert!(!manager.indexes_built());
        assert_eq!(backend.index_builds(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_resets_index_state() {
        let backend = FakeBackend::default();
        let mut manager = ConnectionManager::new(Box::new(FakeConnector::new(&backend)));
        manager.prepare().await.unwrap();

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Absent);
        assert!(!manager.indexes_built());
    }
}
