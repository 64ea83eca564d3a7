//! Protocol server status
//!
//! The status record is written to its store before every broadcast, so a
//! listener never hears about a change that was not at least attempted
//! durably. A failed write is logged and does not hold up the update.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tabrelay_utils::{RelayError, Result};

const STATUS_CHANNEL_CAPACITY: usize = 16;

/// Last known state of the protocol server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub is_running: bool,
    /// Kept after a stop so a later start can reuse it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub last_updated: DateTime<Utc>,
}

impl Default for ServerStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            port: None,
            last_updated: Utc::now(),
        }
    }
}

/// Durable home of the status record
pub trait StatusStore: Send + Sync {
    fn load(&self) -> Result<Option<ServerStatus>>;
    fn save(&self, status: &ServerStatus) -> Result<()>;
}

/// JSON file store, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    path: PathBuf,
}

impl FileStatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusStore for FileStatusStore {
    fn load(&self) -> Result<Option<ServerStatus>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RelayError::FileRead {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| RelayError::persistence(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, status: &ServerStatus) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tabrelay_utils::ensure_dir(dir).map_err(|e| RelayError::FileWrite {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let json = serde_json::to_vec_pretty(status)
            .map_err(|e| RelayError::persistence(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| RelayError::FileWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RelayError::FileWrite {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    saved: Mutex<Option<ServerStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved record
    pub fn saved(&self) -> Option<ServerStatus> {
        self.saved.lock().clone()
    }
}

impl StatusStore for MemoryStatusStore {
    fn load(&self) -> Result<Option<ServerStatus>> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, status: &ServerStatus) -> Result<()> {
        *self.saved.lock() = Some(status.clone());
        Ok(())
    }
}

/// Owns the current status, its store, and its listeners
pub struct StatusTracker {
    current: RwLock<ServerStatus>,
    store: Arc<dyn StatusStore>,
    events: broadcast::Sender<ServerStatus>,
}

impl StatusTracker {
    /// Restore the last persisted status, falling back to "not running"
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        let current = match store.load() {
            Ok(Some(status)) => {
                debug!(?status, "Restored server status");
                status
            }
            Ok(None) => ServerStatus::default(),
            Err(e) => {
                warn!("Failed to load server status: {}", e);
                ServerStatus::default()
            }
        };
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        Self {
            current: RwLock::new(current),
            store,
            events,
        }
    }

    /// Tracker backed by a fresh [`MemoryStatusStore`]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStatusStore::new()))
    }

    pub fn current(&self) -> ServerStatus {
        self.current.read().clone()
    }

    pub fn record_started(&self, port: u16) -> ServerStatus {
        info!(port, "Protocol server running");
        self.apply(|status| {
            status.is_running = true;
            status.port = Some(port);
        })
    }

    pub fn record_stopped(&self) -> ServerStatus {
        info!("Protocol server stopped");
        self.apply(|status| status.is_running = false)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerStatus> {
        self.events.subscribe()
    }

    fn apply(&self, update: impl FnOnce(&mut ServerStatus)) -> ServerStatus {
        // Held across save and send so listeners see changes in store order
        let mut current = self.current.write();
        update(&mut current);
        current.last_updated = Utc::now();
        let status = current.clone();

        if let Err(e) = self.store.save(&status) {
            warn!("Failed to persist server status: {}", e);
        }
        // No receivers is fine
        let _ = self.events.send(status.clone());

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    impl StatusStore for FailingStore {
        fn load(&self) -> Result<Option<ServerStatus>> {
            Err(RelayError::persistence("unreadable"))
        }

        fn save(&self, _status: &ServerStatus) -> Result<()> {
            Err(RelayError::persistence("disk full"))
        }
    }

    #[test]
    fn test_port_retained_after_stop() {
        let tracker = StatusTracker::in_memory();

        let started = tracker.record_started(9222);
        assert!(started.is_running);
        assert_eq!(started.port, Some(9222));

        tracker.record_stopped();
        let current = tracker.current();
        assert!(!current.is_running);
        assert_eq!(current.port, Some(9222));
    }

    #[test]
    fn test_persisted_before_broadcast() {
        let store = Arc::new(MemoryStatusStore::new());
        let tracker = StatusTracker::new(store.clone());
        let mut rx = tracker.subscribe();

        tracker.record_started(3025);

        let heard = rx.try_recv().unwrap();
        assert_eq!(store.saved(), Some(heard));
    }

    #[test]
    fn test_persistence_failure_does_not_block_update() {
        let tracker = StatusTracker::new(Arc::new(FailingStore));
        let mut rx = tracker.subscribe();

        tracker.record_started(3025);

        assert!(tracker.current().is_running);
        assert_eq!(rx.try_recv().unwrap().port, Some(3025));
    }

    #[test]
    fn test_restores_from_store() {
        let store = Arc::new(MemoryStatusStore::new());
        StatusTracker::new(store.clone()).record_started(4100);

        let restored = StatusTracker::new(store);
        assert_eq!(restored.current().port, Some(4100));
        assert!(restored.current().is_running);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path().join("state").join("server-status.json"));
        assert!(store.load().unwrap().is_none());

        let status = ServerStatus {
            is_running: true,
            port: Some(9222),
            last_updated: Utc::now(),
        };
        store.save(&status).unwrap();

        assert_eq!(store.load().unwrap(), Some(status));
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_file_store_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path().join("status.json"));
        store.save(&ServerStatus::default()).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("isRunning"));
        assert!(raw.contains("lastUpdated"));
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = FileStatusStore::new(&path);
        assert!(matches!(store.load(), Err(RelayError::Persistence(_))));

        // The tracker starts from the default instead
        assert!(!StatusTracker::new(Arc::new(store)).current().is_running);
    }
}
