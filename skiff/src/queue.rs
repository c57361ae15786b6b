//! Durable offline queue
//!
//! Captures taken without connectivity are stored in sled and survive
//! process restarts. The queue is local to one device and has a single
//! writer. Entries are removed only after the gateway confirms persistence.

use chrono::Utc;
use sled::Db;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{ActionKind, CatchDraft, OfflineAction};
use crate::types::{Result, SkiffError};

const PENDING_TREE: &str = "pending";

/// Sled-backed queue of offline actions
pub struct OfflineQueue {
    _db: Db,
    pending: sled::Tree,
}

impl OfflineQueue {
    /// Open (or create) the queue at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = sled::open(path.as_ref())?;
        let pending = db.open_tree(PENDING_TREE)?;

        info!(path = %path.as_ref().display(), pending = pending.len(), "Offline queue opened");

        Ok(Self { _db: db, pending })
    }

    /// Queue a catch captured offline. Returns the action id.
    pub fn enqueue(&self, payload: CatchDraft) -> Result<String> {
        let action = OfflineAction {
            action_id: Uuid::new_v4().to_string(),
            kind: ActionKind::SubmitCatch,
            payload,
            captured_at: Utc::now(),
        };

        let bytes = serde_json::to_vec(&action)?;
        self.pending.insert(action.action_id.as_bytes(), bytes)?;
        self.pending.flush()?;

        debug!(action_id = %action.action_id, "Offline action queued");
        Ok(action.action_id)
    }

    /// All pending actions, oldest capture first
    pub fn list_pending(&self) -> Result<Vec<OfflineAction>> {
        let mut actions = Vec::new();
        for entry in self.pending.iter() {
            let (_, bytes) = entry?;
            let action: OfflineAction = serde_json::from_slice(&bytes)?;
            actions.push(action);
        }
        actions.sort_by_key(|a| a.captured_at);
        Ok(actions)
    }

    /// Remove a confirmed action. Returns whether it existed (re-running a
    /// drain against already-synced actions is a no-op).
    pub fn remove(&self, action_id: &str) -> Result<bool> {
        let existed = self.pending.remove(action_id.as_bytes())?.is_some();
        if existed {
            self.pending.flush()?;
            debug!(action_id = %action_id, "Offline action removed");
        }
        Ok(existed)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Open the queue at the default per-user location
    pub fn open_default() -> Result<Self> {
        let base = std::env::var_os("SKIFF_DATA_DIR")
            .map(std::path::PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| Path::new(&h).join(".skiff")))
            .ok_or_else(|| {
                SkiffError::Config("neither SKIFF_DATA_DIR nor HOME is set".to_string())
            })?;
        Self::open(base.join("queue.sled"))
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(species: &str) -> CatchDraft {
        CatchDraft {
            catch_id: None,
            actor_id: "fisher-1".to_string(),
            actor_name: None,
            species: species.to_string(),
            weight: 5.0,
            harvest_date: "2026-08-01".to_string(),
            drying_method: "sun".to_string(),
            batch_size: 1.0,
            shelf_life: 10,
            price: 100.0,
            lat: -6.8,
            lng: 39.2,
            image_urls: vec![],
        }
    }

    #[test]
    fn enqueue_list_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let queue = OfflineQueue::open(dir.path().join("queue.sled")).unwrap();

        let id1 = queue.enqueue(draft("tilapia")).unwrap();
        let id2 = queue.enqueue(draft("sardine")).unwrap();
        assert_eq!(queue.len(), 2);

        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 2);
        // Oldest capture first
        assert_eq!(pending[0].action_id, id1);
        assert_eq!(pending[1].action_id, id2);

        assert!(queue.remove(&id1).unwrap());
        assert!(!queue.remove(&id1).unwrap()); // idempotent
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sled");

        let id = {
            let queue = OfflineQueue::open(&path).unwrap();
            queue.enqueue(draft("tilapia")).unwrap()
        };

        let queue = OfflineQueue::open(&path).unwrap();
        let pending = queue.list_pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action_id, id);
        assert_eq!(pending[0].payload.species, "tilapia");
    }
}
