//! Process-wide map from session id to its connection manager.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::identifiers::SessionId;

use super::manager::{ConnectionManager, SessionContext};

// ============================================================================
// Types
// ============================================================================

struct Entry {
    /// Creation order, for stable listing.
    seq: u64,
    manager: ConnectionManager,
}

// ============================================================================
// SessionRegistry
// ============================================================================

/// Owns at most one [`ConnectionManager`] per session id.
///
/// Resolution constructs lazily and never connects.
pub struct SessionRegistry {
    context: SessionContext,
    managers: RwLock<FxHashMap<SessionId, Entry>>,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry whose managers share `context`.
    #[must_use]
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            managers: RwLock::new(FxHashMap::default()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Returns the manager for `session_id`, creating it if absent.
    ///
    /// Concurrent callers for the same id always get the same instance.
    pub fn resolve(&self, session_id: &SessionId) -> ConnectionManager {
        if let Some(entry) = self.managers.read().get(session_id) {
            return entry.manager.clone();
        }

        let mut managers = self.managers.write();
        let entry = managers.entry(session_id.clone()).or_insert_with(|| {
            debug!(session_id = %session_id, "Creating connection manager");
            Entry {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                manager: ConnectionManager::new(session_id.clone(), self.context.clone()),
            }
        });
        entry.manager.clone()
    }

    /// Returns the manager for `session_id` without creating one.
    #[must_use]
    pub fn get(&self, session_id: &SessionId) -> Option<ConnectionManager> {
        self.managers
            .read()
            .get(session_id)
            .map(|entry| entry.manager.clone())
    }

    /// Returns `true` if a manager exists for `session_id`.
    #[inline]
    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.managers.read().contains_key(session_id)
    }

    /// Logs the session out, retires its manager and evicts it.
    ///
    /// Until eviction completes, the retired manager refuses to connect.
    /// Returns `false` if no manager existed.
    pub async fn remove(&self, session_id: &SessionId) -> bool {
        let Some(manager) = self.get(session_id) else {
            return false;
        };

        manager.teardown(true).await;

        let mut managers = self.managers.write();
        if managers
            .get(session_id)
            .is_some_and(|entry| entry.manager.ptr_eq(&manager))
        {
            managers.remove(session_id);
        }
        drop(managers);

        info!(session_id = %session_id, "Session removed");
        true
    }

    /// Returns every manager in creation order.
    #[must_use]
    pub fn list_all(&self) -> Vec<ConnectionManager> {
        let managers = self.managers.read();
        let mut entries: Vec<_> = managers.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.manager.clone()).collect()
    }

    /// Returns the number of managers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.managers.read().len()
    }

    /// Returns `true` if no manager exists.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.read().is_empty()
    }

    /// Closes every session without logging out and empties the registry.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut managers = self.managers.write();
            managers.drain().map(|(_, entry)| entry.manager).collect()
        };

        let count = drained.len();
        for manager in drained {
            manager.teardown(false).await;
        }

        info!(count, "Registry shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================
