//! In-memory credential store.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::identifiers::SessionId;

use super::credentials::{CredentialStore, Credentials};

// ============================================================================
// MemoryCredentialStore
// ============================================================================

/// Credential store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    sessions: RwLock<FxHashMap<SessionId, Credentials>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, session_id: &SessionId) -> Result<Option<Credentials>> {
        Ok(self
            .sessions
            .read()
            .get(session_id)
            .filter(|c| !c.is_empty())
            .cloned())
    }

    async fn save(&self, session_id: &SessionId, credentials: &Credentials) -> Result<()> {
        self.sessions
            .write()
            .entry(session_id.clone())
            .or_default()
            .merge(credentials);
        Ok(())
    }

    async fn exists(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self
            .sessions
            .read()
            .get(session_id)
            .is_some_and(|c| !c.is_empty()))
    }

    async fn delete(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionId>> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, c)| !c.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        sessions.sort();
        Ok(sessions)
    }
}

// ============================================================================
// Tests
// ============================================================================
