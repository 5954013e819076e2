//! Directory-backed credential store.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├── main/
//! │   ├── creds
//! │   ├── pre-key-1
//! │   └── app-state-sync-key-AAAA
//! └── support/
//!     └── creds
//! ```
//!
//! Entry names are sanitized into file names (`/` becomes `__`, `:`
//! becomes `-`), so names that already avoid those characters round-trip.

// ============================================================================
// Imports
// ============================================================================

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

use super::credentials::{CredentialStore, Credentials};

// ============================================================================
// Constants
// ============================================================================

/// Suffix of in-progress writes.
const TMP_SUFFIX: &str = ".tmp";

// ============================================================================
// FileCredentialStore
// ============================================================================

/// Stores each session's credentials in its own directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    /// Root directory holding one subdirectory per session.
    root: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store rooted at `root`.
    ///
    /// Nothing is touched on disk until the first write.
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory for a session.
    #[inline]
    #[must_use]
    pub fn session_dir(&self, session_id: &SessionId) -> PathBuf {
        self.root.join(session_id.as_str())
    }

    /// Wraps an IO failure with session context.
    fn io_error(session_id: &SessionId, action: &str, err: std::io::Error) -> Error {
        Error::credential_store(session_id.clone(), format!("{action}: {err}"))
    }
}

/// Maps an entry name onto a safe file name.
fn file_name(key: &str) -> String {
    key.replace('/', "__").replace(':', "-")
}

// ============================================================================
// CredentialStore
// ============================================================================

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, session_id: &SessionId) -> Result<Option<Credentials>> {
        let dir = self.session_dir(session_id);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(session_id, "read session dir", e)),
        };

        let mut credentials = Credentials::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(session_id, "list session dir", e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }

            let bytes = fs::read(entry.path())
                .await
                .map_err(|e| Self::io_error(session_id, "read credential", e))?;
            credentials.insert(name, bytes);
        }

        if credentials.is_empty() {
            return Ok(None);
        }

        debug!(session_id = %session_id, entries = credentials.len(), "Credentials loaded");
        Ok(Some(credentials))
    }

    async fn save(&self, session_id: &SessionId, credentials: &Credentials) -> Result<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Self::io_error(session_id, "create session dir", e))?;

        for (key, bytes) in credentials.iter() {
            let target = dir.join(file_name(key));
            let tmp = dir.join(format!("{}{TMP_SUFFIX}", file_name(key)));

            fs::write(&tmp, bytes)
                .await
                .map_err(|e| Self::io_error(session_id, "write credential", e))?;
            fs::rename(&tmp, &target)
                .await
                .map_err(|e| Self::io_error(session_id, "commit credential", e))?;

            trace!(session_id = %session_id, key, "Credential entry written");
        }

        debug!(session_id = %session_id, entries = credentials.len(), "Credentials saved");
        Ok(())
    }

    async fn exists(&self, session_id: &SessionId) -> Result<bool> {
        let mut entries = match fs::read_dir(self.session_dir(session_id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Self::io_error(session_id, "read session dir", e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(session_id, "list session dir", e))?
        {
            if !entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<()> {
        match fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => {
                debug!(session_id = %session_id, "Credentials deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(session_id, "delete session dir", e)),
        }
    }

    async fn list(&self) -> Result<Vec<SessionId>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            match SessionId::new(name.clone()) {
                Ok(session_id) => {
                    if self.exists(&session_id).await? {
                        sessions.push(session_id);
                    }
                }
                Err(e) => warn!(dir = %name, error = %e, "Skipping foreign directory in auth dir"),
            }
        }

        sessions.sort();
        Ok(sessions)
    }
}

// ============================================================================
// Tests
// ============================================================================
