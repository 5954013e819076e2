//! Multi-session gateway service.
//!
//! [`Gateway`] is the surface an outer layer (HTTP, CLI, bot framework)
//! drives: it resolves sessions, restores paired sessions at start, answers
//! status and history queries, and deletes sessions with all their data.
//!
//! # Example
//!
//! ```no_run
//! use wa_gateway::{Gateway, SessionId};
//!
//! # async fn example() -> wa_gateway::Result<()> {
//! let gateway = Gateway::builder().bridge_url("ws://127.0.0.1:8085").build()?;
//! gateway.restore_all().await?;
//!
//! let id = SessionId::new("support")?;
//! let mut events = gateway.session(&id).subscribe();
//! gateway.connect(&id).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::persistence::{ContactRecord, MessageRecord, SessionRow, SessionStore};
use crate::session::{ConnectionManager, Diagnostics, SessionContext, SessionRegistry};
use crate::store::CredentialStore;
use crate::transport::Transport;

use super::builder::GatewayBuilder;
use super::options::GatewayOptions;

// ============================================================================
// Types
// ============================================================================

/// Live diagnostics of a session together with its persisted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub diagnostics: Diagnostics,
    /// `None` until the session has mirrored anything.
    pub row: Option<SessionRow>,
}

/// Internal shared state for the gateway.
pub(crate) struct GatewayInner {
    options: GatewayOptions,
    registry: SessionRegistry,
    credentials: Arc<dyn CredentialStore>,
    store: Arc<dyn SessionStore>,
}

// ============================================================================
// Gateway
// ============================================================================

/// Multi-session gateway.
///
/// Cloning is cheap; clones share the same registry and stores.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("auth_dir", &self.inner.options.auth_dir)
            .field("session_count", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Gateway - Public API
// ============================================================================

impl Gateway {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub(crate) fn new(
        options: GatewayOptions,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let context = SessionContext {
            transport,
            credentials: Arc::clone(&credentials),
            store: Arc::clone(&store),
            policy: options.reconnect,
            transport_config: options.transport.clone(),
        };

        Self {
            inner: Arc::new(GatewayInner {
                options,
                registry: SessionRegistry::new(context),
                credentials,
                store,
            }),
        }
    }

    /// Returns the gateway options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &GatewayOptions {
        &self.inner.options
    }

    /// Returns the manager for `session_id`, creating it if absent.
    #[inline]
    #[must_use]
    pub fn session(&self, session_id: &SessionId) -> ConnectionManager {
        self.inner.registry.resolve(session_id)
    }

    /// Returns every live manager in creation order.
    #[inline]
    #[must_use]
    pub fn sessions(&self) -> Vec<ConnectionManager> {
        self.inner.registry.list_all()
    }

    /// Connects a session, creating its manager if needed.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::connect`].
    pub async fn connect(&self, session_id: &SessionId) -> Result<()> {
        self.session(session_id).connect().await
    }

    /// Returns live diagnostics plus the persisted row.
    ///
    /// Never creates a manager; a session without one reports idle
    /// diagnostics.
    ///
    /// # Errors
    ///
    /// Returns the durable store's failure.
    pub async fn status(&self, session_id: &SessionId) -> Result<SessionReport> {
        let diagnostics = self.inner.registry.get(session_id).map_or_else(
            || Diagnostics::idle(session_id.clone()),
            |manager| manager.diagnostics(),
        );
        let row = self.inner.store.session(session_id).await?;
        Ok(SessionReport { diagnostics, row })
    }

    /// Reattaches a previously paired session.
    ///
    /// Returns at once if the session is already authenticated; otherwise
    /// reconciles its state, reconnecting from stored credentials.
    ///
    /// # Errors
    ///
    /// - [`Error::NoCredentials`] if nothing is stored for the session
    /// - [`Error::CredentialStore`] if the store cannot be read
    pub async fn restore(&self, session_id: &SessionId) -> Result<Diagnostics> {
        if !self.inner.credentials.exists(session_id).await? {
            return Err(Error::no_credentials(session_id.clone()));
        }

        let manager = self.session(session_id);
        if manager.is_authenticated() {
            debug!(session_id = %session_id, "Restore skipped: already authenticated");
        } else {
            manager.refresh_connection_state().await;
        }

        Ok(manager.diagnostics())
    }

    /// Restores every session with stored credentials.
    ///
    /// Meant for service start. Returns the sessions it attempted.
    ///
    /// # Errors
    ///
    /// Returns the credential store's failure to list sessions. Per-session
    /// failures are logged.
    pub async fn restore_all(&self) -> Result<Vec<SessionId>> {
        let session_ids = self.inner.credentials.list().await?;
        info!(count = session_ids.len(), "Restoring stored sessions");

        for session_id in &session_ids {
            if let Err(e) = self.restore(session_id).await {
                warn!(session_id = %session_id, error = %e, "Failed to restore session");
            }
        }

        Ok(session_ids)
    }

    /// Logs a session out and deletes it with all its data.
    ///
    /// # Errors
    ///
    /// Returns the durable store's or credential store's failure. The
    /// manager is evicted either way.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.inner.registry.remove(session_id).await;
        self.inner.store.delete_session(session_id).await?;
        self.inner.credentials.delete(session_id).await?;
        info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// Returns up to `limit` of a session's messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns the durable store's failure.
    pub async fn messages(&self, session_id: &SessionId, limit: usize) -> Result<Vec<MessageRecord>> {
        self.inner.store.messages(session_id, limit).await
    }

    /// Returns a session's mirrored contacts.
    ///
    /// # Errors
    ///
    /// Returns the durable store's failure.
    pub async fn contacts(&self, session_id: &SessionId) -> Result<Vec<ContactRecord>> {
        self.inner.store.contacts(session_id).await
    }

    /// Returns every persisted session row, most recently seen first.
    ///
    /// # Errors
    ///
    /// Returns the durable store's failure.
    pub async fn session_rows(&self) -> Result<Vec<SessionRow>> {
        self.inner.store.sessions().await
    }

    /// Closes every transport without logging out and clears the registry.
    ///
    /// Pairings survive, so [`restore_all`](Self::restore_all) can pick the
    /// sessions up after a restart.
    pub async fn shutdown(&self) {
        info!(count = self.inner.registry.len(), "Shutting down gateway");
        self.inner.registry.shutdown().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
