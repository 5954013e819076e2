//! Glue between a connection manager and the durable store.
//!
//! Every method is fire-and-forget: failures are logged and swallowed so
//! a broken store never alters connection state or aborts event handling.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, trace};

use crate::identifiers::SessionId;
use crate::protocol::{Contact, WireMessage};

use super::SessionStore;
use super::records::{MessageRecord, SessionStatus};

// ============================================================================
// Mirror
// ============================================================================

/// Writes one session's status, messages and contacts to a [`SessionStore`].
#[derive(Clone)]
pub struct Mirror {
    session_id: SessionId,
    store: Arc<dyn SessionStore>,
}

impl Mirror {
    /// Creates a mirror for `session_id`.
    #[must_use]
    pub fn new(session_id: SessionId, store: Arc<dyn SessionStore>) -> Self {
        Self { session_id, store }
    }

    /// Returns the underlying store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Persists a status transition.
    pub async fn record_status(&self, status: SessionStatus) {
        match self
            .store
            .upsert_session_status(&self.session_id, status, Utc::now())
            .await
        {
            Ok(()) => trace!(session_id = %self.session_id, %status, "Status mirrored"),
            Err(e) => error!(
                session_id = %self.session_id,
                %status,
                error = %e,
                "Failed to mirror session status"
            ),
        }
    }

    /// Persists one message observed in direction `from_me`.
    pub async fn record_message(&self, message: &WireMessage, from_me: bool) {
        if !self.ensure_row().await {
            return;
        }

        let record = MessageRecord::from_wire(self.session_id.clone(), message, from_me);
        let message_id = record.message_id.clone();

        if let Err(e) = self.store.create_message_record(record).await {
            error!(
                session_id = %self.session_id,
                message_id = %message_id,
                error = %e,
                "Failed to mirror message"
            );
        }
    }

    /// Upserts every delivered contact. One failure does not stop the pass.
    pub async fn record_contacts(&self, contacts: &[Contact]) {
        if contacts.is_empty() || !self.ensure_row().await {
            return;
        }

        let mut failed = 0_usize;
        for contact in contacts {
            if let Err(e) = self
                .store
                .upsert_contact_record(
                    &self.session_id,
                    &contact.id,
                    contact.name.as_deref(),
                    contact.notify.as_deref(),
                )
                .await
            {
                failed += 1;
                error!(
                    session_id = %self.session_id,
                    jid = %contact.id,
                    error = %e,
                    "Failed to mirror contact"
                );
            }
        }

        trace!(
            session_id = %self.session_id,
            total = contacts.len(),
            failed,
            "Contacts mirrored"
        );
    }

    async fn ensure_row(&self) -> bool {
        match self.store.ensure_session_row(&self.session_id).await {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = %self.session_id, error = %e, "Failed to ensure session row");
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
