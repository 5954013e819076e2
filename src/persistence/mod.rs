//! Persistence Mirror.
//!
//! The durable store is an external collaborator; the gateway only needs
//! the operations in [`SessionStore`]. [`Mirror`] is the per-session glue
//! the connection manager calls, and [`MemoryStore`] is the default
//! implementation.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `records` | Session rows, message and contact records |
//! | `memory` | In-memory [`SessionStore`] with cascading deletes |
//! | `mirror` | Fire-and-forget writes for one session |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::identifiers::{Jid, SessionId};

// ============================================================================
// Submodules
// ============================================================================

/// Store that fails every call.
#[cfg(test)]
pub(crate) mod failing;

/// In-memory store.
pub mod memory;

/// Per-session write glue.
pub mod mirror;

/// Durable record types.
pub mod records;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryStore;
pub use mirror::Mirror;
pub use records::{ContactRecord, MessageRecord, SessionRow, SessionStatus};

// ============================================================================
// SessionStore
// ============================================================================

/// Operations the gateway performs on the durable store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates or updates the status row.
    async fn upsert_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        last_seen: DateTime<Utc>,
    ) -> Result<()>;

    /// Makes sure a row exists so message and contact writes can reference
    /// it. Creates it as connected when missing, otherwise bumps
    /// `last_seen` only.
    async fn ensure_session_row(&self, session_id: &SessionId) -> Result<()>;

    /// Stores one message record.
    async fn create_message_record(&self, record: MessageRecord) -> Result<()>;

    /// Inserts or updates the contact keyed by `(session_id, jid)`.
    ///
    /// A `None` field leaves the stored value unchanged.
    async fn upsert_contact_record(
        &self,
        session_id: &SessionId,
        jid: &Jid,
        name: Option<&str>,
        push_name: Option<&str>,
    ) -> Result<()>;

    /// Returns the status row for a session.
    async fn session(&self, session_id: &SessionId) -> Result<Option<SessionRow>>;

    /// Returns every status row, most recently seen first.
    async fn sessions(&self) -> Result<Vec<SessionRow>>;

    /// Returns up to `limit` messages, newest first.
    async fn messages(&self, session_id: &SessionId, limit: usize) -> Result<Vec<MessageRecord>>;

    /// Returns the stored contacts of a session.
    async fn contacts(&self, session_id: &SessionId) -> Result<Vec<ContactRecord>>;

    /// Deletes the row together with its messages and contacts.
    async fn delete_session(&self, session_id: &SessionId) -> Result<()>;
}
