//! Durable record types.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{Jid, SessionId};
use crate::protocol::WireMessage;

// ============================================================================
// SessionStatus
// ============================================================================

/// Session status as exposed to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No live connection.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Authenticated and ready.
    Connected,
    /// Setup failed or the stream broke.
    Error,
}

impl SessionStatus {
    /// Returns the lowercase wire name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SessionRow
// ============================================================================

/// Persisted session status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Mirrors `status == Connected`.
    pub is_connected: bool,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionRow {
    /// Creates a row first seen at `now`.
    #[must_use]
    pub fn new(session_id: SessionId, status: SessionStatus, now: DateTime<Utc>) -> Self {
        Self {
            session_id,
            status,
            is_connected: status == SessionStatus::Connected,
            last_seen: now,
            created_at: now,
        }
    }

    /// Applies a status change observed at `now`.
    pub fn set_status(&mut self, status: SessionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.is_connected = status == SessionStatus::Connected;
        self.last_seen = now;
    }
}

// ============================================================================
// MessageRecord
// ============================================================================

/// One observed or sent message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Protocol message id, empty when the protocol gave none.
    pub message_id: String,
    pub session_id: SessionId,
    /// Chat the message belongs to, empty when unknown.
    pub remote_jid: String,
    /// Protocol content key, `unknown` when absent.
    pub message_type: String,
    /// Text summary.
    pub content: String,
    pub is_from_me: bool,
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
}

impl MessageRecord {
    /// Derives a record from a protocol message.
    ///
    /// `from_me` is the direction the caller observed, not the key's flag:
    /// inbound upserts are recorded as received even for echoes of our own
    /// sends.
    #[must_use]
    pub fn from_wire(session_id: SessionId, message: &WireMessage, from_me: bool) -> Self {
        Self {
            message_id: message
                .key
                .id
                .as_ref()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
            session_id,
            remote_jid: message
                .key
                .remote_jid
                .as_ref()
                .map(|jid| jid.as_str().to_string())
                .unwrap_or_default(),
            message_type: message.content_type().to_string(),
            content: message.summary(),
            is_from_me: from_me,
            is_group: message.is_group(),
            timestamp: message.timestamp(),
        }
    }
}

// ============================================================================
// ContactRecord
// ============================================================================

/// Contact keyed by `(session_id, jid)`. Last writer wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub session_id: SessionId,
    pub jid: Jid,
    pub name: Option<String>,
    pub push_name: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
