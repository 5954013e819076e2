//! Connection state and diagnostics.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

use crate::identifiers::{Jid, SessionId};
use crate::persistence::SessionStatus;
use crate::protocol::DisconnectInfo;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of one session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No handle and nothing scheduled.
    #[default]
    Disconnected,
    /// A connect is in flight or the handshake is running.
    Connecting,
    /// Authenticated and ready.
    Open,
    /// Closed by the transport; a retry may be pending.
    Closing,
    /// Setup failed.
    Error,
}

impl ConnectionState {
    /// Returns the lowercase name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Error => "error",
        }
    }

    /// Returns the persisted status closest to this state.
    #[inline]
    #[must_use]
    pub const fn status(self) -> SessionStatus {
        match self {
            Self::Disconnected | Self::Closing => SessionStatus::Disconnected,
            Self::Connecting => SessionStatus::Connecting,
            Self::Open => SessionStatus::Connected,
            Self::Error => SessionStatus::Error,
        }
    }

    /// Returns `true` for [`Connecting`](Self::Connecting) and [`Open`](Self::Open).
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Point-in-time view of a manager, for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub session_id: SessionId,
    pub state: ConnectionState,
    pub is_authenticated: bool,
    pub is_connecting: bool,
    pub reconnect_attempts: u32,
    /// Identity reported by the live handle.
    pub user: Option<Jid>,
    /// Cause of the most recent transport close.
    pub last_disconnect: Option<DisconnectInfo>,
}

impl Diagnostics {
    /// Snapshot for a session that has no manager.
    #[must_use]
    pub fn idle(session_id: SessionId) -> Self {
        Self {
            session_id,
            state: ConnectionState::Disconnected,
            is_authenticated: false,
            is_connecting: false,
            reconnect_attempts: 0,
            user: None,
            last_disconnect: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_diagnostics() {
        let diagnostics = Diagnostics::idle(SessionId::new("s1").expect("valid id"));
        assert_eq!(diagnostics.state, ConnectionState::Disconnected);
        assert!(!diagnostics.is_authenticated);
        assert_eq!(diagnostics.reconnect_attempts, 0);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ConnectionState::Open.status(), SessionStatus::Connected);
        assert_eq!(ConnectionState::Closing.status(), SessionStatus::Disconnected);
        assert_eq!(ConnectionState::Error.status(), SessionStatus::Error);
    }

    #[test]
    fn test_diagnostics_shape() {
        let diagnostics = Diagnostics {
            session_id: SessionId::new("diag").expect("valid id"),
            state: ConnectionState::Connecting,
            is_authenticated: false,
            is_connecting: true,
            reconnect_attempts: 2,
            user: None,
            last_disconnect: None,
        };

        let value = serde_json::to_value(&diagnostics).expect("serialize");
        assert_eq!(value["sessionId"], "diag");
        assert_eq!(value["state"], "connecting");
        assert_eq!(value["reconnectAttempts"], 2);
    }
}
