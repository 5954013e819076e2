//! Transport events.
//!
//! Events are notifications a transport emits for one session, delivered
//! to the connection manager in emission order.
//!
//! # Event Types
//!
//! | Bridge method | Event |
//! |---------------|-------|
//! | `connection.update` | [`TransportEvent::ConnectionUpdate`] |
//! | `messages.upsert` | [`TransportEvent::MessagesUpsert`] |
//! | `contacts.upsert`, `contacts.update` | [`TransportEvent::ContactsUpsert`] |
//! | `messaging-history.set` | [`TransportEvent::HistorySync`] |
//! | `creds.update` | [`TransportEvent::CredentialsUpdate`] |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::Jid;
use crate::store::Credentials;

use super::message::{Contact, WireMessage};

// ============================================================================
// DisconnectReason
// ============================================================================

/// Protocol close status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// 401: device unlinked or credentials revoked.
    LoggedOut,
    /// 403: account banned from the linked-device feature.
    Forbidden,
    /// 408: connection lost or timed out.
    ConnectionLost,
    /// 411: multi-device protocol mismatch.
    MultideviceMismatch,
    /// 428: connection closed by the server.
    ConnectionClosed,
    /// 440: another client took over the session.
    ConnectionReplaced,
    /// 500: corrupted session state.
    BadSession,
    /// 503: service temporarily unavailable.
    UnavailableService,
    /// 515: server requested a restart after pairing.
    RestartRequired,
}

impl DisconnectReason {
    /// Maps a status code to a known reason.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            401 => Some(Self::LoggedOut),
            403 => Some(Self::Forbidden),
            408 => Some(Self::ConnectionLost),
            411 => Some(Self::MultideviceMismatch),
            428 => Some(Self::ConnectionClosed),
            440 => Some(Self::ConnectionReplaced),
            500 => Some(Self::BadSession),
            503 => Some(Self::UnavailableService),
            515 => Some(Self::RestartRequired),
            _ => None,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::LoggedOut => 401,
            Self::Forbidden => 403,
            Self::ConnectionLost => 408,
            Self::MultideviceMismatch => 411,
            Self::ConnectionClosed => 428,
            Self::ConnectionReplaced => 440,
            Self::BadSession => 500,
            Self::UnavailableService => 503,
            Self::RestartRequired => 515,
        }
    }
}

// ============================================================================
// DisconnectInfo
// ============================================================================

/// Why a transport connection closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectInfo {
    /// Protocol status code, if the close carried one.
    #[serde(default)]
    pub status_code: Option<u16>,

    /// Error message reported with the close.
    #[serde(default)]
    pub message: String,
}

impl DisconnectInfo {
    /// Creates close info with a status code.
    #[must_use]
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// Creates close info for an authoritative logout.
    #[must_use]
    pub fn logged_out() -> Self {
        Self::new(Some(DisconnectReason::LoggedOut.code()), "Connection Failure")
    }

    /// Returns the decoded reason.
    #[inline]
    #[must_use]
    pub fn reason(&self) -> Option<DisconnectReason> {
        self.status_code.and_then(DisconnectReason::from_code)
    }

    /// Returns `true` for an authoritative logout.
    #[inline]
    #[must_use]
    pub fn is_logged_out(&self) -> bool {
        self.reason() == Some(DisconnectReason::LoggedOut)
    }
}

// ============================================================================
// ConnectionUpdate
// ============================================================================

/// Connection phase reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireConnection {
    /// Handshake in progress.
    Connecting,
    /// Authenticated and ready.
    Open,
    /// Socket closed.
    Close,
}

/// A `connection-state-changed` notification.
///
/// Any combination of fields may be present; a pairing code usually
/// arrives without a connection phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
    /// New connection phase.
    #[serde(default)]
    pub connection: Option<WireConnection>,

    /// Close details when `connection` is `close`.
    #[serde(default)]
    pub last_disconnect: Option<DisconnectInfo>,

    /// Pairing code to render as QR.
    #[serde(default)]
    pub qr: Option<String>,

    /// Set on the first open after a fresh pairing.
    #[serde(default)]
    pub is_new_login: Option<bool>,

    /// Identity the transport resolved, if it reports one.
    #[serde(default)]
    pub me: Option<Jid>,
}

impl ConnectionUpdate {
    /// Creates an update carrying only a connection phase.
    #[must_use]
    pub fn phase(connection: WireConnection) -> Self {
        Self {
            connection: Some(connection),
            ..Default::default()
        }
    }

    /// Creates a close update.
    #[must_use]
    pub fn closed(info: DisconnectInfo) -> Self {
        Self {
            connection: Some(WireConnection::Close),
            last_disconnect: Some(info),
            ..Default::default()
        }
    }

    /// Creates a pairing-code update.
    #[must_use]
    pub fn qr(code: impl Into<String>) -> Self {
        Self {
            qr: Some(code.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Kind of a message upsert batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    /// New messages that should notify.
    Notify,
    /// Back-filled messages.
    Append,
}

/// An event emitted by a transport for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection phase, pairing code or close.
    ConnectionUpdate(ConnectionUpdate),

    /// Inbound messages.
    MessagesUpsert {
        /// The messages, in protocol order.
        messages: Vec<WireMessage>,
        /// Whether the batch is new traffic or back-fill.
        kind: UpsertKind,
    },

    /// Incremental contact data. Entries from `contacts.update` may carry
    /// only some fields; consumers merge them into what they know.
    ContactsUpsert(Vec<Contact>),

    /// Bulk history sync after (re)connection.
    HistorySync {
        /// Contacts delivered by the sync.
        contacts: Vec<Contact>,
        /// Messages delivered by the sync.
        messages: Vec<WireMessage>,
        /// `true` on the final chunk.
        is_latest: bool,
    },

    /// Rotated credential entries to persist.
    CredentialsUpdate(Credentials),
}

impl TransportEvent {
    /// Returns a short name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionUpdate(_) => "connection.update",
            Self::MessagesUpsert { .. } => "messages.upsert",
            Self::ContactsUpsert(_) => "contacts.upsert",
            Self::HistorySync { .. } => "messaging-history.set",
            Self::CredentialsUpdate(_) => "creds.update",
        }
    }
}

// ============================================================================
// Bridge Event Frame
// ============================================================================

/// An event frame from the protocol bridge.
///
/// # Format
///
/// ```json
/// {
///   "type": "event",
///   "method": "messages.upsert",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

/// `messages.upsert` params.
#[derive(Deserialize)]
struct MessagesUpsertParams {
    messages: Vec<WireMessage>,
    #[serde(rename = "type")]
    kind: UpsertKind,
}

/// `messaging-history.set` params.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistorySetParams {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<WireMessage>,
    #[serde(default)]
    is_latest: bool,
}

impl Event {
    /// Parses the frame into a typed event.
    ///
    /// Returns `Ok(None)` for events the gateway does not consume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] or [`Error::Protocol`] if the params do not
    /// match the method.
    pub fn parse(self) -> Result<Option<TransportEvent>> {
        if self.event_type != "event" {
            return Err(Error::protocol(format!(
                "expected event frame, got type {:?}",
                self.event_type
            )));
        }

        let event = match self.method.as_str() {
            "connection.update" => {
                TransportEvent::ConnectionUpdate(serde_json::from_value(self.params)?)
            }
            "messages.upsert" => {
                let params: MessagesUpsertParams = serde_json::from_value(self.params)?;
                TransportEvent::MessagesUpsert {
                    messages: params.messages,
                    kind: params.kind,
                }
            }
            "contacts.upsert" | "contacts.update" => {
                TransportEvent::ContactsUpsert(serde_json::from_value(self.params)?)
            }
            "messaging-history.set" => {
                let params: HistorySetParams = serde_json::from_value(self.params)?;
                TransportEvent::HistorySync {
                    contacts: params.contacts,
                    messages: params.messages,
                    is_latest: params.is_latest,
                }
            }
            "creds.update" => TransportEvent::CredentialsUpdate(Credentials::from_wire(&self.params)?),
            other => {
                trace!(method = other, "Ignoring bridge event");
                return Ok(None);
            }
        };

        Ok(Some(event))
    }
}

// ============================================================================
// Tests
// ============================================================================
