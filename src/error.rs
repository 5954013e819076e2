//! Error types for the gateway.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wa_gateway::{Result, Error};
//!
//! async fn example(manager: &ConnectionManager) -> Result<()> {
//!     manager.connect().await?;
//!     manager.send_text(&jid, "hello").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidSessionId`], [`Error::InvalidJid`] |
//! | Session | [`Error::SessionRemoved`], [`Error::NoCredentials`] |
//! | Credentials | [`Error::CredentialStore`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Send | [`Error::NotConnected`], [`Error::StreamErrored`], [`Error::Transport`] |
//! | Protocol | [`Error::Protocol`], [`Error::RequestTimeout`] |
//! | Persistence | [`Error::Persistence`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Constants
// ============================================================================

/// Message fragment the protocol layer uses for a broken stream.
const STREAM_ERROR_SIGNATURE: &str = "stream errored out";

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when gateway configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Session identifier rejected.
    #[error("Invalid session id: {message}")]
    InvalidSessionId {
        /// Why the identifier was rejected.
        message: String,
    },

    /// JID rejected.
    #[error("Invalid JID: {jid}")]
    InvalidJid {
        /// The rejected JID.
        jid: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Manager was removed from the registry.
    ///
    /// Returned when a handle outlives its registry entry.
    #[error("Session removed: {session_id}")]
    SessionRemoved {
        /// The removed session.
        session_id: SessionId,
    },

    /// No stored credentials for a session.
    #[error("No credentials stored for session: {session_id}")]
    NoCredentials {
        /// The session without credentials.
        session_id: SessionId,
    },

    // ========================================================================
    // Credential Errors
    // ========================================================================
    /// Credential store failure.
    ///
    /// Returned when loading, saving or deleting credentials fails.
    #[error("Credential store error for {session_id}: {message}")]
    CredentialStore {
        /// Session whose credentials were being accessed.
        session_id: SessionId,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport connection failed.
    ///
    /// Returned when the transport cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Transport connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Send Errors
    // ========================================================================
    /// Session is not authenticated.
    ///
    /// Returned by send operations unless the session is open with a
    /// resolved identity.
    #[error("Session {session_id} is not connected")]
    NotConnected {
        /// The session that rejected the send.
        session_id: SessionId,
    },

    /// Transport stream broke during an operation.
    #[error("Stream errored out: {message}")]
    StreamErrored {
        /// Description reported by the transport.
        message: String,
    },

    /// Transport rejected an operation.
    #[error("Transport error: {message}")]
    Transport {
        /// Description reported by the transport.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected frame.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Bridge request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// Durable store failure.
    #[error("Persistence error: {message}")]
    Persistence {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// A reply channel was dropped before it answered.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Creates an invalid session id error.
    #[inline]
    pub fn invalid_session_id(message: impl Into<String>) -> Self {
        Self::InvalidSessionId { message: message.into() }
    }

    /// Creates an invalid JID error.
    #[inline]
    pub fn invalid_jid(jid: impl Into<String>) -> Self {
        Self::InvalidJid { jid: jid.into() }
    }

    /// Creates a session removed error.
    #[inline]
    pub fn session_removed(session_id: SessionId) -> Self {
        Self::SessionRemoved { session_id }
    }

    /// Creates a missing credentials error.
    #[inline]
    pub fn no_credentials(session_id: SessionId) -> Self {
        Self::NoCredentials { session_id }
    }

    /// Creates a credential store error for `session_id`.
    #[inline]
    pub fn credential_store(session_id: SessionId, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::CredentialStore { session_id, message }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not connected error.
    #[inline]
    pub fn not_connected(session_id: SessionId) -> Self {
        Self::NotConnected { session_id }
    }

    /// Creates a stream error. The session holding the stream is torn down.
    #[inline]
    pub fn stream_errored(message: impl Into<String>) -> Self {
        Self::StreamErrored { message: message.into() }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout { request_id, timeout_ms }
    }

    /// Creates a persistence error.
    #[inline]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence { message: message.into() }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the transport stream can no longer be trusted.
    ///
    /// Matches [`Error::StreamErrored`] and any transport, connection or
    /// protocol error whose message carries the stream failure signature.
    #[must_use]
    pub fn is_stream_error(&self) -> bool {
        match self {
            Self::StreamErrored { .. } | Self::ConnectionClosed => true,
            Self::Transport { message }
            | Self::Connection { message }
            | Self::Protocol { message } => message.contains(STREAM_ERROR_SIGNATURE),
            Self::WebSocket(e) => e.to_string().contains(STREAM_ERROR_SIGNATURE),
            _ => false,
        }
    }

    /// Returns `true` if this error happened before a transport handle
    /// existed.
    #[inline]
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::CredentialStore { .. }
                | Self::Config { .. }
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::Io(_)
        )
    }

    /// Returns `true` if retrying the same operation may succeed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::RequestTimeout { .. }
                | Self::NotConnected { .. }
                | Self::ChannelClosed(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    fn session() -> SessionId {
        SessionId::new("alpha").expect("valid session id")
    }

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_not_connected_display() {
        let err = Error::not_connected(session());
        assert_eq!(err.to_string(), "Session alpha is not connected");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 5000 };
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_stream_error() {
        assert!(Error::stream_errored("boom").is_stream_error());
        assert!(Error::transport("Connection Failure: stream errored out").is_stream_error());
        assert!(Error::ConnectionClosed.is_stream_error());
        assert!(!Error::transport("item-not-found").is_stream_error());
        assert!(!Error::not_connected(session()).is_stream_error());
    }



    #[test]
    fn test_setup_and_recoverable_classes() {
        assert!(Error::credential_store(session(), "disk full").is_setup_error());
        assert!(!Error::stream_errored("x").is_setup_error());
        assert!(Error::not_connected(session()).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_request_timeout_is_timeout() {
        let err = Error::request_timeout(RequestId::generate(), 30_000);
        assert!(err.is_timeout());
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
