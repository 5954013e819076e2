//! Transport layer.
//!
//! The connection manager drives the protocol through two capability
//! traits and never sees wire mechanics:
//!
//! - [`Transport`] opens a socket for one session and hands back a
//!   [`TransportHandle`] plus the ordered event stream.
//! - [`TransportHandle`] is the live socket: identity, send, groups,
//!   logout, shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐                        ┌──────────────────┐
//! │ ConnectionManager  │                        │  Protocol bridge │
//! │                    │        WebSocket       │  (owns crypto)   │
//! │  BridgeTransport   │◄──────────────────────►│                  │
//! │  → Connection      │   JSON request/event   │                  │
//! └────────────────────┘                        └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bridge` | [`Transport`] over a WebSocket protocol bridge |
//! | `config` | [`TransportConfig`] socket options |
//! | `connection` | WebSocket connection and event loop |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::identifiers::{Jid, SessionId};
use crate::protocol::{GroupMetadata, MessagePayload, TransportEvent, WireMessage};
use crate::store::Credentials;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket bridge transport.
pub mod bridge;

/// Socket configuration.
pub mod config;

/// WebSocket connection and event loop.
pub mod connection;

/// Scriptable transport for tests.
#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::{BridgeHandle, BridgeTransport};
pub use config::TransportConfig;
pub use connection::{Connection, EventHandler};

// ============================================================================
// Types
// ============================================================================

/// Ordered stream of events for one transport handle.
///
/// The stream ends when the underlying socket is gone.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// A freshly opened transport socket.
pub struct TransportSession {
    /// Live socket handle.
    pub handle: Arc<dyn TransportHandle>,
    /// Events emitted by the socket, in order.
    pub events: EventReceiver,
}

// ============================================================================
// Traits
// ============================================================================

/// Opens protocol sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a socket for `session_id` using `credentials`.
    ///
    /// Empty credentials start a fresh pairing; the socket then emits
    /// pairing codes through its event stream.
    async fn connect(
        &self,
        session_id: &SessionId,
        credentials: Credentials,
        config: &TransportConfig,
    ) -> Result<TransportSession>;
}

/// A live protocol socket.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Identity the socket resolved after authentication.
    fn user(&self) -> Option<Jid>;

    /// Sends a message and returns the protocol's record of it.
    async fn send(&self, jid: &Jid, payload: &MessagePayload) -> Result<WireMessage>;

    /// Lists participating groups.
    async fn groups(&self) -> Result<Vec<GroupMetadata>>;

    /// Creates a group.
    async fn create_group(&self, subject: &str, participants: &[Jid]) -> Result<GroupMetadata>;

    /// Unlinks the device and closes the socket.
    async fn logout(&self) -> Result<()>;

    /// Closes the socket without unlinking.
    fn shutdown(&self);
}
