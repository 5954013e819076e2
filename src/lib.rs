//! Multi-session gateway for a multi-device messaging protocol.
//!
//! Each session is one linked device. The gateway pairs it by relaying QR
//! codes, keeps its socket alive across transient failures, mirrors its
//! traffic into a durable store, and exposes send operations gated on
//! authentication.
//!
//! # Architecture
//!
//! ```text
//! Gateway ──► SessionRegistry ──► ConnectionManager (one per session)
//!                                   │        │         │
//!                                   ▼        ▼         ▼
//!                            Transport  CredentialStore  Mirror → SessionStore
//! ```
//!
//! Key design principles:
//!
//! - At most one [`ConnectionManager`] per [`SessionId`], created lazily
//! - The protocol itself lives behind [`Transport`]; the bundled
//!   [`BridgeTransport`] talks JSON over WebSocket to a bridge process
//! - Persistence is best-effort and never changes connection state
//! - Every retry carries an epoch, so a torn-down session stays down
//!
//! # Quick Start
//!
//! ```no_run
//! use wa_gateway::{Gateway, Jid, Result, SessionEvent, SessionId};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let gateway = Gateway::builder()
//!         .bridge_url("ws://127.0.0.1:8085")
//!         .auth_dir("./auth_sessions")
//!         .build()?;
//!
//!     let id = SessionId::new("sales")?;
//!     let manager = gateway.session(&id);
//!     let mut events = manager.subscribe();
//!     manager.connect().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::QrCode(code) => println!("scan: {code}"),
//!             SessionEvent::ConnectionUpdate(_) if manager.is_authenticated() => {
//!                 manager.send_text(&Jid::user("15550001111"), "online").await?;
//!             }
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`gateway`] | [`Gateway`] service, builder and options |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`persistence`] | Durable store contract and [`Mirror`] |
//! | [`protocol`] | Events, messages and bridge frames |
//! | [`session`] | [`ConnectionManager`], [`SessionRegistry`], reconnect policy |
//! | [`store`] | Credential storage |
//! | [`transport`] | Transport traits and the WebSocket bridge |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Gateway service.
pub mod gateway;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing session ids, JIDs and message ids.
pub mod identifiers;

/// Persistence mirror.
pub mod persistence;

/// Protocol events, messages and bridge frames.
pub mod protocol;

/// Session lifecycle: managers, registry, reconnect policy.
pub mod session;

/// Credential storage.
pub mod store;

/// Transport layer.
///
/// Capability traits plus the WebSocket bridge adapter.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Gateway types
pub use gateway::{Gateway, GatewayBuilder, GatewayOptions, SessionReport};

// Identifier types
pub use identifiers::{Jid, MessageId, RequestId, SessionId};

// Persistence types
pub use persistence::{
    ContactRecord, MemoryStore, MessageRecord, Mirror, SessionRow, SessionStatus, SessionStore,
};

// Protocol types
pub use protocol::{
    Contact, ConnectionUpdate, DisconnectInfo, DisconnectReason, GroupMetadata, MediaKind,
    MessagePayload, TransportEvent, UpsertKind, WireMessage,
};

// Session types
pub use session::{
    ChannelObserver, CloseClass, ConnectionManager, ConnectionState, Diagnostics,
    ReconnectDecision, ReconnectPolicy, SessionContext, SessionEvent, SessionObserver,
    SessionRegistry, TerminalReason,
};

// Credential types
pub use store::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore};

// Transport types
pub use transport::{
    BridgeTransport, EventReceiver, Transport, TransportConfig, TransportHandle, TransportSession,
};
