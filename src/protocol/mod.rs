//! Protocol message types.
//!
//! Transport-neutral events and payloads, plus the frames exchanged with
//! the protocol bridge.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Gateway → Bridge | Command request |
//! | `Response` | Bridge → Gateway | Command response |
//! | `Event` | Bridge → Gateway | Session notification |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Bridge command definitions |
//! | `event` | Transport events and the bridge event frame |
//! | `message` | Messages, contacts, groups, outbound payloads |
//! | `request` | Request and Response frames |

// ============================================================================
// Submodules
// ============================================================================

/// Bridge command definitions.
pub mod command;

/// Transport events.
pub mod event;

/// Message, contact and group payloads.
pub mod message;

/// Request and Response frames.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::Command;
pub use event::{
    ConnectionUpdate, DisconnectInfo, DisconnectReason, Event, TransportEvent, UpsertKind,
    WireConnection,
};
pub use message::{
    Contact, ExtendedText, GroupMetadata, GroupParticipant, MediaContent, MediaKind,
    MessageContent, MessageKey, MessagePayload, WireMessage,
};
pub use request::{Request, Response, ResponseType};
