//! Session lifecycle.
//!
//! One [`ConnectionManager`] per session id, owned by a [`SessionRegistry`].
//! Managers drive the transport, apply the [`ReconnectPolicy`], and report
//! to an optional [`SessionObserver`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manager` | Per-session state machine |
//! | `observer` | Callback trait and channel adapter |
//! | `reconnect` | Close classification and retry budget |
//! | `registry` | Id to manager map |
//! | `state` | [`ConnectionState`] and [`Diagnostics`] |

// ============================================================================
// Submodules
// ============================================================================

/// Connection manager.
pub mod manager;

/// Session observers.
pub mod observer;

/// Reconnect policy.
pub mod reconnect;

/// Session registry.
pub mod registry;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use manager::{ConnectionManager, SessionContext};
pub use observer::{ChannelObserver, SessionEvent, SessionObserver};
pub use reconnect::{CloseClass, ReconnectDecision, ReconnectPolicy, TerminalReason};
pub use registry::SessionRegistry;
pub use state::{ConnectionState, Diagnostics};
