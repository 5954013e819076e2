//! Gateway service.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Gateway`] | Session registry plus stores behind one handle |
//! | [`GatewayBuilder`] | Fluent configuration builder |
//! | [`GatewayOptions`] | Serializable settings |
//! | [`SessionReport`] | Diagnostics with the persisted row |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for gateway configuration.
pub mod builder;

/// Core gateway implementation.
pub mod core;

/// Gateway settings.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::GatewayBuilder;
pub use core::{Gateway, SessionReport};
pub use options::GatewayOptions;
