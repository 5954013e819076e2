//! Credential Store.
//!
//! Persists per-session authentication material in a filesystem-like key
//! space. The connection manager re-reads credentials on every connect
//! attempt and writes them back on every rotation event.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `credentials` | [`Credentials`] blob map and the [`CredentialStore`] trait |
//! | `file` | One directory per session, one file per entry |
//! | `memory` | Process-local store for tests and ephemeral deployments |

// ============================================================================
// Submodules
// ============================================================================

/// Credential blobs and the store contract.
pub mod credentials;

/// Directory-backed credential store.
pub mod file;

/// In-memory credential store.
pub mod memory;

// ============================================================================
// Re-exports
// ============================================================================

pub use credentials::{CredentialStore, Credentials};
pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
