//! Builder for [`Gateway`] instances.
//!
//! # Example
//!
//! ```no_run
//! use wa_gateway::Gateway;
//!
//! # fn example() -> wa_gateway::Result<()> {
//! let gateway = Gateway::builder()
//!     .bridge_url("ws://127.0.0.1:8085")
//!     .auth_dir("./auth_sessions")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::persistence::{MemoryStore, SessionStore};
use crate::session::ReconnectPolicy;
use crate::store::{CredentialStore, FileCredentialStore};
use crate::transport::{BridgeTransport, Transport, TransportConfig};

use super::core::Gateway;
use super::options::GatewayOptions;

// ============================================================================
// GatewayBuilder
// ============================================================================

/// Builder for configuring a [`Gateway`].
///
/// Use [`Gateway::builder()`] to create one.
#[derive(Default, Clone)]
pub struct GatewayBuilder {
    options: GatewayOptions,
    transport: Option<Arc<dyn Transport>>,
    bridge_url: Option<String>,
    credentials: Option<Arc<dyn CredentialStore>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("options", &self.options)
            .field("has_transport", &self.transport.is_some())
            .field("bridge_url", &self.bridge_url)
            .field("has_credentials", &self.credentials.is_some())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

// ============================================================================
// GatewayBuilder Implementation
// ============================================================================

impl GatewayBuilder {
    /// Creates a builder with default options and no transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: GatewayOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the root of the default file credential store.
    #[inline]
    #[must_use]
    pub fn auth_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.auth_dir = dir.into();
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.options.reconnect = policy;
        self
    }

    /// Sets the socket options handed to the transport.
    #[inline]
    #[must_use]
    pub fn transport_config(mut self, config: TransportConfig) -> Self {
        self.options.transport = config;
        self
    }

    /// Uses a custom transport.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Uses a WebSocket protocol bridge at `url`.
    ///
    /// Ignored when [`transport`](Self::transport) is also set.
    #[inline]
    #[must_use]
    pub fn bridge_url(mut self, url: impl Into<String>) -> Self {
        self.bridge_url = Some(url.into());
        self
    }

    /// Uses a custom credential store instead of the file store.
    #[inline]
    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Uses a custom durable store instead of the in-memory one.
    #[inline]
    #[must_use]
    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the gateway with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no transport or bridge URL is set
    /// - [`Error::Config`] if the bridge URL or options are invalid
    pub fn build(self) -> Result<Gateway> {
        self.options.validate()?;
        let transport = self.validate_transport()?;

        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(FileCredentialStore::new(self.options.auth_dir.clone()))
        });
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        Ok(Gateway::new(self.options, transport, credentials, store))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl GatewayBuilder {
    /// Resolves the transport from an explicit one or the bridge URL.
    fn validate_transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }

        let url = self.bridge_url.as_deref().ok_or_else(|| {
            Error::config(
                "A transport is required. Use .bridge_url() or .transport() to set it.\n\
                 Example: Gateway::builder().bridge_url(\"ws://127.0.0.1:8085\")",
            )
        })?;

        Ok(Arc::new(BridgeTransport::parse(url)?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::mock::MockTransport;

    #[test]
    fn test_build_fails_without_transport() {
        let err = GatewayBuilder::new().build().expect_err("no transport");
        assert!(err.to_string().contains("transport"));
    }

    #[test]
    fn test_build_fails_with_invalid_bridge_url() {
        let result = GatewayBuilder::new().bridge_url("http://localhost:1").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_with_bridge_url() {
        let gateway = GatewayBuilder::new()
            .bridge_url("ws://127.0.0.1:8085")
            .auth_dir("/tmp/wa-auth")
            .build()
            .expect("build");

        assert_eq!(gateway.options().auth_dir, PathBuf::from("/tmp/wa-auth"));
    }

    #[test]
    fn test_build_validates_options() {
        let result = GatewayBuilder::new()
            .transport(MockTransport::new())
            .auth_dir("")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_transport_wins() {
        let transport = MockTransport::new();
        let gateway = GatewayBuilder::new()
            .transport(transport)
            .bridge_url("not a url")
            .build();
        assert!(gateway.is_ok());
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = GatewayBuilder::new().auth_dir("/a");
        let cloned = builder.clone();
        assert_eq!(builder.options, cloned.options);
    }
}
