//! Gateway configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wa_gateway::{GatewayOptions, ReconnectPolicy};
//!
//! let options = GatewayOptions::new()
//!     .with_auth_dir("/var/lib/gateway/auth")
//!     .with_reconnect(ReconnectPolicy::default().with_max_attempts(3));
//! ```
//!
//! The same options load from JSON; omitted fields keep their defaults:
//!
//! ```json
//! { "authDir": "auth", "reconnect": { "maxAttempts": 3 } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::ReconnectPolicy;
use crate::transport::TransportConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default root of the file credential store.
const DEFAULT_AUTH_DIR: &str = "auth_sessions";

// ============================================================================
// GatewayOptions
// ============================================================================

/// Gateway-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayOptions {
    /// Root directory of the file credential store.
    pub auth_dir: PathBuf,

    /// Retry budget and backoffs for every session.
    pub reconnect: ReconnectPolicy,

    /// Socket options handed to the transport on every connect.
    pub transport: TransportConfig,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            auth_dir: PathBuf::from(DEFAULT_AUTH_DIR),
            reconnect: ReconnectPolicy::default(),
            transport: TransportConfig::default(),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl GatewayOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads options from a JSON file.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Json`] if it is not valid options JSON
    /// - [`Error::Config`] if the values fail validation
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let options: Self = serde_json::from_str(&raw)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl GatewayOptions {
    /// Sets the credential store root.
    #[inline]
    #[must_use]
    pub fn with_auth_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.auth_dir = dir.into();
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Sets the transport configuration.
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl GatewayOptions {
    /// Checks the options for values no session could run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.auth_dir.as_os_str().is_empty() {
            return Err(Error::config(
                "authDir must not be empty. Use .with_auth_dir() to set it.\n\
                 Example: GatewayOptions::new().with_auth_dir(\"auth_sessions\")",
            ));
        }

        if self.reconnect.backoff.is_zero() || self.reconnect.compat_backoff.is_zero() {
            return Err(Error::config(
                "reconnect backoffs must be positive; set maxAttempts to 0 to disable retries",
            ));
        }

        if self.transport.connect_timeout.is_zero() {
            return Err(Error::config("transport.connectTimeoutMs must be positive"));
        }

        if self.transport.default_query_timeout.is_zero() {
            return Err(Error::config("transport.defaultQueryTimeoutMs must be positive"));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let options = GatewayOptions::new();
        assert_eq!(options.auth_dir, PathBuf::from("auth_sessions"));
        assert_eq!(options.reconnect.max_attempts, 5);
        assert_eq!(options.transport.connect_timeout, Duration::from_secs(60));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{ "authDir": "/tmp/auth", "reconnect": {{ "maxAttempts": 2, "backoffMs": 1000 }} }}"#
        )
        .expect("write");

        let options = GatewayOptions::from_json_file(file.path()).expect("load");
        assert_eq!(options.auth_dir, PathBuf::from("/tmp/auth"));
        assert_eq!(options.reconnect.max_attempts, 2);
        assert_eq!(options.reconnect.backoff, Duration::from_secs(1));
        assert_eq!(options.reconnect.compat_backoff, Duration::from_secs(10));
        assert_eq!(options.transport, TransportConfig::default());
    }

    #[test]
    fn test_from_json_file_errors() {
        assert!(matches!(
            GatewayOptions::from_json_file("/nonexistent/gateway.json"),
            Err(Error::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "not json").expect("write");
        assert!(matches!(
            GatewayOptions::from_json_file(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_validation_rejects_zero_backoff() {
        let options = GatewayOptions::new().with_reconnect(
            ReconnectPolicy::default().with_backoff(Duration::ZERO, Duration::from_secs(1)),
        );

        let err = options.validate().expect_err("invalid");
        assert!(err.to_string().contains("backoff"));
    }

    #[test]
    fn test_validation_rejects_empty_auth_dir() {
        assert!(GatewayOptions::new().with_auth_dir("").validate().is_err());
    }
}
