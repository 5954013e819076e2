//! Socket configuration handed to the transport on every connect.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wa_gateway::TransportConfig;
//!
//! let config = TransportConfig::new()
//!     .with_connect_timeout(Duration::from_secs(30))
//!     .with_full_history_sync();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default browser identity reported to the protocol.
const DEFAULT_BROWSER: [&str; 3] = ["WhatsApp Baileys", "Chrome", "4.0.0"];

// ============================================================================
// TransportConfig
// ============================================================================

/// Protocol socket options.
///
/// Durations cross the bridge as integer milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// Browser identity triple: client name, browser, version.
    pub browser: [String; 3],

    /// Bound on the connect handshake.
    #[serde(rename = "connectTimeoutMs", with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Bound on any single protocol query.
    #[serde(rename = "defaultQueryTimeoutMs", with = "duration_ms")]
    pub default_query_timeout: Duration,

    /// Keep-alive ping interval.
    #[serde(rename = "keepAliveIntervalMs", with = "duration_ms")]
    pub keep_alive_interval: Duration,

    /// Delay between protocol-level request retries.
    #[serde(rename = "retryRequestDelayMs", with = "duration_ms")]
    pub retry_request_delay: Duration,

    /// Protocol-level message retry budget.
    pub max_msg_retry_count: u32,

    /// Request full history on pairing.
    pub sync_full_history: bool,

    /// Announce presence as online on connect.
    pub mark_online_on_connect: bool,

    /// Render high quality link previews on send.
    pub generate_high_quality_link_preview: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            browser: DEFAULT_BROWSER.map(String::from),
            connect_timeout: Duration::from_secs(60),
            default_query_timeout: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(10),
            retry_request_delay: Duration::from_millis(250),
            max_msg_retry_count: 5,
            sync_full_history: false,
            mark_online_on_connect: false,
            generate_high_quality_link_preview: true,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportConfig {
    /// Creates the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the browser identity triple.
    #[inline]
    #[must_use]
    pub fn with_browser(
        mut self,
        client: impl Into<String>,
        browser: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.browser = [client.into(), browser.into(), version.into()];
        self
    }

    /// Sets the connect handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-query timeout.
    #[inline]
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.default_query_timeout = timeout;
        self
    }

    /// Sets the keep-alive interval.
    #[inline]
    #[must_use]
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Requests full history on pairing.
    #[inline]
    #[must_use]
    pub fn with_full_history_sync(mut self) -> Self {
        self.sync_full_history = true;
        self
    }

    /// Marks the account online on connect.
    #[inline]
    #[must_use]
    pub fn with_online_on_connect(mut self) -> Self {
        self.mark_online_on_connect = true;
        self
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

/// (De)serializes a [`Duration`] as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
