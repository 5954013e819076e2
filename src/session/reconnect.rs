//! Reconnect policy and close classification.
//!
//! A transport close is either terminal (logout, or the retry budget is
//! spent) or scheduled for retry after a fixed backoff. Known
//! compatibility failures of the socket layer wait longer than ordinary
//! closes; both draw from the same budget.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::protocol::DisconnectInfo;
use crate::transport::config::duration_ms;

// ============================================================================
// Constants
// ============================================================================

/// Messages of known socket-layer compatibility failures.
static COMPAT_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bufferUtil\.(un)?mask is not a function|\bWebSocket\b")
        .expect("compatibility signature regex is valid")
});

// ============================================================================
// Classification
// ============================================================================

/// Class of a non-terminal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseClass {
    /// Socket-layer compatibility failure; long backoff.
    Compatibility,
    /// Anything else; short backoff.
    Generic,
}

/// Why a close ends the reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalReason {
    /// The account unlinked the device or revoked authentication.
    LoggedOut,
    /// Every retry in the budget was used.
    Exhausted,
}

/// What to do after a transport close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reconnect after `delay`; this is retry number `attempt`.
    Retry {
        delay: Duration,
        class: CloseClass,
        attempt: u32,
    },
    /// Stop until someone calls `connect` again.
    Terminal(TerminalReason),
}

/// Returns `true` if `message` matches a known compatibility failure.
#[must_use]
pub fn is_compat_error(message: &str) -> bool {
    COMPAT_SIGNATURE.is_match(message)
}

/// Classifies a close cause.
#[must_use]
pub fn classify(info: Option<&DisconnectInfo>) -> CloseClass {
    match info {
        Some(info) if is_compat_error(&info.message) => CloseClass::Compatibility,
        _ => CloseClass::Generic,
    }
}

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Retry budget and backoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectPolicy {
    /// Retries allowed between successful opens.
    pub max_attempts: u32,

    /// Delay before retrying an ordinary close.
    #[serde(rename = "backoffMs", with = "duration_ms")]
    pub backoff: Duration,

    /// Delay before retrying a compatibility failure.
    #[serde(rename = "compatBackoffMs", with = "duration_ms")]
    pub compat_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(5),
            compat_backoff: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Sets the retry budget.
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets both backoffs.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration, compat_backoff: Duration) -> Self {
        self.backoff = backoff;
        self.compat_backoff = compat_backoff;
        self
    }

    /// Returns the backoff for a close class.
    #[inline]
    #[must_use]
    pub fn delay_for(&self, class: CloseClass) -> Duration {
        match class {
            CloseClass::Compatibility => self.compat_backoff,
            CloseClass::Generic => self.backoff,
        }
    }

    /// Decides what follows a close, given the retries already scheduled
    /// since the last successful open.
    ///
    /// A logout is terminal whatever its message says.
    #[must_use]
    pub fn decide(&self, info: Option<&DisconnectInfo>, attempts: u32) -> ReconnectDecision {
        if info.is_some_and(DisconnectInfo::is_logged_out) {
            return ReconnectDecision::Terminal(TerminalReason::LoggedOut);
        }

        if attempts >= self.max_attempts {
            return ReconnectDecision::Terminal(TerminalReason::Exhausted);
        }

        let class = classify(info);
        ReconnectDecision::Retry {
            delay: self.delay_for(class),
            class,
            attempt: attempts + 1,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
