//! Type-safe identifiers.
//!
//! Newtype wrappers keep session identifiers, protocol addresses and
//! bridge request ids from being mixed up at compile time.
//!
//! | Type | Wraps | Used for |
//! |------|-------|----------|
//! | [`SessionId`] | `String` | Registry key, credential directory name |
//! | [`Jid`] | `String` | Protocol address of a user or group |
//! | [`MessageId`] | `String` | Protocol message key id |
//! | [`RequestId`] | `Uuid` | Bridge request/response correlation |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Maximum accepted session identifier length.
const MAX_SESSION_ID_LEN: usize = 128;

/// Server suffix for group JIDs.
const GROUP_SERVER: &str = "g.us";

/// Server suffix for individual user JIDs.
const USER_SERVER: &str = "s.whatsapp.net";

// ============================================================================
// SessionId
// ============================================================================

/// Caller-chosen session identifier, unique process-wide.
///
/// The identifier doubles as a directory name inside the file credential
/// store, so it is restricted to ASCII alphanumerics, `-`, `_` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Creates a validated session identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSessionId`] if the identifier is empty, too
    /// long, a relative path component, or contains other characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(Error::invalid_session_id("session id must not be empty"));
        }
        if id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::invalid_session_id(format!(
                "session id longer than {MAX_SESSION_ID_LEN} characters"
            )));
        }
        if id == "." || id == ".." {
            return Err(Error::invalid_session_id("session id must not be a path component"));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(Error::invalid_session_id(format!(
                "unsupported character {bad:?} in {id:?}"
            )));
        }

        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ============================================================================
// Jid
// ============================================================================

/// Protocol address of an individual or group.
///
/// Format: `user[:device]@server`. Groups live on `g.us`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

impl Jid {
    /// Parses a JID, requiring a non-empty user and server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJid`] if the `@` separator is missing or either
    /// side is empty.
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        match raw.split_once('@') {
            Some((user, server)) if !user.is_empty() && !server.is_empty() => Ok(Self(raw)),
            _ => Err(Error::invalid_jid(raw)),
        }
    }

    /// Builds an individual user JID from a phone number.
    #[must_use]
    pub fn user(number: &str) -> Self {
        Self(format!("{number}@{USER_SERVER}"))
    }

    /// Returns the JID as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this JID addresses a group.
    #[inline]
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.0.ends_with(&format!("@{GROUP_SERVER}"))
    }

    /// Returns the user part without device suffix.
    #[must_use]
    pub fn user_part(&self) -> &str {
        let user = self.0.split('@').next().unwrap_or_default();
        user.split(':').next().unwrap_or_default()
    }

    /// Returns the server part, empty if absent.
    #[must_use]
    pub fn server(&self) -> &str {
        self.0.split_once('@').map(|(_, s)| s).unwrap_or_default()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// MessageId
// ============================================================================

/// Protocol message key id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps a raw message id.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// RequestId
// ============================================================================

/// Bridge request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random request id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ============================================================================
// Tests
// ============================================================================
