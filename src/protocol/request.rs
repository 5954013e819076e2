//! Request/reply framing for the bridge socket.
//!
//! Every [`Command`] goes out wrapped in a [`Request`] carrying a fresh
//! [`RequestId`]; the bridge answers with a [`Response`] echoing that id.
//!
//! ```json
//! { "id": "…", "method": "message.send", "params": { … } }
//! { "id": "…", "type": "success", "result": { … } }
//! { "id": "…", "type": "error", "error": "stream", "message": "…" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::Command;

/// Bridge error code for a socket whose stream has errored out.
const CODE_STREAM: &str = "stream";

/// Bridge error code for a socket that has already been closed.
const CODE_CLOSED: &str = "closed";

// ============================================================================
// Request
// ============================================================================

/// Outbound command frame.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Correlation id echoed by the reply.
    pub id: RequestId,

    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    #[inline]
    #[must_use]
    pub fn new(command: Command) -> Self {
        let id = RequestId::generate();
        Self { id, command }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Reply frame for a single [`Request`].
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: RequestId,

    #[serde(rename = "type")]
    pub response_type: ResponseType,

    #[serde(default)]
    pub result: Option<Value>,

    /// Short machine-readable failure code.
    #[serde(default)]
    pub error: Option<String>,

    /// Human-readable failure text, usually the upstream error message.
    #[serde(default)]
    pub message: Option<String>,
}

impl Response {
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.response_type, ResponseType::Success)
    }

    /// Unwraps a success payload (`null` when the bridge sent none).
    ///
    /// # Errors
    ///
    /// An error reply with code `stream` becomes [`Error::StreamErrored`],
    /// code `closed` becomes [`Error::ConnectionClosed`], anything else is
    /// [`Error::Transport`] carrying the message (or the code when the
    /// message is absent).
    pub fn into_result(self) -> Result<Value> {
        if self.is_success() {
            return Ok(self.result.unwrap_or_default());
        }

        let code = self.error.unwrap_or_default();
        let text = match self.message {
            Some(message) => message,
            None if code.is_empty() => "unknown error".to_string(),
            None => code.clone(),
        };

        Err(match code.as_str() {
            CODE_STREAM => Error::stream_errored(text),
            CODE_CLOSED => Error::ConnectionClosed,
            _ => Error::transport(text),
        })
    }

    /// Borrows a string field of the result object.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.result.as_ref()?.get(key)?.as_str()
    }
}

/// `type` discriminator of a [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Success,
    Error,
}

// ============================================================================
// Tests
// ============================================================================
