//! Bridge command definitions.
//!
//! Commands are sent from the gateway to the protocol bridge as
//! `{ "id", "method", "params" }` frames.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | `session.start` | Open the protocol socket for a session |
//! | `message.send` | Send a message |
//! | `group.list` | List participating groups |
//! | `group.create` | Create a group |
//! | `session.logout` | Unlink the device and close |

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::identifiers::{Jid, SessionId};
use crate::transport::TransportConfig;

// ============================================================================
// Command
// ============================================================================

/// Commands understood by the protocol bridge.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum Command {
    /// Start the protocol socket with stored credentials.
    #[serde(rename = "session.start")]
    Start {
        /// Session being started.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Credentials in wire form.
        credentials: Value,
        /// Socket configuration.
        config: TransportConfig,
    },

    /// Send message content to a JID.
    #[serde(rename = "message.send")]
    SendMessage {
        /// Recipient.
        jid: Jid,
        /// Content in the protocol's send shape.
        content: Value,
    },

    /// List participating groups.
    #[serde(rename = "group.list")]
    ListGroups,

    /// Create a group.
    #[serde(rename = "group.create")]
    CreateGroup {
        /// Group title.
        subject: String,
        /// Initial members.
        participants: Vec<Jid>,
    },

    /// Unlink the device.
    #[serde(rename = "session.logout")]
    Logout,
}

impl Command {
    /// Returns the method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Start { .. } => "session.start",
            Self::SendMessage { .. } => "message.send",
            Self::ListGroups => "group.list",
            Self::CreateGroup { .. } => "group.create",
            Self::Logout => "session.logout",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_send_serialization() {
        let command = Command::SendMessage {
            jid: Jid::user("123"),
            content: json!({ "text": "hi" }),
        };

        let value = serde_json::to_value(&command).expect("serialize");
        assert_eq!(
            value,
            json!({ "method": "message.send", "params": { "jid": "123@s.whatsapp.net", "content": { "text": "hi" } } })
        );
        assert_eq!(command.method(), "message.send");
    }

    #[test]
    fn test_unit_command_serialization() {
        let value = serde_json::to_value(Command::Logout).expect("serialize");
        assert_eq!(value["method"], "session.logout");
    }
}
