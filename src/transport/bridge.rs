//! WebSocket bridge transport.
//!
//! The protocol bridge is an external process that owns the protocol's
//! cryptography and encoding. The gateway connects to it over a WebSocket,
//! asks it to start a session with stored credentials, and receives the
//! session's events as JSON frames.
//!
//! # Connection Flow
//!
//! 1. Connect to the bridge URL (bounded by the configured connect timeout)
//! 2. Install the event handler so no event is lost
//! 3. Send `session.start` with credentials and socket configuration
//! 4. Events flow until the bridge closes the socket

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::{Jid, SessionId};
use crate::protocol::{
    Command, GroupMetadata, MessagePayload, Request, TransportEvent, WireConnection, WireMessage,
};
use crate::store::Credentials;

use super::{Connection, EventHandler, Transport, TransportConfig, TransportHandle, TransportSession};

// ============================================================================
// Types
// ============================================================================

/// Identity slot shared between the event handler and the handle.
type UserSlot = Arc<RwLock<Option<Jid>>>;

// ============================================================================
// BridgeTransport
// ============================================================================

/// [`Transport`] that drives sessions through a protocol bridge.
#[derive(Debug, Clone)]
pub struct BridgeTransport {
    url: Url,
}

impl BridgeTransport {
    /// Creates a transport for the bridge at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not `ws://` or `wss://`.
    pub fn new(url: Url) -> Result<Self> {
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(Error::config(format!(
                "bridge URL must use ws:// or wss://, got {other}://"
            ))),
        }
    }

    /// Parses and validates a bridge URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is malformed or not a WebSocket URL.
    pub fn parse(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::config(format!("invalid bridge URL: {e}")))?;
        Self::new(url)
    }

    /// Returns the bridge URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Builds the handler that turns bridge frames into transport events.
    fn event_handler(
        session_id: SessionId,
        user: UserSlot,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
    ) -> EventHandler {
        Box::new(move |frame| {
            let method = frame.method.clone();
            let event = match frame.parse() {
                Ok(Some(event)) => event,
                Ok(None) => return,
                Err(e) => {
                    warn!(session_id = %session_id, method = %method, error = %e, "Malformed bridge event");
                    return;
                }
            };

            if let TransportEvent::ConnectionUpdate(update) = &event {
                if let Some(me) = &update.me {
                    *user.write() = Some(me.clone());
                }
                if update.connection == Some(WireConnection::Close) {
                    *user.write() = None;
                }
            }

            let _ = events_tx.send(event);
        })
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn connect(
        &self,
        session_id: &SessionId,
        credentials: Credentials,
        config: &TransportConfig,
    ) -> Result<TransportSession> {
        let connect_timeout_ms = u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX);

        let (ws_stream, _) = timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| Error::connection_timeout(connect_timeout_ms))?
        .map_err(|e| Error::connection(format!("bridge connect failed: {e}")))?;

        debug!(session_id = %session_id, url = %self.url, "Bridge socket open");

        let user: UserSlot = Arc::new(RwLock::new(None));
        let (events_tx, events) = mpsc::unbounded_channel();

        let connection = Connection::new(
            ws_stream,
            Self::event_handler(session_id.clone(), Arc::clone(&user), events_tx),
            config.default_query_timeout,
        );

        let start = Request::new(Command::Start {
            session_id: session_id.clone(),
            credentials: credentials.to_wire(),
            config: config.clone(),
        });

        let result = match connection.send(start).await.and_then(|r| r.into_result()) {
            Ok(result) => result,
            Err(e) => {
                connection.shutdown();
                return Err(e);
            }
        };

        if let Some(me) = result.get("me").and_then(Value::as_str) {
            match Jid::parse(me) {
                Ok(jid) => *user.write() = Some(jid),
                Err(e) => warn!(session_id = %session_id, error = %e, "Bridge reported invalid identity"),
            }
        }

        info!(session_id = %session_id, "Bridge session started");

        let handle = BridgeHandle {
            session_id: session_id.clone(),
            connection,
            user,
        };

        Ok(TransportSession {
            handle: Arc::new(handle),
            events,
        })
    }
}

// ============================================================================
// BridgeHandle
// ============================================================================

/// A session socket held open by the bridge.
pub struct BridgeHandle {
    session_id: SessionId,
    connection: Connection,
    user: UserSlot,
}

impl BridgeHandle {
    /// Sends a command and unwraps the result.
    async fn call(&self, command: Command) -> Result<Value> {
        let method = command.method();
        let response = self.connection.send(Request::new(command)).await?;
        debug!(session_id = %self.session_id, method, "Bridge call completed");
        response.into_result()
    }
}

#[async_trait]
impl TransportHandle for BridgeHandle {
    fn user(&self) -> Option<Jid> {
        self.user.read().clone()
    }

    async fn send(&self, jid: &Jid, payload: &MessagePayload) -> Result<WireMessage> {
        let result = self
            .call(Command::SendMessage {
                jid: jid.clone(),
                content: payload.to_content(),
            })
            .await?;

        Ok(serde_json::from_value(result)?)
    }

    async fn groups(&self) -> Result<Vec<GroupMetadata>> {
        let result = self.call(Command::ListGroups).await?;

        // The bridge may key groups by id instead of listing them.
        match result {
            Value::Object(map) => map
                .into_iter()
                .map(|(_, group)| serde_json::from_value(group).map_err(Error::from))
                .collect(),
            other => Ok(serde_json::from_value(other)?),
        }
    }

    async fn create_group(&self, subject: &str, participants: &[Jid]) -> Result<GroupMetadata> {
        let result = self
            .call(Command::CreateGroup {
                subject: subject.to_string(),
                participants: participants.to_vec(),
            })
            .await?;

        Ok(serde_json::from_value(result)?)
    }

    async fn logout(&self) -> Result<()> {
        let result = self.call(Command::Logout).await;
        *self.user.write() = None;
        self.connection.shutdown();
        result.map(|_| ())
    }

    fn shutdown(&self) {
        *self.user.write() = None;
        self.connection.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
