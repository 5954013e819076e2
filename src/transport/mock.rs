//! Scriptable transport for tests.
//!
//! [`MockTransport`] records every connect and keeps the event sender of
//! the latest socket so tests can push connection updates, pairing codes
//! and messages in order. [`MockHandle`] controls the resolved identity
//! and the outcome of sends.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::identifiers::{Jid, MessageId, SessionId};
use crate::protocol::{
    ConnectionUpdate, DisconnectInfo, GroupMetadata, GroupParticipant, MediaContent, MediaKind,
    MessageContent, MessageKey, MessagePayload, TransportEvent, WireConnection, WireMessage,
};
use crate::store::Credentials;

use super::{Transport, TransportConfig, TransportHandle, TransportSession};

// ============================================================================
// MockTransport
// ============================================================================

#[derive(Default)]
struct MockState {
    connects: usize,
    fail_connect: Option<String>,
    last_credentials: Option<Credentials>,
    events_tx: Option<mpsc::UnboundedSender<TransportEvent>>,
    handle: Option<Arc<MockHandle>>,
}

/// Transport whose sockets are driven by the test.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `connect` calls so far, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Makes every later connect fail with a connection error.
    pub fn fail_connect_with(&self, message: &str) {
        self.state.lock().fail_connect = Some(message.to_string());
    }

    /// Lets later connects succeed again.
    pub fn succeed_connect(&self) {
        self.state.lock().fail_connect = None;
    }

    /// Credentials passed to the latest connect.
    pub fn last_credentials(&self) -> Option<Credentials> {
        self.state.lock().last_credentials.clone()
    }

    /// Handle returned by the latest successful connect.
    pub fn handle(&self) -> Option<Arc<MockHandle>> {
        self.state.lock().handle.clone()
    }

    /// Pushes an event on the latest socket. Returns `false` if none is live.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.state
            .lock()
            .events_tx
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Authenticates the latest socket as `user` and reports it open.
    pub fn open(&self, user: Option<Jid>) -> bool {
        if let Some(handle) = self.handle() {
            handle.set_user(user.clone());
        }
        self.emit(TransportEvent::ConnectionUpdate(ConnectionUpdate {
            connection: Some(WireConnection::Open),
            me: user,
            ..Default::default()
        }))
    }

    /// Closes the latest socket with `info`.
    pub fn close(&self, info: DisconnectInfo) -> bool {
        if let Some(handle) = self.handle() {
            handle.set_user(None);
        }
        self.emit(TransportEvent::ConnectionUpdate(ConnectionUpdate::closed(info)))
    }

    /// Issues a pairing code on the latest socket.
    pub fn qr(&self, code: &str) -> bool {
        self.emit(TransportEvent::ConnectionUpdate(ConnectionUpdate::qr(code)))
    }

    /// Ends the latest socket's event stream.
    pub fn end_stream(&self) {
        self.state.lock().events_tx = None;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        _session_id: &SessionId,
        credentials: Credentials,
        _config: &TransportConfig,
    ) -> Result<TransportSession> {
        let mut state = self.state.lock();
        state.connects += 1;
        state.last_credentials = Some(credentials);

        if let Some(message) = &state.fail_connect {
            return Err(Error::connection(message.clone()));
        }

        let (events_tx, events) = mpsc::unbounded_channel();
        let handle = Arc::new(MockHandle::default());

        state.events_tx = Some(events_tx);
        state.handle = Some(Arc::clone(&handle));

        Ok(TransportSession { handle, events })
    }
}

// ============================================================================
// MockHandle
// ============================================================================

/// Socket handle with test-controlled identity and send outcome.
#[derive(Default)]
pub struct MockHandle {
    user: RwLock<Option<Jid>>,
    send_failure: Mutex<Option<String>>,
    sent: Mutex<Vec<(Jid, MessagePayload)>>,
    groups: Mutex<Vec<GroupMetadata>>,
    sequence: AtomicUsize,
    logged_out: AtomicBool,
    shut_down: AtomicBool,
}

impl MockHandle {
    pub fn set_user(&self, user: Option<Jid>) {
        *self.user.write() = user;
    }

    /// Makes later sends fail with a transport error carrying `message`.
    pub fn fail_sends_with(&self, message: &str) {
        *self.send_failure.lock() = Some(message.to_string());
    }

    pub fn set_groups(&self, groups: Vec<GroupMetadata>) {
        *self.groups.lock() = groups;
    }

    pub fn sent(&self) -> Vec<(Jid, MessagePayload)> {
        self.sent.lock().clone()
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportHandle for MockHandle {
    fn user(&self) -> Option<Jid> {
        self.user.read().clone()
    }

    async fn send(&self, jid: &Jid, payload: &MessagePayload) -> Result<WireMessage> {
        if let Some(message) = self.send_failure.lock().clone() {
            return Err(Error::transport(message));
        }

        self.sent.lock().push((jid.clone(), payload.clone()));
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);

        let content = match payload {
            MessagePayload::Text { text } => MessageContent::text(text.clone()),
            MessagePayload::Media { kind, url, caption } => {
                let media = Some(MediaContent {
                    caption: caption.clone(),
                    url: Some(url.clone()),
                    ..Default::default()
                });
                let mut content = MessageContent::default();
                match kind {
                    MediaKind::Image => content.image_message = media,
                    MediaKind::Video => content.video_message = media,
                    MediaKind::Audio => content.audio_message = media,
                    MediaKind::Document => content.document_message = media,
                }
                content
            }
        };

        Ok(WireMessage {
            key: MessageKey {
                remote_jid: Some(jid.clone()),
                from_me: true,
                id: Some(MessageId::new(format!("MOCK{n}"))),
                participant: None,
            },
            message: Some(content),
            message_timestamp: Some(1_700_000_000),
            push_name: None,
        })
    }

    async fn groups(&self) -> Result<Vec<GroupMetadata>> {
        Ok(self.groups.lock().clone())
    }

    async fn create_group(&self, subject: &str, participants: &[Jid]) -> Result<GroupMetadata> {
        let group = GroupMetadata {
            id: Jid::parse(format!("{}@g.us", self.groups.lock().len() + 1))?,
            subject: subject.to_string(),
            owner: self.user(),
            creation: Some(1_700_000_000),
            participants: participants
                .iter()
                .map(|id| GroupParticipant {
                    id: id.clone(),
                    admin: None,
                })
                .collect(),
        };
        self.groups.lock().push(group.clone());
        Ok(group)
    }

    async fn logout(&self) -> Result<()> {
        self.logged_out.store(true, Ordering::SeqCst);
        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.set_user(None);
    }
}
