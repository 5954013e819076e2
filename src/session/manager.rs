//! Per-session connection manager.
//!
//! A [`ConnectionManager`] owns one session's lifecycle: it opens the
//! transport, relays pairing codes, mirrors inbound traffic, gates sends on
//! authentication, and reconnects according to its [`ReconnectPolicy`].
//!
//! # State machine
//!
//! ```text
//!                connect()              open event
//! Disconnected ───────────► Connecting ───────────► Open
//!      ▲                      ▲    │                 │
//!      │ logout / budget      │    │ close event     │ close event
//!      │ exhausted            │    ▼                 ▼
//!      └──────────────────── Closing ◄───────────────┘
//!                      retry after backoff
//! ```
//!
//! Every connect attempt, close and teardown advances an epoch. Retry
//! timers and event loops carry the epoch they were started under and do
//! nothing once it is stale, so a torn-down session is never resurrected.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{Jid, SessionId};
use crate::persistence::{Mirror, SessionStatus, SessionStore};
use crate::protocol::{
    Contact, ConnectionUpdate, DisconnectInfo, GroupMetadata, MediaKind, MessagePayload,
    TransportEvent, UpsertKind, WireConnection, WireMessage,
};
use crate::store::CredentialStore;
use crate::transport::{
    EventReceiver, Transport, TransportConfig, TransportHandle, TransportSession,
};

use super::observer::{ChannelObserver, SessionEvent, SessionObserver};
use super::reconnect::{ReconnectDecision, ReconnectPolicy, TerminalReason};
use super::state::{ConnectionState, Diagnostics};

// ============================================================================
// SessionContext
// ============================================================================

/// Collaborators shared by every manager of a registry.
#[derive(Clone)]
pub struct SessionContext {
    /// Opens protocol sockets.
    pub transport: Arc<dyn Transport>,
    /// Per-session credential material.
    pub credentials: Arc<dyn CredentialStore>,
    /// Durable store the mirror writes to.
    pub store: Arc<dyn SessionStore>,
    /// Retry budget and backoffs.
    pub policy: ReconnectPolicy,
    /// Socket options handed to every connect.
    pub transport_config: TransportConfig,
}

// ============================================================================
// Types
// ============================================================================

/// Mutable per-session state. Only ever locked briefly, never across I/O.
#[derive(Default)]
struct ManagerState {
    connection: ConnectionState,
    handle: Option<Arc<dyn TransportHandle>>,
    /// Set between the start of a connect and the handle being installed.
    setup_in_flight: bool,
    attempts: u32,
    epoch: u64,
    removed: bool,
    last_disconnect: Option<DisconnectInfo>,
    /// Latest contact data seen on this session.
    contacts: BTreeMap<Jid, Contact>,
}

/// Result of ending a connection cycle.
struct CloseOutcome {
    decision: ReconnectDecision,
    epoch: u64,
    handle: Option<Arc<dyn TransportHandle>>,
}

impl ManagerState {
    #[inline]
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.removed
    }

    fn is_authenticated(&self) -> bool {
        self.connection == ConnectionState::Open
            && self.handle.as_ref().is_some_and(|h| h.user().is_some())
    }

    /// Drops the handle and decides between retry and terminal.
    fn close_cycle(&mut self, policy: &ReconnectPolicy, info: Option<DisconnectInfo>) -> CloseOutcome {
        self.setup_in_flight = false;
        self.epoch += 1;
        let handle = self.handle.take();

        let decision = policy.decide(info.as_ref(), self.attempts);
        self.last_disconnect = info;

        match decision {
            ReconnectDecision::Retry { attempt, .. } => {
                self.attempts = attempt;
                self.connection = ConnectionState::Closing;
            }
            ReconnectDecision::Terminal(_) => {
                self.attempts = 0;
                self.connection = ConnectionState::Disconnected;
            }
        }

        CloseOutcome {
            decision,
            epoch: self.epoch,
            handle,
        }
    }
}

/// Internal shared state for a manager.
pub(crate) struct ManagerInner {
    session_id: SessionId,
    context: SessionContext,
    mirror: Mirror,
    state: Mutex<ManagerState>,
    observer: RwLock<Option<Arc<dyn SessionObserver>>>,
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Handle to one session's connection lifecycle.
///
/// Cloning is cheap; clones share the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionManager")
            .field("session_id", &self.inner.session_id)
            .field("state", &state.connection)
            .field("attempts", &state.attempts)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Creates a disconnected manager. Touches neither the transport nor
    /// any store.
    #[must_use]
    pub fn new(session_id: SessionId, context: SessionContext) -> Self {
        let mirror = Mirror::new(session_id.clone(), Arc::clone(&context.store));
        Self {
            inner: Arc::new(ManagerInner {
                session_id,
                context,
                mirror,
                state: Mutex::new(ManagerState::default()),
                observer: RwLock::new(None),
            }),
        }
    }

    /// Returns the session this manager owns.
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Returns `true` if both handles refer to the same manager.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Opens the transport and resets the retry budget.
    ///
    /// No-op while connecting or open.
    ///
    /// # Errors
    ///
    /// Setup failures before a handle exists (credential store, transport
    /// construction) are returned and leave the session in
    /// [`ConnectionState::Error`]. Returns [`Error::SessionRemoved`] once the
    /// manager has been torn down.
    pub async fn connect(&self) -> Result<()> {
        self.start_connection(true).await
    }

    /// Logs the device out and closes the transport.
    ///
    /// Safe to call in any state. Cancels any pending retry.
    ///
    /// # Errors
    ///
    /// Returns the transport's logout failure. The session is disconnected
    /// either way.
    pub async fn disconnect(&self) -> Result<()> {
        self.release(true).await
    }

    /// Closes the transport without logging out, so the pairing survives.
    pub async fn close(&self) {
        // Nothing to report without a logout.
        let _ = self.release(false).await;
    }

    /// Returns `true` iff a handle exists, the state is open, and the handle
    /// reports a resolved identity.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().is_authenticated()
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().connection
    }

    /// Returns a diagnostics snapshot.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let state = self.inner.state.lock();
        Diagnostics {
            session_id: self.inner.session_id.clone(),
            state: state.connection,
            is_authenticated: state.is_authenticated(),
            is_connecting: state.setup_in_flight || state.connection == ConnectionState::Connecting,
            reconnect_attempts: state.attempts,
            user: state.handle.as_ref().and_then(|h| h.user()),
            last_disconnect: state.last_disconnect.clone(),
        }
    }

    /// Sends a message and mirrors it as outbound.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless [`is_authenticated`](Self::is_authenticated)
    /// - Any transport failure. A stream failure also drops the handle and
    ///   leaves the session disconnected; it is not retried.
    pub async fn send(&self, jid: &Jid, payload: &MessagePayload) -> Result<WireMessage> {
        let handle = {
            let state = self.inner.state.lock();
            match &state.handle {
                Some(handle) if state.is_authenticated() => Arc::clone(handle),
                _ => return Err(Error::not_connected(self.inner.session_id.clone())),
            }
        };

        debug!(session_id = %self.inner.session_id, %jid, "Sending message");

        match handle.send(jid, payload).await {
            Ok(message) => {
                self.inner.mirror.record_message(&message, true).await;
                Ok(message)
            }
            Err(e) => {
                error!(session_id = %self.inner.session_id, %jid, error = %e, "Send failed");
                if e.is_stream_error() {
                    self.drop_broken_stream(&handle).await;
                }
                Err(e)
            }
        }
    }

    /// Sends plain text.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_text(&self, jid: &Jid, text: impl Into<String>) -> Result<WireMessage> {
        self.send(jid, &MessagePayload::text(text)).await
    }

    /// Sends media by URL or path. Captions only travel with images and
    /// videos.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_media(
        &self,
        jid: &Jid,
        kind: MediaKind,
        url: impl Into<String>,
        caption: Option<String>,
    ) -> Result<WireMessage> {
        self.send(jid, &MessagePayload::media(kind, url, caption)).await
    }

    /// Reconciles state after restarts or missed events.
    ///
    /// An authenticated handle forces the state to open. Without one, a
    /// connect is started if credentials are stored and nothing is in
    /// flight. Failures are logged.
    pub async fn refresh_connection_state(&self) {
        let session_id = &self.inner.session_id;

        let (handle, in_flight) = {
            let state = self.inner.state.lock();
            (
                state.handle.clone(),
                state.setup_in_flight || state.connection == ConnectionState::Connecting,
            )
        };

        if let Some(handle) = handle.filter(|h| h.user().is_some()) {
            let forced = {
                let mut state = self.inner.state.lock();
                let same = state.handle.as_ref().is_some_and(|h| Arc::ptr_eq(h, &handle));
                if same {
                    state.connection = ConnectionState::Open;
                }
                same
            };
            if forced {
                self.inner.mirror.record_status(SessionStatus::Connected).await;
                debug!(session_id = %session_id, "Refreshed state: open");
            }
            return;
        }

        if in_flight {
            debug!(session_id = %session_id, "Refresh skipped: connect in flight");
            return;
        }

        match self.inner.context.credentials.exists(session_id).await {
            Ok(true) => {
                info!(session_id = %session_id, "Stored credentials without live socket, reconnecting");
                if let Err(e) = self.connect().await {
                    warn!(session_id = %session_id, error = %e, "Refresh reconnect failed");
                }
            }
            Ok(false) => debug!(session_id = %session_id, "Refresh: no stored credentials"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Refresh: credential check failed"),
        }
    }

    /// Lists participating groups.
    ///
    /// Empty when there is no handle or the query fails.
    pub async fn groups(&self) -> Vec<GroupMetadata> {
        let Some(handle) = self.handle() else {
            return Vec::new();
        };

        match handle.groups().await {
            Ok(groups) => groups,
            Err(e) => {
                error!(session_id = %self.inner.session_id, error = %e, "Failed to fetch groups");
                Vec::new()
            }
        }
    }

    /// Creates a group.
    ///
    /// # Errors
    ///
    /// [`Error::NotConnected`] without a handle, or the transport failure.
    pub async fn create_group(&self, subject: &str, participants: &[Jid]) -> Result<GroupMetadata> {
        let handle = self
            .handle()
            .ok_or_else(|| Error::not_connected(self.inner.session_id.clone()))?;

        handle.create_group(subject, participants).await.inspect_err(|e| {
            error!(session_id = %self.inner.session_id, error = %e, "Failed to create group");
        })
    }

    /// Returns the contacts seen on this session, ordered by JID.
    #[must_use]
    pub fn contacts(&self) -> Vec<Contact> {
        self.inner.state.lock().contacts.values().cloned().collect()
    }

    /// Installs an observer and returns the one it replaces.
    pub fn set_observer(
        &self,
        observer: Arc<dyn SessionObserver>,
    ) -> Option<Arc<dyn SessionObserver>> {
        self.inner.observer.write().replace(observer)
    }

    /// Removes the observer.
    pub fn clear_observer(&self) -> Option<Arc<dyn SessionObserver>> {
        self.inner.observer.write().take()
    }

    /// Subscribes to this session's events through a channel.
    ///
    /// Replaces the current observer; an earlier subscription's stream ends.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (observer, rx) = ChannelObserver::new();
        if self.set_observer(Arc::new(observer)).is_some() {
            debug!(session_id = %self.inner.session_id, "Observer replaced by subscription");
        }
        rx
    }

    /// Retires the manager: no further connects or retries, transport
    /// released with or without logout.
    pub(crate) async fn teardown(&self, logout: bool) {
        self.inner.state.lock().removed = true;
        if let Err(e) = self.release(logout).await {
            warn!(session_id = %self.inner.session_id, error = %e, "Logout failed during teardown");
        }
        debug!(session_id = %self.inner.session_id, "Manager torn down");
    }
}

// ============================================================================
// ConnectionManager - Connection lifecycle
// ============================================================================

impl ConnectionManager {
    fn handle(&self) -> Option<Arc<dyn TransportHandle>> {
        self.inner.state.lock().handle.clone()
    }

    fn observer(&self) -> Option<Arc<dyn SessionObserver>> {
        self.inner.observer.read().clone()
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.state.lock().is_current(epoch)
    }

    async fn start_connection(&self, explicit: bool) -> Result<()> {
        let session_id = &self.inner.session_id;

        let (epoch, stale_handle) = {
            let mut state = self.inner.state.lock();
            if state.removed {
                return Err(Error::session_removed(session_id.clone()));
            }
            if state.setup_in_flight || state.connection == ConnectionState::Connecting {
                debug!(session_id = %session_id, "Connect skipped: already connecting");
                return Ok(());
            }
            if state.connection == ConnectionState::Open && state.handle.is_some() {
                debug!(session_id = %session_id, "Connect skipped: already open");
                return Ok(());
            }

            if explicit {
                state.attempts = 0;
            }
            state.setup_in_flight = true;
            state.connection = ConnectionState::Connecting;
            state.epoch += 1;
            (state.epoch, state.handle.take())
        };

        if let Some(handle) = stale_handle {
            handle.shutdown();
        }

        info!(session_id = %session_id, explicit, "Starting connection");
        self.inner.mirror.record_status(SessionStatus::Connecting).await;

        // Never cached: credentials may rotate mid-session.
        let credentials = match self.inner.context.credentials.load(session_id).await {
            Ok(credentials) => credentials.unwrap_or_default(),
            Err(e) => return self.fail_setup(epoch, explicit, e).await,
        };

        if credentials.is_empty() {
            debug!(session_id = %session_id, "No stored credentials, pairing required");
        }

        let connected = self
            .inner
            .context
            .transport
            .connect(session_id, credentials, &self.inner.context.transport_config)
            .await;

        let TransportSession { handle, events } = match connected {
            Ok(session) => session,
            Err(e) => return self.fail_setup(epoch, explicit, e).await,
        };

        let installed = {
            let mut state = self.inner.state.lock();
            if state.is_current(epoch) {
                state.handle = Some(Arc::clone(&handle));
                state.setup_in_flight = false;
                true
            } else {
                false
            }
        };

        if !installed {
            debug!(session_id = %session_id, "Connection superseded before install");
            handle.shutdown();
            return Ok(());
        }

        tokio::spawn(Self::run_events(Arc::downgrade(&self.inner), epoch, events));
        Ok(())
    }

    async fn fail_setup(&self, epoch: u64, explicit: bool, error: Error) -> Result<()> {
        let session_id = &self.inner.session_id;
        error!(session_id = %session_id, error = %error, "Connection setup failed");

        let outcome = {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return Err(error);
            }
            if explicit {
                state.setup_in_flight = false;
                state.connection = ConnectionState::Error;
                None
            } else {
                // A failed retry spends budget like a close.
                let info = DisconnectInfo::new(None, error.to_string());
                Some(state.close_cycle(&self.inner.context.policy, Some(info)))
            }
        };

        self.inner.mirror.record_status(SessionStatus::Error).await;

        if let Some(outcome) = outcome {
            self.apply_decision(outcome.decision, outcome.epoch);
        }

        Err(error)
    }

    /// Releases the transport, optionally logging out.
    async fn release(&self, logout: bool) -> Result<()> {
        let session_id = &self.inner.session_id;

        let (handle, previous) = {
            let mut state = self.inner.state.lock();
            state.epoch += 1;
            state.setup_in_flight = false;
            state.attempts = 0;
            let previous = mem::replace(&mut state.connection, ConnectionState::Disconnected);
            (state.handle.take(), previous)
        };

        if handle.is_none() && previous == ConnectionState::Disconnected {
            debug!(session_id = %session_id, "Already disconnected");
            return Ok(());
        }

        let result = match handle {
            Some(handle) if logout => handle.logout().await,
            Some(handle) => {
                handle.shutdown();
                Ok(())
            }
            None => Ok(()),
        };

        self.inner.mirror.record_status(SessionStatus::Disconnected).await;
        info!(session_id = %session_id, logout, %previous, "Disconnected");

        result
    }

    /// Forgets a handle whose stream broke during a send.
    async fn drop_broken_stream(&self, handle: &Arc<dyn TransportHandle>) {
        let dropped = {
            let mut state = self.inner.state.lock();
            let same = state.handle.as_ref().is_some_and(|h| Arc::ptr_eq(h, handle));
            if same {
                state.handle = None;
                state.connection = ConnectionState::Disconnected;
                state.epoch += 1;
            }
            same
        };

        if dropped {
            handle.shutdown();
            warn!(session_id = %self.inner.session_id, "Stream errored, session marked disconnected");
            self.inner.mirror.record_status(SessionStatus::Error).await;
        }
    }

    fn apply_decision(&self, decision: ReconnectDecision, epoch: u64) {
        let session_id = &self.inner.session_id;
        let max = self.inner.context.policy.max_attempts;

        match decision {
            ReconnectDecision::Retry {
                delay,
                class,
                attempt,
            } => {
                info!(
                    session_id = %session_id,
                    attempt,
                    max,
                    ?class,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnect scheduled"
                );
                self.schedule_retry(epoch, delay);
            }
            ReconnectDecision::Terminal(TerminalReason::LoggedOut) => {
                warn!(session_id = %session_id, "Logged out, pairing required");
            }
            ReconnectDecision::Terminal(TerminalReason::Exhausted) => {
                warn!(session_id = %session_id, max, "Reconnect budget exhausted");
            }
        }
    }

    fn schedule_retry(&self, epoch: u64, delay: Duration) {
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = Self { inner };

            if !manager.is_current(epoch) {
                debug!(session_id = %manager.inner.session_id, "Stale retry ignored");
                return;
            }

            if let Err(e) = manager.start_connection(false).await {
                debug!(session_id = %manager.inner.session_id, error = %e, "Retry failed");
            }
        });
    }
}

// ============================================================================
// ConnectionManager - Event handling
// ============================================================================

impl ConnectionManager {
    /// Processes one handle's events in order until the stream ends or the
    /// connection is superseded.
    async fn run_events(weak: Weak<ManagerInner>, epoch: u64, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let manager = Self { inner };

            if !manager.is_current(epoch) {
                trace!(
                    session_id = %manager.inner.session_id,
                    event = event.name(),
                    "Dropping event from stale connection"
                );
                return;
            }

            manager.handle_event(epoch, event).await;
        }

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let manager = Self { inner };

        let live = {
            let state = manager.inner.state.lock();
            state.is_current(epoch) && state.handle.is_some()
        };

        if live {
            debug!(session_id = %manager.inner.session_id, "Event stream ended without close");
            let info = DisconnectInfo::new(None, "transport event stream ended");
            manager.handle_close(epoch, Some(info)).await;
        }
    }

    async fn handle_event(&self, epoch: u64, event: TransportEvent) {
        trace!(session_id = %self.inner.session_id, event = event.name(), "Transport event");

        match event {
            TransportEvent::ConnectionUpdate(update) => {
                self.handle_connection_update(epoch, update).await;
            }
            TransportEvent::MessagesUpsert {
                messages,
                kind: UpsertKind::Notify,
            } => {
                let observer = self.observer();
                for message in &messages {
                    self.inner.mirror.record_message(message, false).await;
                    if let Some(observer) = &observer {
                        observer.on_message(message);
                    }
                }
            }
            TransportEvent::MessagesUpsert {
                messages,
                kind: UpsertKind::Append,
            } => {
                trace!(
                    session_id = %self.inner.session_id,
                    count = messages.len(),
                    "Ignoring back-filled messages"
                );
            }
            TransportEvent::ContactsUpsert(contacts) => {
                self.absorb_contacts(&contacts).await;
            }
            TransportEvent::HistorySync {
                contacts,
                messages,
                is_latest,
            } => {
                debug!(
                    session_id = %self.inner.session_id,
                    contacts = contacts.len(),
                    messages = messages.len(),
                    is_latest,
                    "History sync"
                );
                self.absorb_contacts(&contacts).await;
            }
            TransportEvent::CredentialsUpdate(credentials) => {
                if let Err(e) = self
                    .inner
                    .context
                    .credentials
                    .save(&self.inner.session_id, &credentials)
                    .await
                {
                    error!(
                        session_id = %self.inner.session_id,
                        error = %e,
                        "Failed to persist rotated credentials"
                    );
                }
            }
        }
    }

    async fn handle_connection_update(&self, epoch: u64, update: ConnectionUpdate) {
        let session_id = &self.inner.session_id;

        if let Some(code) = &update.qr {
            let state = self.state();
            if state == ConnectionState::Connecting {
                info!(session_id = %session_id, "Pairing code issued");
                if let Some(observer) = self.observer() {
                    observer.on_qr_code(code);
                }
            } else {
                debug!(session_id = %session_id, %state, "Pairing code outside handshake ignored");
            }
        }

        match update.connection {
            Some(WireConnection::Connecting) => self.handle_connecting(epoch).await,
            Some(WireConnection::Open) => self.handle_open(epoch).await,
            Some(WireConnection::Close) => {
                self.handle_close(epoch, update.last_disconnect.clone()).await;
            }
            None => {}
        }

        if let Some(observer) = self.observer() {
            observer.on_connection_update(&update);
        }
    }

    async fn handle_connecting(&self, epoch: u64) {
        let applied = {
            let mut state = self.inner.state.lock();
            let current = state.is_current(epoch);
            if current {
                state.connection = ConnectionState::Connecting;
            }
            current
        };

        if applied {
            self.inner.mirror.record_status(SessionStatus::Connecting).await;
        }
    }

    async fn handle_open(&self, epoch: u64) {
        let user = {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return;
            }
            state.connection = ConnectionState::Open;
            state.attempts = 0;
            state.last_disconnect = None;
            state.handle.as_ref().and_then(|h| h.user())
        };

        info!(session_id = %self.inner.session_id, user = ?user, "Connection open");
        self.inner.mirror.record_status(SessionStatus::Connected).await;
        self.sync_contacts().await;
    }

    async fn handle_close(&self, epoch: u64, info: Option<DisconnectInfo>) {
        let session_id = &self.inner.session_id;
        let status_code = info.as_ref().and_then(|i| i.status_code);
        let message = info.as_ref().map(|i| i.message.clone()).unwrap_or_default();

        let outcome = {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return;
            }
            state.close_cycle(&self.inner.context.policy, info)
        };

        if let Some(handle) = &outcome.handle {
            handle.shutdown();
        }

        info!(session_id = %session_id, ?status_code, %message, "Connection closed");
        self.inner.mirror.record_status(SessionStatus::Disconnected).await;
        self.apply_decision(outcome.decision, outcome.epoch);
    }

    /// Mirrors the contact snapshot after an open.
    async fn sync_contacts(&self) {
        let contacts = self.contacts();
        if contacts.is_empty() {
            return;
        }
        debug!(session_id = %self.inner.session_id, count = contacts.len(), "Syncing contacts");
        self.inner.mirror.record_contacts(&contacts).await;
    }

    async fn absorb_contacts(&self, contacts: &[Contact]) {
        if contacts.is_empty() {
            return;
        }

        let merged: Vec<Contact> = {
            let mut state = self.inner.state.lock();
            contacts
                .iter()
                .map(|contact| {
                    let entry = state
                        .contacts
                        .entry(contact.id.clone())
                        .or_insert_with(|| Contact {
                            id: contact.id.clone(),
                            name: None,
                            notify: None,
                        });
                    entry.merge(contact);
                    entry.clone()
                })
                .collect()
        };

        self.inner.mirror.record_contacts(&merged).await;

        if let Some(observer) = self.observer() {
            observer.on_contacts_update(&merged);
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
    use tokio_test::assert_ok;

    use crate::persistence::MemoryStore;
    use crate::persistence::failing::BrokenStore;
    use crate::protocol::Event;
    use crate::store::{Credentials, MemoryCredentialStore};
    use crate::transport::mock::MockTransport;

    const SHORT: Duration = Duration::from_secs(5);

    struct Harness {
        manager: ConnectionManager,
        transport: Arc<MockTransport>,
        credentials: Arc<MemoryCredentialStore>,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let transport = MockTransport::new();
        let credentials = Arc::new(MemoryCredentialStore::new());
        let store = Arc::new(MemoryStore::new());

        let context = SessionContext {
            transport: transport.clone(),
            credentials: credentials.clone(),
            store: store.clone(),
            policy: ReconnectPolicy::default(),
            transport_config: TransportConfig::default(),
        };

        Harness {
            manager: ConnectionManager::new(SessionId::new("s1").expect("valid id"), context),
            transport,
            credentials,
            store,
        }
    }

    /// Lets spawned tasks run; with a paused clock this advances time only
    /// once everything else is idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    fn me() -> Jid {
        Jid::user("15550001")
    }

    fn generic_close() -> DisconnectInfo {
        DisconnectInfo::new(Some(428), "Connection Closed")
    }

    async fn open(h: &Harness) {
        h.manager.connect().await.expect("connect");
        assert!(h.transport.open(Some(me())));
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Open);
    }

    fn bridge_event(frame: serde_json::Value) -> TransportEvent {
        serde_json::from_value::<Event>(frame)
            .expect("valid frame")
            .parse()
            .expect("parse")
            .expect("consumed")
    }

    async fn status(h: &Harness) -> Option<SessionStatus> {
        h.store
            .session(h.manager.session_id())
            .await
            .expect("row")
            .map(|r| r.status)
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_is_inert() {
        let h = harness();
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(h.transport.connect_count(), 0);
        assert!(status(&h).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_open_and_authenticate() {
        let h = harness();

        h.manager.connect().await.expect("connect");
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert_eq!(status(&h).await, Some(SessionStatus::Connecting));
        assert!(!h.manager.is_authenticated());

        h.transport.open(Some(me()));
        settle().await;

        assert!(h.manager.is_authenticated());
        assert_eq!(status(&h).await, Some(SessionStatus::Connected));
        assert_eq!(h.manager.diagnostics().user, Some(me()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let h = harness();

        h.manager.connect().await.expect("connect");
        h.manager.connect().await.expect("connect again while connecting");
        assert_eq!(h.transport.connect_count(), 1);

        h.transport.open(Some(me()));
        settle().await;
        h.manager.connect().await.expect("connect again while open");
        assert_eq!(h.transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_without_identity_is_not_authenticated() {
        let h = harness();
        h.manager.connect().await.expect("connect");
        h.transport.open(None);
        settle().await;

        assert_eq!(h.manager.state(), ConnectionState::Open);
        assert!(!h.manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_authenticated_outside_open() {
        let h = harness();
        assert!(!h.manager.is_authenticated());

        open(&h).await;
        h.transport.close(generic_close());
        settle().await;

        assert_eq!(h.manager.state(), ConnectionState::Closing);
        assert!(!h.manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_close_retries_after_short_backoff() {
        let h = harness();
        open(&h).await;

        h.transport.close(generic_close());
        settle().await;
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 1);
        assert_eq!(status(&h).await, Some(SessionStatus::Disconnected));

        tokio::time::sleep(SHORT - Duration::from_millis(100)).await;
        assert_eq!(h.transport.connect_count(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.transport.connect_count(), 2);
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_compat_close_waits_for_long_backoff() {
        let h = harness();
        open(&h).await;

        h.transport
            .close(DisconnectInfo::new(None, "TypeError: bufferUtil.mask is not a function"));
        settle().await;

        tokio::time::sleep(SHORT + Duration::from_secs(1)).await;
        assert_eq!(h.transport.connect_count(), 1, "short backoff must not apply");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.transport.connect_count(), 2);
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_is_terminal() {
        let h = harness();
        h.manager.connect().await.expect("connect");

        for attempt in 1..=5 {
            h.transport.close(generic_close());
            settle().await;
            assert_eq!(h.manager.diagnostics().reconnect_attempts, attempt);
            tokio::time::sleep(SHORT + Duration::from_millis(10)).await;
            assert_eq!(h.transport.connect_count(), attempt as usize + 1);
        }

        h.transport.close(generic_close());
        settle().await;

        let diagnostics = h.manager.diagnostics();
        assert_eq!(diagnostics.state, ConnectionState::Disconnected);
        assert_eq!(diagnostics.reconnect_attempts, 0);
        assert_eq!(diagnostics.last_disconnect, Some(generic_close()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.connect_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_attempts() {
        let h = harness();
        open(&h).await;

        h.transport.close(generic_close());
        tokio::time::sleep(SHORT + Duration::from_millis(10)).await;
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 1);

        h.transport.open(Some(me()));
        settle().await;
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_close_is_terminal() {
        let h = harness();
        open(&h).await;

        h.transport.close(DisconnectInfo::logged_out());
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_connect_resets_budget_and_supersedes_retry() {
        let h = harness();
        open(&h).await;

        h.transport.close(generic_close());
        settle().await;
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 1);

        h.manager.connect().await.expect("connect");
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 0);
        assert_eq!(h.transport.connect_count(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.connect_count(), 2, "stale timer must not fire a connect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_ignores_pending_retry() {
        let h = harness();
        open(&h).await;

        h.transport.close(generic_close());
        settle().await;
        h.manager.teardown(true).await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.connect_count(), 1);
        assert!(matches!(
            h.manager.connect().await,
            Err(Error::SessionRemoved { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_logs_out_once() {
        let h = harness();
        open(&h).await;
        let handle = h.transport.handle().expect("handle");

        h.manager.disconnect().await.expect("disconnect");
        assert!(handle.is_logged_out());
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert_eq!(status(&h).await, Some(SessionStatus::Disconnected));

        h.manager.disconnect().await.expect("second disconnect is a no-op");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_keeps_pairing() {
        let h = harness();
        open(&h).await;
        let handle = h.transport.handle().expect("handle");

        h.manager.close().await;
        assert!(handle.is_shut_down());
        assert!(!handle.is_logged_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_is_reported() {
        let h = harness();
        h.transport.fail_connect_with("bridge unreachable");

        let err = h.manager.connect().await.expect_err("setup fails");
        assert!(err.is_connection_error());
        assert_eq!(h.manager.state(), ConnectionState::Error);
        assert_eq!(status(&h).await, Some(SessionStatus::Error));

        h.transport.succeed_connect();
        h.manager.connect().await.expect("explicit connect recovers");
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_retry_spends_budget() {
        let h = harness();
        open(&h).await;

        h.transport.fail_connect_with("bridge unreachable");
        h.transport.close(generic_close());
        tokio::time::sleep(SHORT + Duration::from_millis(10)).await;

        assert_eq!(h.transport.connect_count(), 2);
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 2);
        assert_eq!(h.manager.state(), ConnectionState::Closing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_leave_connection_alone() {
        let transport = MockTransport::new();
        let manager = ConnectionManager::new(
            SessionId::new("s1").expect("valid id"),
            SessionContext {
                transport: transport.clone(),
                credentials: Arc::new(MemoryCredentialStore::new()),
                store: Arc::new(BrokenStore),
                policy: ReconnectPolicy::default(),
                transport_config: TransportConfig::default(),
            },
        );
        let mut events = manager.subscribe();

        manager.connect().await.expect("connect");
        assert!(transport.open(Some(me())));
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Open);

        let inbound: Vec<WireMessage> = serde_json::from_value(json!([
            { "key": { "remoteJid": "5@s.whatsapp.net", "fromMe": false, "id": "D1" }, "message": { "conversation": "hi" } }
        ]))
        .expect("messages");
        transport.emit(TransportEvent::MessagesUpsert {
            messages: inbound,
            kind: UpsertKind::Notify,
        });
        transport.emit(TransportEvent::ContactsUpsert(vec![Contact {
            id: Jid::user("5"),
            name: Some("Five".into()),
            notify: None,
        }]));
        settle().await;

        assert_eq!(manager.state(), ConnectionState::Open);
        assert!(manager.is_authenticated());
        assert_eq!(manager.contacts().len(), 1);

        let relayed: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, SessionEvent::Message(_)))
            .collect();
        assert_eq!(relayed.len(), 1);

        assert_ok!(manager.send_text(&Jid::user("5"), "hello").await);
        assert_eq!(manager.state(), ConnectionState::Open);
        assert!(manager.is_authenticated());
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.handle().expect("handle").sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_authentication() {
        let h = harness();

        let err = h
            .manager
            .send_text(&Jid::user("2"), "hi")
            .await
            .expect_err("not connected");
        assert!(matches!(err, Error::NotConnected { .. }));
        assert!(h.store.messages(h.manager.session_id(), 10).await.expect("messages").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_mirrors_outbound_once() {
        let h = harness();
        open(&h).await;

        let sent = h.manager.send_text(&Jid::user("2"), "hello").await.expect("send");
        assert!(sent.key.from_me);

        let records = h.store.messages(h.manager.session_id(), 10).await.expect("messages");
        assert_eq!(records.len(), 1);
        assert!(records[0].is_from_me);
        assert!(!records[0].is_group);
        assert_eq!(records[0].content, "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_media_drops_audio_caption() {
        let h = harness();
        open(&h).await;

        h.manager
            .send_media(&Jid::user("2"), MediaKind::Audio, "/tmp/a.ogg", Some("ignored".into()))
            .await
            .expect("send");

        let handle = h.transport.handle().expect("handle");
        let (_, payload) = handle.sent().pop().expect("sent");
        assert_eq!(
            payload,
            MessagePayload::Media {
                kind: MediaKind::Audio,
                url: "/tmp/a.ogg".into(),
                caption: None,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_on_send_drops_handle() {
        let h = harness();
        open(&h).await;
        let handle = h.transport.handle().expect("handle");
        handle.fail_sends_with("Connection Closed: stream errored out");

        let err = h.manager.send_text(&Jid::user("2"), "x").await.expect_err("fails");
        assert!(err.is_stream_error());
        assert_eq!(h.manager.state(), ConnectionState::Disconnected);
        assert!(handle.is_shut_down());
        assert_eq!(status(&h).await, Some(SessionStatus::Error));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.transport.connect_count(), 1, "send failures are not retried");
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_send_error_keeps_session() {
        let h = harness();
        open(&h).await;
        h.transport.handle().expect("handle").fail_sends_with("rate-overlimit");

        assert!(h.manager.send_text(&Jid::user("2"), "x").await.is_err());
        assert!(h.manager.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_messages_are_mirrored_and_relayed() {
        let h = harness();
        let mut events = h.manager.subscribe();
        open(&h).await;

        let messages: Vec<WireMessage> = serde_json::from_value(json!([
            { "key": { "remoteJid": "99@g.us", "fromMe": false, "id": "G1" }, "message": { "conversation": "group" } },
            { "key": { "remoteJid": "5@s.whatsapp.net", "fromMe": false, "id": "D1" }, "message": { "conversation": "direct" } }
        ]))
        .expect("messages");

        h.transport.emit(TransportEvent::MessagesUpsert {
            messages: messages.clone(),
            kind: UpsertKind::Notify,
        });
        h.transport.emit(TransportEvent::MessagesUpsert {
            messages,
            kind: UpsertKind::Append,
        });
        settle().await;

        let records = h.store.messages(h.manager.session_id(), 10).await.expect("messages");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.is_from_me));
        let group = records.iter().find(|r| r.message_id == "G1").expect("group record");
        assert!(group.is_group);
        let direct = records.iter().find(|r| r.message_id == "D1").expect("direct record");
        assert!(!direct.is_group);

        let relayed: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| matches!(e, SessionEvent::Message(_)))
            .collect();
        assert_eq!(relayed.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_codes_relayed_once_each() {
        let h = harness();
        let mut events = h.manager.subscribe();

        h.manager.connect().await.expect("connect");
        h.transport.qr("ref-1");
        h.transport.qr("ref-2");
        settle().await;

        let codes: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter_map(|e| match e {
                SessionEvent::QrCode(code) => Some(code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, ["ref-1", "ref-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contacts_mirrored_and_synced_on_open() {
        let h = harness();
        h.manager.connect().await.expect("connect");

        h.transport.emit(TransportEvent::ContactsUpsert(vec![Contact {
            id: Jid::user("7"),
            name: Some("Old".into()),
            notify: None,
        }]));
        h.transport.emit(TransportEvent::HistorySync {
            contacts: vec![Contact {
                id: Jid::user("7"),
                name: Some("New".into()),
                notify: Some("seven".into()),
            }],
            messages: Vec::new(),
            is_latest: true,
        });
        h.transport.open(Some(me()));
        settle().await;

        let stored = h.store.contacts(h.manager.session_id()).await.expect("contacts");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name.as_deref(), Some("New"));
        assert_eq!(h.manager.contacts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_contact_update_keeps_name() {
        let h = harness();
        open(&h).await;

        let upsert = bridge_event(json!({
            "type": "event",
            "method": "contacts.upsert",
            "params": [{ "id": "7@s.whatsapp.net", "name": "Ann", "notify": "annie" }]
        }));
        let update = bridge_event(json!({
            "type": "event",
            "method": "contacts.update",
            "params": [{ "id": "7@s.whatsapp.net", "notify": "A." }]
        }));
        h.transport.emit(upsert);
        h.transport.emit(update);
        settle().await;

        let stored = h.store.contacts(h.manager.session_id()).await.expect("contacts");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name.as_deref(), Some("Ann"));
        assert_eq!(stored[0].push_name.as_deref(), Some("A."));

        let snapshot = h.manager.contacts();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name.as_deref(), Some("Ann"));
        assert_eq!(snapshot[0].notify.as_deref(), Some("A."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotated_credentials_are_saved_and_reloaded() {
        let h = harness();
        open(&h).await;

        let rotated = Credentials::new().with("creds.json", b"v2".to_vec());
        h.transport.emit(TransportEvent::CredentialsUpdate(rotated.clone()));
        settle().await;

        let stored = h
            .credentials
            .load(h.manager.session_id())
            .await
            .expect("load")
            .expect("stored");
        assert_eq!(stored, rotated);

        h.transport.close(generic_close());
        tokio::time::sleep(SHORT + Duration::from_millis(10)).await;
        assert_eq!(h.transport.last_credentials(), Some(rotated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_connects_once_with_stored_credentials() {
        let h = harness();
        h.credentials
            .save(h.manager.session_id(), &Credentials::new().with("creds.json", b"x".to_vec()))
            .await
            .expect("save");

        h.manager.refresh_connection_state().await;
        assert_eq!(h.transport.connect_count(), 1);

        h.manager.refresh_connection_state().await;
        assert_eq!(h.transport.connect_count(), 1, "connect already in flight");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_without_credentials_is_noop() {
        let h = harness();
        h.manager.refresh_connection_state().await;
        assert_eq!(h.transport.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_forces_open_for_authenticated_handle() {
        let h = harness();
        h.manager.connect().await.expect("connect");
        h.transport.handle().expect("handle").set_user(Some(me()));

        h.manager.refresh_connection_state().await;
        assert_eq!(h.manager.state(), ConnectionState::Open);
        assert!(h.manager.is_authenticated());
        assert_eq!(status(&h).await, Some(SessionStatus::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_counts_as_close() {
        let h = harness();
        open(&h).await;

        h.transport.end_stream();
        settle().await;
        assert_eq!(h.manager.state(), ConnectionState::Closing);
        assert_eq!(h.manager.diagnostics().reconnect_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups() {
        let h = harness();
        assert!(h.manager.groups().await.is_empty());
        assert!(matches!(
            h.manager.create_group("Team", &[]).await,
            Err(Error::NotConnected { .. })
        ));

        open(&h).await;
        let group = h
            .manager
            .create_group("Team", &[Jid::user("2")])
            .await
            .expect("create");
        assert!(group.id.is_group());
        assert_eq!(h.manager.groups().await, vec![group]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_observer_returns_previous() {
        let h = harness();
        let mut first = h.manager.subscribe();
        let _second = h.manager.subscribe();

        assert!(first.recv().await.is_none(), "replaced subscription ends");
        assert!(h.manager.clear_observer().is_some());
    }
}
