//! Bridge socket and its I/O task.
//!
//! A [`Connection`] is a cloneable front for one WebSocket to the protocol
//! bridge. The socket itself lives in a spawned event loop that:
//!
//! - writes queued requests and parks their reply channels by request id
//! - resolves replies as response frames arrive
//! - hands event frames to the [`EventHandler`] in arrival order
//! - fails every parked request once the socket ends
//!
//! A failed write means the stream can no longer be trusted: the loop
//! stops and the request fails with [`Error::StreamErrored`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Event, Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Requests allowed in flight on one socket.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Called for each event frame, on the I/O task, in arrival order.
///
/// The handler is dropped when the socket ends, which closes any channel
/// it feeds.
pub type EventHandler = Box<dyn Fn(Event) + Send + Sync>;

type ReplySender = oneshot::Sender<Result<Response>>;

/// Parked replies, shared between the front and the I/O task.
#[derive(Default)]
struct Pending {
    replies: Mutex<FxHashMap<RequestId, ReplySender>>,
}

impl Pending {
    fn len(&self) -> usize {
        self.replies.lock().len()
    }

    fn park(&self, id: RequestId, reply: ReplySender) {
        self.replies.lock().insert(id, reply);
    }

    fn take(&self, id: &RequestId) -> Option<ReplySender> {
        self.replies.lock().remove(id)
    }

    fn fail_all(&self) -> usize {
        let drained: Vec<_> = self.replies.lock().drain().collect();
        let count = drained.len();
        for (_, reply) in drained {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
        count
    }
}

/// Work queued for the I/O task.
enum Outbound {
    Request { request: Request, reply: ReplySender },
    Forget(RequestId),
    Close,
}

/// A text frame from the bridge: a reply if it carries an id, else an event.
#[derive(Deserialize)]
#[serde(untagged)]
enum BridgeFrame {
    Response(Response),
    Event(Event),
}

// ============================================================================
// Connection
// ============================================================================

/// Cloneable front for one bridge socket.
///
/// Clones share the socket; [`shutdown`](Self::shutdown) closes it for all
/// of them.
#[derive(Clone)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Arc<Pending>,
    request_timeout: Duration,
}

impl Connection {
    /// Takes ownership of an upgraded socket and starts its I/O task.
    pub fn new<S>(
        ws_stream: WebSocketStream<S>,
        event_handler: EventHandler,
        request_timeout: Duration,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let pending = Arc::new(Pending::default());

        let (sink, stream) = ws_stream.split();
        let event_loop = EventLoop {
            sink,
            stream,
            outbound: outbound_rx,
            pending: Arc::clone(&pending),
            event_handler,
        };
        tokio::spawn(event_loop.run());

        Self {
            outbound,
            pending,
            request_timeout,
        }
    }

    /// Sends a request and waits for its reply under the default timeout.
    ///
    /// # Errors
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.send_with_timeout(request, self.request_timeout).await
    }

    /// Sends a request and waits up to `limit` for its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] once the socket has ended
    /// - [`Error::StreamErrored`] if the write failed
    /// - [`Error::RequestTimeout`] if no reply arrives in time
    /// - [`Error::Protocol`] if 100 requests are already in flight
    pub async fn send_with_timeout(&self, request: Request, limit: Duration) -> Result<Response> {
        let in_flight = self.pending.len();
        if in_flight >= MAX_PENDING_REQUESTS {
            warn!(in_flight, max = MAX_PENDING_REQUESTS, "Bridge request limit reached");
            return Err(Error::protocol(format!(
                "too many requests in flight: {in_flight}/{MAX_PENDING_REQUESTS}"
            )));
        }

        let id = request.id;
        let (reply, reply_rx) = oneshot::channel();

        self.outbound
            .send(Outbound::Request { request, reply })
            .map_err(|_| Error::ConnectionClosed)?;

        match tokio::time::timeout(limit, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                let _ = self.outbound.send(Outbound::Forget(id));
                Err(Error::request_timeout(
                    id,
                    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                ))
            }
        }
    }

    /// Returns the number of requests awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` once the I/O task has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Closes the socket. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// Owns both halves of the socket for its lifetime.
struct EventLoop<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    stream: SplitStream<WebSocketStream<S>>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    pending: Arc<Pending>,
    event_handler: EventHandler,
}

impl<S> EventLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(mut self) {
        loop {
            tokio::select! {
                frame = self.stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Bridge closed the socket");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Bridge socket failed");
                        break;
                    }
                    None => {
                        debug!("Bridge socket ended");
                        break;
                    }
                },

                work = self.outbound.recv() => match work {
                    Some(Outbound::Request { request, reply }) => {
                        if !self.write(request, reply).await {
                            break;
                        }
                    }
                    Some(Outbound::Forget(id)) => {
                        self.pending.take(&id);
                        trace!(%id, "Dropped timed-out request");
                    }
                    Some(Outbound::Close) | None => {
                        let _ = self.sink.close().await;
                        break;
                    }
                },
            }
        }

        self.outbound.close();
        let failed = self.pending.fail_all();
        debug!(failed, "Bridge I/O task stopped");
    }

    fn dispatch(&self, text: &str) {
        match serde_json::from_str::<BridgeFrame>(text) {
            Ok(BridgeFrame::Response(response)) => match self.pending.take(&response.id) {
                Some(reply) => {
                    let _ = reply.send(Ok(response));
                }
                None => debug!(id = %response.id, "Reply for unknown or expired request"),
            },
            Ok(BridgeFrame::Event(event)) => (self.event_handler)(event),
            Err(e) => warn!(error = %e, frame = %text, "Unparseable bridge frame"),
        }
    }

    /// Writes one request. Returns `false` if the socket is unusable.
    async fn write(&mut self, request: Request, reply: ReplySender) -> bool {
        let id = request.id;
        let method = request.command.method();

        let json = match serde_json::to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                let _ = reply.send(Err(Error::Json(e)));
                return true;
            }
        };

        // Parked before the write so a fast reply always finds its slot.
        self.pending.park(id, reply);

        if let Err(e) = self.sink.send(Message::Text(json.into())).await {
            if let Some(reply) = self.pending.take(&id) {
                let _ = reply.send(Err(Error::stream_errored(e.to_string())));
            }
            return false;
        }

        trace!(%id, method, "Request written");
        true
    }
}

// ============================================================================
// Tests
// ============================================================================
