//! Session observers.
//!
//! Each manager has one observer slot. Observers are called synchronously
//! from the manager's event loop, in event order, so they must not block.
//! Use [`ChannelObserver`] (via `ConnectionManager::subscribe`) to hand
//! events to async code instead.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::protocol::{Contact, ConnectionUpdate, WireMessage};

// ============================================================================
// SessionObserver
// ============================================================================

/// Receives a session's pairing codes, connection updates, messages and
/// contact changes.
pub trait SessionObserver: Send + Sync {
    /// A pairing code to render as QR. Called once per code.
    fn on_qr_code(&self, _code: &str) {}

    /// Raw connection update, after the manager applied it.
    fn on_connection_update(&self, _update: &ConnectionUpdate) {}

    /// New inbound message.
    fn on_message(&self, _message: &WireMessage) {}

    /// Contact data delivered incrementally or by history sync.
    fn on_contacts_update(&self, _contacts: &[Contact]) {}
}

// ============================================================================
// ChannelObserver
// ============================================================================

/// An observed session event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QrCode(String),
    ConnectionUpdate(ConnectionUpdate),
    Message(WireMessage),
    ContactsUpdate(Vec<Contact>),
}

/// Observer that forwards every callback into an unbounded channel.
///
/// Dropping the observer (for example when another one replaces it) ends
/// the receiver's stream.
#[derive(Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_qr_code(&self, code: &str) {
        self.forward(SessionEvent::QrCode(code.to_string()));
    }

    fn on_connection_update(&self, update: &ConnectionUpdate) {
        self.forward(SessionEvent::ConnectionUpdate(update.clone()));
    }

    fn on_message(&self, message: &WireMessage) {
        self.forward(SessionEvent::Message(message.clone()));
    }

    fn on_contacts_update(&self, contacts: &[Contact]) {
        self.forward(SessionEvent::ContactsUpdate(contacts.to_vec()));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::Jid;

    #[test]
    fn test_channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();

        observer.on_qr_code("2@abc");
        observer.on_contacts_update(&[Contact {
            id: Jid::user("1"),
            name: None,
            notify: None,
        }]);

        assert_eq!(rx.try_recv().ok(), Some(SessionEvent::QrCode("2@abc".into())));
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::ContactsUpdate(c)) if c.len() == 1));
    }

    #[test]
    fn test_dropping_observer_closes_stream() {
        let (observer, mut rx) = ChannelObserver::new();
        drop(observer);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
