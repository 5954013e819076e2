//! In-memory durable store.
//!
//! Behaves like the relational store it stands in for: messages and
//! contacts reference a session row, and deleting the row cascades.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::identifiers::{Jid, SessionId};

use super::SessionStore;
use super::records::{ContactRecord, MessageRecord, SessionRow, SessionStatus};

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Debug, Default)]
struct Tables {
    sessions: FxHashMap<SessionId, SessionRow>,
    messages: FxHashMap<SessionId, Vec<MessageRecord>>,
    contacts: FxHashMap<SessionId, BTreeMap<Jid, ContactRecord>>,
}

/// [`SessionStore`] held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn require_row(tables: &Tables, session_id: &SessionId) -> Result<()> {
        if tables.sessions.contains_key(session_id) {
            Ok(())
        } else {
            Err(Error::persistence(format!(
                "no session row for {session_id}"
            )))
        }
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn upsert_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        last_seen: DateTime<Utc>,
    ) -> Result<()> {
        self.tables
            .write()
            .sessions
            .entry(session_id.clone())
            .and_modify(|row| row.set_status(status, last_seen))
            .or_insert_with(|| SessionRow::new(session_id.clone(), status, last_seen));
        Ok(())
    }

    async fn ensure_session_row(&self, session_id: &SessionId) -> Result<()> {
        let now = Utc::now();
        self.tables
            .write()
            .sessions
            .entry(session_id.clone())
            .and_modify(|row| row.last_seen = now)
            .or_insert_with(|| SessionRow::new(session_id.clone(), SessionStatus::Connected, now));
        Ok(())
    }

    async fn create_message_record(&self, record: MessageRecord) -> Result<()> {
        let mut tables = self.tables.write();
        Self::require_row(&tables, &record.session_id)?;
        tables
            .messages
            .entry(record.session_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn upsert_contact_record(
        &self,
        session_id: &SessionId,
        jid: &Jid,
        name: Option<&str>,
        push_name: Option<&str>,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        Self::require_row(&tables, session_id)?;
        let record = tables
            .contacts
            .entry(session_id.clone())
            .or_default()
            .entry(jid.clone())
            .or_insert_with(|| ContactRecord {
                session_id: session_id.clone(),
                jid: jid.clone(),
                name: None,
                push_name: None,
            });
        if let Some(name) = name {
            record.name = Some(name.to_string());
        }
        if let Some(push_name) = push_name {
            record.push_name = Some(push_name.to_string());
        }
        Ok(())
    }

    async fn session(&self, session_id: &SessionId) -> Result<Option<SessionRow>> {
        Ok(self.tables.read().sessions.get(session_id).cloned())
    }

    async fn sessions(&self) -> Result<Vec<SessionRow>> {
        let mut rows: Vec<_> = self.tables.read().sessions.values().cloned().collect();
        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(rows)
    }

    async fn messages(&self, session_id: &SessionId, limit: usize) -> Result<Vec<MessageRecord>> {
        let tables = self.tables.read();
        let Some(messages) = tables.messages.get(session_id) else {
            return Ok(Vec::new());
        };

        // Stable sort keeps insertion order among equal timestamps; reverse
        // so the latest write wins ties.
        let mut newest: Vec<_> = messages.iter().rev().cloned().collect();
        newest.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        newest.truncate(limit);
        Ok(newest)
    }

    async fn contacts(&self, session_id: &SessionId) -> Result<Vec<ContactRecord>> {
        Ok(self
            .tables
            .read()
            .contacts
            .get(session_id)
            .map(|contacts| contacts.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let mut tables = self.tables.write();
        tables.sessions.remove(session_id);
        tables.messages.remove(session_id);
        tables.contacts.remove(session_id);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn session() -> SessionId {
        SessionId::new("store").expect("valid id")
    }

    fn record(id: &str, secs: i64) -> MessageRecord {
        MessageRecord {
            message_id: id.to_string(),
            session_id: session(),
            remote_jid: "1@s.whatsapp.net".to_string(),
            message_type: "conversation".to_string(),
            content: id.to_string(),
            is_from_me: false,
            is_group: false,
            timestamp: Utc.timestamp_opt(secs, 0).single().expect("timestamp"),
        }
    }

    #[tokio::test]
    async fn test_status_upsert_creates_then_updates() {
        let store = MemoryStore::new();
        let id = session();

        store
            .upsert_session_status(&id, SessionStatus::Connecting, Utc::now())
            .await
            .expect("upsert");
        store
            .upsert_session_status(&id, SessionStatus::Connected, Utc::now())
            .await
            .expect("upsert");

        let rows = store.sessions().await.expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, SessionStatus::Connected);
        assert!(rows[0].is_connected);
    }

    #[tokio::test]
    async fn test_ensure_row_keeps_existing_status() {
        let store = MemoryStore::new();
        let id = session();

        store.ensure_session_row(&id).await.expect("ensure");
        assert_eq!(
            store.session(&id).await.expect("row").map(|r| r.status),
            Some(SessionStatus::Connected)
        );

        store
            .upsert_session_status(&id, SessionStatus::Disconnected, Utc::now())
            .await
            .expect("upsert");
        store.ensure_session_row(&id).await.expect("ensure");
        assert_eq!(
            store.session(&id).await.expect("row").map(|r| r.status),
            Some(SessionStatus::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_message_requires_session_row() {
        let store = MemoryStore::new();
        let err = store
            .create_message_record(record("A", 1))
            .await
            .expect_err("no row");
        assert!(matches!(err, Error::Persistence { .. }));
    }

    #[tokio::test]
    async fn test_messages_newest_first_with_limit() {
        let store = MemoryStore::new();
        let id = session();
        store.ensure_session_row(&id).await.expect("ensure");

        for (name, secs) in [("A", 10), ("B", 30), ("C", 20)] {
            store.create_message_record(record(name, secs)).await.expect("create");
        }

        let latest = store.messages(&id, 2).await.expect("messages");
        let ids: Vec<_> = latest.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(ids, ["B", "C"]);
    }

    #[tokio::test]
    async fn test_contact_upsert_is_last_writer_wins() {
        let store = MemoryStore::new();
        let id = session();
        let jid = Jid::user("42");
        store.ensure_session_row(&id).await.expect("ensure");

        store
            .upsert_contact_record(&id, &jid, Some("Old"), None)
            .await
            .expect("upsert");
        store
            .upsert_contact_record(&id, &jid, Some("New"), Some("push"))
            .await
            .expect("upsert");

        let contacts = store.contacts(&id).await.expect("contacts");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name.as_deref(), Some("New"));
        assert_eq!(contacts[0].push_name.as_deref(), Some("push"));
    }

    #[tokio::test]
    async fn test_contact_upsert_keeps_fields_left_out() {
        let store = MemoryStore::new();
        let id = session();
        let jid = Jid::user("7");
        store.ensure_session_row(&id).await.expect("ensure");

        store
            .upsert_contact_record(&id, &jid, Some("Ann"), Some("annie"))
            .await
            .expect("upsert");
        store
            .upsert_contact_record(&id, &jid, None, Some("A."))
            .await
            .expect("upsert");

        let contacts = store.contacts(&id).await.expect("contacts");
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name.as_deref(), Some("Ann"));
        assert_eq!(contacts[0].push_name.as_deref(), Some("A."));
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = MemoryStore::new();
        let id = session();
        store.ensure_session_row(&id).await.expect("ensure");
        store.create_message_record(record("A", 1)).await.expect("create");
        store
            .upsert_contact_record(&id, &Jid::user("1"), None, None)
            .await
            .expect("upsert");

        store.delete_session(&id).await.expect("delete");

        assert!(store.session(&id).await.expect("row").is_none());
        assert!(store.messages(&id, 10).await.expect("messages").is_empty());
        assert!(store.contacts(&id).await.expect("contacts").is_empty());
    }
}
