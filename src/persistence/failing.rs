//! Durable store that rejects every write, for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::identifiers::{Jid, SessionId};

use super::{ContactRecord, MessageRecord, SessionRow, SessionStatus, SessionStore};

/// Store whose every operation fails.
pub struct BrokenStore;

fn down<T>() -> Result<T> {
    Err(Error::persistence("store unavailable"))
}

#[async_trait]
impl SessionStore for BrokenStore {
    async fn upsert_session_status(
        &self,
        _: &SessionId,
        _: SessionStatus,
        _: DateTime<Utc>,
    ) -> Result<()> {
        down()
    }

    async fn ensure_session_row(&self, _: &SessionId) -> Result<()> {
        down()
    }

    async fn create_message_record(&self, _: MessageRecord) -> Result<()> {
        down()
    }

    async fn upsert_contact_record(
        &self,
        _: &SessionId,
        _: &Jid,
        _: Option<&str>,
        _: Option<&str>,
    ) -> Result<()> {
        down()
    }

    async fn session(&self, _: &SessionId) -> Result<Option<SessionRow>> {
        down()
    }

    async fn sessions(&self) -> Result<Vec<SessionRow>> {
        down()
    }

    async fn messages(&self, _: &SessionId, _: usize) -> Result<Vec<MessageRecord>> {
        down()
    }

    async fn contacts(&self, _: &SessionId) -> Result<Vec<ContactRecord>> {
        down()
    }

    async fn delete_session(&self, _: &SessionId) -> Result<()> {
        down()
    }
}
