//! Credential blobs and the store contract.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::SessionId;

// ============================================================================
// Credentials
// ============================================================================

/// Opaque authentication material for one session.
///
/// A map of named blobs (identity keys, pre-keys, sender keys, ...). The
/// gateway never looks inside a blob; the transport owns their meaning.
/// An empty map means "no pairing yet" and makes the transport issue a
/// pairing code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Credentials {
    /// Creates empty credentials.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a blob by name.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Inserts or replaces a blob.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Adds a blob, builder style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(key, value);
        self
    }

    /// Copies every entry of `rotated` over this set.
    pub fn merge(&mut self, rotated: &Credentials) {
        for (key, value) in &rotated.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Returns the number of blobs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no blobs.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, blob)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Encodes to the bridge wire form: `{ name: base64 }`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(Base64Standard.encode(v))))
            .collect();
        Value::Object(map)
    }

    /// Decodes the bridge wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the value is not an object of base64
    /// strings.
    pub fn from_wire(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::protocol("credentials must be a JSON object"))?;

        let mut credentials = Self::new();
        for (key, encoded) in object {
            let encoded = encoded
                .as_str()
                .ok_or_else(|| Error::protocol(format!("credential {key} is not a string")))?;
            let bytes = Base64Standard
                .decode(encoded)
                .map_err(|e| Error::protocol(format!("credential {key} is not base64: {e}")))?;
            credentials.insert(key.clone(), bytes);
        }

        Ok(credentials)
    }
}

// ============================================================================
// CredentialStore
// ============================================================================

/// Persistence contract for per-session credentials.
///
/// `exists` is the single authority on whether a session has been paired
/// before; callers must not probe the backing storage themselves.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the credentials for a session, `None` if nothing is stored.
    async fn load(&self, session_id: &SessionId) -> Result<Option<Credentials>>;

    /// Writes the given entries, leaving other stored entries untouched.
    async fn save(&self, session_id: &SessionId, credentials: &Credentials) -> Result<()>;

    /// Returns `true` if any credential material is stored.
    async fn exists(&self, session_id: &SessionId) -> Result<bool>;

    /// Deletes everything stored for a session. Missing sessions are fine.
    async fn delete(&self, session_id: &SessionId) -> Result<()>;

    /// Lists sessions with stored credentials.
    async fn list(&self) -> Result<Vec<SessionId>>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_merge_overwrites_rotated_entries() {
        let mut stored = Credentials::new().with("creds", b"v1".to_vec()).with("pre-key-1", b"k".to_vec());
        let rotated = Credentials::new().with("creds", b"v2".to_vec());

        stored.merge(&rotated);

        assert_eq!(stored.get("creds"), Some(&b"v2"[..]));
        assert_eq!(stored.get("pre-key-1"), Some(&b"k"[..]));
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_wire_encoding() {
        let creds = Credentials::new().with("creds", b"hello".to_vec());
        assert_eq!(creds.to_wire(), json!({ "creds": "aGVsbG8=" }));

        let decoded = Credentials::from_wire(&creds.to_wire()).expect("decode");
        assert_eq!(decoded, creds);
    }

    #[test]
    fn test_wire_rejects_garbage() {
        assert!(Credentials::from_wire(&json!([1, 2])).is_err());
        assert!(Credentials::from_wire(&json!({ "creds": 5 })).is_err());
        assert!(Credentials::from_wire(&json!({ "creds": "***" })).is_err());
    }
}
