//! Message, contact and group payload types.
//!
//! These mirror the protocol's JSON shapes closely enough to travel over
//! the bridge unchanged, while exposing the few derived facts the gateway
//! needs: content type, a text summary, and group classification.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::identifiers::{Jid, MessageId};

// ============================================================================
// Constants
// ============================================================================

/// Summary used when a message carries media without a caption.
pub const MEDIA_PLACEHOLDER: &str = "[Media Message]";

/// Content type used when a message has no recognizable content.
pub const UNKNOWN_TYPE: &str = "unknown";

/// Content keys that accompany real content and never describe it.
const AUXILIARY_KEYS: &[&str] = &["senderKeyDistributionMessage", "messageContextInfo"];

// ============================================================================
// MessageKey
// ============================================================================

/// Identifies a message within a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    /// Chat the message belongs to.
    #[serde(default)]
    pub remote_jid: Option<Jid>,

    /// Whether the linked device's account sent it.
    #[serde(default)]
    pub from_me: bool,

    /// Protocol message id.
    #[serde(default)]
    pub id: Option<MessageId>,

    /// Sender inside a group chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Jid>,
}

// ============================================================================
// Content
// ============================================================================

/// Text body of an extended text message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedText {
    /// Message text.
    #[serde(default)]
    pub text: Option<String>,
}

/// Media attachment descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    /// Optional caption (image and video only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,

    /// Download URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Protocol message content.
///
/// Known content kinds are typed; anything else is preserved in `other`
/// so the content type can still be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    /// Plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,

    /// Text with link preview or quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_text_message: Option<ExtendedText>,

    /// Image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_message: Option<MediaContent>,

    /// Video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_message: Option<MediaContent>,

    /// Audio or voice note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_message: Option<MediaContent>,

    /// Document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_message: Option<MediaContent>,

    /// Sticker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_message: Option<MediaContent>,

    /// Other content kinds, keyed by protocol name.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl MessageContent {
    /// Creates plain text content.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            conversation: Some(text.into()),
            ..Default::default()
        }
    }

    /// Returns the protocol content key describing this message.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        let typed = [
            ("conversation", self.conversation.is_some()),
            ("extendedTextMessage", self.extended_text_message.is_some()),
            ("imageMessage", self.image_message.is_some()),
            ("videoMessage", self.video_message.is_some()),
            ("audioMessage", self.audio_message.is_some()),
            ("documentMessage", self.document_message.is_some()),
            ("stickerMessage", self.sticker_message.is_some()),
        ];

        if let Some(&(key, _)) = typed.iter().find(|&&(_, present)| present) {
            return Some(key);
        }

        self.other
            .keys()
            .map(String::as_str)
            .find(|key| !AUXILIARY_KEYS.contains(key))
    }

    /// Returns a human-readable summary of the content.
    ///
    /// Text wins over captions; media without caption collapses to
    /// [`MEDIA_PLACEHOLDER`].
    #[must_use]
    pub fn summary(&self) -> String {
        if let Some(text) = self.conversation.as_ref().filter(|t| !t.is_empty()) {
            return text.clone();
        }

        let caption = self
            .extended_text_message
            .as_ref()
            .and_then(|m| m.text.as_ref())
            .or_else(|| self.image_message.as_ref().and_then(|m| m.caption.as_ref()))
            .or_else(|| self.video_message.as_ref().and_then(|m| m.caption.as_ref()));

        match caption {
            Some(text) if !text.is_empty() => text.clone(),
            _ => MEDIA_PLACEHOLDER.to_string(),
        }
    }
}

// ============================================================================
// WireMessage
// ============================================================================

/// A protocol message as delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Message key.
    pub key: MessageKey,

    /// Content, absent for protocol stubs.
    #[serde(default)]
    pub message: Option<MessageContent>,

    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub message_timestamp: Option<i64>,

    /// Sender's push name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
}

impl WireMessage {
    /// Returns the content type, or [`UNKNOWN_TYPE`].
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.message
            .as_ref()
            .and_then(MessageContent::content_type)
            .unwrap_or(UNKNOWN_TYPE)
    }

    /// Returns the content summary, empty when there is no content.
    #[must_use]
    pub fn summary(&self) -> String {
        self.message
            .as_ref()
            .map(MessageContent::summary)
            .unwrap_or_default()
    }

    /// Returns `true` if the chat is a group.
    #[inline]
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.key.remote_jid.as_ref().is_some_and(Jid::is_group)
    }

    /// Returns the message time, falling back to the Unix epoch.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.message_timestamp
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

// ============================================================================
// Outbound payloads
// ============================================================================

/// Kind of media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Image file.
    Image,
    /// Video file.
    Video,
    /// Audio file.
    Audio,
    /// Arbitrary document.
    Document,
}

impl MediaKind {
    /// Returns the protocol content key for this kind.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    /// Returns `true` if the protocol accepts a caption for this kind.
    #[inline]
    #[must_use]
    pub const fn supports_caption(self) -> bool {
        matches!(self, Self::Image | Self::Video)
    }
}

/// Content handed to the transport for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    /// Plain text.
    Text {
        /// Message text.
        text: String,
    },
    /// Media by URL or local path.
    Media {
        /// Attachment kind.
        kind: MediaKind,
        /// Location of the media.
        url: String,
        /// Caption, already dropped for kinds that do not support it.
        caption: Option<String>,
    },
}

impl MessagePayload {
    /// Creates a text payload.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Creates a media payload.
    ///
    /// The caption is discarded for audio and documents.
    #[must_use]
    pub fn media(kind: MediaKind, url: impl Into<String>, caption: Option<String>) -> Self {
        Self::Media {
            kind,
            url: url.into(),
            caption: caption.filter(|_| kind.supports_caption()),
        }
    }

    /// Converts to the protocol's send-content JSON shape.
    #[must_use]
    pub fn to_content(&self) -> Value {
        match self {
            Self::Text { text } => json!({ "text": text }),
            Self::Media { kind, url, caption } => {
                let mut content = Map::new();
                content.insert(kind.as_str().to_string(), json!({ "url": url }));
                if let Some(caption) = caption {
                    content.insert("caption".to_string(), Value::String(caption.clone()));
                }
                Value::Object(content)
            }
        }
    }
}

// ============================================================================
// Contacts & Groups
// ============================================================================

/// Contact data delivered by the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Contact address.
    pub id: Jid,

    /// Name from the address book.
    #[serde(default)]
    pub name: Option<String>,

    /// Push name the contact chose.
    #[serde(default)]
    pub notify: Option<String>,
}

impl Contact {
    /// Folds `update` into this contact. Fields the update leaves out keep
    /// their current value, so a partial `contacts.update` never erases a
    /// known name.
    pub fn merge(&mut self, update: &Contact) {
        if update.name.is_some() {
            self.name.clone_from(&update.name);
        }
        if update.notify.is_some() {
            self.notify.clone_from(&update.notify);
        }
    }
}

/// Group participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParticipant {
    /// Participant address.
    pub id: Jid,

    /// `admin` or `superadmin` when elevated.
    #[serde(default)]
    pub admin: Option<String>,
}

/// Group metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadata {
    /// Group address.
    pub id: Jid,

    /// Group title.
    #[serde(default)]
    pub subject: String,

    /// Creator.
    #[serde(default)]
    pub owner: Option<Jid>,

    /// Creation time in seconds.
    #[serde(default)]
    pub creation: Option<i64>,

    /// Members.
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

// ============================================================================
// Tests
// ============================================================================
