//! Unified message model shared by every channel adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::metadata::Metadata;

/// Identifier of one configured channel instance (e.g. a single Facebook page).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Create a new channel ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of channel an adapter speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Facebook Messenger via the Graph API.
    Facebook,
    /// RCS business messaging through an aggregator.
    Rcs,
    /// SMS/MMS through Twilio.
    Sms,
    /// Telegram Bot API.
    Telegram,
}

impl ChannelType {
    /// All channel types known to this crate.
    pub const ALL: [Self; 4] = [Self::Facebook, Self::Rcs, Self::Sms, Self::Telegram];

    /// Get string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Rcs => "rcs",
            Self::Sms => "sms",
            Self::Telegram => "telegram",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown channel type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel type: {0}")]
pub struct UnknownChannelType(pub String);

impl FromStr for ChannelType {
    type Err = UnknownChannelType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownChannelType(s.to_string()))
    }
}

/// Content type of a unified message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Plain text.
    #[default]
    Text,
    /// Image.
    Image,
    /// Video.
    Video,
    /// Audio or voice note.
    Audio,
    /// Any other file.
    Document,
    /// Geographic location.
    Location,
    /// Shared contact card.
    Contact,
    /// Provider-approved template.
    Template,
    /// Buttons, quick replies, postbacks.
    Interactive,
}

impl ContentType {
    /// Get string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Location => "location",
            Self::Contact => "contact",
            Self::Template => "template",
            Self::Interactive => "interactive",
        }
    }

    /// Whether this content type carries a media attachment.
    #[must_use]
    pub const fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio | Self::Document)
    }

    /// Resolve a content type from a MIME type.
    ///
    /// Anything that is not image, video, or audio is a document.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else {
            Self::Document
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted but not yet handed to the network.
    #[default]
    Pending,
    /// Sent to the provider network.
    Sent,
    /// Delivered to the device.
    Delivered,
    /// Read by the recipient.
    Read,
    /// Delivery failed.
    Failed,
}

impl MessageStatus {
    /// Get string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Image file.
    Image,
    /// Video file.
    Video,
    /// Audio file or voice note.
    Audio,
    /// Document/file.
    Document,
    /// Sticker.
    Sticker,
    /// Location pin.
    Location,
    /// Link preview or fallback URL.
    Link,
}

impl AttachmentKind {
    /// Attachment kind matching a unified content type.
    #[must_use]
    pub const fn for_content(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Image => Self::Image,
            ContentType::Video => Self::Video,
            ContentType::Audio => Self::Audio,
            ContentType::Location => Self::Location,
            _ => Self::Document,
        }
    }
}

/// An attachment to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment type.
    pub kind: AttachmentKind,
    /// URL (or provider file reference) of the attachment.
    pub url: String,
    /// MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// File name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// File size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Thumbnail URL (for images/videos).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Provider-specific attachment fields.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl Attachment {
    /// Create an attachment from a kind and URL.
    #[must_use]
    pub fn new(kind: AttachmentKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            mime_type: None,
            filename: None,
            size_bytes: None,
            thumbnail_url: None,
            metadata: Metadata::new(),
        }
    }

    /// Set the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Set the file name.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A normalized message received from any channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Locally generated message ID.
    pub id: String,
    /// Message ID assigned by the provider.
    pub external_id: String,
    /// Channel type the message arrived on.
    pub channel_type: ChannelType,
    /// Provider identifier of the sender.
    pub sender_id: String,
    /// Display name of the sender, when the provider sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Page, agent, or number the message was addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Resolved content type.
    pub content_type: ContentType,
    /// Text content (caption, postback title, or coordinates for locations).
    pub content: String,
    /// Ordered attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// When the provider says the message was sent.
    pub timestamp: DateTime<Utc>,
    /// Provider-specific fields.
    #[serde(default)]
    pub metadata: Metadata,
}

impl InboundMessage {
    /// Create an inbound message with a fresh local ID and the current time.
    #[must_use]
    pub fn new(
        channel_type: ChannelType,
        external_id: impl Into<String>,
        sender_id: impl Into<String>,
        content_type: ContentType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: external_id.into(),
            channel_type,
            sender_id: sender_id.into(),
            sender_name: None,
            recipient_id: None,
            content_type,
            content: content.into(),
            attachments: Vec::new(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }
}

/// A unified message to be sent through a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Local message ID, if the caller tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Conversation this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Provider identifier of the recipient.
    pub recipient_id: String,
    /// Requested content type.
    #[serde(default)]
    pub content_type: ContentType,
    /// Text content or caption.
    #[serde(default)]
    pub content: String,
    /// Media to attach.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Hints for provider-only features.
    #[serde(default)]
    pub metadata: Metadata,
}

impl OutboundMessage {
    /// Create a text message.
    #[must_use]
    pub fn text(recipient_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Create a media message with one attachment.
    #[must_use]
    pub fn media(
        recipient_id: impl Into<String>,
        content_type: ContentType,
        url: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            content_type,
            attachments: vec![Attachment::new(AttachmentKind::for_content(content_type), url)],
            ..Self::default()
        }
    }

    /// Add a metadata hint.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// First attachment, if any.
    #[must_use]
    pub fn first_attachment(&self) -> Option<&Attachment> {
        self.attachments.first()
    }
}

/// Outcome of one send attempt.
///
/// `external_id` is present iff `success`; `error` is present iff not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Whether the provider accepted the message.
    pub success: bool,
    /// Provider message ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Status reported by the provider at send time.
    pub status: MessageStatus,
    /// Human-readable failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
}

impl SendResult {
    /// A successful send.
    #[must_use]
    pub fn sent(external_id: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            success: true,
            external_id: Some(external_id.into()),
            status,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed send.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            external_id: None,
            status: MessageStatus::Failed,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// A normalized delivery report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCallback {
    /// Provider message ID the report refers to. Empty for watermark reports.
    pub external_id: String,
    /// Normalized status.
    pub status: MessageStatus,
    /// Recipient the report is about, when the provider names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Provider error description for failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the provider observed the status.
    pub timestamp: DateTime<Utc>,
}

impl StatusCallback {
    /// Create a status report for a provider message ID.
    #[must_use]
    pub fn new(external_id: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            external_id: external_id.into(),
            status,
            recipient_id: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }
}

/// Static feature descriptor of an adapter type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChannelCapabilities {
    /// Content types the adapter can send.
    pub supported_content_types: Vec<ContentType>,
    /// Supports media attachments.
    pub supports_media: bool,
    /// Supports location messages.
    pub supports_location: bool,
    /// Supports provider templates.
    pub supports_templates: bool,
    /// Supports buttons, quick replies, or rich cards.
    pub supports_interactive: bool,
    /// Supports read receipts.
    pub supports_read_receipts: bool,
    /// Supports typing indicators.
    pub supports_typing_indicator: bool,
    /// Supports reactions.
    pub supports_reactions: bool,
    /// Supports replying to a specific message.
    pub supports_replies: bool,
    /// Supports forwarding.
    pub supports_forwarding: bool,
    /// Maximum text length in characters.
    pub max_message_length: usize,
    /// Maximum media size in bytes.
    pub max_media_size: u64,
    /// Maximum attachments per message.
    pub max_attachments: usize,
    /// Accepted media MIME types.
    pub supported_media_types: Vec<String>,
}

impl ChannelCapabilities {
    /// Whether the adapter advertises support for a content type.
    #[must_use]
    pub fn supports(&self, content_type: ContentType) -> bool {
        self.supported_content_types.contains(&content_type)
    }
}

/// Lifecycle phase of an adapter instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, no configuration yet.
    #[default]
    Uninitialized,
    /// Configuration accepted, not connected.
    Initialized,
    /// Provider client live.
    Connected,
    /// Torn down after a connection.
    Disconnected,
}

/// Connection status snapshot of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Whether the adapter is connected.
    pub connected: bool,
    /// Lifecycle phase.
    pub state: LifecycleState,
    /// Time of the last successful connect.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last connect error, if the most recent attempt failed.
    pub last_error: Option<String>,
}

/// Descriptive information about an adapter type.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    /// Channel type.
    pub channel_type: ChannelType,
    /// Human-readable name.
    pub name: &'static str,
    /// Short description.
    pub description: &'static str,
    /// Adapter version.
    pub version: &'static str,
    /// Capabilities of the adapter type.
    pub capabilities: ChannelCapabilities,
}

/// Typing indicator request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    /// Recipient to show the indicator to.
    pub recipient_id: String,
    /// Start (`true`) or stop (`false`) typing.
    pub active: bool,
}

/// Read receipt request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    /// Sender whose messages are marked as read.
    pub recipient_id: String,
    /// Provider message ID being acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_channel_type_parse() {
        assert_eq!("facebook".parse::<ChannelType>().unwrap(), ChannelType::Facebook);
        assert_eq!(" SMS ".parse::<ChannelType>().unwrap(), ChannelType::Sms);
        assert!("whatsapp".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_content_type_from_mime() {
        assert_eq!(ContentType::from_mime("image/png"), ContentType::Image);
        assert_eq!(ContentType::from_mime("VIDEO/mp4"), ContentType::Video);
        assert_eq!(ContentType::from_mime("audio/ogg"), ContentType::Audio);
        assert_eq!(ContentType::from_mime("application/pdf"), ContentType::Document);
        assert_eq!(ContentType::from_mime(""), ContentType::Document);
    }

    #[test]
    fn test_send_result_invariants() {
        let ok = SendResult::sent("m1", MessageStatus::Sent);
        assert!(ok.success);
        assert_eq!(ok.external_id.as_deref(), Some("m1"));
        assert!(ok.error.is_none());

        let failed = SendResult::failed("bad recipient");
        assert!(!failed.success);
        assert!(failed.external_id.is_none());
        assert_eq!(failed.status, MessageStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("bad recipient"));
    }

    #[test]
    fn test_content_type_serde() {
        let json = serde_json::to_string(&ContentType::Interactive).unwrap();
        assert_eq!(json, "\"interactive\"");
        let status: MessageStatus = serde_json::from_str("\"delivered\"").unwrap();
        assert_eq!(status, MessageStatus::Delivered);
    }

    #[test]
    fn test_outbound_builders() {
        let msg = OutboundMessage::media("+5511999999999", ContentType::Image, "https://x/img.png")
            .with_metadata("caption", "hello");
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].kind, AttachmentKind::Image);
        assert_eq!(msg.metadata.get("caption"), Some("hello"));
    }

    #[test]
    fn test_inbound_ids_are_unique() {
        let a = InboundMessage::new(ChannelType::Sms, "SM1", "+1", ContentType::Text, "hi");
        let b = InboundMessage::new(ChannelType::Sms, "SM1", "+1", ContentType::Text, "hi");
        assert_ne!(a.id, b.id);
    }
}
