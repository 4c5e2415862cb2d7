//! Aggregator-neutral RCS message model.
//!
//! Outbound messages are first lowered into [`RcsOutbound`], which every
//! backend renders into its own request schema. Inbound payloads go the
//! other way through the small builders at the bottom of this file so all
//! four aggregators produce the same unified shape.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use switchboard_core::metadata::keys::{inbound, outbound, provider};
use switchboard_core::types::{
    Attachment, AttachmentKind, ChannelType, ContentType, InboundMessage, MessageStatus,
    OutboundMessage, StatusCallback,
};

use super::RcsProvider;
use crate::signature::verify_hmac_sha256_hex;
use crate::traits::{WebhookHeaders, header};

/// Headers that may carry the body signature, in lookup order.
pub const SIGNATURE_HEADERS: [&str; 2] = ["X-Signature", "X-Hub-Signature-256"];

/// RBM accepts at most 11 suggestions per message.
pub const MAX_SUGGESTIONS: usize = 11;

/// Numbered quick replies read from metadata.
const QUICK_REPLY_SLOTS: usize = 3;

/// Media reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcsMedia {
    /// Public URL of the file.
    pub url: String,
    /// MIME type, when known.
    pub mime_type: Option<String>,
    /// File name, when known.
    pub filename: Option<String>,
}

/// Standalone rich card.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RichCard {
    /// Card title.
    pub title: Option<String>,
    /// Card body.
    pub description: Option<String>,
    /// Card media.
    pub media: Option<RcsMedia>,
}

/// Suggested reply or action attached to a message.
///
/// Deserializes from the `suggestions` metadata hint:
/// `[{"type":"reply","text":"Yes","postbackData":"yes"}]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Suggestion {
    /// Plain reply chip.
    Reply {
        /// Chip label.
        text: String,
        /// Data echoed back when tapped.
        #[serde(default)]
        postback_data: String,
    },
    /// Opens the dialer.
    Dial {
        /// Chip label.
        text: String,
        /// Number to dial.
        phone_number: String,
        /// Data echoed back when tapped.
        #[serde(default)]
        postback_data: String,
    },
    /// Opens a URL.
    Url {
        /// Chip label.
        text: String,
        /// Target URL.
        url: String,
        /// Data echoed back when tapped.
        #[serde(default)]
        postback_data: String,
    },
    /// Shows a point on a map.
    Location {
        /// Chip label.
        text: String,
        /// Latitude.
        latitude: f64,
        /// Longitude.
        longitude: f64,
        /// Pin label.
        #[serde(default)]
        label: Option<String>,
        /// Data echoed back when tapped.
        #[serde(default)]
        postback_data: String,
    },
}

impl Suggestion {
    /// Chip label.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Reply { text, .. }
            | Self::Dial { text, .. }
            | Self::Url { text, .. }
            | Self::Location { text, .. } => text,
        }
    }

    /// Postback data, falling back to the label.
    #[must_use]
    pub fn postback_data(&self) -> &str {
        let data = match self {
            Self::Reply { postback_data, .. }
            | Self::Dial { postback_data, .. }
            | Self::Url { postback_data, .. }
            | Self::Location { postback_data, .. } => postback_data,
        };
        if data.is_empty() { self.text() } else { data }
    }
}

/// A message lowered to what RCS aggregators can express.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RcsOutbound {
    /// Plain text body.
    pub text: Option<String>,
    /// Standalone media file.
    pub media: Option<RcsMedia>,
    /// Rich card. Takes precedence over text and media.
    pub card: Option<RichCard>,
    /// Suggestions, at most [`MAX_SUGGESTIONS`].
    pub suggestions: Vec<Suggestion>,
}

impl RcsOutbound {
    /// Text to show when a backend can render only one body.
    #[must_use]
    pub fn body_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or_else(|| self.card.as_ref().and_then(|c| c.description.as_deref()))
    }
}

/// Lower a unified message into the neutral RCS model.
///
/// # Errors
///
/// Returns the reason the message cannot be sent: a media message without
/// an attachment, a location without coordinates, malformed suggestions, or
/// nothing to send at all.
pub fn build_outbound(message: &OutboundMessage) -> Result<RcsOutbound, String> {
    let meta = &message.metadata;
    let content = Some(message.content.as_str()).filter(|c| !c.trim().is_empty());
    let mut out = RcsOutbound::default();

    match message.content_type {
        ContentType::Image | ContentType::Video | ContentType::Audio | ContentType::Document => {
            let attachment = message.first_attachment().ok_or_else(|| {
                format!("{} message requires an attachment", message.content_type)
            })?;
            let media = RcsMedia {
                url: attachment.url.clone(),
                mime_type: attachment.mime_type.clone(),
                filename: attachment.filename.clone(),
            };
            let caption = content.or_else(|| meta.get_non_empty(outbound::CAPTION));
            match (message.content_type, caption) {
                (ContentType::Image, Some(caption)) => {
                    out.card = Some(RichCard {
                        title: meta.get_non_empty(outbound::CARD_TITLE).map(str::to_string),
                        description: Some(caption.to_string()),
                        media: Some(media),
                    });
                }
                _ => out.media = Some(media),
            }
        }
        ContentType::Location => {
            let (Some(latitude), Some(longitude)) = (
                meta.get_f64(outbound::LATITUDE),
                meta.get_f64(outbound::LONGITUDE),
            ) else {
                return Err("location message requires latitude and longitude".to_string());
            };
            let label = meta.get_non_empty(outbound::LOCATION_NAME).map(str::to_string);
            let text = content
                .map(str::to_string)
                .or_else(|| label.clone())
                .unwrap_or_else(|| format!("{latitude}, {longitude}"));
            out.suggestions.push(Suggestion::Location {
                text: "View location".to_string(),
                latitude,
                longitude,
                label,
                postback_data: String::new(),
            });
            out.text = Some(text);
        }
        _ => {
            if let Some(title) = meta.get_non_empty(outbound::CARD_TITLE) {
                out.card = Some(RichCard {
                    title: Some(title.to_string()),
                    description: meta
                        .get_non_empty(outbound::CARD_DESCRIPTION)
                        .or(content)
                        .map(str::to_string),
                    media: meta.get_non_empty(outbound::CARD_MEDIA_URL).map(|url| RcsMedia {
                        url: url.to_string(),
                        mime_type: meta
                            .get_non_empty(outbound::CARD_MEDIA_TYPE)
                            .map(str::to_string),
                        filename: None,
                    }),
                });
            } else {
                out.text = content.map(str::to_string);
            }
        }
    }

    if let Some(raw) = meta.get_non_empty(outbound::SUGGESTIONS) {
        let parsed: Vec<Suggestion> =
            serde_json::from_str(raw).map_err(|e| format!("invalid suggestions: {e}"))?;
        out.suggestions.extend(parsed);
    }
    for n in 1..=QUICK_REPLY_SLOTS {
        if let Some(text) = meta.get_non_empty(&outbound::quick_reply(n)) {
            out.suggestions.push(Suggestion::Reply {
                text: text.to_string(),
                postback_data: meta
                    .get(&outbound::quick_reply_data(n))
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }
    out.suggestions.truncate(MAX_SUGGESTIONS);

    if out.text.is_none() && out.media.is_none() && out.card.is_none() {
        return Err("message has no content".to_string());
    }
    Ok(out)
}

/// Verify the body signature against whichever header is present.
#[must_use]
pub fn verify_signature(secret: &str, headers: &WebhookHeaders, body: &[u8]) -> bool {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| header(headers, name))
        .is_some_and(|signature| verify_hmac_sha256_hex(secret.as_bytes(), body, signature))
}

/// Parse the timestamp formats aggregators use.
///
/// Accepts RFC 3339 and the `+0000` offset style Infobip sends.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

// Inbound builders shared by the backends

/// Start a text message from an aggregator.
pub(crate) fn inbound_message(
    rcs: RcsProvider,
    external_id: &str,
    sender: &str,
    recipient: Option<&str>,
    timestamp: Option<&str>,
) -> InboundMessage {
    let mut msg = InboundMessage::new(
        ChannelType::Rcs,
        external_id,
        sender,
        ContentType::Text,
        String::new(),
    );
    msg.recipient_id = recipient.filter(|r| !r.is_empty()).map(str::to_string);
    if let Some(at) = timestamp.and_then(parse_timestamp) {
        msg.timestamp = at;
    }
    msg.metadata.insert(provider::RCS_PROVIDER, rcs.as_str());
    msg
}

/// Attach a received file. The MIME type decides the content type.
pub(crate) fn set_media(
    msg: &mut InboundMessage,
    url: &str,
    mime_type: Option<&str>,
    filename: Option<&str>,
) {
    let content_type = ContentType::from_mime(mime_type.unwrap_or_default());
    let mut attachment = Attachment::new(AttachmentKind::for_content(content_type), url);
    attachment.mime_type = mime_type.filter(|m| !m.is_empty()).map(str::to_string);
    attachment.filename = filename.filter(|f| !f.is_empty()).map(str::to_string);
    msg.content_type = content_type;
    msg.attachments.push(attachment);
}

/// Turn the message into a shared location.
pub(crate) fn set_location(
    msg: &mut InboundMessage,
    latitude: f64,
    longitude: f64,
    label: Option<&str>,
) {
    msg.content_type = ContentType::Location;
    msg.content = label
        .filter(|l| !l.is_empty())
        .map_or_else(|| format!("{latitude},{longitude}"), str::to_string);
    msg.metadata.insert(inbound::LATITUDE, latitude.to_string());
    msg.metadata.insert(inbound::LONGITUDE, longitude.to_string());
}

/// Turn the message into a tapped suggestion.
pub(crate) fn set_suggestion(msg: &mut InboundMessage, text: &str, postback_data: &str) {
    msg.content_type = ContentType::Interactive;
    msg.content = text.to_string();
    msg.metadata.insert(inbound::POSTBACK_DATA, postback_data);
    msg.metadata.insert(inbound::SUGGESTION_TEXT, text);
}

/// Keep a content kind we have no unified type for.
pub(crate) fn set_unmapped(msg: &mut InboundMessage, raw_type: &str, raw: &serde_json::Value) {
    msg.content_type = ContentType::Text;
    msg.metadata.insert(provider::RAW_TYPE, raw_type);
    msg.metadata.insert(provider::RAW_PAYLOAD, raw.to_string());
}

/// Build a delivery report.
pub(crate) fn status_callback(
    external_id: &str,
    status: MessageStatus,
    recipient: Option<&str>,
    timestamp: Option<&str>,
    error_message: Option<String>,
) -> StatusCallback {
    let mut callback = StatusCallback::new(external_id, status);
    callback.recipient_id = recipient.filter(|r| !r.is_empty()).map(str::to_string);
    if let Some(at) = timestamp.and_then(parse_timestamp) {
        callback.timestamp = at;
    }
    callback.error_message = error_message.filter(|e| !e.is_empty());
    callback
}
