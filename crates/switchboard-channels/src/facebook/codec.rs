//! Messenger webhook and Send API wire formats.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use switchboard_core::metadata::keys::{inbound, outbound, provider};
use switchboard_core::types::{
    Attachment, AttachmentKind, ChannelType, ContentType, InboundMessage, MessageStatus,
    OutboundMessage, StatusCallback,
};

use crate::signature::{SHA256_PREFIX, verify_hmac_sha256_hex};
use crate::traits::{ChannelError, WebhookEvents};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Messenger allows at most 13 quick replies.
const MAX_QUICK_REPLIES: usize = 13;

/// Generic template titles are capped at 80 characters.
const MAX_TEMPLATE_TITLE: usize = 80;

// Inbound wire types

/// Top-level webhook body.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    object: String,
    #[serde(default)]
    entry: Vec<Entry>,
}

/// One page entry.
#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
    #[serde(default)]
    standby: Vec<MessagingEvent>,
}

/// One messaging event.
#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: Party,
    recipient: Party,
    #[serde(default)]
    timestamp: i64,
    message: Option<Message>,
    delivery: Option<Delivery>,
    read: Option<Read>,
    postback: Option<Postback>,
}

#[derive(Debug, Deserialize)]
struct Party {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    mid: String,
    text: Option<String>,
    #[serde(default)]
    is_echo: bool,
    quick_reply: Option<QuickReplyPayload>,
    reply_to: Option<ReplyTo>,
    #[serde(default)]
    attachments: Vec<WireAttachment>,
}

#[derive(Debug, Deserialize)]
struct QuickReplyPayload {
    payload: String,
}

#[derive(Debug, Deserialize)]
struct ReplyTo {
    mid: String,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<WirePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePayload {
    url: Option<String>,
    coordinates: Option<Coordinates>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Coordinates {
    lat: f64,
    long: f64,
}

#[derive(Debug, Deserialize)]
struct Delivery {
    #[serde(default)]
    mids: Vec<String>,
    #[serde(default)]
    watermark: i64,
}

#[derive(Debug, Deserialize)]
struct Read {
    #[serde(default)]
    watermark: i64,
}

#[derive(Debug, Deserialize)]
struct Postback {
    #[serde(default)]
    title: String,
    #[serde(default)]
    payload: String,
    mid: Option<String>,
}

/// Parse a webhook body into unified events.
///
/// Echoes of our own messages are dropped. Valid JSON that is not a page
/// webhook yields no events.
pub fn parse_webhook(body: &[u8]) -> Result<WebhookEvents, ChannelError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ChannelError::Parse(e.to_string()))?;
    let Ok(payload) = serde_json::from_value::<WebhookPayload>(value) else {
        return Ok(WebhookEvents::default());
    };
    if payload.object != "page" {
        return Ok(WebhookEvents::default());
    }

    let mut events = WebhookEvents::default();
    for entry in payload.entry {
        for event in entry.messaging.into_iter().chain(entry.standby) {
            collect_event(event, &mut events);
        }
    }
    Ok(events)
}

fn collect_event(event: MessagingEvent, events: &mut WebhookEvents) {
    let timestamp = from_millis(event.timestamp);

    if let Some(message) = event.message {
        if !message.is_echo {
            events
                .messages
                .push(inbound_message(&event.sender, &event.recipient, timestamp, message));
        }
    }

    if let Some(postback) = event.postback {
        let mut msg = InboundMessage::new(
            ChannelType::Facebook,
            postback.mid.unwrap_or_default(),
            &event.sender.id,
            ContentType::Interactive,
            postback.title,
        );
        msg.recipient_id = Some(event.recipient.id.clone());
        msg.timestamp = timestamp;
        msg.metadata.insert(inbound::POSTBACK_PAYLOAD, postback.payload);
        msg.metadata.insert(inbound::PAGE_ID, &event.recipient.id);
        events.messages.push(msg);
    }

    if let Some(delivery) = event.delivery {
        let at = if delivery.watermark > 0 {
            from_millis(delivery.watermark)
        } else {
            timestamp
        };
        for mid in delivery.mids {
            let mut status = StatusCallback::new(mid, MessageStatus::Delivered);
            status.recipient_id = Some(event.sender.id.clone());
            status.timestamp = at;
            events.statuses.push(status);
        }
    }

    if let Some(read) = event.read {
        // Everything sent to this user before the watermark is read
        let mut status = StatusCallback::new("", MessageStatus::Read);
        status.recipient_id = Some(event.sender.id.clone());
        status.timestamp = from_millis(read.watermark);
        events.statuses.push(status);
    }
}

fn inbound_message(
    sender: &Party,
    recipient: &Party,
    timestamp: DateTime<Utc>,
    message: Message,
) -> InboundMessage {
    let content_type = message
        .attachments
        .first()
        .map_or(ContentType::Text, |a| map_content_type(&a.kind));

    let mut msg = InboundMessage::new(
        ChannelType::Facebook,
        message.mid,
        &sender.id,
        content_type,
        message.text.unwrap_or_default(),
    );
    msg.recipient_id = Some(recipient.id.clone());
    msg.timestamp = timestamp;
    msg.metadata.insert(inbound::PAGE_ID, &recipient.id);

    if let Some(quick_reply) = message.quick_reply {
        msg.metadata
            .insert(inbound::QUICK_REPLY_PAYLOAD, quick_reply.payload);
    }
    if let Some(reply_to) = message.reply_to {
        msg.metadata.insert(inbound::REPLY_TO_ID, reply_to.mid);
    }

    for attachment in message.attachments {
        let payload = attachment.payload.unwrap_or_default();
        if let Some(coords) = payload.coordinates {
            msg.metadata.insert(inbound::LATITUDE, coords.lat.to_string());
            msg.metadata.insert(inbound::LONGITUDE, coords.long.to_string());
            if msg.content.is_empty() {
                msg.content = format!("{},{}", coords.lat, coords.long);
            }
        }
        if content_type_for(&attachment.kind).is_none() {
            msg.metadata.insert(provider::RAW_TYPE, &attachment.kind);
            if let Some(title) = &payload.title {
                msg.metadata.insert(provider::RAW_PAYLOAD, title);
            }
        }
        if let Some(url) = payload.url {
            msg.attachments
                .push(Attachment::new(attachment_kind(&attachment.kind), url));
        }
    }

    msg
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

/// Messenger attachment type to unified content type, if recognized.
#[must_use]
pub fn content_type_for(fb_type: &str) -> Option<ContentType> {
    match fb_type {
        "image" => Some(ContentType::Image),
        "video" => Some(ContentType::Video),
        "audio" => Some(ContentType::Audio),
        "file" => Some(ContentType::Document),
        "location" => Some(ContentType::Location),
        _ => None,
    }
}

/// Total mapping: unrecognized types become text.
#[must_use]
pub fn map_content_type(fb_type: &str) -> ContentType {
    content_type_for(fb_type).unwrap_or(ContentType::Text)
}

/// Messenger attachment type to unified attachment kind.
#[must_use]
pub fn attachment_kind(fb_type: &str) -> AttachmentKind {
    match fb_type {
        "image" => AttachmentKind::Image,
        "video" => AttachmentKind::Video,
        "audio" => AttachmentKind::Audio,
        "location" => AttachmentKind::Location,
        "fallback" => AttachmentKind::Link,
        _ => AttachmentKind::Document,
    }
}

/// Unified content type to Messenger attachment type.
const fn attachment_type_for(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Image => "image",
        ContentType::Video => "video",
        ContentType::Audio => "audio",
        _ => "file",
    }
}

/// Verify `X-Hub-Signature-256`. The `sha256=` prefix is mandatory.
#[must_use]
pub fn verify_signature(app_secret: &str, body: &[u8], header: &str) -> bool {
    header.trim().starts_with(SHA256_PREFIX)
        && verify_hmac_sha256_hex(app_secret.as_bytes(), body, header)
}

// Outbound wire types

/// Send API request.
#[derive(Debug, Serialize, PartialEq)]
pub struct SendRequest {
    recipient: Recipient,
    messaging_type: String,
    message: MessagePayload,
}

/// Sender action request (typing, seen).
#[derive(Debug, Serialize)]
pub struct SenderActionRequest {
    recipient: Recipient,
    sender_action: &'static str,
}

impl SenderActionRequest {
    /// Create a sender action for a recipient.
    #[must_use]
    pub fn new(recipient_id: &str, action: &'static str) -> Self {
        Self {
            recipient: Recipient {
                id: recipient_id.to_string(),
            },
            sender_action: action,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct Recipient {
    id: String,
}

#[derive(Debug, Default, Serialize, PartialEq)]
struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<OutgoingAttachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    quick_replies: Vec<QuickReply>,
}

#[derive(Debug, Serialize, PartialEq)]
struct OutgoingAttachment {
    #[serde(rename = "type")]
    kind: &'static str,
    payload: OutgoingPayload,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum OutgoingPayload {
    Media { url: String, is_reusable: bool },
    Template {
        template_type: &'static str,
        elements: Vec<TemplateElement>,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct TemplateElement {
    title: String,
    image_url: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct QuickReply {
    content_type: &'static str,
    title: String,
    payload: String,
}

/// Build a Send API request from a unified message.
///
/// Features Messenger lacks degrade: image captions become a generic
/// template, locations become a text line with a map link, interactive,
/// template, and contact content is sent as text with quick replies.
///
/// # Errors
///
/// Returns a reason string when the message has nothing sendable.
pub fn build_send_request(message: &OutboundMessage) -> Result<SendRequest, String> {
    let meta = &message.metadata;
    let caption = Some(message.content.trim())
        .filter(|c| !c.is_empty())
        .or_else(|| meta.get_non_empty(outbound::CAPTION));

    let mut payload = MessagePayload::default();

    match message.content_type {
        ContentType::Image | ContentType::Video | ContentType::Audio | ContentType::Document => {
            let url = message
                .first_attachment()
                .map(|a| a.url.clone())
                .or_else(|| meta.get_non_empty(outbound::CARD_MEDIA_URL).map(str::to_string))
                .ok_or_else(|| format!("{} message has no attachment url", message.content_type))?;

            payload.attachment = Some(match (message.content_type, caption) {
                (ContentType::Image, Some(caption)) => OutgoingAttachment {
                    kind: "template",
                    payload: OutgoingPayload::Template {
                        template_type: "generic",
                        elements: vec![TemplateElement {
                            title: caption.chars().take(MAX_TEMPLATE_TITLE).collect(),
                            image_url: url,
                        }],
                    },
                },
                (content_type, _) => OutgoingAttachment {
                    kind: attachment_type_for(content_type),
                    payload: OutgoingPayload::Media {
                        url,
                        is_reusable: true,
                    },
                },
            });
        }
        ContentType::Location => {
            payload.text = Some(location_text(message).ok_or("location message has no coordinates")?);
        }
        ContentType::Text
        | ContentType::Interactive
        | ContentType::Template
        | ContentType::Contact => {
            let text = message.content.trim();
            if text.is_empty() {
                return Err("message has no text content".to_string());
            }
            payload.text = Some(text.to_string());
            payload.quick_replies = quick_replies(message);
        }
    }

    Ok(SendRequest {
        recipient: Recipient {
            id: message.recipient_id.clone(),
        },
        messaging_type: meta
            .get_non_empty(outbound::MESSAGING_TYPE)
            .unwrap_or("RESPONSE")
            .to_string(),
        message: payload,
    })
}

fn location_text(message: &OutboundMessage) -> Option<String> {
    let meta = &message.metadata;
    let (Some(lat), Some(long)) = (
        meta.get_f64(outbound::LATITUDE),
        meta.get_f64(outbound::LONGITUDE),
    ) else {
        return Some(message.content.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
    };
    let label = meta
        .get_non_empty(outbound::LOCATION_NAME)
        .or_else(|| Some(message.content.trim()).filter(|c| !c.is_empty()));
    let link = format!("https://maps.google.com/?q={lat},{long}");
    Some(match label {
        Some(label) => format!("{label} ({lat}, {long}) {link}"),
        None => format!("({lat}, {long}) {link}"),
    })
}

fn quick_replies(message: &OutboundMessage) -> Vec<QuickReply> {
    (1..=MAX_QUICK_REPLIES)
        .map_while(|n| {
            let title = message
                .metadata
                .get_non_empty(&outbound::quick_reply(n))?
                .to_string();
            let payload = message
                .metadata
                .get_non_empty(&outbound::quick_reply_data(n))
                .map_or_else(|| title.clone(), str::to_string);
            Some(QuickReply {
                content_type: "text",
                title,
                payload,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::signature::hmac_sha256_hex;

    fn page_payload(messaging: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "object": "page",
            "entry": [{ "id": "PAGE", "time": 1, "messaging": messaging }]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_text_message() {
        let body = page_payload(json!([{
            "sender": {"id": "USER"},
            "recipient": {"id": "PAGE"},
            "timestamp": 1_700_000_000_000_i64,
            "message": {"mid": "m_1", "text": "hello", "quick_reply": {"payload": "YES"}}
        }]));
        let events = parse_webhook(&body).unwrap();
        assert_eq!(events.messages.len(), 1);
        let msg = &events.messages[0];
        assert_eq!(msg.external_id, "m_1");
        assert_eq!(msg.sender_id, "USER");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.content_type, ContentType::Text);
        assert_eq!(msg.metadata.get(inbound::QUICK_REPLY_PAYLOAD), Some("YES"));
        assert_eq!(msg.metadata.get(inbound::PAGE_ID), Some("PAGE"));
        assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_echo_is_filtered() {
        let body = page_payload(json!([{
            "sender": {"id": "PAGE"},
            "recipient": {"id": "USER"},
            "timestamp": 1,
            "message": {"mid": "m_echo", "text": "we said this", "is_echo": true}
        }]));
        let events = parse_webhook(&body).unwrap();
        assert!(events.messages.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_standby_and_attachments() {
        let body = serde_json::to_vec(&json!({
            "object": "page",
            "entry": [{
                "id": "PAGE",
                "standby": [{
                    "sender": {"id": "USER"},
                    "recipient": {"id": "PAGE"},
                    "timestamp": 1,
                    "message": {"mid": "m_2", "attachments": [
                        {"type": "image", "payload": {"url": "https://cdn/x.jpg"}},
                        {"type": "location", "payload": {"coordinates": {"lat": -23.5, "long": -46.6}}}
                    ]}
                }]
            }]
        }))
        .unwrap();
        let events = parse_webhook(&body).unwrap();
        let msg = &events.messages[0];
        assert_eq!(msg.content_type, ContentType::Image);
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].kind, AttachmentKind::Image);
        assert_eq!(msg.metadata.get(inbound::LATITUDE), Some("-23.5"));
        assert_eq!(msg.content, "-23.5,-46.6");
    }

    #[test]
    fn test_unknown_attachment_preserved_as_text() {
        let body = page_payload(json!([{
            "sender": {"id": "USER"},
            "recipient": {"id": "PAGE"},
            "message": {"mid": "m_3", "attachments": [
                {"type": "ig_reel", "payload": {"url": "https://ig/reel", "title": "Reel"}}
            ]}
        }]));
        let msg = &parse_webhook(&body).unwrap().messages[0];
        assert_eq!(msg.content_type, ContentType::Text);
        assert_eq!(msg.metadata.get(provider::RAW_TYPE), Some("ig_reel"));
        assert_eq!(msg.metadata.get(provider::RAW_PAYLOAD), Some("Reel"));
        assert_eq!(msg.attachments[0].kind, AttachmentKind::Document);
    }

    #[test]
    fn test_delivery_read_and_postback() {
        let body = page_payload(json!([
            {"sender": {"id": "USER"}, "recipient": {"id": "PAGE"}, "timestamp": 5,
             "delivery": {"mids": ["m_a", "m_b"], "watermark": 1_700_000_000_000_i64}},
            {"sender": {"id": "USER"}, "recipient": {"id": "PAGE"}, "timestamp": 6,
             "read": {"watermark": 1_700_000_001_000_i64}},
            {"sender": {"id": "USER"}, "recipient": {"id": "PAGE"}, "timestamp": 7,
             "postback": {"title": "Get Started", "payload": "START", "mid": "m_pb"}}
        ]));
        let events = parse_webhook(&body).unwrap();

        let statuses: Vec<_> = events
            .statuses
            .iter()
            .map(|s| (s.external_id.as_str(), s.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("m_a", MessageStatus::Delivered),
                ("m_b", MessageStatus::Delivered),
                ("", MessageStatus::Read),
            ]
        );
        assert_eq!(events.statuses[2].recipient_id.as_deref(), Some("USER"));

        let postback = &events.messages[0];
        assert_eq!(postback.content_type, ContentType::Interactive);
        assert_eq!(postback.content, "Get Started");
        assert_eq!(postback.metadata.get(inbound::POSTBACK_PAYLOAD), Some("START"));
    }

    #[test]
    fn test_non_page_and_malformed() {
        let other = serde_json::to_vec(&json!({"object": "instagram", "entry": []})).unwrap();
        assert!(parse_webhook(&other).unwrap().is_empty());

        let unrelated = br#"{"hello": "world"}"#;
        assert!(parse_webhook(unrelated).unwrap().is_empty());

        assert!(matches!(
            parse_webhook(b"not json"),
            Err(ChannelError::Parse(_))
        ));
    }

    #[test]
    fn test_content_type_mapping_is_total() {
        for t in ["image", "video", "audio", "file", "location"] {
            assert!(content_type_for(t).is_some(), "{t}");
        }
        for t in ["fallback", "template", "sticker", "", "IMAGE"] {
            assert_eq!(map_content_type(t), ContentType::Text, "{t}");
        }
        assert_eq!(attachment_kind("fallback"), AttachmentKind::Link);
        assert_eq!(attachment_kind("file"), AttachmentKind::Document);
    }

    #[test]
    fn test_verify_signature_requires_prefix() {
        let body = br#"{"object":"page"}"#;
        let digest = hmac_sha256_hex(b"app-secret", body).unwrap();
        assert!(verify_signature("app-secret", body, &format!("sha256={digest}")));
        assert!(!verify_signature("app-secret", body, &digest));
        assert!(!verify_signature("wrong", body, &format!("sha256={digest}")));
    }

    #[test]
    fn test_build_text_with_quick_replies() {
        let msg = OutboundMessage::text("USER", "Pick one")
            .with_metadata("quick_reply_1", "Yes")
            .with_metadata("quick_reply_1_data", "YES")
            .with_metadata("quick_reply_2", "No");
        let req = build_send_request(&msg).unwrap();
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "recipient": {"id": "USER"},
                "messaging_type": "RESPONSE",
                "message": {
                    "text": "Pick one",
                    "quick_replies": [
                        {"content_type": "text", "title": "Yes", "payload": "YES"},
                        {"content_type": "text", "title": "No", "payload": "No"}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_build_media_and_caption_card() {
        let plain = OutboundMessage::media("USER", ContentType::Document, "https://x/a.pdf");
        let req = serde_json::to_value(build_send_request(&plain).unwrap()).unwrap();
        assert_eq!(
            req["message"]["attachment"],
            json!({"type": "file", "payload": {"url": "https://x/a.pdf", "is_reusable": true}})
        );

        let mut captioned = OutboundMessage::media("USER", ContentType::Image, "https://x/i.png");
        captioned.content = "Our new store".to_string();
        let req = serde_json::to_value(build_send_request(&captioned).unwrap()).unwrap();
        assert_eq!(
            req["message"]["attachment"],
            json!({"type": "template", "payload": {
                "template_type": "generic",
                "elements": [{"title": "Our new store", "image_url": "https://x/i.png"}]
            }})
        );
    }

    #[test]
    fn test_build_location_degrades_to_text() {
        let msg = OutboundMessage {
            recipient_id: "USER".to_string(),
            content_type: ContentType::Location,
            ..OutboundMessage::default()
        }
        .with_metadata("latitude", "-23.5")
        .with_metadata("longitude", "-46.6")
        .with_metadata("location_name", "Office");
        let req = serde_json::to_value(build_send_request(&msg).unwrap()).unwrap();
        assert_eq!(
            req["message"]["text"],
            "Office (-23.5, -46.6) https://maps.google.com/?q=-23.5,-46.6"
        );
    }

    #[test]
    fn test_build_rejects_empty() {
        assert!(build_send_request(&OutboundMessage::text("USER", "  ")).is_err());
        let media = OutboundMessage {
            recipient_id: "USER".to_string(),
            content_type: ContentType::Video,
            ..OutboundMessage::default()
        };
        assert!(build_send_request(&media).is_err());
    }
}
