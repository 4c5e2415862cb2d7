//! Bot API update and method payloads.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use switchboard_core::metadata::keys::{inbound, outbound, provider};
use switchboard_core::types::{
    Attachment, AttachmentKind, ChannelType, ContentType, InboundMessage, OutboundMessage,
};

use crate::traits::{ChannelError, WebhookEvents};

/// Header carrying the secret token registered with `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Update kinds requested from `setWebhook`.
pub const ALLOWED_UPDATES: [&str; 3] = ["message", "edited_message", "callback_query"];

/// Message kinds with no unified content type. Kept as raw metadata.
const UNMAPPED_KINDS: [&str; 8] = [
    "sticker",
    "animation",
    "poll",
    "dice",
    "venue",
    "game",
    "story",
    "invoice",
];

// Telegram API types

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// A Telegram user or bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    /// User ID.
    pub id: i64,
    /// Whether user is a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    pub last_name: Option<String>,
    /// Username.
    pub username: Option<String>,
}

/// One webhook update.
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    /// Update sequence number.
    pub update_id: i64,
    /// New message.
    pub message: Option<TelegramMessage>,
    /// Edited message.
    pub edited_message: Option<TelegramMessage>,
    /// Inline keyboard button press.
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    /// Message ID within the chat.
    pub message_id: i64,
    /// Unix time the message was sent.
    #[serde(default)]
    pub date: i64,
    /// Chat the message belongs to.
    pub chat: TelegramChat,
    /// Sender.
    pub from: Option<TelegramUser>,
    text: Option<String>,
    caption: Option<String>,
    reply_to_message: Option<Box<TelegramMessage>>,
    photo: Option<Vec<PhotoSize>>,
    document: Option<FileRef>,
    voice: Option<FileRef>,
    audio: Option<FileRef>,
    video: Option<FileRef>,
    video_note: Option<FileRef>,
    location: Option<Location>,
    contact: Option<Contact>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

/// A chat.
#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    /// Chat ID.
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub chat_type: String,
}

/// Inline keyboard callback.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    /// Callback ID.
    pub id: String,
    /// User who pressed the button.
    pub from: TelegramUser,
    /// Message carrying the keyboard.
    pub message: Option<TelegramMessage>,
    /// Button payload.
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    file_id: String,
    file_name: Option<String>,
    mime_type: Option<String>,
    file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Location {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct Contact {
    phone_number: String,
    #[serde(default)]
    first_name: String,
}

/// `getFile` result.
#[derive(Debug, Deserialize)]
pub struct TelegramFile {
    /// File ID.
    pub file_id: String,
    /// Path for the file download endpoint.
    pub file_path: Option<String>,
    /// Size in bytes.
    pub file_size: Option<u64>,
}

/// Sent message, as returned by the `send*` methods.
#[derive(Debug, Deserialize)]
pub struct SentMessage {
    /// Message ID within the chat.
    pub message_id: i64,
}

/// Parse one update into unified events.
///
/// Only private chats are handled; group, supergroup, and channel updates
/// yield no events.
pub fn parse_update(body: &[u8]) -> Result<WebhookEvents, ChannelError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| ChannelError::Parse(e.to_string()))?;
    let Ok(update) = serde_json::from_value::<TelegramUpdate>(value) else {
        return Ok(WebhookEvents::default());
    };

    let mut events = WebhookEvents::default();
    if let Some(message) = update.message {
        events.messages.extend(inbound_message(message, false));
    } else if let Some(message) = update.edited_message {
        events.messages.extend(inbound_message(message, true));
    } else if let Some(query) = update.callback_query {
        events.messages.extend(callback_message(query));
    }
    Ok(events)
}

fn inbound_message(message: TelegramMessage, edited: bool) -> Option<InboundMessage> {
    if message.chat.chat_type != "private" {
        return None;
    }

    let caption = message.caption.or(message.text).unwrap_or_default();
    let sender_id = message
        .from
        .as_ref()
        .map_or(message.chat.id, |from| from.id)
        .to_string();

    let (content_type, attachment) = if let Some(photos) = message.photo {
        // Sizes are ordered smallest first
        let largest = photos.into_iter().next_back()?;
        let mut attachment = Attachment::new(AttachmentKind::Image, largest.file_id)
            .with_mime_type("image/jpeg");
        attachment.size_bytes = largest.file_size;
        (ContentType::Image, Some(attachment))
    } else if let Some(video) = message.video.or(message.video_note) {
        (ContentType::Video, Some(file_attachment(AttachmentKind::Video, video, None)))
    } else if let Some(voice) = message.voice {
        (
            ContentType::Audio,
            Some(file_attachment(AttachmentKind::Audio, voice, Some("audio/ogg"))),
        )
    } else if let Some(audio) = message.audio {
        (ContentType::Audio, Some(file_attachment(AttachmentKind::Audio, audio, None)))
    } else if let Some(document) = message.document {
        (
            ContentType::Document,
            Some(file_attachment(AttachmentKind::Document, document, None)),
        )
    } else if message.location.is_some() {
        (ContentType::Location, None)
    } else if message.contact.is_some() {
        (ContentType::Contact, None)
    } else {
        (ContentType::Text, None)
    };

    let mut msg = InboundMessage::new(
        ChannelType::Telegram,
        message.message_id.to_string(),
        sender_id,
        content_type,
        caption,
    );
    if let Some(sent_at) = DateTime::from_timestamp(message.date, 0).filter(|_| message.date > 0) {
        msg.timestamp = sent_at;
    }
    msg.attachments.extend(attachment);
    msg.metadata.insert(inbound::CHAT_ID, message.chat.id.to_string());

    if let Some(from) = message.from {
        insert_user(&mut msg, &from);
    }
    if let Some(reply) = message.reply_to_message {
        msg.metadata
            .insert(inbound::REPLY_TO_ID, reply.message_id.to_string());
    }
    if edited {
        msg.metadata.insert(inbound::IS_EDITED, "true");
    }
    if let Some(location) = message.location {
        msg.metadata
            .insert(inbound::LATITUDE, location.latitude.to_string());
        msg.metadata
            .insert(inbound::LONGITUDE, location.longitude.to_string());
        msg.content = format!("{},{}", location.latitude, location.longitude);
    }
    if let Some(contact) = message.contact {
        msg.metadata.insert(inbound::CONTACT_PHONE, &contact.phone_number);
        msg.content = if contact.first_name.is_empty() {
            contact.phone_number
        } else {
            format!("{} {}", contact.first_name, contact.phone_number)
        };
    }

    if content_type == ContentType::Text {
        if let Some((kind, payload)) = UNMAPPED_KINDS
            .iter()
            .find_map(|kind| message.other.get(*kind).map(|v| (*kind, v)))
        {
            msg.metadata.insert(provider::RAW_TYPE, kind);
            msg.metadata.insert(provider::RAW_PAYLOAD, payload.to_string());
            if kind == "sticker" {
                if let Some(file_id) = payload.get("file_id").and_then(Value::as_str) {
                    msg.attachments
                        .push(Attachment::new(AttachmentKind::Sticker, file_id));
                }
            }
        }
    }

    Some(msg)
}

fn callback_message(query: CallbackQuery) -> Option<InboundMessage> {
    let chat = query.message.as_ref().map(|m| &m.chat);
    if chat.is_some_and(|chat| chat.chat_type != "private") {
        return None;
    }
    let data = query.data.unwrap_or_default();

    let mut msg = InboundMessage::new(
        ChannelType::Telegram,
        query.id,
        query.from.id.to_string(),
        ContentType::Interactive,
        data.clone(),
    );
    msg.metadata.insert(inbound::CALLBACK_DATA, data);
    if let Some(message) = &query.message {
        msg.metadata
            .insert(inbound::CHAT_ID, message.chat.id.to_string());
        msg.metadata
            .insert(inbound::REPLY_TO_ID, message.message_id.to_string());
    }
    insert_user(&mut msg, &query.from);
    Some(msg)
}

fn insert_user(msg: &mut InboundMessage, user: &TelegramUser) {
    msg.metadata.insert(inbound::FROM_USER_ID, user.id.to_string());
    msg.metadata.insert_opt(inbound::USERNAME, user.username.as_deref());
    if !user.first_name.is_empty() {
        msg.metadata.insert(inbound::FIRST_NAME, &user.first_name);
    }
    msg.metadata.insert_opt(inbound::LAST_NAME, user.last_name.as_deref());

    let name = match &user.last_name {
        Some(last) => format!("{} {last}", user.first_name),
        None => user.first_name.clone(),
    };
    msg.sender_name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
}

fn file_attachment(kind: AttachmentKind, file: FileRef, default_mime: Option<&str>) -> Attachment {
    let mut attachment = Attachment::new(kind, file.file_id);
    attachment.mime_type = file.mime_type.or_else(|| default_mime.map(str::to_string));
    attachment.filename = file.file_name;
    attachment.size_bytes = file.file_size;
    attachment
}

/// One Bot API method call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    /// Method name, e.g. `sendMessage`.
    pub method: &'static str,
    /// JSON parameters.
    pub params: Value,
}

/// Map a unified message to the Bot API method that sends it.
///
/// Media is sent by URL or file ID with the content as caption; interactive,
/// template, and contact content go out as text.
///
/// # Errors
///
/// Returns a reason string when the message has nothing sendable.
pub fn build_request(message: &OutboundMessage) -> Result<ApiCall, String> {
    let meta = &message.metadata;
    let mut params = Map::new();
    params.insert("chat_id".to_string(), json!(message.recipient_id));
    if let Some(reply_to) = meta
        .get_non_empty(outbound::REPLY_TO_ID)
        .and_then(|id| id.parse::<i64>().ok())
    {
        params.insert("reply_to_message_id".to_string(), json!(reply_to));
    }

    let caption = Some(message.content.trim())
        .filter(|c| !c.is_empty())
        .or_else(|| meta.get_non_empty(outbound::CAPTION));

    let method = match message.content_type {
        ContentType::Image | ContentType::Video | ContentType::Audio | ContentType::Document => {
            let (method, field) = media_method(message.content_type);
            let url = message
                .first_attachment()
                .map(|a| a.url.as_str())
                .or_else(|| meta.get_non_empty(outbound::CARD_MEDIA_URL))
                .ok_or_else(|| format!("{} message has no attachment url", message.content_type))?;
            params.insert(field.to_string(), json!(url));
            if let Some(caption) = caption {
                params.insert("caption".to_string(), json!(caption));
                insert_parse_mode(&mut params, message);
            }
            method
        }
        ContentType::Location => {
            let (Some(lat), Some(long)) = (
                meta.get_f64(outbound::LATITUDE),
                meta.get_f64(outbound::LONGITUDE),
            ) else {
                return Err("location message has no coordinates".to_string());
            };
            params.insert("latitude".to_string(), json!(lat));
            params.insert("longitude".to_string(), json!(long));
            "sendLocation"
        }
        ContentType::Text
        | ContentType::Interactive
        | ContentType::Template
        | ContentType::Contact => {
            let text = message.content.trim();
            if text.is_empty() {
                return Err("message has no text content".to_string());
            }
            params.insert("text".to_string(), json!(text));
            insert_parse_mode(&mut params, message);
            "sendMessage"
        }
    };

    if let Some(keyboard) = meta
        .get_non_empty(outbound::QUICK_REPLIES)
        .and_then(inline_keyboard)
    {
        params.insert("reply_markup".to_string(), keyboard);
    }

    Ok(ApiCall {
        method,
        params: Value::Object(params),
    })
}

const fn media_method(content_type: ContentType) -> (&'static str, &'static str) {
    match content_type {
        ContentType::Image => ("sendPhoto", "photo"),
        ContentType::Video => ("sendVideo", "video"),
        ContentType::Audio => ("sendAudio", "audio"),
        _ => ("sendDocument", "document"),
    }
}

fn insert_parse_mode(params: &mut Map<String, Value>, message: &OutboundMessage) {
    if let Some(mode) = message.metadata.get_non_empty(outbound::PARSE_MODE) {
        params.insert("parse_mode".to_string(), json!(mode));
    }
}

/// Build an inline keyboard from `label|data,label|data`, one button per row.
#[must_use]
pub fn inline_keyboard(buttons: &str) -> Option<Value> {
    let rows: Vec<Value> = buttons
        .split(',')
        .filter_map(|button| {
            let (label, data) = button.split_once('|').unwrap_or((button, button));
            let label = label.trim();
            let data = Some(data.trim()).filter(|d| !d.is_empty()).unwrap_or(label);
            (!label.is_empty()).then(|| json!([{ "text": label, "callback_data": data }]))
        })
        .collect();
    (!rows.is_empty()).then(|| json!({ "inline_keyboard": rows }))
}
