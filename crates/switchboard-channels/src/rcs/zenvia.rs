//! Zenvia RCS channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::types::MessageStatus;

use super::RcsProvider;
use super::client::{AgentInfo, Endpoint, RcsBackend, require_id};
use super::codec::{self, RcsMedia, RcsOutbound, Suggestion};
use crate::http::{ClientError, raw_body, read_json};
use crate::traits::WebhookEvents;

const MESSAGES_PATH: &str = "/channels/rcs/messages";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
enum Content<'a> {
    Text {
        text: &'a str,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        buttons: Vec<Button<'a>>,
    },
    File {
        file_url: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_mime_type: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<&'a str>,
    },
    Card {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media: Option<CardMedia<'a>>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        buttons: Vec<Button<'a>>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardMedia<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    disposition: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum Button<'a> {
    QuickReply { text: &'a str, payload: &'a str },
    Link { text: &'a str, url: String },
    Dial { text: &'a str, phone_number: &'a str },
}

impl<'a> From<&'a Suggestion> for Button<'a> {
    fn from(suggestion: &'a Suggestion) -> Self {
        match suggestion {
            Suggestion::Reply { text, .. } => Self::QuickReply {
                text,
                payload: suggestion.postback_data(),
            },
            Suggestion::Url { text, url, .. } => Self::Link {
                text,
                url: url.clone(),
            },
            Suggestion::Dial {
                text, phone_number, ..
            } => Self::Dial { text, phone_number },
            Suggestion::Location {
                text,
                latitude,
                longitude,
                ..
            } => Self::Link {
                text,
                url: format!("https://maps.google.com/?q={latitude},{longitude}"),
            },
        }
    }
}

fn file_content(media: &RcsMedia) -> Content<'_> {
    Content::File {
        file_url: &media.url,
        file_mime_type: media.mime_type.as_deref(),
        file_name: media.filename.as_deref(),
    }
}

/// Whether Zenvia has nowhere to put the suggestions: file contents carry
/// no buttons.
#[must_use]
pub fn drops_suggestions(message: &RcsOutbound) -> bool {
    message.card.is_none() && message.text.is_none() && !message.suggestions.is_empty()
}

fn contents(message: &RcsOutbound) -> Vec<Content<'_>> {
    let buttons = || -> Vec<Button<'_>> {
        message.suggestions.iter().map(Button::from).collect()
    };
    if let Some(card) = &message.card {
        return vec![Content::Card {
            title: card.title.as_deref(),
            text: card.description.as_deref(),
            media: card.media.as_ref().map(|m| CardMedia {
                url: &m.url,
                mime_type: m.mime_type.as_deref(),
                disposition: "ON_THE_TOP",
            }),
            buttons: buttons(),
        }];
    }

    let mut contents = Vec::with_capacity(2);
    if let Some(media) = &message.media {
        contents.push(file_content(media));
    }
    if let Some(text) = &message.text {
        contents.push(Content::Text {
            text,
            buttons: buttons(),
        });
    }
    contents
}

#[derive(Debug, Deserialize)]
struct Sent {
    #[serde(default)]
    id: String,
}

// Webhook wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Webhook {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: Option<String>,
    message_id: Option<String>,
    message: Option<Message>,
    message_status: Option<StatusPayload>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    id: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    direction: Option<String>,
    #[serde(default)]
    contents: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
enum InboundContent {
    Text {
        #[serde(default)]
        text: String,
        payload: Option<String>,
    },
    File {
        file_url: String,
        file_mime_type: Option<String>,
        file_name: Option<String>,
        file_caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
        name: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    timestamp: Option<String>,
    code: String,
    description: Option<String>,
    #[serde(default)]
    causes: Vec<Cause>,
}

#[derive(Debug, Deserialize)]
struct Cause {
    reason: Option<String>,
}

/// Map a Zenvia status code.
#[must_use]
pub fn map_status(code: &str) -> MessageStatus {
    match code.to_ascii_uppercase().as_str() {
        "SENT" => MessageStatus::Sent,
        "DELIVERED" => MessageStatus::Delivered,
        "READ" => MessageStatus::Read,
        "FAILED" | "REJECTED" | "NOT_DELIVERED" => MessageStatus::Failed,
        _ => MessageStatus::Pending,
    }
}

/// Parse a Zenvia subscription event.
///
/// Outgoing echoes (`direction: OUT`) are dropped.
#[must_use]
pub fn parse_webhook(payload: Value) -> WebhookEvents {
    let mut events = WebhookEvents::default();
    let Ok(webhook) = serde_json::from_value::<Webhook>(payload) else {
        return events;
    };

    match (webhook.kind.as_str(), webhook.message, webhook.message_status) {
        ("MESSAGE", Some(message), _) => {
            if message
                .direction
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case("OUT"))
            {
                return events;
            }
            let mut msg = codec::inbound_message(
                RcsProvider::Zenvia,
                &message.id,
                &message.from,
                Some(&message.to),
                webhook.timestamp.as_deref(),
            );
            for content in message.contents {
                match serde_json::from_value::<InboundContent>(content.clone()) {
                    Ok(InboundContent::Text { text, payload }) => match payload {
                        Some(payload) => codec::set_suggestion(&mut msg, &text, &payload),
                        None if msg.content.is_empty() => msg.content = text,
                        None => {
                            msg.content.push('\n');
                            msg.content.push_str(&text);
                        }
                    },
                    Ok(InboundContent::File {
                        file_url,
                        file_mime_type,
                        file_name,
                        file_caption,
                    }) => {
                        codec::set_media(
                            &mut msg,
                            &file_url,
                            file_mime_type.as_deref(),
                            file_name.as_deref(),
                        );
                        if let Some(caption) = file_caption {
                            msg.content = caption;
                        }
                    }
                    Ok(InboundContent::Location {
                        latitude,
                        longitude,
                        name,
                    }) => codec::set_location(&mut msg, latitude, longitude, name.as_deref()),
                    Err(_) => {
                        let kind = content
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown");
                        codec::set_unmapped(&mut msg, kind, &content);
                    }
                }
            }
            events.messages.push(msg);
        }
        ("MESSAGE_STATUS", _, Some(status)) => {
            let mapped = map_status(&status.code);
            let error = (mapped == MessageStatus::Failed)
                .then(|| {
                    status
                        .description
                        .or_else(|| status.causes.into_iter().find_map(|c| c.reason))
                })
                .flatten();
            let external_id = webhook.message_id.unwrap_or(webhook.id);
            events.statuses.push(codec::status_callback(
                &external_id,
                mapped,
                None,
                status.timestamp.or(webhook.timestamp).as_deref(),
                error,
            ));
        }
        _ => {}
    }
    events
}

/// Zenvia backend.
pub struct ZenviaBackend {
    endpoint: Endpoint,
}

impl ZenviaBackend {
    pub(crate) const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl RcsBackend for ZenviaBackend {
    fn provider(&self) -> RcsProvider {
        RcsProvider::Zenvia
    }

    async fn send(&self, to: &str, message: &RcsOutbound) -> Result<String, ClientError> {
        let request = SendRequest {
            from: self.endpoint.from(),
            to,
            contents: contents(message),
        };
        let response = self
            .endpoint
            .http
            .post(self.endpoint.url(MESSAGES_PATH))
            .header("X-API-TOKEN", self.endpoint.api_key.expose())
            .json(&request)
            .send()
            .await?;
        let sent: Sent = read_json(response, raw_body).await?;
        require_id(sent.id)
    }

    fn parse_webhook(&self, payload: Value) -> WebhookEvents {
        parse_webhook(payload)
    }

    async fn agent_info(&self) -> Result<AgentInfo, ClientError> {
        Ok(self.endpoint.local_info(RcsProvider::Zenvia))
    }
}
