//! Infobip RCS channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::types::{InboundMessage, MessageStatus};

use super::RcsProvider;
use super::client::{AgentInfo, Endpoint, RcsBackend, require_id};
use super::codec::{self, RcsOutbound, Suggestion};
use crate::http::{ClientError, raw_body, read_json};
use crate::traits::WebhookEvents;

const MESSAGES_PATH: &str = "/rcs/1/messages";

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    destinations: [Destination<'a>; 1],
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Destination<'a> {
    to: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
enum Content<'a> {
    Text {
        text: &'a str,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        suggestions: Vec<WireSuggestion<'a>>,
    },
    File {
        file: FileRef<'a>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        suggestions: Vec<WireSuggestion<'a>>,
    },
    Card {
        orientation: &'static str,
        alignment: &'static str,
        content: CardContent<'a>,
    },
}

#[derive(Debug, Serialize)]
struct FileRef<'a> {
    url: &'a str,
}

#[derive(Debug, Serialize)]
struct CardContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<CardMedia<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<WireSuggestion<'a>>,
}

#[derive(Debug, Serialize)]
struct CardMedia<'a> {
    file: FileRef<'a>,
    height: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum WireSuggestion<'a> {
    Reply {
        text: &'a str,
        postback_data: &'a str,
    },
    OpenUrl {
        text: &'a str,
        postback_data: &'a str,
        url: &'a str,
    },
    DialPhone {
        text: &'a str,
        postback_data: &'a str,
        phone_number: &'a str,
    },
    ShowLocation {
        text: &'a str,
        postback_data: &'a str,
        latitude: f64,
        longitude: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<&'a str>,
    },
}

impl<'a> From<&'a Suggestion> for WireSuggestion<'a> {
    fn from(suggestion: &'a Suggestion) -> Self {
        let postback_data = suggestion.postback_data();
        match suggestion {
            Suggestion::Reply { text, .. } => Self::Reply {
                text,
                postback_data,
            },
            Suggestion::Url { text, url, .. } => Self::OpenUrl {
                text,
                postback_data,
                url,
            },
            Suggestion::Dial {
                text, phone_number, ..
            } => Self::DialPhone {
                text,
                postback_data,
                phone_number,
            },
            Suggestion::Location {
                text,
                latitude,
                longitude,
                label,
                ..
            } => Self::ShowLocation {
                text,
                postback_data,
                latitude: *latitude,
                longitude: *longitude,
                label: label.as_deref(),
            },
        }
    }
}

fn content(message: &RcsOutbound) -> Content<'_> {
    let suggestions = || -> Vec<WireSuggestion<'_>> {
        message.suggestions.iter().map(WireSuggestion::from).collect()
    };
    if let Some(card) = &message.card {
        return Content::Card {
            orientation: "VERTICAL",
            alignment: "LEFT",
            content: CardContent {
                title: card.title.as_deref(),
                description: card.description.as_deref(),
                media: card.media.as_ref().map(|m| CardMedia {
                    file: FileRef { url: &m.url },
                    height: "MEDIUM",
                }),
                suggestions: suggestions(),
            },
        };
    }
    if let Some(media) = &message.media {
        return Content::File {
            file: FileRef { url: &media.url },
            suggestions: suggestions(),
        };
    }
    Content::Text {
        text: message.text.as_deref().unwrap_or_default(),
        suggestions: suggestions(),
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SentMessage {
    #[serde(default)]
    message_id: String,
}

// Webhook wire types

#[derive(Debug, Deserialize)]
struct Webhook {
    results: Vec<WebhookResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResult {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    from: String,
    to: Option<String>,
    received_at: Option<String>,
    sent_at: Option<String>,
    done_at: Option<String>,
    seen_at: Option<String>,
    text: Option<String>,
    message: Option<Value>,
    status: Option<StatusField>,
    error: Option<ErrorField>,
}

/// Status as a bare name or a `{groupName, name}` object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusField {
    Name(String),
    #[serde(rename_all = "camelCase")]
    Object {
        group_name: Option<String>,
        name: Option<String>,
        description: Option<String>,
    },
}

impl StatusField {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Object {
                group_name, name, ..
            } => group_name.as_deref().or(name.as_deref()).unwrap_or_default(),
        }
    }

    fn description(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Object { description, .. } => description.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorField {
    name: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum InboundContent {
    Text {
        text: String,
    },
    File {
        file: InboundFile,
    },
    Suggestion {
        text: String,
        #[serde(default)]
        postback_data: String,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundFile {
    url: String,
    name: Option<String>,
    content_type: Option<String>,
}

/// Map an Infobip status group or name.
///
/// Detailed names such as `UNDELIVERABLE_NOT_DELIVERED` map by their group
/// prefix. Anything unrecognized is pending.
#[must_use]
pub fn map_status(name: &str) -> MessageStatus {
    let name = name.trim().to_ascii_uppercase();
    let group = name.split_once('_').map_or(name.as_str(), |(group, _)| group);
    match group {
        "PENDING" | "ACCEPTED" => MessageStatus::Pending,
        "SENT" => MessageStatus::Sent,
        "DELIVERED" => MessageStatus::Delivered,
        "SEEN" | "READ" => MessageStatus::Read,
        "FAILED" | "REJECTED" | "UNDELIVERABLE" | "EXPIRED" => MessageStatus::Failed,
        _ => MessageStatus::Pending,
    }
}

/// Parse an Infobip inbound or delivery-report webhook.
///
/// Every entry of `results` is read. An entry is a message when it carries
/// `message` or `text`, a delivery report otherwise.
#[must_use]
pub fn parse_webhook(payload: Value) -> WebhookEvents {
    let mut events = WebhookEvents::default();
    let Ok(webhook) = serde_json::from_value::<Webhook>(payload) else {
        return events;
    };

    for result in webhook.results {
        if result.message.is_some() || result.text.is_some() {
            events.messages.push(inbound(result));
        } else if let Some(status) = &result.status {
            let mapped = if result.seen_at.is_some() {
                MessageStatus::Read
            } else {
                map_status(status.name())
            };
            let error = (mapped == MessageStatus::Failed)
                .then(|| {
                    result
                        .error
                        .as_ref()
                        .and_then(|e| e.description.clone().or_else(|| e.name.clone()))
                        .or_else(|| status.description().map(str::to_string))
                })
                .flatten();
            let at = result
                .seen_at
                .as_deref()
                .or(result.done_at.as_deref())
                .or(result.sent_at.as_deref());
            events.statuses.push(codec::status_callback(
                &result.message_id,
                mapped,
                result.to.as_deref(),
                at,
                error,
            ));
        }
    }
    events
}

fn inbound(result: WebhookResult) -> InboundMessage {
    let mut msg = codec::inbound_message(
        RcsProvider::Infobip,
        &result.message_id,
        &result.from,
        result.to.as_deref(),
        result.received_at.as_deref(),
    );
    let Some(raw) = result.message else {
        msg.content = result.text.unwrap_or_default();
        return msg;
    };
    match serde_json::from_value::<InboundContent>(raw.clone()) {
        Ok(InboundContent::Text { text }) => msg.content = text,
        Ok(InboundContent::File { file }) => codec::set_media(
            &mut msg,
            &file.url,
            file.content_type.as_deref(),
            file.name.as_deref(),
        ),
        Ok(InboundContent::Suggestion {
            text,
            postback_data,
        }) => codec::set_suggestion(&mut msg, &text, &postback_data),
        Ok(InboundContent::Location {
            latitude,
            longitude,
        }) => codec::set_location(&mut msg, latitude, longitude, None),
        Err(_) => {
            let kind = raw.get("type").and_then(Value::as_str).unwrap_or("unknown");
            codec::set_unmapped(&mut msg, kind, &raw);
        }
    }
    msg
}

/// Infobip backend.
pub struct InfobipBackend {
    endpoint: Endpoint,
}

impl InfobipBackend {
    pub(crate) const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl RcsBackend for InfobipBackend {
    fn provider(&self) -> RcsProvider {
        RcsProvider::Infobip
    }

    async fn send(&self, to: &str, message: &RcsOutbound) -> Result<String, ClientError> {
        let request = SendRequest {
            from: self.endpoint.from(),
            destinations: [Destination { to }],
            content: content(message),
        };
        let response = self
            .endpoint
            .http
            .post(self.endpoint.url(MESSAGES_PATH))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("App {}", self.endpoint.api_key.expose()),
            )
            .json(&request)
            .send()
            .await?;
        let sent: SendResponse = read_json(response, raw_body).await?;
        require_id(
            sent.messages
                .into_iter()
                .next()
                .map(|m| m.message_id)
                .unwrap_or_default(),
        )
    }

    fn parse_webhook(&self, payload: Value) -> WebhookEvents {
        parse_webhook(payload)
    }

    async fn agent_info(&self) -> Result<AgentInfo, ClientError> {
        Ok(self.endpoint.local_info(RcsProvider::Infobip))
    }
}
