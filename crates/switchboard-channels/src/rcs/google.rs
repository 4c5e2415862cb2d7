//! Google RCS Business Messaging.
//!
//! `api_key` is used as a bearer token, so it must be an OAuth access token
//! minted for the agent's service account. Webhooks arrive either as bare
//! events or wrapped in a Pub/Sub push envelope with base64 `data`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::types::MessageStatus;

use super::RcsProvider;
use super::client::{AgentEvent, AgentInfo, Endpoint, RcsBackend, require_id};
use super::codec::{self, RcsMedia, RcsOutbound, Suggestion};
use crate::http::{ClientError, raw_body, read_body, read_json};
use crate::traits::WebhookEvents;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentMessage<'a> {
    content_message: ContentMessage<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_info: Option<ContentInfo<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rich_card: Option<WireRichCard<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<WireSuggestion<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentInfo<'a> {
    file_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRichCard<'a> {
    standalone_card: StandaloneCard<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StandaloneCard<'a> {
    card_orientation: &'static str,
    card_content: CardContent<'a>,
}

#[derive(Debug, Serialize)]
struct CardContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<CardMedia<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CardMedia<'a> {
    height: &'static str,
    content_info: ContentInfo<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum WireSuggestion<'a> {
    Reply(Reply<'a>),
    Action(Action<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reply<'a> {
    text: &'a str,
    postback_data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Action<'a> {
    text: &'a str,
    postback_data: &'a str,
    #[serde(flatten)]
    kind: ActionKind<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ActionKind<'a> {
    DialAction {
        phone_number: &'a str,
    },
    OpenUrlAction {
        url: &'a str,
    },
    ViewLocationAction {
        lat_long: LatLng,
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<&'a str>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl<'a> From<&'a Suggestion> for WireSuggestion<'a> {
    fn from(suggestion: &'a Suggestion) -> Self {
        let text = suggestion.text();
        let postback_data = suggestion.postback_data();
        let kind = match suggestion {
            Suggestion::Reply { .. } => {
                return Self::Reply(Reply {
                    text,
                    postback_data,
                });
            }
            Suggestion::Dial { phone_number, .. } => ActionKind::DialAction { phone_number },
            Suggestion::Url { url, .. } => ActionKind::OpenUrlAction { url },
            Suggestion::Location {
                latitude,
                longitude,
                label,
                ..
            } => ActionKind::ViewLocationAction {
                lat_long: LatLng {
                    latitude: *latitude,
                    longitude: *longitude,
                },
                label: label.as_deref(),
            },
        };
        Self::Action(Action {
            text,
            postback_data,
            kind,
        })
    }
}

fn content_info(media: &RcsMedia) -> ContentInfo<'_> {
    ContentInfo {
        file_url: &media.url,
    }
}

/// RBM carries exactly one of card, file, or text per message.
fn agent_message(message: &RcsOutbound) -> AgentMessage<'_> {
    let mut content = ContentMessage {
        text: None,
        content_info: None,
        rich_card: None,
        suggestions: message.suggestions.iter().map(WireSuggestion::from).collect(),
    };
    if let Some(card) = &message.card {
        content.rich_card = Some(WireRichCard {
            standalone_card: StandaloneCard {
                card_orientation: "VERTICAL",
                card_content: CardContent {
                    title: card.title.as_deref(),
                    description: card.description.as_deref(),
                    media: card.media.as_ref().map(|m| CardMedia {
                        height: "MEDIUM",
                        content_info: content_info(m),
                    }),
                },
            },
        });
    } else if let Some(media) = &message.media {
        content.content_info = Some(content_info(media));
    } else {
        content.text = message.text.as_deref();
    }
    AgentMessage {
        content_message: content,
    }
}

#[derive(Debug, Deserialize)]
struct Sent {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventRequest<'a> {
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<&'a str>,
}

impl<'a> From<AgentEvent<'a>> for EventRequest<'a> {
    fn from(event: AgentEvent<'a>) -> Self {
        match event {
            AgentEvent::Typing => Self {
                event_type: "IS_TYPING",
                message_id: None,
            },
            AgentEvent::Read { message_id } => Self {
                event_type: "READ",
                message_id: Some(message_id),
            },
        }
    }
}

// Webhook wire types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(default)]
    sender_phone_number: String,
    #[serde(default)]
    message_id: String,
    event_type: Option<String>,
    send_time: Option<String>,
    agent_id: Option<String>,
    text: Option<String>,
    suggestion_response: Option<SuggestionResponse>,
    location: Option<LatLng>,
    user_file: Option<UserFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionResponse {
    #[serde(default)]
    postback_data: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UserFile {
    payload: FilePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    mime_type: Option<String>,
    file_uri: String,
    file_name: Option<String>,
}

/// Map an RBM event type. Only delivery and read events are reports.
#[must_use]
pub fn map_event(event_type: &str) -> Option<MessageStatus> {
    match event_type {
        "DELIVERED" => Some(MessageStatus::Delivered),
        "READ" => Some(MessageStatus::Read),
        _ => None,
    }
}

/// Unwrap a Pub/Sub push envelope if there is one.
fn unwrap_envelope(payload: Value) -> Option<Value> {
    let Some(data) = payload.pointer("/message/data").and_then(Value::as_str) else {
        return Some(payload);
    };
    let decoded = BASE64.decode(data).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// Parse an RBM user message or event.
///
/// `agent_id` fills the recipient when the event does not name one.
#[must_use]
pub fn parse_webhook(payload: Value, agent_id: &str) -> WebhookEvents {
    let mut events = WebhookEvents::default();
    let Some(event) = unwrap_envelope(payload)
        .and_then(|value| serde_json::from_value::<Event>(value).ok())
    else {
        return events;
    };

    if let Some(event_type) = &event.event_type {
        if let Some(status) = map_event(event_type) {
            events.statuses.push(codec::status_callback(
                &event.message_id,
                status,
                Some(&event.sender_phone_number),
                event.send_time.as_deref(),
                None,
            ));
        }
        return events;
    }

    let mut msg = codec::inbound_message(
        RcsProvider::Google,
        &event.message_id,
        &event.sender_phone_number,
        Some(event.agent_id.as_deref().unwrap_or(agent_id)),
        event.send_time.as_deref(),
    );
    if let Some(text) = event.text {
        msg.content = text;
    } else if let Some(reply) = event.suggestion_response {
        codec::set_suggestion(&mut msg, &reply.text, &reply.postback_data);
    } else if let Some(at) = event.location {
        codec::set_location(&mut msg, at.latitude, at.longitude, None);
    } else if let Some(file) = event.user_file {
        codec::set_media(
            &mut msg,
            &file.payload.file_uri,
            file.payload.mime_type.as_deref(),
            file.payload.file_name.as_deref(),
        );
    } else {
        return events;
    }
    events.messages.push(msg);
    events
}

/// Google RBM backend.
pub struct GoogleBackend {
    endpoint: Endpoint,
}

impl GoogleBackend {
    pub(crate) const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    fn phone_url(&self, msisdn: &str, collection: &str) -> String {
        self.endpoint
            .url(&format!("/phones/{}/{collection}", urlencoding::encode(msisdn)))
    }
}

#[async_trait]
impl RcsBackend for GoogleBackend {
    fn provider(&self) -> RcsProvider {
        RcsProvider::Google
    }

    async fn send(&self, to: &str, message: &RcsOutbound) -> Result<String, ClientError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .endpoint
            .http
            .post(self.phone_url(to, "agentMessages"))
            .query(&[
                ("messageId", message_id.as_str()),
                ("agentId", self.endpoint.agent_id.as_str()),
            ])
            .bearer_auth(self.endpoint.api_key.expose())
            .json(&agent_message(message))
            .send()
            .await?;
        let sent: Sent = read_json(response, raw_body).await?;
        require_id(sent.name)
    }

    async fn send_event(&self, to: &str, event: AgentEvent<'_>) -> Result<(), ClientError> {
        let event_id = uuid::Uuid::new_v4().to_string();
        let response = self
            .endpoint
            .http
            .post(self.phone_url(to, "agentEvents"))
            .query(&[
                ("eventId", event_id.as_str()),
                ("agentId", self.endpoint.agent_id.as_str()),
            ])
            .bearer_auth(self.endpoint.api_key.expose())
            .json(&EventRequest::from(event))
            .send()
            .await?;
        read_body(response, raw_body).await?;
        Ok(())
    }

    fn parse_webhook(&self, payload: Value) -> WebhookEvents {
        parse_webhook(payload, &self.endpoint.agent_id)
    }

    async fn agent_info(&self) -> Result<AgentInfo, ClientError> {
        Ok(self.endpoint.local_info(RcsProvider::Google))
    }
}
