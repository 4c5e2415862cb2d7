//! Pontaltech RCS channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use switchboard_core::types::MessageStatus;

use super::RcsProvider;
use super::client::{AgentInfo, Endpoint, RcsBackend, require_id};
use super::codec::{self, RcsOutbound};
use crate::http::{ClientError, raw_body, read_json};
use crate::traits::WebhookEvents;

const SEND_PATH: &str = "/rcs/send";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    to: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggestions: Vec<WireSuggestion<'a>>,
}

/// Pontaltech takes reply chips only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireSuggestion<'a> {
    text: &'a str,
    postback_data: &'a str,
}

fn request<'a>(to: &'a str, from: Option<&'a str>, message: &'a RcsOutbound) -> SendRequest<'a> {
    let media = message
        .card
        .as_ref()
        .and_then(|c| c.media.as_ref())
        .or(message.media.as_ref());
    SendRequest {
        to,
        from,
        content: message.body_text().unwrap_or_default(),
        title: message.card.as_ref().and_then(|c| c.title.as_deref()),
        media_url: media.map(|m| m.url.as_str()),
        media_type: media.and_then(|m| m.mime_type.as_deref()),
        suggestions: message
            .suggestions
            .iter()
            .map(|s| WireSuggestion {
                text: s.text(),
                postback_data: s.postback_data(),
            })
            .collect(),
    }
}

#[derive(Debug, Deserialize)]
struct Sent {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Webhook {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    from: String,
    to: Option<String>,
    #[serde(default)]
    content: String,
    status: Option<String>,
    timestamp: Option<String>,
    media_url: Option<String>,
    media_type: Option<String>,
    postback_data: Option<String>,
    error: Option<String>,
}

/// Map a Pontaltech status name.
#[must_use]
pub fn map_status(status: &str) -> MessageStatus {
    match status.to_ascii_lowercase().as_str() {
        "sent" => MessageStatus::Sent,
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" | "error" | "rejected" => MessageStatus::Failed,
        _ => MessageStatus::Pending,
    }
}

/// Parse a Pontaltech webhook (`type: message | status`).
#[must_use]
pub fn parse_webhook(payload: Value) -> WebhookEvents {
    let mut events = WebhookEvents::default();
    let Ok(webhook) = serde_json::from_value::<Webhook>(payload) else {
        return events;
    };

    match webhook.kind.as_str() {
        "message" => {
            let mut msg = codec::inbound_message(
                RcsProvider::Pontaltech,
                &webhook.id,
                &webhook.from,
                webhook.to.as_deref(),
                webhook.timestamp.as_deref(),
            );
            if let Some(url) = webhook.media_url.as_deref() {
                codec::set_media(&mut msg, url, webhook.media_type.as_deref(), None);
            }
            match webhook.postback_data {
                Some(data) => codec::set_suggestion(&mut msg, &webhook.content, &data),
                None => msg.content = webhook.content,
            }
            events.messages.push(msg);
        }
        "status" => {
            let status = map_status(webhook.status.as_deref().unwrap_or_default());
            events.statuses.push(codec::status_callback(
                &webhook.id,
                status,
                webhook.to.as_deref(),
                webhook.timestamp.as_deref(),
                webhook.error.filter(|_| status == MessageStatus::Failed),
            ));
        }
        _ => {}
    }
    events
}

/// Pontaltech backend.
pub struct PontaltechBackend {
    endpoint: Endpoint,
}

impl PontaltechBackend {
    pub(crate) const fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl RcsBackend for PontaltechBackend {
    fn provider(&self) -> RcsProvider {
        RcsProvider::Pontaltech
    }

    async fn send(&self, to: &str, message: &RcsOutbound) -> Result<String, ClientError> {
        let response = self
            .endpoint
            .http
            .post(self.endpoint.url(SEND_PATH))
            .bearer_auth(self.endpoint.api_key.expose())
            .json(&request(to, self.endpoint.sender_id.as_deref(), message))
            .send()
            .await?;
        let sent: Sent = read_json(response, raw_body).await?;
        require_id(sent.id)
    }

    fn parse_webhook(&self, payload: Value) -> WebhookEvents {
        parse_webhook(payload)
    }

    async fn agent_info(&self) -> Result<AgentInfo, ClientError> {
        Ok(self.endpoint.local_info(RcsProvider::Pontaltech))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::rcs::codec::{RcsMedia, RichCard, Suggestion};

    #[test]
    fn test_request_flattens_card() {
        let message = RcsOutbound {
            card: Some(RichCard {
                title: Some("Promo".to_string()),
                description: Some("50% off".to_string()),
                media: Some(RcsMedia {
                    url: "https://x/p.png".to_string(),
                    mime_type: Some("image/png".to_string()),
                    filename: None,
                }),
            }),
            suggestions: vec![Suggestion::Reply {
                text: "Buy".to_string(),
                postback_data: "buy".to_string(),
            }],
            ..RcsOutbound::default()
        };
        assert_eq!(
            serde_json::to_value(request("+5511999999999", None, &message)).unwrap(),
            json!({"to": "+5511999999999", "content": "50% off", "title": "Promo",
                   "mediaUrl": "https://x/p.png", "mediaType": "image/png",
                   "suggestions": [{"text": "Buy", "postbackData": "buy"}]})
        );
    }

    #[test]
    fn test_parse_message_and_status() {
        let events = parse_webhook(json!({
            "id": "p1", "type": "message", "from": "5511999999999", "to": "agent",
            "content": "oi", "timestamp": "2024-03-01T12:00:00Z"
        }));
        assert_eq!(events.messages[0].content, "oi");
        assert_eq!(events.messages[0].recipient_id.as_deref(), Some("agent"));

        let events = parse_webhook(json!({
            "id": "p2", "type": "status", "status": "FAILED", "error": "blocked"
        }));
        assert_eq!(events.statuses[0].status, MessageStatus::Failed);
        assert_eq!(events.statuses[0].error_message.as_deref(), Some("blocked"));

        assert!(parse_webhook(json!({"id": "p3", "type": "ping"})).is_empty());
    }

    #[test]
    fn test_status_mapping_is_total() {
        assert_eq!(map_status("delivered"), MessageStatus::Delivered);
        assert_eq!(map_status("READ"), MessageStatus::Read);
        assert_eq!(map_status(""), MessageStatus::Pending);
    }
}
