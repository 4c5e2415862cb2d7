//! RCS Business Messaging adapter.
//!
//! One adapter fronts four aggregators. The `provider` setting picks the
//! [`RcsBackend`] at connect time; everything above the backend (lifecycle,
//! message lowering, signatures, handler dispatch) is shared.

pub mod client;
pub mod codec;
pub mod google;
pub mod infobip;
pub mod pontaltech;
pub mod zenvia;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use switchboard_core::config::{ChannelSettings, ConfigError};
use switchboard_core::secrets::ApiKey;
use switchboard_core::types::{
    ChannelCapabilities, ChannelInfo, ChannelType, ConnectionStatus, ContentType,
    MessageStatus, OutboundMessage, ReadReceipt, SendResult, TypingIndicator,
};

use crate::context::Context;
use crate::http::ClientError;
use crate::lifecycle::{
    NOT_CONNECTED, SharedState, ensure_recipient, settle, unsigned_webhook_allowed,
    warn_if_unverified,
};
use crate::traits::{
    ChannelAdapter, ChannelError, MessageHandler, StatusHandler, WebhookEvents, WebhookHeaders,
};

pub use client::{AgentEvent, AgentInfo, RcsBackend, RcsClient};
pub use codec::{RcsOutbound, Suggestion};

/// Webhook path served by this adapter type.
pub const WEBHOOK_PATH: &str = "/webhooks/rcs";

/// Setting keys.
pub mod settings {
    /// Aggregator: `zenvia`, `infobip`, `pontaltech` or `google`.
    pub const PROVIDER: &str = "provider";
    /// RBM agent identifier (required).
    pub const AGENT_ID: &str = "agent_id";
    /// Aggregator API key or access token (required).
    pub const API_KEY: &str = "api_key";
    /// Secret half of a key pair, for aggregators that issue one.
    pub const API_SECRET: &str = "api_secret";
    /// Sender shown to users, when it differs from the agent ID.
    pub const SENDER_ID: &str = "sender_id";
    /// Public URL registered with the aggregator for callbacks.
    pub const WEBHOOK_URL: &str = "webhook_url";
    /// HMAC secret for webhook signatures.
    pub const WEBHOOK_SECRET: &str = "webhook_secret";
    /// API base URL override.
    pub const BASE_URL: &str = "base_url";
}

/// RCS aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RcsProvider {
    /// Zenvia.
    Zenvia,
    /// Infobip.
    Infobip,
    /// Pontaltech.
    Pontaltech,
    /// Google RCS Business Messaging.
    Google,
}

impl RcsProvider {
    /// Every supported aggregator.
    pub const ALL: [Self; 4] = [Self::Zenvia, Self::Infobip, Self::Pontaltech, Self::Google];

    /// Get string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zenvia => "zenvia",
            Self::Infobip => "infobip",
            Self::Pontaltech => "pontaltech",
            Self::Google => "google",
        }
    }

    /// Production API base URL.
    #[must_use]
    pub const fn default_base_url(&self) -> &'static str {
        match self {
            Self::Zenvia => "https://api.zenvia.com/v2",
            Self::Infobip => "https://api.infobip.com",
            Self::Pontaltech => "https://api.pontaltech.com.br/v1",
            Self::Google => "https://rcsbusinessmessaging.googleapis.com/v1",
        }
    }
}

impl fmt::Display for RcsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown aggregator name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown RCS provider: {0}")]
pub struct UnknownRcsProvider(pub String);

impl FromStr for RcsProvider {
    type Err = UnknownRcsProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownRcsProvider(s.to_string()))
    }
}

/// Validated RCS configuration.
///
/// `provider` stays a raw string here; it is resolved when connecting.
#[derive(Debug, Clone)]
pub struct RcsConfig {
    /// Aggregator name as configured.
    pub provider: String,
    /// Agent identifier.
    pub agent_id: String,
    /// API key or access token.
    pub api_key: ApiKey,
    /// Secret half of a key pair. Not used by the current aggregators.
    pub api_secret: Option<ApiKey>,
    /// Sender identity override.
    pub sender_id: Option<String>,
    /// Callback URL registered with the aggregator.
    pub webhook_url: Option<String>,
    /// Webhook HMAC secret.
    pub webhook_secret: Option<ApiKey>,
    /// API base URL override.
    pub base_url: Option<String>,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Reject unsigned webhooks when no secret is set.
    pub strict_webhooks: bool,
}

impl RcsConfig {
    /// Parse settings. The provider defaults to Zenvia.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first missing or malformed key.
    pub fn from_settings(settings: &ChannelSettings) -> Result<Self, ConfigError> {
        let base_url = settings.optional(settings::BASE_URL);
        if let Some(url) = &base_url {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidField {
                key: settings::BASE_URL.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self {
            provider: settings
                .optional(settings::PROVIDER)
                .unwrap_or_else(|| RcsProvider::Zenvia.as_str().to_string()),
            agent_id: settings.require(settings::AGENT_ID)?.to_string(),
            api_key: settings.secret(settings::API_KEY)?,
            api_secret: settings.optional_secret(settings::API_SECRET),
            sender_id: settings.optional(settings::SENDER_ID),
            webhook_url: settings.optional(settings::WEBHOOK_URL),
            webhook_secret: settings.optional_secret(settings::WEBHOOK_SECRET),
            base_url,
            timeout: settings.timeout()?,
            strict_webhooks: settings.strict_webhooks()?,
        })
    }

    /// Resolve the configured aggregator.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidField` for an unknown name.
    pub fn resolve_provider(&self) -> Result<RcsProvider, ConfigError> {
        self.provider
            .parse()
            .map_err(|e: UnknownRcsProvider| ConfigError::InvalidField {
                key: settings::PROVIDER.to_string(),
                reason: e.to_string(),
            })
    }
}

/// RCS channel adapter.
pub struct RcsAdapter {
    state: SharedState<RcsConfig, RcsClient>,
    capabilities: ChannelCapabilities,
}

impl RcsAdapter {
    /// Create an uninitialized adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SharedState::new(),
            capabilities: capabilities(),
        }
    }

    /// Aggregator of the live connection.
    pub async fn provider(&self) -> Option<RcsProvider> {
        Some(self.state.connection().await?.client.provider())
    }

    async fn send_event(
        &self,
        ctx: &Context,
        recipient_id: &str,
        event: AgentEvent<'_>,
    ) -> Result<(), ChannelError> {
        let conn = self
            .state
            .connection()
            .await
            .ok_or(ChannelError::NotConnected)?;
        ctx.run(conn.client.send_event(recipient_id, event)).await??;
        Ok(())
    }
}

impl Default for RcsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn capabilities() -> ChannelCapabilities {
    ChannelCapabilities {
        supported_content_types: vec![
            ContentType::Text,
            ContentType::Image,
            ContentType::Video,
            ContentType::Audio,
            ContentType::Document,
            ContentType::Location,
            ContentType::Interactive,
        ],
        supports_media: true,
        supports_location: true,
        supports_templates: false,
        supports_interactive: true,
        supports_read_receipts: true,
        supports_typing_indicator: true,
        supports_reactions: false,
        supports_replies: false,
        supports_forwarding: false,
        max_message_length: 3072,
        max_media_size: 10 * 1024 * 1024,
        max_attachments: 1,
        supported_media_types: [
            "image/jpeg",
            "image/png",
            "image/gif",
            "video/mp4",
            "video/3gpp",
            "audio/mp3",
            "audio/aac",
            "application/pdf",
        ]
        .map(String::from)
        .to_vec(),
    }
}

#[async_trait]
impl ChannelAdapter for RcsAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Rcs
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_type: ChannelType::Rcs,
            name: "RCS Business Messaging",
            description: "Rich Communication Services through Zenvia, Infobip, Pontaltech or Google",
            version: env!("CARGO_PKG_VERSION"),
            capabilities: self.capabilities.clone(),
        }
    }

    fn webhook_path(&self) -> &'static str {
        WEBHOOK_PATH
    }

    async fn initialize(&self, settings: &ChannelSettings) -> Result<(), ChannelError> {
        let config = RcsConfig::from_settings(settings)?;
        warn_if_unverified("rcs", config.webhook_secret.is_some(), config.strict_webhooks);
        self.state.write().await.initialize(config)
    }

    async fn connect(&self, ctx: &Context) -> Result<(), ChannelError> {
        let mut state = self.state.write().await;
        if state.is_connected() {
            return Ok(());
        }
        let config = state.config()?;
        let provider = match config.resolve_provider() {
            Ok(provider) => provider,
            Err(err) => {
                let err = ChannelError::Config(err);
                state.mark_failed(&err);
                return Err(err);
            }
        };
        let client = RcsClient::new(&config, provider)?;

        let agent = state.probed(ctx.run(client.agent_info()).await)?;

        state.mark_connected(client);
        tracing::info!(
            provider = %agent.provider,
            agent_id = %agent.agent_id,
            callback_url = config.webhook_url.as_deref().unwrap_or("-"),
            "RCS agent connected"
        );
        Ok(())
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<(), ChannelError> {
        if let Some((config, client)) = self.state.write().await.disconnect() {
            tracing::info!(
                provider = %client.provider(),
                agent_id = %config.agent_id,
                "RCS agent disconnected"
            );
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.is_connected().await
    }

    async fn connection_status(&self) -> ConnectionStatus {
        self.state.status().await
    }

    async fn send_message(
        &self,
        ctx: &Context,
        message: &OutboundMessage,
    ) -> Result<SendResult, ChannelError> {
        ensure_recipient(message)?;
        let Some(conn) = self.state.connection().await else {
            return Ok(SendResult::failed(NOT_CONNECTED));
        };
        let outbound = match codec::build_outbound(message) {
            Ok(outbound) => outbound,
            Err(reason) => return Ok(SendResult::failed(reason)),
        };
        if conn.client.provider() == RcsProvider::Zenvia && zenvia::drops_suggestions(&outbound) {
            tracing::debug!(
                recipient_id = %message.recipient_id,
                "Zenvia file content cannot carry buttons, suggestions dropped"
            );
        }

        let outcome = ctx
            .run(async {
                let id = conn.client.send(&message.recipient_id, &outbound).await?;
                Ok::<_, ClientError>(SendResult::sent(id, MessageStatus::Sent))
            })
            .await;
        Ok(settle(outcome))
    }

    async fn send_typing_indicator(
        &self,
        ctx: &Context,
        indicator: &TypingIndicator,
    ) -> Result<(), ChannelError> {
        // RBM typing events expire on their own
        if !indicator.active {
            return Ok(());
        }
        self.send_event(ctx, &indicator.recipient_id, AgentEvent::Typing)
            .await
    }

    async fn send_read_receipt(
        &self,
        ctx: &Context,
        receipt: &ReadReceipt,
    ) -> Result<(), ChannelError> {
        let Some(message_id) = receipt.message_id.as_deref() else {
            tracing::debug!("RCS read receipts need a message id, skipping");
            return Ok(());
        };
        self.send_event(ctx, &receipt.recipient_id, AgentEvent::Read { message_id })
            .await
    }

    async fn set_message_handler(&self, handler: Option<Arc<dyn MessageHandler>>) {
        self.state.set_message_handler(handler).await;
    }

    async fn set_status_handler(&self, handler: Option<Arc<dyn StatusHandler>>) {
        self.state.set_status_handler(handler).await;
    }

    async fn validate_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> bool {
        let Some(config) = self.state.config().await else {
            return false;
        };
        let Some(secret) = &config.webhook_secret else {
            return unsigned_webhook_allowed(config.strict_webhooks);
        };
        codec::verify_signature(secret.expose(), headers, body)
    }

    async fn process_webhook(
        &self,
        ctx: &Context,
        body: &[u8],
    ) -> Result<WebhookEvents, ChannelError> {
        let conn = self
            .state
            .connection()
            .await
            .ok_or(ChannelError::NotConnected)?;
        let events = conn.client.parse_webhook(body)?;
        conn.handlers.dispatch(ctx, &events).await?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::post;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use switchboard_core::types::LifecycleState;

    use crate::signature::hmac_sha256_hex;
    use crate::test_support::{Captured, Collector, captured, spawn};

    const REJECTED_NUMBER: &str = "+5500000000000";

    fn header_value(headers: &HeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    async fn mock_aggregators(log: Captured) -> String {
        let zenvia_log = log.clone();
        let infobip_log = log.clone();
        let pontaltech_log = log.clone();
        let google_log = log;
        let router = Router::new()
            .route(
                "/channels/rcs/messages",
                post(move |headers: HeaderMap, body: String| {
                    let log = zenvia_log.clone();
                    async move {
                        let token = header_value(&headers, "x-api-token");
                        log.lock().unwrap().push(format!("zenvia|{token}|{body}"));
                        if body.contains(REJECTED_NUMBER) {
                            return (
                                StatusCode::BAD_REQUEST,
                                r#"{"code":"VALIDATION_ERROR","message":"Invalid recipient"}"#
                                    .to_string(),
                            );
                        }
                        (StatusCode::OK, json!({"id": "m1"}).to_string())
                    }
                }),
            )
            .route(
                "/rcs/1/messages",
                post(move |headers: HeaderMap, body: String| {
                    let log = infobip_log.clone();
                    async move {
                        let auth = header_value(&headers, "authorization");
                        log.lock().unwrap().push(format!("infobip|{auth}|{body}"));
                        json!({"messages": [{"messageId": "m2", "status": {"groupName": "PENDING"}}]})
                            .to_string()
                    }
                }),
            )
            .route(
                "/rcs/send",
                post(move |headers: HeaderMap, body: String| {
                    let log = pontaltech_log.clone();
                    async move {
                        let auth = header_value(&headers, "authorization");
                        log.lock().unwrap().push(format!("pontaltech|{auth}|{body}"));
                        json!({"id": "m3"}).to_string()
                    }
                }),
            )
            .route(
                "/phones/{phone}/{collection}",
                post(
                    move |Path((phone, collection)): Path<(String, String)>,
                          uri: Uri,
                          body: String| {
                        let log = google_log.clone();
                        async move {
                            let query = uri.query().unwrap_or_default().to_string();
                            log.lock()
                                .unwrap()
                                .push(format!("google|{phone}|{collection}|{query}|{body}"));
                            if collection == "agentMessages" {
                                json!({"name": format!("phones/{phone}/agentMessages/m4")})
                                    .to_string()
                            } else {
                                "{}".to_string()
                            }
                        }
                    },
                ),
            );
        spawn(router).await
    }

    fn settings(provider: &str, base: &str) -> ChannelSettings {
        ChannelSettings::new()
            .with(settings::PROVIDER, provider)
            .with(settings::AGENT_ID, "agent-1")
            .with(settings::API_KEY, "key")
            .with(settings::BASE_URL, base)
    }

    async fn connected(provider: &str, base: &str) -> RcsAdapter {
        let adapter = RcsAdapter::new();
        adapter.initialize(&settings(provider, base)).await.unwrap();
        adapter.connect(&Context::background()).await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_send_dispatches_per_provider() {
        let log = captured();
        let base = mock_aggregators(log.clone()).await;
        let message = OutboundMessage::text("+5511999999999", "hi");
        let ctx = Context::background();

        let zenvia = connected("zenvia", &base).await;
        let result = zenvia.send_message(&ctx, &message).await.unwrap();
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("m1"));

        let infobip = connected("infobip", &base).await;
        let result = infobip.send_message(&ctx, &message).await.unwrap();
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("m2"));

        let seen = log.lock().unwrap().clone();
        assert_eq!(
            seen[0],
            r#"zenvia|key|{"from":"agent-1","to":"+5511999999999","contents":[{"type":"text","text":"hi"}]}"#
        );
        assert_eq!(
            seen[1],
            r#"infobip|App key|{"from":"agent-1","destinations":[{"to":"+5511999999999"}],"content":{"type":"TEXT","text":"hi"}}"#
        );
    }

    #[tokio::test]
    async fn test_send_pontaltech_and_google() {
        let log = captured();
        let base = mock_aggregators(log.clone()).await;
        let ctx = Context::background();
        let message = OutboundMessage::text("+5511999999999", "hi");

        let pontaltech = connected("pontaltech", &base).await;
        let result = pontaltech.send_message(&ctx, &message).await.unwrap();
        assert_eq!(result.external_id.as_deref(), Some("m3"));

        let google = connected("Google", &base).await;
        assert_eq!(google.provider().await, Some(RcsProvider::Google));
        let result = google.send_message(&ctx, &message).await.unwrap();
        assert_eq!(
            result.external_id.as_deref(),
            Some("phones/+5511999999999/agentMessages/m4")
        );

        let seen = log.lock().unwrap().clone();
        assert!(seen[0].starts_with("pontaltech|Bearer key|"));
        let google_call = &seen[1];
        assert!(google_call.starts_with("google|+5511999999999|agentMessages|messageId="));
        assert!(google_call.contains("agentId=agent-1"));
        assert!(google_call.ends_with(r#"{"contentMessage":{"text":"hi"}}"#));
    }

    #[tokio::test]
    async fn test_provider_rejection_is_a_failed_result() {
        let base = mock_aggregators(captured()).await;
        let adapter = connected("zenvia", &base).await;

        let result = adapter
            .send_message(&Context::background(), &OutboundMessage::text(REJECTED_NUMBER, "hi"))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.status, MessageStatus::Failed);
        assert_eq!(
            result.error.as_deref(),
            Some(r#"API error (400): {"code":"VALIDATION_ERROR","message":"Invalid recipient"}"#)
        );
    }

    #[tokio::test]
    async fn test_unbuildable_and_disconnected_sends() {
        let base = mock_aggregators(captured()).await;
        let adapter = connected("zenvia", &base).await;
        let ctx = Context::background();

        let no_media = OutboundMessage {
            recipient_id: "+5511999999999".to_string(),
            content_type: ContentType::Image,
            ..OutboundMessage::default()
        };
        let result = adapter.send_message(&ctx, &no_media).await.unwrap();
        assert!(!result.success);

        assert!(matches!(
            adapter.send_message(&ctx, &OutboundMessage::text("", "hi")).await,
            Err(ChannelError::InvalidMessage(_))
        ));

        adapter.disconnect(&ctx).await.unwrap();
        adapter.disconnect(&ctx).await.unwrap();
        let result = adapter
            .send_message(&ctx, &OutboundMessage::text("+5511999999999", "hi"))
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some(NOT_CONNECTED));
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_at_connect() {
        let adapter = RcsAdapter::new();
        adapter
            .initialize(&settings("carrier-pigeon", "http://127.0.0.1:9"))
            .await
            .unwrap();

        let err = adapter.connect(&Context::background()).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Config(ConfigError::InvalidField { ref key, .. }) if key == "provider"
        ));
        let status = adapter.connection_status().await;
        assert!(!status.connected);
        assert_eq!(status.state, LifecycleState::Initialized);
        assert_eq!(
            status.last_error.as_deref(),
            Some("Configuration error: Invalid field provider: unknown RCS provider: carrier-pigeon")
        );
    }

    #[tokio::test]
    async fn test_settings_validation() {
        let adapter = RcsAdapter::new();
        let missing = ChannelSettings::new().with(settings::API_KEY, "key");
        assert!(matches!(
            adapter.initialize(&missing).await,
            Err(ChannelError::Config(ConfigError::MissingField(key))) if key == "agent_id"
        ));

        let blank_key = settings("zenvia", "http://unused").with(settings::API_KEY, "  ");
        assert!(matches!(
            adapter.initialize(&blank_key).await,
            Err(ChannelError::Config(ConfigError::MissingField(key))) if key == "api_key"
        ));

        let bad_url = settings("zenvia", "not a url");
        assert!(matches!(
            adapter.initialize(&bad_url).await,
            Err(ChannelError::Config(ConfigError::InvalidField { .. }))
        ));

        let defaults = RcsConfig::from_settings(
            &ChannelSettings::new()
                .with(settings::AGENT_ID, "a")
                .with(settings::API_KEY, "k"),
        )
        .unwrap();
        assert_eq!(defaults.resolve_provider().unwrap(), RcsProvider::Zenvia);
        assert_eq!(defaults.base_url, None);
    }

    #[tokio::test]
    async fn test_validate_webhook() {
        let body = br#"{"type":"MESSAGE"}"#;
        let adapter = RcsAdapter::new();
        assert!(!adapter.validate_webhook(&WebhookHeaders::new(), body).await);

        adapter
            .initialize(&settings("zenvia", "http://unused").with(settings::WEBHOOK_SECRET, "whsec"))
            .await
            .unwrap();
        let mut headers = WebhookHeaders::new();
        headers.insert(
            "X-Signature".to_string(),
            hmac_sha256_hex(b"whsec", body).unwrap(),
        );
        assert!(adapter.validate_webhook(&headers, body).await);
        assert!(!adapter.validate_webhook(&headers, b"{}").await);

        let unsigned = RcsAdapter::new();
        unsigned
            .initialize(&settings("zenvia", "http://unused"))
            .await
            .unwrap();
        assert!(unsigned.validate_webhook(&WebhookHeaders::new(), body).await);

        let strict = RcsAdapter::new();
        strict
            .initialize(&settings("zenvia", "http://unused").with("strict_webhooks", "true"))
            .await
            .unwrap();
        assert!(!strict.validate_webhook(&WebhookHeaders::new(), body).await);
    }

    #[tokio::test]
    async fn test_process_webhook_dispatches() {
        let base = mock_aggregators(captured()).await;
        let adapter = RcsAdapter::new();
        adapter.initialize(&settings("zenvia", &base)).await.unwrap();
        let body = json!({
            "type": "MESSAGE",
            "message": {"id": "in1", "from": "5511999999999", "to": "agent-1",
                        "contents": [{"type": "text", "text": "Yes", "payload": "yes"}]}
        })
        .to_string();

        assert!(matches!(
            adapter.process_webhook(&Context::background(), body.as_bytes()).await,
            Err(ChannelError::NotConnected)
        ));

        adapter.connect(&Context::background()).await.unwrap();
        let collector = Collector::new();
        adapter.set_message_handler(Some(collector.clone())).await;
        let events = adapter
            .process_webhook(&Context::background(), body.as_bytes())
            .await
            .unwrap();
        assert_eq!(events.messages.len(), 1);

        let received = collector.messages();
        assert_eq!(received[0].content_type, ContentType::Interactive);
        assert_eq!(received[0].metadata.get("postback_data"), Some("yes"));
        assert_eq!(received[0].metadata.get("provider.rcs"), Some("zenvia"));

        assert!(matches!(
            adapter.process_webhook(&Context::background(), b"not json").await,
            Err(ChannelError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_typing_and_read_events() {
        let log = captured();
        let base = mock_aggregators(log.clone()).await;
        let ctx = Context::background();

        let google = connected("google", &base).await;
        google
            .send_typing_indicator(
                &ctx,
                &TypingIndicator {
                    recipient_id: "+15550100".to_string(),
                    active: true,
                },
            )
            .await
            .unwrap();
        google
            .send_read_receipt(
                &ctx,
                &ReadReceipt {
                    recipient_id: "+15550100".to_string(),
                    message_id: Some("in1".to_string()),
                },
            )
            .await
            .unwrap();
        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].ends_with(r#"{"eventType":"IS_TYPING"}"#));
        assert!(seen[1].ends_with(r#"{"eventType":"READ","messageId":"in1"}"#));

        // Aggregators without agent events accept and ignore them
        let zenvia = connected("zenvia", &base).await;
        zenvia
            .send_typing_indicator(
                &ctx,
                &TypingIndicator {
                    recipient_id: "+15550100".to_string(),
                    active: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap().len(), 2);
    }
}
