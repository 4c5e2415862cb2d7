//! Telegram channel adapter using the Bot API.

pub mod client;
pub mod codec;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use switchboard_core::config::{ChannelSettings, ConfigError};
use switchboard_core::secrets::ApiKey;
use switchboard_core::types::{
    ChannelCapabilities, ChannelInfo, ChannelType, ConnectionStatus, ContentType,
    MessageStatus, OutboundMessage, SendResult, TypingIndicator,
};

use crate::context::Context;
use crate::http::ClientError;
use crate::lifecycle::{
    NOT_CONNECTED, SharedState, ensure_recipient, settle, unsigned_webhook_allowed,
    warn_if_unverified,
};
use crate::signature::constant_time_eq;
use crate::traits::{
    ChannelAdapter, ChannelError, MessageHandler, StatusHandler, WebhookEvents, WebhookHeaders,
    header,
};

pub use client::BotClient;
use codec::TelegramUser;

/// Default Bot API host.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Webhook path served by this adapter type.
pub const WEBHOOK_PATH: &str = "/webhooks/telegram";

/// Setting keys.
pub mod settings {
    /// Bot token from `@BotFather` (required).
    pub const BOT_TOKEN: &str = "bot_token";
    /// Public URL registered with `setWebhook`.
    pub const WEBHOOK_URL: &str = "webhook_url";
    /// Secret token Telegram echoes in every webhook.
    pub const WEBHOOK_SECRET: &str = "webhook_secret";
    /// Bot API host override.
    pub const API_BASE_URL: &str = "api_base_url";
}

/// Validated Telegram configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token.
    pub bot_token: ApiKey,
    /// Webhook URL to register on connect.
    pub webhook_url: Option<String>,
    /// Secret token for webhook verification.
    pub webhook_secret: Option<ApiKey>,
    /// Bot API host.
    pub api_base_url: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Reject unsigned webhooks when no secret is set.
    pub strict_webhooks: bool,
}

impl TelegramConfig {
    /// Parse settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first missing or malformed key.
    pub fn from_settings(settings: &ChannelSettings) -> Result<Self, ConfigError> {
        let webhook_url = settings.optional(settings::WEBHOOK_URL);
        if let Some(url) = &webhook_url {
            url::Url::parse(url).map_err(|e| ConfigError::InvalidField {
                key: settings::WEBHOOK_URL.to_string(),
                reason: e.to_string(),
            })?;
        }
        Ok(Self {
            bot_token: settings.secret(settings::BOT_TOKEN)?,
            webhook_url,
            webhook_secret: settings.optional_secret(settings::WEBHOOK_SECRET),
            api_base_url: settings
                .optional(settings::API_BASE_URL)
                .unwrap_or_else(|| TELEGRAM_API_BASE.to_string()),
            timeout: settings.timeout()?,
            strict_webhooks: settings.strict_webhooks()?,
        })
    }
}

/// A live bot connection.
pub struct BotSession {
    api: BotClient,
    me: TelegramUser,
    webhook_registered: bool,
}

impl BotSession {
    /// The bot account returned by `getMe`.
    #[must_use]
    pub const fn me(&self) -> &TelegramUser {
        &self.me
    }
}

/// Telegram channel adapter.
pub struct TelegramAdapter {
    state: SharedState<TelegramConfig, BotSession>,
    capabilities: ChannelCapabilities,
}

impl TelegramAdapter {
    /// Create an uninitialized adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SharedState::new(),
            capabilities: capabilities(),
        }
    }

    /// Username of the connected bot.
    pub async fn bot_username(&self) -> Option<String> {
        let conn = self.state.connection().await?;
        conn.client.me.username.clone()
    }

    /// Resolve a file ID (as found in inbound attachment URLs) to its
    /// download URL. The URL embeds the bot token.
    ///
    /// # Errors
    ///
    /// Fails when not connected or when `getFile` fails.
    pub async fn file_url(&self, ctx: &Context, file_id: &str) -> Result<String, ChannelError> {
        let conn = self
            .state
            .connection()
            .await
            .ok_or(ChannelError::NotConnected)?;
        let file = ctx.run(conn.client.api.get_file(file_id)).await??;
        let path = file
            .file_path
            .ok_or_else(|| ClientError::Decode("getFile returned no file_path".to_string()))?;
        Ok(conn.client.api.file_url(&path))
    }

    /// Download the contents of a file by ID.
    ///
    /// # Errors
    ///
    /// Fails when not connected, when the file is unavailable, or when the
    /// context ends first.
    pub async fn download_file(&self, ctx: &Context, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let conn = self
            .state
            .connection()
            .await
            .ok_or(ChannelError::NotConnected)?;
        let api = &conn.client.api;
        let bytes = ctx
            .run(async {
                let file = api.get_file(file_id).await?;
                let path = file
                    .file_path
                    .ok_or_else(|| ClientError::Decode("getFile returned no file_path".to_string()))?;
                api.download(&path).await
            })
            .await??;
        Ok(bytes)
    }
}

impl Default for TelegramAdapter {
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
        supports_read_receipts: false,
        supports_typing_indicator: true,
        supports_reactions: false,
        supports_replies: true,
        supports_forwarding: true,
        max_message_length: 4096,
        max_media_size: 50 * 1024 * 1024,
        max_attachments: 1,
        supported_media_types: [
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/webp",
            "video/mp4",
            "audio/mpeg",
            "audio/ogg",
            "application/pdf",
        ]
        .map(String::from)
        .to_vec(),
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_type: ChannelType::Telegram,
            name: "Telegram",
            description: "Telegram Bot API",
            version: env!("CARGO_PKG_VERSION"),
            capabilities: self.capabilities.clone(),
        }
    }

    fn webhook_path(&self) -> &'static str {
        WEBHOOK_PATH
    }

    async fn initialize(&self, settings: &ChannelSettings) -> Result<(), ChannelError> {
        let config = TelegramConfig::from_settings(settings)?;
        warn_if_unverified("telegram", config.webhook_secret.is_some(), config.strict_webhooks);
        self.state.write().await.initialize(config)
    }

    async fn connect(&self, ctx: &Context) -> Result<(), ChannelError> {
        let mut state = self.state.write().await;
        if state.is_connected() {
            return Ok(());
        }
        let config = state.config()?;
        let api = BotClient::new(&config)?;

        let me = state.probed(ctx.run(api.get_me()).await)?;

        let mut webhook_registered = false;
        if let Some(url) = &config.webhook_url {
            let secret = config.webhook_secret.as_ref().map(ApiKey::expose);
            match ctx.run(api.set_webhook(url, secret)).await {
                Ok(Ok(())) => webhook_registered = true,
                Ok(Err(err)) => tracing::warn!("setWebhook failed: {err}"),
                Err(err) => tracing::warn!("setWebhook interrupted: {err}"),
            }
        }

        tracing::info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or_default(),
            "Telegram bot connected: {}",
            me.first_name
        );
        state.mark_connected(BotSession {
            api,
            me,
            webhook_registered,
        });
        Ok(())
    }

    async fn disconnect(&self, ctx: &Context) -> Result<(), ChannelError> {
        let Some((_, session)) = self.state.write().await.disconnect() else {
            return Ok(());
        };
        if session.webhook_registered {
            match ctx.run(session.api.delete_webhook()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("deleteWebhook failed: {err}"),
                Err(err) => tracing::warn!("deleteWebhook interrupted: {err}"),
            }
        }
        tracing::info!(bot_id = session.me.id, "Telegram bot disconnected");
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
        let call = match codec::build_request(message) {
            Ok(call) => call,
            Err(reason) => return Ok(SendResult::failed(reason)),
        };

        let outcome = ctx
            .run(async {
                let sent = conn.client.api.send(&call).await?;
                Ok::<_, ClientError>(SendResult::sent(
                    sent.message_id.to_string(),
                    MessageStatus::Sent,
                ))
            })
            .await;
        Ok(settle(outcome))
    }

    async fn send_typing_indicator(
        &self,
        ctx: &Context,
        indicator: &TypingIndicator,
    ) -> Result<(), ChannelError> {
        // Chat actions expire on their own; there is no "stop typing"
        if !indicator.active {
            return Ok(());
        }
        let conn = self
            .state
            .connection()
            .await
            .ok_or(ChannelError::NotConnected)?;
        ctx.run(conn.client.api.send_chat_action(&indicator.recipient_id, "typing"))
            .await??;
        Ok(())
    }

    async fn set_message_handler(&self, handler: Option<Arc<dyn MessageHandler>>) {
        self.state.set_message_handler(handler).await;
    }

    async fn set_status_handler(&self, handler: Option<Arc<dyn StatusHandler>>) {
        self.state.set_status_handler(handler).await;
    }

    async fn validate_webhook(&self, headers: &WebhookHeaders, _body: &[u8]) -> bool {
        let Some(config) = self.state.config().await else {
            return false;
        };
        let Some(secret) = &config.webhook_secret else {
            return unsigned_webhook_allowed(config.strict_webhooks);
        };
        header(headers, codec::SECRET_TOKEN_HEADER)
            .is_some_and(|token| constant_time_eq(secret.expose(), token))
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
        let events = codec::parse_update(body)?;
        conn.handlers.dispatch(ctx, &events).await?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use switchboard_core::types::LifecycleState;

    use crate::test_support::{Captured, Collector, captured, spawn};

    const TOKEN: &str = "123:ABC";

    async fn mock_bot_api(log: Captured) -> String {
        let router = Router::new()
            .route(
                "/bot123:ABC/{method}",
                post(move |Path(method): Path<String>, body: String| {
                    let log = log.clone();
                    async move {
                        log.lock().unwrap().push(format!("{method} {body}"));
                        let params: Value = serde_json::from_str(&body).unwrap_or_default();
                        match method.as_str() {
                            "setWebhook" | "deleteWebhook" | "sendChatAction" => {
                                (StatusCode::OK, Json(json!({"ok": true, "result": true})))
                            }
                            "getFile" => (
                                StatusCode::OK,
                                Json(json!({"ok": true, "result": {"file_id": params["file_id"], "file_path": "photos/file_1.jpg"}})),
                            ),
                            _ if params["chat_id"] == "404" => (
                                StatusCode::BAD_REQUEST,
                                Json(json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"})),
                            ),
                            _ => (StatusCode::OK, Json(json!({"ok": true, "result": {"message_id": 77}}))),
                        }
                    }
                })
                .get(|Path(method): Path<String>| async move {
                    assert_eq!(method, "getMe");
                    Json(json!({"ok": true, "result": {"id": 1, "is_bot": true, "first_name": "Switch", "username": "switch_bot"}}))
                }),
            )
            .route(
                "/file/bot123:ABC/photos/file_1.jpg",
                get(|| async { vec![0xFF_u8, 0xD8, 0xFF] }),
            );
        spawn(router).await
    }

    fn settings(base: &str) -> ChannelSettings {
        ChannelSettings::new()
            .with(settings::BOT_TOKEN, TOKEN)
            .with(settings::API_BASE_URL, base)
    }

    async fn connected(settings: &ChannelSettings) -> TelegramAdapter {
        let adapter = TelegramAdapter::new();
        adapter.initialize(settings).await.unwrap();
        adapter.connect(&Context::background()).await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn test_connect_registers_and_removes_webhook() {
        let log = captured();
        let base = mock_bot_api(log.clone()).await;
        let adapter = connected(
            &settings(&base)
                .with(settings::WEBHOOK_URL, "https://hooks.example.com/webhooks/telegram/tg")
                .with(settings::WEBHOOK_SECRET, "s3cret"),
        )
        .await;
        assert_eq!(adapter.bot_username().await.as_deref(), Some("switch_bot"));

        let ctx = Context::background();
        adapter.disconnect(&ctx).await.unwrap();
        adapter.disconnect(&ctx).await.unwrap();
        assert_eq!(adapter.connection_status().await.state, LifecycleState::Disconnected);

        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("setWebhook"));
        assert!(calls[0].contains(r#""secret_token":"s3cret""#));
        assert!(calls[1].starts_with("deleteWebhook"));
    }

    #[tokio::test]
    async fn test_send_message() {
        let log = captured();
        let base = mock_bot_api(log.clone()).await;
        let adapter = connected(&settings(&base)).await;
        let ctx = Context::background();

        let result = adapter
            .send_message(&ctx, &OutboundMessage::text("42", "hello"))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("77"));

        let photo = OutboundMessage::media("42", ContentType::Image, "https://x/p.jpg");
        assert!(adapter.send_message(&ctx, &photo).await.unwrap().success);
        assert!(log.lock().unwrap()[1].starts_with("sendPhoto"));

        let failed = adapter
            .send_message(&ctx, &OutboundMessage::text("404", "hello"))
            .await
            .unwrap();
        assert!(!failed.success);
        assert_eq!(
            failed.error.as_deref(),
            Some("API error (400): Bad Request: chat not found")
        );
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let adapter = TelegramAdapter::new();
        let result = adapter
            .send_message(&Context::background(), &OutboundMessage::text("42", "hi"))
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some(NOT_CONNECTED));
    }

    #[tokio::test]
    async fn test_typing_indicator() {
        let log = captured();
        let base = mock_bot_api(log.clone()).await;
        let adapter = connected(&settings(&base)).await;
        let ctx = Context::background();

        let on = TypingIndicator {
            recipient_id: "42".to_string(),
            active: true,
        };
        adapter.send_typing_indicator(&ctx, &on).await.unwrap();
        let off = TypingIndicator { active: false, ..on };
        adapter.send_typing_indicator(&ctx, &off).await.unwrap();

        let calls = log.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains(r#""action":"typing""#));
    }

    #[tokio::test]
    async fn test_file_download() {
        let base = mock_bot_api(captured()).await;
        let adapter = connected(&settings(&base)).await;
        let ctx = Context::background();

        let url = adapter.file_url(&ctx, "F1").await.unwrap();
        assert_eq!(url, format!("{base}/file/bot{TOKEN}/photos/file_1.jpg"));
        let bytes = adapter.download_file(&ctx, "F1").await.unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_validate_webhook() {
        let adapter = TelegramAdapter::new();
        adapter
            .initialize(&settings("http://unused").with(settings::WEBHOOK_SECRET, "s3cret"))
            .await
            .unwrap();

        let mut headers = WebhookHeaders::new();
        headers.insert(
            "x-telegram-bot-api-secret-token".to_string(),
            "s3cret".to_string(),
        );
        assert!(adapter.validate_webhook(&headers, b"{}").await);
        headers.insert(
            "x-telegram-bot-api-secret-token".to_string(),
            "wrong".to_string(),
        );
        assert!(!adapter.validate_webhook(&headers, b"{}").await);

        adapter.initialize(&settings("http://unused")).await.unwrap();
        assert!(adapter.validate_webhook(&WebhookHeaders::new(), b"{}").await);
    }

    #[tokio::test]
    async fn test_process_webhook_dispatches() {
        let base = mock_bot_api(captured()).await;
        let adapter = connected(&settings(&base)).await;
        let collector = Collector::new();
        adapter.set_message_handler(Some(collector.clone())).await;

        let body = json!({"update_id": 1, "message": {
            "message_id": 3, "date": 1, "chat": {"id": 42, "type": "private"},
            "from": {"id": 42, "first_name": "Ada"}, "text": "/start"}});
        let events = adapter
            .process_webhook(&Context::background(), body.to_string().as_bytes())
            .await
            .unwrap();
        assert_eq!(events.messages.len(), 1);
        assert_eq!(collector.messages()[0].content, "/start");
    }

    #[tokio::test]
    async fn test_invalid_settings() {
        let adapter = TelegramAdapter::new();
        assert!(matches!(
            adapter.initialize(&ChannelSettings::new()).await,
            Err(ChannelError::Config(ConfigError::MissingField(_)))
        ));
        assert!(matches!(
            adapter
                .initialize(&settings("x").with(settings::WEBHOOK_URL, "not a url"))
                .await,
            Err(ChannelError::Config(ConfigError::InvalidField { .. }))
        ));
    }
}
