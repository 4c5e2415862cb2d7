//! Facebook Messenger adapter over the Graph API.

pub mod client;
pub mod codec;

use async_trait::async_trait;
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
use crate::signature::constant_time_eq;
use crate::traits::{
    ChannelAdapter, ChannelError, MessageHandler, StatusHandler, WebhookEvents, WebhookHeaders,
    header,
};

pub use client::GraphClient;
use codec::SenderActionRequest;

/// Default Graph API host.
pub const GRAPH_API_BASE: &str = "https://graph.facebook.com";

/// Graph API version used for every call.
pub const GRAPH_API_VERSION: &str = "v22.0";

/// Webhook path served by this adapter type.
pub const WEBHOOK_PATH: &str = "/webhooks/facebook";

/// Setting keys.
pub mod settings {
    /// Page ID (required).
    pub const PAGE_ID: &str = "page_id";
    /// Page access token (required).
    pub const PAGE_ACCESS_TOKEN: &str = "page_access_token";
    /// App ID.
    pub const APP_ID: &str = "app_id";
    /// App secret, used for webhook signatures and `appsecret_proof`.
    pub const APP_SECRET: &str = "app_secret";
    /// Token expected in the hub verification handshake.
    pub const VERIFY_TOKEN: &str = "verify_token";
    /// User access token.
    pub const USER_ACCESS_TOKEN: &str = "user_access_token";
    /// Linked Instagram business account.
    pub const INSTAGRAM_ID: &str = "instagram_id";
    /// Graph host override.
    pub const API_BASE_URL: &str = "api_base_url";
}

/// Validated Messenger configuration.
#[derive(Debug, Clone)]
pub struct FacebookConfig {
    /// Page ID.
    pub page_id: String,
    /// Page access token.
    pub page_access_token: ApiKey,
    /// App ID.
    pub app_id: Option<String>,
    /// App secret.
    pub app_secret: Option<ApiKey>,
    /// Hub verification token.
    pub verify_token: Option<ApiKey>,
    /// User access token.
    pub user_access_token: Option<ApiKey>,
    /// Linked Instagram account ID.
    pub instagram_id: Option<String>,
    /// Graph host.
    pub api_base_url: String,
    /// Graph API version.
    pub api_version: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Reject unsigned webhooks when no app secret is set.
    pub strict_webhooks: bool,
}

impl FacebookConfig {
    /// Parse settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first missing or malformed key.
    pub fn from_settings(settings: &ChannelSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            page_id: settings.require(settings::PAGE_ID)?.to_string(),
            page_access_token: settings.secret(settings::PAGE_ACCESS_TOKEN)?,
            app_id: settings.optional(settings::APP_ID),
            app_secret: settings.optional_secret(settings::APP_SECRET),
            verify_token: settings.optional_secret(settings::VERIFY_TOKEN),
            user_access_token: settings.optional_secret(settings::USER_ACCESS_TOKEN),
            instagram_id: settings.optional(settings::INSTAGRAM_ID),
            api_base_url: settings
                .optional(settings::API_BASE_URL)
                .unwrap_or_else(|| GRAPH_API_BASE.to_string()),
            api_version: GRAPH_API_VERSION.to_string(),
            timeout: settings.timeout()?,
            strict_webhooks: settings.strict_webhooks()?,
        })
    }
}

/// Facebook Messenger channel adapter.
pub struct FacebookAdapter {
    state: SharedState<FacebookConfig, GraphClient>,
    capabilities: ChannelCapabilities,
}

impl FacebookAdapter {
    /// Create an uninitialized adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SharedState::new(),
            capabilities: capabilities(),
        }
    }

    /// Answer the hub verification handshake (`GET` with `hub.mode`,
    /// `hub.verify_token`, `hub.challenge`).
    ///
    /// Returns the challenge to echo back when the token matches.
    pub async fn verify_subscription(
        &self,
        mode: &str,
        token: &str,
        challenge: &str,
    ) -> Option<String> {
        let config = self.state.config().await?;
        let expected = config.verify_token.as_ref()?;
        (mode == "subscribe" && constant_time_eq(expected.expose(), token))
            .then(|| challenge.to_string())
    }

    async fn sender_action(
        &self,
        ctx: &Context,
        recipient_id: &str,
        action: &'static str,
    ) -> Result<(), ChannelError> {
        let conn = self
            .state
            .connection()
            .await
            .ok_or(ChannelError::NotConnected)?;
        let request = SenderActionRequest::new(recipient_id, action);
        ctx.run(conn.client.sender_action(&request)).await??;
        Ok(())
    }
}

impl Default for FacebookAdapter {
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
        max_message_length: 2000,
        max_media_size: 25 * 1024 * 1024,
        max_attachments: 1,
        supported_media_types: [
            "image/jpeg",
            "image/png",
            "image/gif",
            "video/mp4",
            "audio/mpeg",
            "audio/mp4",
            "application/pdf",
        ]
        .map(String::from)
        .to_vec(),
    }
}

#[async_trait]
impl ChannelAdapter for FacebookAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Facebook
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_type: ChannelType::Facebook,
            name: "Facebook Messenger",
            description: "Facebook Messenger via the Graph API",
            version: env!("CARGO_PKG_VERSION"),
            capabilities: self.capabilities.clone(),
        }
    }

    fn webhook_path(&self) -> &'static str {
        WEBHOOK_PATH
    }

    async fn initialize(&self, settings: &ChannelSettings) -> Result<(), ChannelError> {
        let config = FacebookConfig::from_settings(settings)?;
        warn_if_unverified("facebook", config.app_secret.is_some(), config.strict_webhooks);
        self.state.write().await.initialize(config)
    }

    async fn connect(&self, ctx: &Context) -> Result<(), ChannelError> {
        let mut state = self.state.write().await;
        if state.is_connected() {
            return Ok(());
        }
        let config = state.config()?;
        let client = GraphClient::new(&config)?;

        let page = state.probed(ctx.run(client.page_info()).await)?;

        match ctx.run(client.subscribe()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(page_id = %config.page_id, "webhook subscription failed: {err}"),
            Err(err) => tracing::warn!(page_id = %config.page_id, "webhook subscription interrupted: {err}"),
        }

        state.mark_connected(client);
        tracing::info!(page_id = %page.id, page_name = %page.name, "Facebook page connected");
        Ok(())
    }

    async fn disconnect(&self, ctx: &Context) -> Result<(), ChannelError> {
        let Some((config, client)) = self.state.write().await.disconnect() else {
            return Ok(());
        };
        match ctx.run(client.unsubscribe()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(page_id = %config.page_id, "webhook unsubscribe failed: {err}"),
            Err(err) => tracing::warn!(page_id = %config.page_id, "webhook unsubscribe interrupted: {err}"),
        }
        tracing::info!(page_id = %config.page_id, "Facebook page disconnected");
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
        let request = match codec::build_send_request(message) {
            Ok(request) => request,
            Err(reason) => return Ok(SendResult::failed(reason)),
        };

        let outcome = ctx
            .run(async {
                let response = conn.client.send(&request).await?;
                Ok::<_, ClientError>(SendResult::sent(response.message_id, MessageStatus::Sent))
            })
            .await;
        Ok(settle(outcome))
    }

    async fn send_typing_indicator(
        &self,
        ctx: &Context,
        indicator: &TypingIndicator,
    ) -> Result<(), ChannelError> {
        let action = if indicator.active { "typing_on" } else { "typing_off" };
        self.sender_action(ctx, &indicator.recipient_id, action).await
    }

    async fn send_read_receipt(
        &self,
        ctx: &Context,
        receipt: &ReadReceipt,
    ) -> Result<(), ChannelError> {
        self.sender_action(ctx, &receipt.recipient_id, "mark_seen").await
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
        let Some(secret) = &config.app_secret else {
            return unsigned_webhook_allowed(config.strict_webhooks);
        };
        header(headers, codec::SIGNATURE_HEADER)
            .is_some_and(|signature| codec::verify_signature(secret.expose(), body, signature))
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
        let events = codec::parse_webhook(body)?;
        conn.handlers.dispatch(ctx, &events).await?;
        Ok(events)
    }
}
