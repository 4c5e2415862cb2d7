//! SMS and MMS adapter over Twilio Programmable Messaging.

pub mod client;
pub mod codec;
pub mod twiml;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use switchboard_core::config::{ChannelSettings, ConfigError};
use switchboard_core::secrets::ApiKey;
use switchboard_core::types::{
    ChannelCapabilities, ChannelInfo, ChannelType, ConnectionStatus, ContentType,
    OutboundMessage, SendResult,
};
use switchboard_core::validation::validate_e164;

use crate::context::Context;
use crate::http::ClientError;
use crate::lifecycle::{
    NOT_CONNECTED, SharedState, ensure_recipient, settle, unsigned_webhook_allowed,
    warn_if_unverified,
};
use crate::signature::verify_twilio_signature;
use crate::traits::{
    ChannelAdapter, ChannelError, MessageHandler, StatusHandler, WebhookEvents, WebhookHeaders,
    header,
};

pub use client::TwilioClient;
pub use codec::Sender;
pub use twiml::TwimlResponse;

/// Default Twilio API host.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Webhook path served by this adapter type.
pub const WEBHOOK_PATH: &str = "/webhooks/sms";

/// Setting keys.
pub mod settings {
    /// Account SID (required).
    pub const ACCOUNT_SID: &str = "account_sid";
    /// Account auth token. Also signs webhooks.
    pub const AUTH_TOKEN: &str = "auth_token";
    /// API key SID, used with `api_key_secret` instead of the auth token.
    pub const API_KEY_SID: &str = "api_key_sid";
    /// API key secret.
    pub const API_KEY_SECRET: &str = "api_key_secret";
    /// Sending number in E.164.
    pub const PHONE_NUMBER: &str = "phone_number";
    /// Messaging service SID, used instead of a fixed number.
    pub const MESSAGING_SERVICE_SID: &str = "messaging_service_sid";
    /// URL Twilio posts delivery reports to.
    pub const STATUS_CALLBACK_URL: &str = "status_callback_url";
    /// Public URL of this webhook, exactly as configured in Twilio.
    pub const WEBHOOK_URL: &str = "webhook_url";
    /// Country code for recipients given without a leading `+`.
    pub const DEFAULT_COUNTRY_CODE: &str = "default_country_code";
    /// Twilio host override.
    pub const API_BASE_URL: &str = "api_base_url";
}

/// Credentials for the REST API.
#[derive(Debug, Clone)]
pub enum TwilioCredentials {
    /// Account SID and auth token.
    AuthToken(ApiKey),
    /// API key pair.
    ApiKey {
        /// Key SID.
        sid: String,
        /// Key secret.
        secret: ApiKey,
    },
}

impl TwilioCredentials {
    /// Username and password for HTTP basic auth.
    #[must_use]
    pub fn basic_auth<'a>(&'a self, account_sid: &'a str) -> (&'a str, &'a ApiKey) {
        match self {
            Self::AuthToken(token) => (account_sid, token),
            Self::ApiKey { sid, secret } => (sid, secret),
        }
    }
}

/// Validated Twilio configuration.
#[derive(Debug, Clone)]
pub struct SmsConfig {
    /// Account SID.
    pub account_sid: String,
    /// REST credentials.
    pub credentials: TwilioCredentials,
    /// Auth token for webhook signatures, when configured.
    pub auth_token: Option<ApiKey>,
    /// Sending identity.
    pub sender: Sender,
    /// Delivery report URL.
    pub status_callback_url: Option<String>,
    /// Public webhook URL, needed for signature checks.
    pub webhook_url: Option<String>,
    /// Country code for bare recipient numbers.
    pub default_country_code: Option<String>,
    /// Twilio host.
    pub api_base_url: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Reject unsigned webhooks when signatures cannot be checked.
    pub strict_webhooks: bool,
}

impl SmsConfig {
    /// Parse settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` naming the first missing or malformed key.
    pub fn from_settings(settings: &ChannelSettings) -> Result<Self, ConfigError> {
        let account_sid = settings.require(settings::ACCOUNT_SID)?.to_string();
        let auth_token = settings.optional_secret(settings::AUTH_TOKEN);

        let credentials = match (&auth_token, settings.get(settings::API_KEY_SID)) {
            (Some(token), _) => TwilioCredentials::AuthToken(token.clone()),
            (None, Some(sid)) => TwilioCredentials::ApiKey {
                sid: sid.to_string(),
                secret: settings.secret(settings::API_KEY_SECRET)?,
            },
            (None, None) => return Err(ConfigError::MissingField(settings::AUTH_TOKEN.to_string())),
        };

        let sender = match (
            settings.get(settings::PHONE_NUMBER),
            settings.get(settings::MESSAGING_SERVICE_SID),
        ) {
            (Some(number), _) => {
                validate_e164(number).map_err(|e| ConfigError::InvalidField {
                    key: settings::PHONE_NUMBER.to_string(),
                    reason: e.to_string(),
                })?;
                Sender::PhoneNumber(number.to_string())
            }
            (None, Some(sid)) => Sender::MessagingService(sid.to_string()),
            (None, None) => {
                return Err(ConfigError::MissingField(settings::PHONE_NUMBER.to_string()));
            }
        };

        Ok(Self {
            account_sid,
            credentials,
            auth_token,
            sender,
            status_callback_url: settings.optional(settings::STATUS_CALLBACK_URL),
            webhook_url: settings.optional(settings::WEBHOOK_URL),
            default_country_code: settings.optional(settings::DEFAULT_COUNTRY_CODE),
            api_base_url: settings
                .optional(settings::API_BASE_URL)
                .unwrap_or_else(|| TWILIO_API_BASE.to_string()),
            timeout: settings.timeout()?,
            strict_webhooks: settings.strict_webhooks()?,
        })
    }

    /// Auth token and webhook URL, when signatures can be checked.
    fn signing_key(&self) -> Option<(&ApiKey, &str)> {
        Some((self.auth_token.as_ref()?, self.webhook_url.as_deref()?))
    }
}

/// SMS/MMS channel adapter.
pub struct SmsAdapter {
    state: SharedState<SmsConfig, TwilioClient>,
    capabilities: ChannelCapabilities,
}

impl SmsAdapter {
    /// Create an uninitialized adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SharedState::new(),
            capabilities: capabilities(),
        }
    }
}

impl Default for SmsAdapter {
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
        ],
        supports_media: true,
        supports_location: false,
        supports_templates: false,
        supports_interactive: false,
        supports_read_receipts: false,
        supports_typing_indicator: false,
        supports_reactions: false,
        supports_replies: false,
        supports_forwarding: false,
        max_message_length: 1600,
        max_media_size: 5 * 1024 * 1024,
        max_attachments: codec::MAX_MEDIA,
        supported_media_types: [
            "image/jpeg",
            "image/png",
            "image/gif",
            "video/mp4",
            "audio/mpeg",
            "text/vcard",
            "application/pdf",
        ]
        .map(String::from)
        .to_vec(),
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Sms
    }

    fn capabilities(&self) -> &ChannelCapabilities {
        &self.capabilities
    }

    fn info(&self) -> ChannelInfo {
        ChannelInfo {
            channel_type: ChannelType::Sms,
            name: "SMS",
            description: "SMS and MMS via Twilio",
            version: env!("CARGO_PKG_VERSION"),
            capabilities: self.capabilities.clone(),
        }
    }

    fn webhook_path(&self) -> &'static str {
        WEBHOOK_PATH
    }

    async fn initialize(&self, settings: &ChannelSettings) -> Result<(), ChannelError> {
        let config = SmsConfig::from_settings(settings)?;
        warn_if_unverified("sms", config.signing_key().is_some(), config.strict_webhooks);
        self.state.write().await.initialize(config)
    }

    async fn connect(&self, ctx: &Context) -> Result<(), ChannelError> {
        let mut state = self.state.write().await;
        if state.is_connected() {
            return Ok(());
        }
        let config = state.config()?;
        let client = TwilioClient::new(&config)?;

        let account = state.probed(ctx.run(client.account()).await)?;

        state.mark_connected(client);
        tracing::info!(
            account_sid = %account.sid,
            account_status = %account.status,
            "Twilio account connected: {}",
            account.friendly_name
        );
        Ok(())
    }

    async fn disconnect(&self, _ctx: &Context) -> Result<(), ChannelError> {
        if let Some((config, _)) = self.state.write().await.disconnect() {
            tracing::info!(account_sid = %config.account_sid, "Twilio account disconnected");
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
        let config = &conn.config;
        let form = match codec::build_form(
            message,
            &config.sender,
            config.status_callback_url.as_deref(),
            config.default_country_code.as_deref(),
        ) {
            Ok(form) => form,
            Err(reason) => return Ok(SendResult::failed(reason)),
        };

        let outcome = ctx
            .run(async {
                let resource = conn.client.send(&form).await?;
                Ok::<_, ClientError>(SendResult::sent(
                    resource.sid,
                    codec::map_send_status(&resource.status),
                ))
            })
            .await;
        Ok(settle(outcome))
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
        let Some((auth_token, webhook_url)) = config.signing_key() else {
            return unsigned_webhook_allowed(config.strict_webhooks);
        };
        let Some(signature) = header(headers, codec::SIGNATURE_HEADER) else {
            return false;
        };
        let Ok(params) = codec::parse_form(body) else {
            return false;
        };
        verify_twilio_signature(auth_token.expose(), webhook_url, &params, signature)
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
