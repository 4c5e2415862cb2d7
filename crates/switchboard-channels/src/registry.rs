//! Adapter registry and webhook router.
//!
//! The registry owns one adapter per channel ID. The router maps an inbound
//! webhook path of the form `{prefix}{webhook_path}/{channel_id}` to the
//! registered adapter and hands it the untouched headers and body.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;

use switchboard_core::config::{ChannelSettings, Config, ConfigError, WebhookConfig};
use switchboard_core::types::{ChannelType, ConnectionStatus};

use crate::context::Context;
use crate::facebook::FacebookAdapter;
use crate::rcs::RcsAdapter;
use crate::sms::SmsAdapter;
use crate::telegram::TelegramAdapter;
use crate::traits::{ChannelAdapter, ChannelError, WebhookEvents, WebhookHeaders};

/// Builds a fresh, uninitialized adapter.
pub type AdapterFactory = fn() -> Arc<dyn ChannelAdapter>;

fn facebook() -> Arc<dyn ChannelAdapter> {
    Arc::new(FacebookAdapter::new())
}

fn rcs() -> Arc<dyn ChannelAdapter> {
    Arc::new(RcsAdapter::new())
}

fn sms() -> Arc<dyn ChannelAdapter> {
    Arc::new(SmsAdapter::new())
}

fn telegram() -> Arc<dyn ChannelAdapter> {
    Arc::new(TelegramAdapter::new())
}

/// Registry of configured channel instances.
pub struct AdapterRegistry {
    factories: HashMap<ChannelType, AdapterFactory>,
    adapters: RwLock<BTreeMap<String, Arc<dyn ChannelAdapter>>>,
}

impl AdapterRegistry {
    /// Create an empty registry with every built-in adapter type.
    #[must_use]
    pub fn new() -> Self {
        let factories: [(ChannelType, AdapterFactory); 4] = [
            (ChannelType::Facebook, facebook),
            (ChannelType::Rcs, rcs),
            (ChannelType::Sms, sms),
            (ChannelType::Telegram, telegram),
        ];
        Self {
            factories: factories.into_iter().collect(),
            adapters: RwLock::new(BTreeMap::new()),
        }
    }

    /// Replace the factory used for a channel type.
    pub fn register_factory(&mut self, channel_type: ChannelType, factory: AdapterFactory) {
        self.factories.insert(channel_type, factory);
    }

    /// Build, initialize and connect an adapter under `channel_id`.
    ///
    /// Nothing is registered unless both steps succeed.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::InvalidState` if the ID is taken, a config
    /// error for a malformed ID, or whatever `initialize`/`connect` returns.
    pub async fn configure(
        &self,
        channel_id: &str,
        channel_type: ChannelType,
        settings: &ChannelSettings,
        ctx: &Context,
    ) -> Result<Arc<dyn ChannelAdapter>, ChannelError> {
        if channel_id.trim().is_empty() || channel_id.contains('/') {
            return Err(ConfigError::Validation(format!("invalid channel ID '{channel_id}'")).into());
        }
        if self.adapters.read().await.contains_key(channel_id) {
            return Err(ChannelError::InvalidState(format!(
                "channel '{channel_id}' is already configured"
            )));
        }
        let factory = self
            .factories
            .get(&channel_type)
            .ok_or_else(|| ChannelError::UnknownChannel(channel_type.to_string()))?;

        let adapter = factory();
        adapter.initialize(settings).await?;
        adapter.connect(ctx).await?;

        let inserted = match self.adapters.write().await.entry(channel_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&adapter));
                true
            }
            Entry::Occupied(_) => false,
        };
        if !inserted {
            // Lost a race with another configure of the same ID
            adapter.disconnect(ctx).await?;
            return Err(ChannelError::InvalidState(format!(
                "channel '{channel_id}' is already configured"
            )));
        }
        tracing::info!(channel_id, channel_type = %channel_type, "Channel configured");
        Ok(adapter)
    }

    /// Build a registry from a config file, starting every enabled channel.
    ///
    /// Fails on the first channel that cannot start, after disconnecting the
    /// ones already started.
    ///
    /// # Errors
    ///
    /// Returns the failing channel's error.
    pub async fn from_config(config: &Config, ctx: &Context) -> Result<Self, ChannelError> {
        let registry = Self::new();
        for (id, channel) in config.enabled_channels() {
            let settings = channel.effective_settings(config.webhooks.strict);
            if let Err(err) = registry
                .configure(id, channel.channel_type, &settings, ctx)
                .await
            {
                tracing::error!(channel_id = id, error = %err, "Channel failed to start");
                registry.shutdown(ctx).await;
                return Err(err);
            }
        }
        Ok(registry)
    }

    /// Get an adapter by channel ID.
    pub async fn get(&self, channel_id: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.read().await.get(channel_id).cloned()
    }

    /// Registered channel IDs with their types, in ID order.
    pub async fn list(&self) -> Vec<(String, ChannelType)> {
        self.adapters
            .read()
            .await
            .iter()
            .map(|(id, adapter)| (id.clone(), adapter.channel_type()))
            .collect()
    }

    /// Disconnect and unregister a channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::UnknownChannel` if nothing is registered under
    /// the ID, or the adapter's disconnect error.
    pub async fn remove(&self, channel_id: &str, ctx: &Context) -> Result<(), ChannelError> {
        let adapter = self
            .adapters
            .write()
            .await
            .remove(channel_id)
            .ok_or_else(|| ChannelError::UnknownChannel(channel_id.to_string()))?;
        adapter.disconnect(ctx).await?;
        tracing::info!(channel_id, "Channel removed");
        Ok(())
    }

    /// Connection status of every channel.
    pub async fn statuses(&self) -> BTreeMap<String, ConnectionStatus> {
        let adapters: Vec<_> = self
            .adapters
            .read()
            .await
            .iter()
            .map(|(id, adapter)| (id.clone(), Arc::clone(adapter)))
            .collect();
        let statuses = join_all(adapters.iter().map(|(_, a)| a.connection_status())).await;
        adapters
            .into_iter()
            .map(|(id, _)| id)
            .zip(statuses)
            .collect()
    }

    /// Disconnect and unregister every channel. Errors are logged.
    pub async fn shutdown(&self, ctx: &Context) {
        let adapters = std::mem::take(&mut *self.adapters.write().await);
        let results = join_all(adapters.values().map(|a| a.disconnect(ctx))).await;
        for (id, result) in adapters.keys().zip(results) {
            if let Err(err) = result {
                tracing::warn!(channel_id = %id, error = %err, "Channel disconnect failed");
            }
        }
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Webhook routing failures.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// No adapter owns the path.
    #[error("no channel for webhook path {0}")]
    NotFound(String),

    /// The adapter rejected the request's signature.
    #[error("webhook signature rejected")]
    Unauthorized,

    /// Body exceeds the configured limit.
    #[error("webhook body of {0} bytes exceeds the limit")]
    PayloadTooLarge(usize),

    /// The adapter failed to process the payload.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl RouteError {
    /// HTTP status to answer the provider with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthorized => 401,
            Self::PayloadTooLarge(_) => 413,
            Self::Channel(ChannelError::Parse(_) | ChannelError::InvalidMessage(_)) => 400,
            Self::Channel(_) => 500,
        }
    }
}

/// Maps webhook requests onto registered adapters.
pub struct WebhookRouter {
    registry: Arc<AdapterRegistry>,
    path_prefix: String,
    max_body_bytes: usize,
}

impl WebhookRouter {
    /// Create a router over `registry`.
    #[must_use]
    pub fn new(registry: Arc<AdapterRegistry>, config: &WebhookConfig) -> Self {
        Self {
            registry,
            path_prefix: config.path_prefix.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Full webhook path for a channel, to register with its provider.
    #[must_use]
    pub fn path_for(&self, webhook_path: &str, channel_id: &str) -> String {
        format!("{}{webhook_path}/{channel_id}", self.path_prefix)
    }

    /// Find the adapter serving `path`.
    ///
    /// The adapter type must own the path segment: a Telegram channel is not
    /// reachable under `/webhooks/sms/...`.
    pub async fn resolve(&self, path: &str) -> Option<Arc<dyn ChannelAdapter>> {
        let path = path.strip_prefix(self.path_prefix.as_str())?;
        let (webhook_path, channel_id) = path.rsplit_once('/')?;
        if channel_id.is_empty() {
            return None;
        }
        let adapter = self.registry.get(channel_id).await?;
        (adapter.webhook_path() == webhook_path).then_some(adapter)
    }

    /// Validate and process one webhook request.
    ///
    /// # Errors
    ///
    /// Returns a `RouteError` whose `status_code` is the HTTP answer.
    pub async fn handle(
        &self,
        ctx: &Context,
        path: &str,
        headers: &WebhookHeaders,
        body: &[u8],
    ) -> Result<WebhookEvents, RouteError> {
        if body.len() > self.max_body_bytes {
            return Err(RouteError::PayloadTooLarge(body.len()));
        }
        let adapter = self
            .resolve(path)
            .await
            .ok_or_else(|| RouteError::NotFound(path.to_string()))?;
        if !adapter.validate_webhook(headers, body).await {
            tracing::warn!(path, channel = %adapter.channel_type(), "Webhook signature rejected");
            return Err(RouteError::Unauthorized);
        }
        Ok(adapter.process_webhook(ctx, body).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use switchboard_core::config::ChannelConfig;
    use switchboard_core::types::LifecycleState;

    use crate::telegram::settings as tg;
    use crate::test_support::{Collector, spawn};

    const UPDATE: &str = r#"{"update_id":1,"message":{"message_id":5,"from":{"id":42,"is_bot":false,"first_name":"Ann"},"chat":{"id":42,"type":"private"},"date":1700000000,"text":"hello"}}"#;

    async fn mock_bot_api() -> String {
        let router = Router::new().route(
            "/bot123:ABC/getMe",
            get(|| async {
                Json(json!({"ok": true, "result": {"id": 1, "is_bot": true, "first_name": "Switch", "username": "switch_bot"}}))
            }),
        );
        spawn(router).await
    }

    fn telegram_settings(base: &str) -> ChannelSettings {
        ChannelSettings::new()
            .with(tg::BOT_TOKEN, "123:ABC")
            .with(tg::API_BASE_URL, base)
    }

    fn telegram_channel(settings: ChannelSettings) -> ChannelConfig {
        ChannelConfig {
            channel_type: ChannelType::Telegram,
            enabled: true,
            strict_webhooks: None,
            settings,
        }
    }

    fn secret_headers(secret: &str) -> WebhookHeaders {
        let mut headers = WebhookHeaders::new();
        headers.insert(
            "x-telegram-bot-api-secret-token".to_string(),
            secret.to_string(),
        );
        headers
    }

    #[tokio::test]
    async fn test_configure_get_list_remove() {
        let base = mock_bot_api().await;
        let registry = AdapterRegistry::new();
        let ctx = Context::background();

        registry
            .configure("tg", ChannelType::Telegram, &telegram_settings(&base), &ctx)
            .await
            .unwrap();
        assert!(registry.get("tg").await.unwrap().is_connected().await);
        assert_eq!(registry.list().await, vec![("tg".to_string(), ChannelType::Telegram)]);

        let duplicate = registry
            .configure("tg", ChannelType::Telegram, &telegram_settings(&base), &ctx)
            .await;
        assert!(matches!(duplicate, Err(ChannelError::InvalidState(_))));

        let statuses = registry.statuses().await;
        assert_eq!(statuses["tg"].state, LifecycleState::Connected);

        registry.remove("tg", &ctx).await.unwrap();
        assert!(registry.get("tg").await.is_none());
        assert!(matches!(
            registry.remove("tg", &ctx).await,
            Err(ChannelError::UnknownChannel(id)) if id == "tg"
        ));
    }

    #[tokio::test]
    async fn test_configure_failure_registers_nothing() {
        let registry = AdapterRegistry::new();
        let ctx = Context::background();

        let missing_token = registry
            .configure("sms", ChannelType::Sms, &ChannelSettings::new(), &ctx)
            .await;
        assert!(matches!(missing_token, Err(ChannelError::Config(_))));

        let bad_id = registry
            .configure("a/b", ChannelType::Telegram, &ChannelSettings::new(), &ctx)
            .await;
        assert!(matches!(bad_id, Err(ChannelError::Config(ConfigError::Validation(_)))));

        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_from_config_applies_strict_default() {
        let base = mock_bot_api().await;
        let mut config = Config::default();
        config.webhooks.strict = true;
        config
            .channels
            .insert("open".to_string(), telegram_channel(telegram_settings(&base)));
        let mut disabled = telegram_channel(ChannelSettings::new());
        disabled.enabled = false;
        config.channels.insert("off".to_string(), disabled);

        let ctx = Context::background();
        let registry = Arc::new(AdapterRegistry::from_config(&config, &ctx).await.unwrap());
        assert_eq!(registry.list().await.len(), 1);

        let router = WebhookRouter::new(Arc::clone(&registry), &config.webhooks);
        let err = router
            .handle(&ctx, "/webhooks/telegram/open", &WebhookHeaders::new(), UPDATE.as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, RouteError::Unauthorized));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_from_config_stops_on_first_failure() {
        let base = mock_bot_api().await;
        let mut config = Config::default();
        config
            .channels
            .insert("a-good".to_string(), telegram_channel(telegram_settings(&base)));
        config
            .channels
            .insert("b-bad".to_string(), telegram_channel(ChannelSettings::new()));

        let result = AdapterRegistry::from_config(&config, &Context::background()).await;
        assert!(matches!(result, Err(ChannelError::Config(_))));
    }

    #[tokio::test]
    async fn test_router_dispatches_by_path() {
        let base = mock_bot_api().await;
        let registry = Arc::new(AdapterRegistry::new());
        let ctx = Context::background();
        let adapter = registry
            .configure(
                "tg",
                ChannelType::Telegram,
                &telegram_settings(&base).with(tg::WEBHOOK_SECRET, "s3cret"),
                &ctx,
            )
            .await
            .unwrap();
        let collector = Collector::new();
        adapter.set_message_handler(Some(collector.clone())).await;

        let config = WebhookConfig {
            path_prefix: "/api".to_string(),
            max_body_bytes: 1024,
            ..WebhookConfig::default()
        };
        let router = WebhookRouter::new(registry, &config);
        assert_eq!(router.path_for("/webhooks/telegram", "tg"), "/api/webhooks/telegram/tg");

        let events = router
            .handle(&ctx, "/api/webhooks/telegram/tg", &secret_headers("s3cret"), UPDATE.as_bytes())
            .await
            .unwrap();
        assert_eq!(events.messages.len(), 1);
        assert_eq!(collector.messages()[0].content, "hello");

        let wrong_type = router
            .handle(&ctx, "/api/webhooks/sms/tg", &secret_headers("s3cret"), UPDATE.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(wrong_type.status_code(), 404);

        let no_prefix = router
            .handle(&ctx, "/webhooks/telegram/tg", &secret_headers("s3cret"), UPDATE.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(no_prefix.status_code(), 404);

        let forged = router
            .handle(&ctx, "/api/webhooks/telegram/tg", &secret_headers("guess"), UPDATE.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(forged.status_code(), 401);

        let garbage = router
            .handle(&ctx, "/api/webhooks/telegram/tg", &secret_headers("s3cret"), b"not json")
            .await
            .unwrap_err();
        assert_eq!(garbage.status_code(), 400);

        let oversized = vec![b' '; 2048];
        let too_large = router
            .handle(&ctx, "/api/webhooks/telegram/tg", &secret_headers("s3cret"), &oversized)
            .await
            .unwrap_err();
        assert_eq!(too_large.status_code(), 413);
    }
}
