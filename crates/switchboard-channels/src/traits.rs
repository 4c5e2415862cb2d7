//! Adapter contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use switchboard_core::config::{ChannelSettings, ConfigError};
use switchboard_core::types::{
    ChannelCapabilities, ChannelInfo, ChannelType, ConnectionStatus, InboundMessage,
    OutboundMessage, ReadReceipt, SendResult, StatusCallback, TypingIndicator,
};

use crate::context::{Context, Interrupted};
use crate::http::ClientError;

/// Error a downstream handler may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Raw webhook request headers as forwarded by the router.
pub type WebhookHeaders = HashMap<String, String>;

/// Channel errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// `connect` called before `initialize`.
    #[error("Channel not initialized")]
    NotInitialized,

    /// Operation requires a connected adapter.
    #[error("Channel not connected")]
    NotConnected,

    /// Operation not allowed in the current lifecycle phase.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Liveness probe against the provider failed.
    #[error("Liveness probe failed: {0}")]
    Probe(#[source] ClientError),

    /// Provider API call failed.
    #[error("Provider call failed: {0}")]
    Client(#[from] ClientError),

    /// Webhook body is not valid JSON or form encoding.
    #[error("Invalid webhook payload: {0}")]
    Parse(String),

    /// A registered handler returned an error.
    #[error("Handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// The caller's context ended the operation.
    #[error(transparent)]
    Interrupted(#[from] Interrupted),

    /// Outbound message violates the contract (e.g. no recipient).
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// No adapter registered under the given channel ID.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

/// Receives normalized inbound messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one message. The error is returned to the webhook caller.
    async fn on_message(&self, ctx: &Context, message: InboundMessage) -> Result<(), HandlerError>;
}

/// Receives normalized delivery reports.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    /// Handle one status report. The error is returned to the webhook caller.
    async fn on_status(&self, ctx: &Context, status: StatusCallback) -> Result<(), HandlerError>;
}

/// Events extracted from one webhook delivery.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookEvents {
    /// Inbound messages, in payload order.
    pub messages: Vec<InboundMessage>,
    /// Delivery reports, in payload order.
    pub statuses: Vec<StatusCallback>,
}

impl WebhookEvents {
    /// Whether the payload carried nothing applicable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.statuses.is_empty()
    }

    /// Total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len() + self.statuses.len()
    }
}

/// Case-insensitive header lookup.
#[must_use]
pub fn header<'a>(headers: &'a WebhookHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A channel adapter.
///
/// Lifecycle: `initialize` (pure, validates settings) then `connect` (one
/// liveness probe) then `disconnect` (best effort, idempotent). Sends and
/// webhook processing need a connected adapter. Provider failures during a
/// send are reported inside [`SendResult`]; the `Err` side is reserved for
/// contract violations.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel type served by this adapter.
    fn channel_type(&self) -> ChannelType;

    /// Static capabilities of this adapter type.
    fn capabilities(&self) -> &ChannelCapabilities;

    /// Descriptive information.
    fn info(&self) -> ChannelInfo;

    /// Webhook path for this adapter type (e.g. `/webhooks/facebook`).
    fn webhook_path(&self) -> &'static str;

    /// Validate and store settings. May be repeated until `connect`.
    async fn initialize(&self, settings: &ChannelSettings) -> Result<(), ChannelError>;

    /// Build the provider client and probe the provider once.
    async fn connect(&self, ctx: &Context) -> Result<(), ChannelError>;

    /// Tear down. Never fails because of the provider.
    async fn disconnect(&self, ctx: &Context) -> Result<(), ChannelError>;

    /// Whether the adapter is connected.
    async fn is_connected(&self) -> bool;

    /// Connection status snapshot.
    async fn connection_status(&self) -> ConnectionStatus;

    /// Send one message, one attempt.
    async fn send_message(
        &self,
        ctx: &Context,
        message: &OutboundMessage,
    ) -> Result<SendResult, ChannelError>;

    /// Show or hide a typing indicator. No-op where unsupported.
    async fn send_typing_indicator(
        &self,
        _ctx: &Context,
        _indicator: &TypingIndicator,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Mark messages as read. No-op where unsupported.
    async fn send_read_receipt(
        &self,
        _ctx: &Context,
        _receipt: &ReadReceipt,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    /// Replace the message handler. `None` drops inbound messages.
    async fn set_message_handler(&self, handler: Option<Arc<dyn MessageHandler>>);

    /// Replace the status handler. `None` drops status reports.
    async fn set_status_handler(&self, handler: Option<Arc<dyn StatusHandler>>);

    /// Verify the provider signature of a webhook.
    ///
    /// Accepts everything when no secret is configured, unless the channel
    /// runs with `strict_webhooks`.
    async fn validate_webhook(&self, headers: &WebhookHeaders, body: &[u8]) -> bool;

    /// Parse a webhook body and dispatch its events to the handlers.
    async fn process_webhook(
        &self,
        ctx: &Context,
        body: &[u8],
    ) -> Result<WebhookEvents, ChannelError>;
}
