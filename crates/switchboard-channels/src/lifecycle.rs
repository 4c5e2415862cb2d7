//! Lifecycle state shared by every adapter.
//!
//! Each adapter keeps one `tokio::sync::RwLock` around its mutable state.
//! Readers snapshot the `Arc`s they need and release the lock before any
//! network call or handler invocation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

use switchboard_core::types::{ConnectionStatus, LifecycleState, OutboundMessage, SendResult};

use crate::context::{Context, Interrupted};
use crate::http::ClientError;
use crate::traits::{ChannelError, MessageHandler, StatusHandler, WebhookEvents};

/// Error text for sends on an adapter that is not connected.
pub(crate) const NOT_CONNECTED: &str = "adapter not connected";

/// Registered downstream callbacks.
#[derive(Clone, Default)]
pub(crate) struct Handlers {
    pub message: Option<Arc<dyn MessageHandler>>,
    pub status: Option<Arc<dyn StatusHandler>>,
}

impl Handlers {
    /// Hand events to the registered handlers, stopping at the first error.
    ///
    /// Events for a missing handler are dropped.
    pub async fn dispatch(&self, ctx: &Context, events: &WebhookEvents) -> Result<(), ChannelError> {
        if let Some(handler) = &self.message {
            for message in &events.messages {
                handler
                    .on_message(ctx, message.clone())
                    .await
                    .map_err(ChannelError::Handler)?;
            }
        }
        if let Some(handler) = &self.status {
            for status in &events.statuses {
                handler
                    .on_status(ctx, status.clone())
                    .await
                    .map_err(ChannelError::Handler)?;
            }
        }
        Ok(())
    }
}

/// References captured from a connected adapter.
pub(crate) struct Connection<C, K> {
    pub config: Arc<C>,
    pub client: Arc<K>,
    pub handlers: Handlers,
}

/// Mutable adapter state.
pub(crate) struct AdapterState<C, K> {
    phase: LifecycleState,
    config: Option<Arc<C>>,
    client: Option<Arc<K>>,
    handlers: Handlers,
    last_connected_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl<C, K> AdapterState<C, K> {
    /// Store a validated config. Rejected once connected.
    pub fn initialize(&mut self, config: C) -> Result<(), ChannelError> {
        if self.phase == LifecycleState::Connected {
            return Err(ChannelError::InvalidState(
                "cannot re-initialize a connected adapter; disconnect first".to_string(),
            ));
        }
        self.config = Some(Arc::new(config));
        self.phase = LifecycleState::Initialized;
        Ok(())
    }

    /// Config stored by `initialize`.
    pub fn config(&self) -> Result<Arc<C>, ChannelError> {
        self.config.clone().ok_or(ChannelError::NotInitialized)
    }

    /// Whether a client is live.
    pub const fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Install a freshly probed client.
    pub fn mark_connected(&mut self, client: K) {
        self.client = Some(Arc::new(client));
        self.phase = LifecycleState::Connected;
        self.last_connected_at = Some(Utc::now());
        self.last_error = None;
    }

    /// Record a failed connect. The adapter stays initialized.
    pub fn mark_failed(&mut self, err: &ChannelError) {
        self.client = None;
        self.phase = LifecycleState::Initialized;
        self.last_error = Some(err.to_string());
    }

    /// Resolve the outcome of a liveness probe, recording any failure.
    pub fn probed<T>(
        &mut self,
        outcome: Result<Result<T, ClientError>, Interrupted>,
    ) -> Result<T, ChannelError> {
        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => ChannelError::Probe(err),
            Err(interrupted) => ChannelError::Interrupted(interrupted),
        };
        self.mark_failed(&err);
        Err(err)
    }

    /// Drop the client and move to `Disconnected`, returning what was live.
    pub fn disconnect(&mut self) -> Option<(Arc<C>, Arc<K>)> {
        self.phase = LifecycleState::Disconnected;
        let client = self.client.take()?;
        let config = self.config.clone()?;
        Some((config, client))
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.is_connected(),
            state: self.phase,
            last_connected_at: self.last_connected_at,
            last_error: self.last_error.clone(),
        }
    }
}

impl<C, K> Default for AdapterState<C, K> {
    fn default() -> Self {
        Self {
            phase: LifecycleState::Uninitialized,
            config: None,
            client: None,
            handlers: Handlers::default(),
            last_connected_at: None,
            last_error: None,
        }
    }
}

/// The lock around an adapter's state.
pub(crate) struct SharedState<C, K> {
    inner: RwLock<AdapterState<C, K>>,
}

impl<C, K> SharedState<C, K> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AdapterState::default()),
        }
    }

    /// Exclusive access for initialize/connect/disconnect.
    pub async fn write(&self) -> RwLockWriteGuard<'_, AdapterState<C, K>> {
        self.inner.write().await
    }

    /// Snapshot of a live connection, if any.
    pub async fn connection(&self) -> Option<Connection<C, K>> {
        let state = self.inner.read().await;
        Some(Connection {
            client: state.client.clone()?,
            config: state.config.clone()?,
            handlers: state.handlers.clone(),
        })
    }

    /// Snapshot of the stored config, connected or not.
    pub async fn config(&self) -> Option<Arc<C>> {
        self.inner.read().await.config.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.read().await.is_connected()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.read().await.status()
    }

    pub async fn set_message_handler(&self, handler: Option<Arc<dyn MessageHandler>>) {
        self.inner.write().await.handlers.message = handler;
    }

    pub async fn set_status_handler(&self, handler: Option<Arc<dyn StatusHandler>>) {
        self.inner.write().await.handlers.status = handler;
    }
}

/// Reject outbound messages that no provider could address.
pub(crate) fn ensure_recipient(message: &OutboundMessage) -> Result<(), ChannelError> {
    if message.recipient_id.trim().is_empty() {
        return Err(ChannelError::InvalidMessage(
            "recipient_id is required".to_string(),
        ));
    }
    Ok(())
}

/// Fold the outcome of one send attempt into a `SendResult`.
pub(crate) fn settle(outcome: Result<Result<SendResult, ClientError>, Interrupted>) -> SendResult {
    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => SendResult::failed(err.to_string()),
        Err(interrupted) => SendResult::failed(interrupted.to_string()),
    }
}

/// Signature policy when no secret is configured.
///
/// Permissive by default so unconfigured deployments keep working; strict
/// channels reject instead.
pub(crate) fn unsigned_webhook_allowed(strict: bool) -> bool {
    if strict {
        tracing::warn!("rejecting webhook: strict mode is on but no webhook secret is configured");
    }
    !strict
}

/// Log once at initialize when signatures will not be checked.
pub(crate) fn warn_if_unverified(channel: &str, has_secret: bool, strict: bool) {
    if !has_secret && !strict {
        tracing::warn!(
            channel,
            "no webhook secret configured; webhook signatures will NOT be verified (set strict_webhooks=true to reject instead)"
        );
    }
}
