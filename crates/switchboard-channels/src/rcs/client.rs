//! RCS client: one [`RcsBackend`] per aggregator behind a single handle.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use switchboard_core::secrets::ApiKey;

use super::codec::RcsOutbound;
use super::google::GoogleBackend;
use super::infobip::InfobipBackend;
use super::pontaltech::PontaltechBackend;
use super::zenvia::ZenviaBackend;
use super::{RcsConfig, RcsProvider};
use crate::http::{ClientError, build_client};
use crate::traits::{ChannelError, WebhookEvents};

/// Agent identity reported by the connect probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    /// Aggregator serving the agent.
    pub provider: RcsProvider,
    /// Agent identifier.
    pub agent_id: String,
    /// Sender shown to users, when it differs from the agent.
    pub sender_id: Option<String>,
}

/// Connection details every backend shares.
pub(crate) struct Endpoint {
    pub http: Client,
    pub base_url: String,
    pub api_key: ApiKey,
    pub agent_id: String,
    pub sender_id: Option<String>,
}

impl Endpoint {
    fn new(config: &RcsConfig, provider: RcsProvider) -> Result<Self, ClientError> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or_else(|| provider.default_base_url());
        Ok(Self {
            http: build_client(config.timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            agent_id: config.agent_id.clone(),
            sender_id: config.sender_id.clone(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sender identity for outbound messages.
    pub fn from(&self) -> &str {
        self.sender_id.as_deref().unwrap_or(&self.agent_id)
    }

    /// Agent identity from configuration.
    ///
    /// None of the aggregators exposes an agent lookup for messaging
    /// credentials, so the connect probe is static: bad credentials surface
    /// on the first send.
    pub fn local_info(&self, provider: RcsProvider) -> AgentInfo {
        AgentInfo {
            provider,
            agent_id: self.agent_id.clone(),
            sender_id: self.sender_id.clone(),
        }
    }
}

/// Reject a success response that carries no message ID.
pub(crate) fn require_id(id: String) -> Result<String, ClientError> {
    if id.is_empty() {
        return Err(ClientError::Decode("response carries no message id".to_string()));
    }
    Ok(id)
}

/// Agent-side conversation events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentEvent<'a> {
    /// The agent is typing.
    Typing,
    /// The agent read a user message.
    Read {
        /// Message being acknowledged.
        message_id: &'a str,
    },
}

/// One aggregator's wire protocol.
#[async_trait]
pub trait RcsBackend: Send + Sync {
    /// Aggregator this backend talks to.
    fn provider(&self) -> RcsProvider;

    /// Send one message, returning the aggregator's message ID.
    async fn send(&self, to: &str, message: &RcsOutbound) -> Result<String, ClientError>;

    /// Extract events from a decoded webhook body.
    ///
    /// Bodies that do not match the aggregator's schema yield no events.
    fn parse_webhook(&self, payload: serde_json::Value) -> WebhookEvents;

    /// Identify the agent. Used as the connect probe.
    async fn agent_info(&self) -> Result<AgentInfo, ClientError>;

    /// Send a typing or read event. Aggregators without events ignore it.
    async fn send_event(&self, _to: &str, _event: AgentEvent<'_>) -> Result<(), ClientError> {
        Ok(())
    }
}

/// RCS client bound to the configured aggregator.
pub struct RcsClient {
    backend: Box<dyn RcsBackend>,
}

impl RcsClient {
    /// Build the backend for `provider`.
    pub(crate) fn new(config: &RcsConfig, provider: RcsProvider) -> Result<Self, ClientError> {
        let endpoint = Endpoint::new(config, provider)?;
        let backend: Box<dyn RcsBackend> = match provider {
            RcsProvider::Zenvia => Box::new(ZenviaBackend::new(endpoint)),
            RcsProvider::Infobip => Box::new(InfobipBackend::new(endpoint)),
            RcsProvider::Pontaltech => Box::new(PontaltechBackend::new(endpoint)),
            RcsProvider::Google => Box::new(GoogleBackend::new(endpoint)),
        };
        Ok(Self { backend })
    }

    /// Aggregator in use.
    #[must_use]
    pub fn provider(&self) -> RcsProvider {
        self.backend.provider()
    }

    /// Send one message.
    pub async fn send(&self, to: &str, message: &RcsOutbound) -> Result<String, ClientError> {
        self.backend.send(to, message).await
    }

    /// Probe the agent.
    pub async fn agent_info(&self) -> Result<AgentInfo, ClientError> {
        self.backend.agent_info().await
    }

    /// Send a typing or read event.
    pub async fn send_event(&self, to: &str, event: AgentEvent<'_>) -> Result<(), ClientError> {
        self.backend.send_event(to, event).await
    }

    /// Decode and parse a webhook body.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Parse` when the body is not JSON.
    pub fn parse_webhook(&self, body: &[u8]) -> Result<WebhookEvents, ChannelError> {
        let payload: serde_json::Value =
            serde_json::from_slice(body).map_err(|e| ChannelError::Parse(e.to_string()))?;
        Ok(self.backend.parse_webhook(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config(base_url: Option<&str>, api_key: &str) -> RcsConfig {
        RcsConfig {
            provider: "infobip".to_string(),
            agent_id: "agent-1".to_string(),
            api_key: ApiKey::new(api_key.to_string()),
            api_secret: None,
            sender_id: None,
            webhook_url: None,
            webhook_secret: None,
            base_url: base_url.map(String::from),
            timeout: Duration::from_secs(5),
            strict_webhooks: false,
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoint = Endpoint::new(&config(None, "k"), RcsProvider::Infobip).unwrap();
        assert_eq!(endpoint.url("/rcs/1/messages"), "https://api.infobip.com/rcs/1/messages");
        assert_eq!(endpoint.from(), "agent-1");

        let mut overridden = config(Some("http://127.0.0.1:8080/gw/"), "k");
        overridden.sender_id = Some("Brand".to_string());
        let endpoint = Endpoint::new(&overridden, RcsProvider::Zenvia).unwrap();
        assert_eq!(endpoint.url("/x"), "http://127.0.0.1:8080/gw/x");
        assert_eq!(endpoint.from(), "Brand");
    }

    #[test]
    fn test_local_info_reports_configured_agent() {
        let mut branded = config(None, "k");
        branded.sender_id = Some("Brand".to_string());
        let endpoint = Endpoint::new(&branded, RcsProvider::Pontaltech).unwrap();
        assert_eq!(
            endpoint.local_info(RcsProvider::Pontaltech),
            AgentInfo {
                provider: RcsProvider::Pontaltech,
                agent_id: "agent-1".to_string(),
                sender_id: Some("Brand".to_string()),
            }
        );
    }

    #[test]
    fn test_require_id() {
        assert_eq!(require_id("m1".to_string()).unwrap(), "m1");
        assert!(matches!(require_id(String::new()), Err(ClientError::Decode(_))));
    }

    #[test]
    fn test_parse_webhook_rejects_non_json() {
        let client = RcsClient::new(&config(None, "k"), RcsProvider::Infobip).unwrap();
        assert_eq!(client.provider(), RcsProvider::Infobip);
        assert!(matches!(client.parse_webhook(b"<xml/>"), Err(ChannelError::Parse(_))));
        assert!(client.parse_webhook(b"{}").unwrap().is_empty());
    }
}
