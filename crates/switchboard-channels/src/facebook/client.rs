//! Graph API client for Messenger.

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use switchboard_core::secrets::ApiKey;

use super::FacebookConfig;
use super::codec::{SendRequest, SenderActionRequest};
use crate::http::{ClientError, build_client, read_json};
use crate::signature::hmac_sha256_hex;

/// Webhook fields the page subscribes the app to.
pub const SUBSCRIBED_FIELDS: &str =
    "messages,messaging_postbacks,message_deliveries,message_reads,messaging_optins,message_echoes";

/// Page identity returned by the probe.
#[derive(Debug, Deserialize)]
pub struct PageInfo {
    /// Page ID.
    pub id: String,
    /// Page name.
    #[serde(default)]
    pub name: String,
}

/// Send API response.
#[derive(Debug, Deserialize)]
pub struct SendResponse {
    /// Page-scoped recipient ID.
    #[serde(default)]
    pub recipient_id: String,
    /// Provider message ID.
    pub message_id: String,
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: i64,
}

/// Extract the Graph error text from a failure body.
fn graph_error_message(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    Some(format!("{} (code {})", envelope.error.message, envelope.error.code))
}

/// Graph API client bound to one page.
pub struct GraphClient {
    http: Client,
    base_url: String,
    page_id: String,
    access_token: ApiKey,
    appsecret_proof: Option<String>,
}

impl GraphClient {
    /// Build a client from a validated config.
    pub(crate) fn new(config: &FacebookConfig) -> Result<Self, ClientError> {
        let appsecret_proof = config.app_secret.as_ref().and_then(|secret| {
            hmac_sha256_hex(
                secret.expose().as_bytes(),
                config.page_access_token.expose().as_bytes(),
            )
        });
        Ok(Self {
            http: build_client(config.timeout)?,
            base_url: format!(
                "{}/{}",
                config.api_base_url.trim_end_matches('/'),
                config.api_version
            ),
            page_id: config.page_id.clone(),
            access_token: config.page_access_token.clone(),
            appsecret_proof,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn auth(&self) -> Vec<(&'static str, &str)> {
        let mut query = vec![("access_token", self.access_token.expose())];
        if let Some(proof) = &self.appsecret_proof {
            query.push(("appsecret_proof", proof.as_str()));
        }
        query
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ClientError> {
        let response = self
            .http
            .get(self.url(path))
            .query(&self.auth())
            .query(query)
            .send()
            .await?;
        read_json(response, graph_error_message).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(self.url(path))
            .query(&self.auth())
            .json(body)
            .send()
            .await?;
        read_json(response, graph_error_message).await
    }

    /// Fetch the page's ID and name.
    pub async fn page_info(&self) -> Result<PageInfo, ClientError> {
        self.get(&self.page_id, &[("fields", "id,name")]).await
    }

    /// Send one message through the Send API.
    pub async fn send(&self, request: &SendRequest) -> Result<SendResponse, ClientError> {
        self.post(&format!("{}/messages", self.page_id), request).await
    }

    /// Send a sender action (`typing_on`, `typing_off`, `mark_seen`).
    pub async fn sender_action(&self, request: &SenderActionRequest) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .post(&format!("{}/messages", self.page_id), request)
            .await?;
        Ok(())
    }

    /// Subscribe the app to the page's webhook fields.
    pub async fn subscribe(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url(&format!("{}/subscribed_apps", self.page_id)))
            .query(&self.auth())
            .query(&[("subscribed_fields", SUBSCRIBED_FIELDS)])
            .send()
            .await?;
        expect_success(read_json(response, graph_error_message).await?)
    }

    /// Remove the app's page subscription.
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url(&format!("{}/subscribed_apps", self.page_id)))
            .query(&self.auth())
            .send()
            .await?;
        expect_success(read_json(response, graph_error_message).await?)
    }
}

fn expect_success(response: SuccessResponse) -> Result<(), ClientError> {
    if response.success {
        Ok(())
    } else {
        Err(ClientError::Decode("graph call returned success=false".to_string()))
    }
}
