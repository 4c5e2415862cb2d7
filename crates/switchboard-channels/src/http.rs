//! Shared HTTP plumbing for provider clients.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use switchboard_core::secrets::{COMMON_SECRET_PATTERNS, scrub_secrets};

/// Provider client errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Request never produced a response (DNS, TLS, timeout, reset).
    #[error("request failed: {0}")]
    Transport(String),

    /// Provider answered 429.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Provider answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider error message, or the raw body.
        message: String,
    },

    /// Response body did not match the expected schema.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status of an API error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited(_) => Some(429),
            _ => None,
        }
    }

    /// Whether the provider rejected the request itself (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        // URLs may carry credentials in the query string
        Self::Transport(err.without_url().to_string())
    }
}

/// Build a client with a bounded per-request deadline.
pub(crate) fn build_client(timeout: Duration) -> Result<Client, ClientError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("switchboard/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ClientError::from)
}

/// Read a response, classifying failures.
///
/// `error_message` extracts the provider's own error text from a failure
/// body; when it returns `None` the raw body is kept.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    error_message: fn(&str) -> Option<String>,
) -> Result<T, ClientError> {
    let body = read_body(response, error_message).await?;
    serde_json::from_str(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Read a response body as text, classifying failures.
pub(crate) async fn read_body(
    response: Response,
    error_message: fn(&str) -> Option<String>,
) -> Result<String, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if status.is_success() {
        return Ok(body);
    }

    Err(classify(status, &body, error_message))
}

/// Read a binary response body, classifying failures.
pub(crate) async fn read_bytes(
    response: Response,
    error_message: fn(&str) -> Option<String>,
) -> Result<Vec<u8>, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.bytes().await?.to_vec());
    }
    let body = response.text().await?;
    Err(classify(status, &body, error_message))
}

fn classify(status: StatusCode, body: &str, error_message: fn(&str) -> Option<String>) -> ClientError {
    let message = error_message(body)
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    let message = scrub_secrets(&message, COMMON_SECRET_PATTERNS);

    if status == StatusCode::TOO_MANY_REQUESTS {
        ClientError::RateLimited(message)
    } else {
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Extractor for providers without a structured error envelope.
pub(crate) const fn raw_body(_: &str) -> Option<String> {
    None
}
