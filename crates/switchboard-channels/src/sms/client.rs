//! Twilio REST client for the Messages API.

use reqwest::Client;
use serde::Deserialize;

use switchboard_core::secrets::ApiKey;

use super::SmsConfig;
use super::codec::FormParams;
use crate::http::{ClientError, build_client, read_json};

const API_VERSION: &str = "2010-04-01";

/// Account resource returned by the probe.
#[derive(Debug, Deserialize)]
pub struct AccountInfo {
    /// Account SID.
    pub sid: String,
    /// Display name.
    #[serde(default)]
    pub friendly_name: String,
    /// `active`, `suspended` or `closed`.
    #[serde(default)]
    pub status: String,
}

/// Message resource returned by a send.
#[derive(Debug, Deserialize)]
pub struct MessageResource {
    /// Message SID.
    pub sid: String,
    /// Initial status.
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct TwilioError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Extract the Twilio error text from a failure body.
fn twilio_error_message(body: &str) -> Option<String> {
    let error: TwilioError = serde_json::from_str(body).ok()?;
    Some(match error.code {
        Some(code) => format!("{} (code {code})", error.message),
        None => error.message,
    })
}

/// Twilio client bound to one account.
pub struct TwilioClient {
    http: Client,
    base_url: String,
    account_sid: String,
    username: String,
    password: ApiKey,
}

impl TwilioClient {
    /// Build a client from a validated config.
    pub(crate) fn new(config: &SmsConfig) -> Result<Self, ClientError> {
        let (username, password) = config.credentials.basic_auth(&config.account_sid);
        Ok(Self {
            http: build_client(config.timeout)?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            username: username.to_string(),
            password: password.clone(),
        })
    }

    fn account_url(&self, suffix: &str) -> String {
        format!(
            "{}/{API_VERSION}/Accounts/{}{suffix}",
            self.base_url, self.account_sid
        )
    }

    /// Fetch the account resource.
    pub async fn account(&self) -> Result<AccountInfo, ClientError> {
        let response = self
            .http
            .get(self.account_url(".json"))
            .basic_auth(&self.username, Some(self.password.expose()))
            .send()
            .await?;
        read_json(response, twilio_error_message).await
    }

    /// Create a message.
    pub async fn send(&self, form: &FormParams) -> Result<MessageResource, ClientError> {
        let response = self
            .http
            .post(self.account_url("/Messages.json"))
            .basic_auth(&self.username, Some(self.password.expose()))
            .form(form)
            .send()
            .await?;
        read_json(response, twilio_error_message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twilio_error_message() {
        let body = r#"{"code": 21211, "message": "The 'To' number is not valid.", "more_info": "https://www.twilio.com/docs/errors/21211", "status": 400}"#;
        assert_eq!(
            twilio_error_message(body).as_deref(),
            Some("The 'To' number is not valid. (code 21211)")
        );
        assert_eq!(twilio_error_message("oops"), None);
    }
}
