//! Bot API client.

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use switchboard_core::secrets::{ApiKey, redact};

use super::TelegramConfig;
use super::codec::{
    ALLOWED_UPDATES, ApiCall, SentMessage, TelegramFile, TelegramResponse, TelegramUser,
};
use crate::http::{ClientError, build_client, read_bytes, read_json};

/// Extract `description` from a Bot API error body.
fn bot_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<TelegramResponse<serde_json::Value>>(body)
        .ok()?
        .description
}

/// Telegram Bot API client.
pub struct BotClient {
    http: Client,
    base_url: String,
    token: ApiKey,
}

impl BotClient {
    /// Build a client from a validated config.
    pub(crate) fn new(config: &TelegramConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(config.timeout)?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        })
    }

    /// Get the Bot API URL.
    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token.expose(), method)
    }

    /// Download URL of a file returned by `getFile`.
    ///
    /// The URL embeds the bot token; never log it.
    #[must_use]
    pub fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token.expose(), file_path)
    }

    /// Keep the token out of error text.
    fn scrub(&self, err: ClientError) -> ClientError {
        match err {
            ClientError::Transport(msg) => ClientError::Transport(redact(&msg, &self.token)),
            ClientError::RateLimited(msg) => ClientError::RateLimited(redact(&msg, &self.token)),
            ClientError::Api { status, message } => ClientError::Api {
                status,
                message: redact(&message, &self.token),
            },
            ClientError::Decode(msg) => ClientError::Decode(redact(&msg, &self.token)),
        }
    }

    /// Call a Telegram Bot API method.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<&impl Serialize>,
    ) -> Result<T, ClientError> {
        let url = self.api_url(method);
        let request = match params {
            Some(p) => self.http.post(&url).json(p),
            None => self.http.get(&url),
        };

        let result = async {
            let response = request.send().await?;
            let envelope: TelegramResponse<T> = read_json(response, bot_error_message).await?;
            if !envelope.ok {
                return Err(ClientError::Decode(
                    envelope
                        .description
                        .unwrap_or_else(|| "Unknown error".to_string()),
                ));
            }
            envelope
                .result
                .ok_or_else(|| ClientError::Decode("Empty response".to_string()))
        }
        .await;

        result.map_err(|err| self.scrub(err))
    }

    /// `getMe`.
    pub async fn get_me(&self) -> Result<TelegramUser, ClientError> {
        self.call("getMe", None::<&()>).await
    }

    /// Register the webhook URL with an optional secret token.
    pub async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<(), ClientError> {
        let mut params = json!({ "url": url, "allowed_updates": ALLOWED_UPDATES });
        if let Some(secret) = secret_token {
            params["secret_token"] = json!(secret);
        }
        let _: bool = self.call("setWebhook", Some(&params)).await?;
        Ok(())
    }

    /// Remove the webhook.
    pub async fn delete_webhook(&self) -> Result<(), ClientError> {
        let _: bool = self.call("deleteWebhook", Some(&json!({}))).await?;
        Ok(())
    }

    /// Run a `send*` method built by the codec.
    pub async fn send(&self, call: &ApiCall) -> Result<SentMessage, ClientError> {
        self.call(call.method, Some(&call.params)).await
    }

    /// `sendChatAction`.
    pub async fn send_chat_action(&self, chat_id: &str, action: &str) -> Result<(), ClientError> {
        let params = json!({ "chat_id": chat_id, "action": action });
        let _: bool = self.call("sendChatAction", Some(&params)).await?;
        Ok(())
    }

    /// `getFile`.
    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile, ClientError> {
        self.call("getFile", Some(&json!({ "file_id": file_id })))
            .await
    }

    /// Fetch file contents by the path `getFile` returned.
    pub async fn download(&self, file_path: &str) -> Result<Vec<u8>, ClientError> {
        let result = async {
            let response = self.http.get(self.file_url(file_path)).send().await?;
            read_bytes(response, bot_error_message).await
        }
        .await;
        result.map_err(|err| self.scrub(err))
    }
}
