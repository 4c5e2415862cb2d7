//! Credential handling.
//!
//! - `ApiKey`: Wrapper that prevents accidental logging
//! - `scrub_secrets`: Redact secrets from error messages
//! - `redact`: Remove one known secret from a string

use secrecy::{ExposeSecret, SecretBox};

/// API key wrapper that prevents accidental logging.
///
/// The inner value is wrapped with `secrecy::SecretBox` to ensure
/// it's not accidentally printed in logs or debug output.
#[derive(Clone)]
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    /// Create a new API key.
    #[must_use]
    pub fn new(key: String) -> Self {
        Self(SecretBox::new(key.into_boxed_str()))
    }

    /// Expose the secret for actual API calls.
    ///
    /// Use sparingly - only when actually sending to an API.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Scrub secrets from error messages and logs.
///
/// Replaces values after known secret patterns with `[REDACTED]`.
///
/// # Arguments
///
/// * `text` - Text to scrub
/// * `patterns` - Patterns to look for (e.g., `["api_key=", "token="]`)
#[must_use]
pub fn scrub_secrets(text: &str, patterns: &[&str]) -> String {
    let mut result = text.to_string();

    for pattern in patterns {
        let mut search_start = 0;
        while let Some(start) = result[search_start..].find(pattern) {
            let abs_start = search_start + start + pattern.len();

            // Value ends at whitespace, a quote, or a parameter separator
            let end = result[abs_start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '&' || c == ',')
                .map_or(result.len(), |e| abs_start + e);

            result.replace_range(abs_start..end, "[REDACTED]");

            search_start = abs_start + "[REDACTED]".len();
        }
    }

    result
}

/// Replace every occurrence of a known secret with `[REDACTED]`.
#[must_use]
pub fn redact(text: &str, secret: &ApiKey) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret.expose(), "[REDACTED]")
}

/// Common secret patterns to scrub from logs.
pub const COMMON_SECRET_PATTERNS: &[&str] = &[
    "access_token=",
    "appsecret_proof=",
    "api_key=",
    "apikey=",
    "token=",
    "secret=",
    "password=",
    "Authorization: Bearer ",
    "Authorization: Basic ",
    "Authorization: App ",
    "X-API-TOKEN: ",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_redaction() {
        let key = ApiKey::new("sk-secret-key-12345".to_string());

        assert_eq!(format!("{key:?}"), "ApiKey([REDACTED])");
        assert_eq!(format!("{key}"), "[REDACTED]");

        assert_eq!(key.expose(), "sk-secret-key-12345");
    }

    #[test]
    fn test_scrub_secrets() {
        let text = "GET /v22.0/123?access_token=EAAB123&appsecret_proof=abcd failed";
        let scrubbed = scrub_secrets(text, COMMON_SECRET_PATTERNS);
        assert_eq!(
            scrubbed,
            "GET /v22.0/123?access_token=[REDACTED]&appsecret_proof=[REDACTED] failed"
        );
    }

    #[test]
    fn test_scrub_secrets_with_quotes() {
        let text = r#"{"api_key":"sk-secret","other":"value"}"#;
        let scrubbed = scrub_secrets(text, &["api_key\":\""]);
        assert!(scrubbed.contains("[REDACTED]"));
        assert!(!scrubbed.contains("sk-secret"));
    }

    #[test]
    fn test_redact_known_secret() {
        let token = ApiKey::new("123456:ABC-DEF".to_string());
        let text = "error sending request for url (https://api.telegram.org/bot123456:ABC-DEF/getMe)";
        assert_eq!(
            redact(text, &token),
            "error sending request for url (https://api.telegram.org/bot[REDACTED]/getMe)"
        );
        assert_eq!(redact("x", &ApiKey::new(String::new())), "x");
    }
}
