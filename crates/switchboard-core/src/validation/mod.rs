//! Input validation.
//!
//! Phone numbers must be E.164 before they reach a provider, and webhook
//! bodies are bounded before anything parses them.

use thiserror::Error;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Phone number is not valid E.164.
    #[error("Invalid E.164 phone number: {0}")]
    InvalidPhoneNumber(String),
}

/// Size limits per input type.
pub mod limits {
    /// Maximum config file size (1MB).
    pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

    /// Maximum webhook body accepted by default (1MB).
    pub const MAX_WEBHOOK_BODY: usize = 1024 * 1024;

    /// Shortest E.164 number including the leading `+`.
    pub const MIN_E164_LENGTH: usize = 10;

    /// Longest E.164 number including the leading `+`.
    pub const MAX_E164_LENGTH: usize = 16;
}

/// Check that input is within a size limit.
///
/// # Errors
///
/// Returns `ValidationError::TooLong` if `len` exceeds `max`.
pub const fn check_size(len: usize, max: usize) -> Result<(), ValidationError> {
    if len > max {
        return Err(ValidationError::TooLong { max, actual: len });
    }
    Ok(())
}

/// Validate a phone number in E.164 form (`+` followed by digits only).
///
/// # Errors
///
/// Returns `ValidationError::InvalidPhoneNumber` otherwise.
pub fn validate_e164(phone: &str) -> Result<(), ValidationError> {
    let valid = (limits::MIN_E164_LENGTH..=limits::MAX_E164_LENGTH).contains(&phone.len())
        && phone
            .strip_prefix('+')
            .is_some_and(|digits| !digits.starts_with('0') && digits.bytes().all(|b| b.is_ascii_digit()));

    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidPhoneNumber(phone.to_string()))
    }
}

/// Normalize a human-entered phone number to E.164.
///
/// Spaces, dashes, dots and parentheses are dropped. Numbers without a
/// leading `+` get `default_country_code` prepended when one is given.
///
/// # Errors
///
/// Returns `ValidationError::InvalidPhoneNumber` if the result is not E.164.
pub fn format_e164(phone: &str, default_country_code: Option<&str>) -> Result<String, ValidationError> {
    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    let formatted = if cleaned.starts_with('+') {
        cleaned
    } else if let Some(code) = default_country_code.map(str::trim).filter(|c| !c.is_empty()) {
        format!("+{}{cleaned}", code.trim_start_matches('+'))
    } else {
        format!("+{cleaned}")
    };

    validate_e164(&formatted).map_err(|_| ValidationError::InvalidPhoneNumber(phone.to_string()))?;
    Ok(formatted)
}
