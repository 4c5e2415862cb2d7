//! # Switchboard Core
//!
//! Channel-agnostic building blocks for Switchboard.
//!
//! This crate provides:
//! - The unified inbound/outbound/status message model
//! - An open, ordered metadata container with documented keys
//! - Per-channel settings maps and JSON5 configuration loading
//! - Secrets handling that keeps credentials out of logs
//! - Phone-number and size validation
//! - Event-bus subject formatting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod metadata;
pub mod secrets;
pub mod subjects;
pub mod types;
pub mod validation;

pub use config::{ChannelConfig, ChannelSettings, Config, ConfigError, WebhookConfig};
pub use metadata::Metadata;
pub use secrets::{ApiKey, redact, scrub_secrets};
pub use types::{
    Attachment, AttachmentKind, ChannelCapabilities, ChannelId, ChannelInfo, ChannelType,
    ConnectionStatus, ContentType, InboundMessage, LifecycleState, MessageStatus,
    OutboundMessage, ReadReceipt, SendResult, StatusCallback, TypingIndicator,
};
pub use validation::{ValidationError, format_e164, validate_e164};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::ChannelSettings;
    pub use crate::metadata::{Metadata, keys};
    pub use crate::secrets::ApiKey;
    pub use crate::types::*;
}
