//! # Switchboard Channels
//!
//! Channel adapters for Switchboard.
//!
//! Every adapter implements [`ChannelAdapter`]: it is configured from a flat
//! settings map, connects to its provider, sends unified outbound messages
//! and turns provider webhooks into unified inbound messages and delivery
//! reports. The [`AdapterRegistry`] and [`WebhookRouter`] sit at the HTTP
//! boundary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod http;
mod lifecycle;
pub mod registry;
pub mod signature;
mod traits;

/// Facebook Messenger adapter.
pub mod facebook;
/// RCS Business Messaging adapter.
pub mod rcs;
/// SMS/MMS adapter over Twilio.
pub mod sms;
/// Telegram Bot API adapter.
pub mod telegram;

#[cfg(test)]
mod test_support;

pub use context::{Context, Interrupted};
pub use http::ClientError;
pub use registry::{AdapterFactory, AdapterRegistry, RouteError, WebhookRouter};
pub use traits::{
    ChannelAdapter, ChannelError, HandlerError, MessageHandler, StatusHandler, WebhookEvents,
    WebhookHeaders, header,
};

// Re-export adapter implementations
pub use facebook::FacebookAdapter;
pub use rcs::{RcsAdapter, RcsProvider};
pub use sms::SmsAdapter;
pub use telegram::TelegramAdapter;
