//! Event-bus subject names.
//!
//! Subjects are derived, never stored: every builder is a pure function of
//! its inputs.

use crate::types::ChannelType;

/// Root of every subject.
pub const ROOT: &str = "switchboard";

/// All inbound message subjects.
pub const INBOUND_ALL: &str = "switchboard.messages.inbound.>";

/// All outbound message subjects.
pub const OUTBOUND_ALL: &str = "switchboard.messages.outbound.>";

/// All status update subjects.
pub const STATUS_ALL: &str = "switchboard.messages.status.>";

/// All platform event subjects.
pub const EVENTS_ALL: &str = "switchboard.events.>";

/// All tenant webhook subjects.
pub const WEBHOOKS_ALL: &str = "switchboard.webhooks.>";

/// Subject for messages received on a channel type.
#[must_use]
pub fn inbound_subject(channel_type: ChannelType) -> String {
    format!("{ROOT}.messages.inbound.{channel_type}")
}

/// Subject for messages queued for a channel type.
#[must_use]
pub fn outbound_subject(channel_type: ChannelType) -> String {
    format!("{ROOT}.messages.outbound.{channel_type}")
}

/// Subject for delivery reports from a channel type.
#[must_use]
pub fn status_subject(channel_type: ChannelType) -> String {
    format!("{ROOT}.messages.status.{channel_type}")
}

/// Subject for a platform event type.
#[must_use]
pub fn event_subject(event_type: &str) -> String {
    format!("{ROOT}.events.{}", sanitize_token(event_type))
}

/// Subject for webhooks delivered to a tenant.
#[must_use]
pub fn webhook_subject(tenant_id: &str) -> String {
    format!("{ROOT}.webhooks.{}", sanitize_token(tenant_id))
}

/// Subject tokens cannot contain separators, wildcards, or whitespace.
fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}
