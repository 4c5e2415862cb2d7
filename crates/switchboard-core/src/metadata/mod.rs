//! Open metadata container carried on unified messages.
//!
//! Metadata is where provider-only features travel: quick-reply payloads,
//! rich-card hints, coordinates, raw provider types. Keys are plain strings
//! so adapters can add fields without touching the model, but the keys this
//! workspace reads or writes are listed in [`keys`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered string-to-string map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Get a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Get a non-empty value.
    #[must_use]
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    /// Parse a value as a float.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Insert a value only when it is present.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.0.insert(key.into(), value.into());
        }
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Metadata {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

/// Well-known metadata keys.
pub mod keys {
    /// Keys adapters write on inbound messages.
    pub mod inbound {
        /// Quick-reply payload chosen by the user.
        pub const QUICK_REPLY_PAYLOAD: &str = "quick_reply_payload";
        /// Postback payload from a button press.
        pub const POSTBACK_PAYLOAD: &str = "postback_payload";
        /// Postback data from an RCS suggestion.
        pub const POSTBACK_DATA: &str = "postback_data";
        /// Text of the suggestion the user tapped.
        pub const SUGGESTION_TEXT: &str = "suggestion_text";
        /// Telegram callback query data.
        pub const CALLBACK_DATA: &str = "callback_data";
        /// Latitude of a shared location.
        pub const LATITUDE: &str = "latitude";
        /// Longitude of a shared location.
        pub const LONGITUDE: &str = "longitude";
        /// Facebook page the message was sent to.
        pub const PAGE_ID: &str = "page_id";
        /// Provider chat identifier.
        pub const CHAT_ID: &str = "chat_id";
        /// Provider user identifier of the sender.
        pub const FROM_USER_ID: &str = "from_user_id";
        /// Sender username.
        pub const USERNAME: &str = "username";
        /// Sender first name.
        pub const FIRST_NAME: &str = "first_name";
        /// Sender last name.
        pub const LAST_NAME: &str = "last_name";
        /// Set to "true" when the message is an edit.
        pub const IS_EDITED: &str = "is_edited";
        /// Provider message this one replies to.
        pub const REPLY_TO_ID: &str = "reply_to_id";
        /// Phone number of a shared contact.
        pub const CONTACT_PHONE: &str = "contact_phone";
        /// Number of media items on an MMS.
        pub const NUM_MEDIA: &str = "num_media";
        /// Provider account the message arrived on.
        pub const ACCOUNT_ID: &str = "account_id";
    }

    /// Keys adapters read on outbound messages.
    pub mod outbound {
        /// Caption for media messages.
        pub const CAPTION: &str = "caption";
        /// Rich card title.
        pub const CARD_TITLE: &str = "card_title";
        /// Rich card description.
        pub const CARD_DESCRIPTION: &str = "card_description";
        /// Rich card media URL.
        pub const CARD_MEDIA_URL: &str = "card_media_url";
        /// Rich card media MIME type.
        pub const CARD_MEDIA_TYPE: &str = "card_media_type";
        /// Location latitude.
        pub const LATITUDE: &str = "latitude";
        /// Location longitude.
        pub const LONGITUDE: &str = "longitude";
        /// Location label.
        pub const LOCATION_NAME: &str = "location_name";
        /// JSON array of suggestions (`[{"type":"reply","text":..,"postbackData":..}]`).
        pub const SUGGESTIONS: &str = "suggestions";
        /// Telegram-style quick replies: `label|data,label|data`.
        pub const QUICK_REPLIES: &str = "quick_replies";
        /// Text parse mode (Telegram: `HTML`, `Markdown`, `MarkdownV2`).
        pub const PARSE_MODE: &str = "parse_mode";
        /// Provider message to reply to.
        pub const REPLY_TO_ID: &str = "reply_to_id";
        /// Facebook messaging type (`RESPONSE`, `UPDATE`, `MESSAGE_TAG`).
        pub const MESSAGING_TYPE: &str = "messaging_type";

        /// Key of the n-th (1-based) quick-reply label.
        #[must_use]
        pub fn quick_reply(n: usize) -> String {
            format!("quick_reply_{n}")
        }

        /// Key of the n-th (1-based) quick-reply payload.
        #[must_use]
        pub fn quick_reply_data(n: usize) -> String {
            format!("quick_reply_{n}_data")
        }
    }

    /// Keys preserving provider payloads that have no unified equivalent.
    pub mod provider {
        /// Native type name the provider used.
        pub const RAW_TYPE: &str = "provider.raw_type";
        /// Raw JSON of the unmapped payload.
        pub const RAW_PAYLOAD: &str = "provider.raw_payload";
        /// Name of the RCS aggregator that produced the event.
        pub const RCS_PROVIDER: &str = "provider.rcs";
    }
}
