//! TwiML responses for answering Twilio webhooks.

use std::fmt;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Content type to send TwiML with.
pub const TWIML_CONTENT_TYPE: &str = "application/xml";

/// Builder for a `<Response>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwimlResponse {
    body: String,
}

impl TwimlResponse {
    /// Start an empty response.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with a text message.
    #[must_use]
    pub fn message(mut self, text: &str) -> Self {
        self.body.push_str("<Message>");
        self.body.push_str(&escape_xml(text));
        self.body.push_str("</Message>");
        self
    }

    /// Reply with text and media.
    #[must_use]
    pub fn message_with_media<'a>(
        mut self,
        text: &str,
        media_urls: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.body.push_str("<Message>");
        if !text.is_empty() {
            self.body.push_str("<Body>");
            self.body.push_str(&escape_xml(text));
            self.body.push_str("</Body>");
        }
        for url in media_urls {
            self.body.push_str("<Media>");
            self.body.push_str(&escape_xml(url));
            self.body.push_str("</Media>");
        }
        self.body.push_str("</Message>");
        self
    }

    /// Hand the conversation to another TwiML URL.
    #[must_use]
    pub fn redirect(mut self, url: &str) -> Self {
        self.body.push_str("<Redirect>");
        self.body.push_str(&escape_xml(url));
        self.body.push_str("</Redirect>");
        self
    }

    /// The acknowledgement that sends nothing back.
    #[must_use]
    pub fn empty() -> String {
        Self::new().to_string()
    }
}

impl fmt::Display for TwimlResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{XML_HEADER}<Response>{}</Response>", self.body)
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}
