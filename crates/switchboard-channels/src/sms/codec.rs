//! Twilio form payloads.

use url::form_urlencoded;

use switchboard_core::metadata::keys::{inbound, outbound};
use switchboard_core::types::{
    Attachment, AttachmentKind, ChannelType, ContentType, InboundMessage, MessageStatus,
    OutboundMessage, StatusCallback,
};
use switchboard_core::validation::format_e164;

use crate::traits::{ChannelError, WebhookEvents};

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Twilio accepts at most 10 media URLs per message.
pub const MAX_MEDIA: usize = 10;

/// Decoded form parameters, in body order.
pub type FormParams = Vec<(String, String)>;

/// Who a message is sent from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    /// A Twilio number in E.164.
    PhoneNumber(String),
    /// A messaging service picking the number.
    MessagingService(String),
}

/// Decode a form-encoded body.
///
/// # Errors
///
/// Returns `ChannelError::Parse` if the body is not UTF-8.
pub fn parse_form(body: &[u8]) -> Result<FormParams, ChannelError> {
    std::str::from_utf8(body).map_err(|e| ChannelError::Parse(e.to_string()))?;
    Ok(form_urlencoded::parse(body).into_owned().collect())
}

fn param<'a>(params: &'a FormParams, key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parse a Twilio webhook into unified events.
///
/// Payloads with `MessageStatus`, or an `SmsStatus` other than `received`,
/// are delivery reports; anything else with a message SID and a sender is
/// an inbound message.
pub fn parse_webhook(body: &[u8]) -> Result<WebhookEvents, ChannelError> {
    let params = parse_form(body)?;
    let mut events = WebhookEvents::default();

    let Some(sid) = param(&params, "MessageSid").or_else(|| param(&params, "SmsSid")) else {
        return Ok(events);
    };

    let status = param(&params, "MessageStatus")
        .or_else(|| param(&params, "SmsStatus").filter(|s| !s.eq_ignore_ascii_case("received")));

    if let Some(status) = status {
        let mut callback = StatusCallback::new(sid, map_status(status));
        callback.recipient_id = param(&params, "To").map(str::to_string);
        callback.error_message = match (param(&params, "ErrorMessage"), param(&params, "ErrorCode")) {
            (Some(message), _) => Some(message.to_string()),
            (None, Some(code)) => Some(format!("error code {code}")),
            (None, None) => None,
        };
        events.statuses.push(callback);
    } else if let Some(from) = param(&params, "From") {
        events.messages.push(inbound_message(&params, sid, from));
    }

    Ok(events)
}

fn inbound_message(params: &FormParams, sid: &str, from: &str) -> InboundMessage {
    let num_media = param(params, "NumMedia")
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_MEDIA);

    let attachments: Vec<Attachment> = (0..num_media)
        .map_while(|i| {
            let url = param(params, &format!("MediaUrl{i}"))?;
            let mime = param(params, &format!("MediaContentType{i}")).unwrap_or_default();
            let kind = AttachmentKind::for_content(ContentType::from_mime(mime));
            let attachment = Attachment::new(kind, url);
            Some(if mime.is_empty() {
                attachment
            } else {
                attachment.with_mime_type(mime)
            })
        })
        .collect();

    let content_type = attachments
        .first()
        .map_or(ContentType::Text, |a| {
            ContentType::from_mime(a.mime_type.as_deref().unwrap_or_default())
        });

    let mut msg = InboundMessage::new(
        ChannelType::Sms,
        sid,
        from,
        content_type,
        param(params, "Body").unwrap_or_default(),
    );
    msg.recipient_id = param(params, "To").map(str::to_string);
    msg.attachments = attachments;
    if num_media > 0 {
        msg.metadata.insert(inbound::NUM_MEDIA, num_media.to_string());
    }
    msg.metadata
        .insert_opt(inbound::ACCOUNT_ID, param(params, "AccountSid"));
    msg
}

/// Twilio message status to unified status. Total: unknown values are pending.
#[must_use]
pub fn map_status(status: &str) -> MessageStatus {
    match status.to_ascii_lowercase().as_str() {
        "delivered" => MessageStatus::Delivered,
        "read" => MessageStatus::Read,
        "failed" | "undelivered" | "canceled" => MessageStatus::Failed,
        "sent" | "queued" | "sending" | "accepted" => MessageStatus::Sent,
        _ => MessageStatus::Pending,
    }
}

/// Status to report for a freshly created message resource.
#[must_use]
pub fn map_send_status(status: &str) -> MessageStatus {
    match status.to_ascii_lowercase().as_str() {
        "queued" | "accepted" | "scheduled" => MessageStatus::Pending,
        _ => MessageStatus::Sent,
    }
}

/// Build the `Messages.json` form for a unified message.
///
/// Locations become a text line with a map link; interactive quick replies
/// become a numbered list.
///
/// # Errors
///
/// Returns a reason string for an invalid recipient number or a message
/// with neither body nor media.
pub fn build_form(
    message: &OutboundMessage,
    sender: &Sender,
    status_callback: Option<&str>,
    default_country_code: Option<&str>,
) -> Result<FormParams, String> {
    let to = format_e164(&message.recipient_id, default_country_code).map_err(|e| e.to_string())?;

    let mut form: FormParams = vec![("To".to_string(), to)];
    match sender {
        Sender::PhoneNumber(number) => form.push(("From".to_string(), number.clone())),
        Sender::MessagingService(sid) => {
            form.push(("MessagingServiceSid".to_string(), sid.clone()));
        }
    }

    let body = match message.content_type {
        ContentType::Location => location_text(message),
        ContentType::Interactive => with_numbered_options(message),
        _ => message.content.trim().to_string(),
    };

    let media: Vec<&str> = if message.content_type.is_media() {
        message
            .attachments
            .iter()
            .map(|a| a.url.as_str())
            .filter(|url| !url.is_empty())
            .take(MAX_MEDIA)
            .collect()
    } else {
        Vec::new()
    };

    if body.is_empty() && media.is_empty() {
        return Err("message has neither body nor media".to_string());
    }
    if !body.is_empty() {
        form.push(("Body".to_string(), body));
    }
    for url in media {
        form.push(("MediaUrl".to_string(), url.to_string()));
    }
    if let Some(callback) = status_callback {
        form.push(("StatusCallback".to_string(), callback.to_string()));
    }
    Ok(form)
}

fn location_text(message: &OutboundMessage) -> String {
    let meta = &message.metadata;
    let text = message.content.trim();
    let (Some(lat), Some(long)) = (
        meta.get_f64(outbound::LATITUDE),
        meta.get_f64(outbound::LONGITUDE),
    ) else {
        return text.to_string();
    };
    let label = meta
        .get_non_empty(outbound::LOCATION_NAME)
        .unwrap_or(text);
    let link = format!("https://maps.google.com/?q={lat},{long}");
    if label.is_empty() {
        link
    } else {
        format!("{label}: {link}")
    }
}

fn with_numbered_options(message: &OutboundMessage) -> String {
    let mut text = message.content.trim().to_string();
    let options = (1..)
        .map_while(|n| message.metadata.get_non_empty(&outbound::quick_reply(n)));
    for (n, option) in options.enumerate() {
        text.push_str(&format!("\n{}. {option}", n + 1));
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn form(pairs: &[(&str, &str)]) -> Vec<u8> {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
            .into_bytes()
    }

    #[test]
    fn test_parse_inbound_sms() {
        let body = form(&[
            ("MessageSid", "SM1"),
            ("AccountSid", "AC1"),
            ("From", "+14155550100"),
            ("To", "+14155550199"),
            ("Body", "Hello there"),
            ("NumMedia", "0"),
            ("SmsStatus", "received"),
        ]);
        let events = parse_webhook(&body).unwrap();
        assert!(events.statuses.is_empty());
        let msg = &events.messages[0];
        assert_eq!(msg.external_id, "SM1");
        assert_eq!(msg.sender_id, "+14155550100");
        assert_eq!(msg.recipient_id.as_deref(), Some("+14155550199"));
        assert_eq!(msg.content, "Hello there");
        assert_eq!(msg.content_type, ContentType::Text);
        assert_eq!(msg.metadata.get(inbound::ACCOUNT_ID), Some("AC1"));
    }

    #[test]
    fn test_parse_mms() {
        let body = form(&[
            ("MessageSid", "MM1"),
            ("From", "+14155550100"),
            ("NumMedia", "2"),
            ("MediaUrl0", "https://api.twilio.com/media/1"),
            ("MediaContentType0", "image/jpeg"),
            ("MediaUrl1", "https://api.twilio.com/media/2"),
            ("MediaContentType1", "application/pdf"),
        ]);
        let msg = &parse_webhook(&body).unwrap().messages[0];
        assert_eq!(msg.content_type, ContentType::Image);
        assert_eq!(msg.attachments.len(), 2);
        assert_eq!(msg.attachments[1].kind, AttachmentKind::Document);
        assert_eq!(msg.metadata.get(inbound::NUM_MEDIA), Some("2"));
    }

    #[test]
    fn test_parse_status_callback() {
        let body = form(&[
            ("MessageSid", "SM9"),
            ("MessageStatus", "undelivered"),
            ("To", "+14155550100"),
            ("ErrorCode", "30003"),
        ]);
        let events = parse_webhook(&body).unwrap();
        assert!(events.messages.is_empty());
        let status = &events.statuses[0];
        assert_eq!(status.external_id, "SM9");
        assert_eq!(status.status, MessageStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("error code 30003"));
    }

    #[test]
    fn test_parse_edge_cases() {
        assert!(parse_webhook(b"").unwrap().is_empty());
        assert!(parse_webhook(b"Body=orphan").unwrap().is_empty());
        assert!(matches!(
            parse_webhook(&[0xff, 0xfe, 0x00]),
            Err(ChannelError::Parse(_))
        ));
    }

    #[test]
    fn test_status_mapping_is_total() {
        let table = [
            ("delivered", MessageStatus::Delivered),
            ("read", MessageStatus::Read),
            ("failed", MessageStatus::Failed),
            ("undelivered", MessageStatus::Failed),
            ("canceled", MessageStatus::Failed),
            ("sent", MessageStatus::Sent),
            ("queued", MessageStatus::Sent),
            ("sending", MessageStatus::Sent),
            ("accepted", MessageStatus::Sent),
            ("receiving", MessageStatus::Pending),
            ("", MessageStatus::Pending),
        ];
        for (raw, expected) in table {
            assert_eq!(map_status(raw), expected, "{raw}");
        }
        assert_eq!(map_send_status("queued"), MessageStatus::Pending);
        assert_eq!(map_send_status("sent"), MessageStatus::Sent);
    }

    #[test]
    fn test_build_form() {
        let sender = Sender::PhoneNumber("+14155550199".to_string());
        let mut msg = OutboundMessage::media("(415) 555-0100", ContentType::Image, "https://x/a.png");
        msg.content = "pic".to_string();
        let form = build_form(&msg, &sender, Some("https://cb"), Some("1")).unwrap();
        assert_eq!(
            form,
            vec![
                ("To".to_string(), "+14155550100".to_string()),
                ("From".to_string(), "+14155550199".to_string()),
                ("Body".to_string(), "pic".to_string()),
                ("MediaUrl".to_string(), "https://x/a.png".to_string()),
                ("StatusCallback".to_string(), "https://cb".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_form_degrades_and_rejects() {
        let service = Sender::MessagingService("MG1".to_string());
        let msg = OutboundMessage::text("+14155550100", "Pick")
            .with_metadata("quick_reply_1", "Yes")
            .with_metadata("quick_reply_2", "No");
        let msg = OutboundMessage {
            content_type: ContentType::Interactive,
            ..msg
        };
        let form = build_form(&msg, &service, None, None).unwrap();
        assert_eq!(form[1], ("MessagingServiceSid".to_string(), "MG1".to_string()));
        assert_eq!(form[2].1, "Pick\n1. Yes\n2. No");

        assert!(build_form(&OutboundMessage::text("abc", "hi"), &service, None, None).is_err());
        assert!(build_form(&OutboundMessage::text("+14155550100", " "), &service, None, None).is_err());
    }
}
