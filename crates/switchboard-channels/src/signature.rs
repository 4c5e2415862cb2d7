//! Webhook signature schemes.
//!
//! All comparisons are constant time.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Prefix Meta puts in front of hex digests.
pub const SHA256_PREFIX: &str = "sha256=";

/// Hex-encoded HMAC-SHA256 of `payload`.
#[must_use]
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex-encoded HMAC-SHA256, with or without the `sha256=` prefix.
#[must_use]
pub fn verify_hmac_sha256_hex(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let signature = signature.trim();
    let signature = signature.strip_prefix(SHA256_PREFIX).unwrap_or(signature);

    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Canonical string Twilio signs: the URL followed by every parameter,
/// sorted by key, as `key + value`.
///
/// Input order does not matter; repeated keys are ordered by value.
#[must_use]
pub fn twilio_canonical_string(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut canonical = String::with_capacity(
        url.len() + sorted.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>(),
    );
    canonical.push_str(url);
    for (key, value) in sorted {
        canonical.push_str(key);
        canonical.push_str(value);
    }
    canonical
}

/// Base64-encoded HMAC-SHA1 over the Twilio canonical string.
#[must_use]
pub fn twilio_signature(auth_token: &str, url: &str, params: &[(String, String)]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(twilio_canonical_string(url, params).as_bytes());
    Some(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verify an `X-Twilio-Signature` header value.
#[must_use]
pub fn verify_twilio_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    twilio_signature(auth_token, url, params)
        .is_some_and(|expected| constant_time_eq(&expected, signature.trim()))
}

/// Constant-time string equality.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_hmac_sha256_roundtrip() {
        let body = br#"{"object":"page"}"#;
        let sig = hmac_sha256_hex(b"secret", body).unwrap();
        assert!(verify_hmac_sha256_hex(b"secret", body, &sig));
        assert!(verify_hmac_sha256_hex(b"secret", body, &format!("sha256={sig}")));
        assert!(!verify_hmac_sha256_hex(b"other", body, &sig));
    }

    #[test]
    fn test_hmac_sha256_single_byte_flips() {
        let body = b"payload-bytes".to_vec();
        let sig = hmac_sha256_hex(b"k", &body).unwrap();

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(!verify_hmac_sha256_hex(b"k", &tampered, &sig), "byte {i}");
        }

        let mut bad_sig = sig.into_bytes();
        bad_sig[0] = if bad_sig[0] == b'0' { b'1' } else { b'0' };
        let bad_sig = String::from_utf8(bad_sig).unwrap();
        assert!(!verify_hmac_sha256_hex(b"k", &body, &bad_sig));
    }

    #[test]
    fn test_hmac_sha256_rejects_garbage() {
        assert!(!verify_hmac_sha256_hex(b"k", b"x", "not-hex"));
        assert!(!verify_hmac_sha256_hex(b"k", b"x", ""));
    }

    #[test]
    fn test_twilio_canonical_string_is_order_independent() {
        let a = params(&[("To", "+1"), ("Body", "hi"), ("From", "+2")]);
        let b = params(&[("From", "+2"), ("To", "+1"), ("Body", "hi")]);
        let url = "https://example.com/webhooks/sms";
        assert_eq!(twilio_canonical_string(url, &a), twilio_canonical_string(url, &b));
        assert_eq!(
            twilio_canonical_string(url, &a),
            "https://example.com/webhooks/smsBodyhiFrom+2To+1"
        );
    }

    #[test]
    fn test_twilio_known_vector() {
        // Example from Twilio's request validation documentation
        let url = "https://mycompany.com/myapp.php?foo=1&bar=2";
        let p = params(&[
            ("CallSid", "CA1234567890ABCDE"),
            ("Caller", "+14158675309"),
            ("Digits", "1234"),
            ("From", "+14158675309"),
            ("To", "+18005551212"),
        ]);
        let sig = twilio_signature("12345", url, &p).unwrap();
        assert_eq!(sig, "RSOYDt4T1cUTdK1PDd93/VVr8B8=");
        assert!(verify_twilio_signature("12345", url, &p, &sig));
    }

    #[test]
    fn test_twilio_signature_tamper() {
        let url = "https://example.com/sms";
        let p = params(&[("Body", "hello")]);
        let sig = twilio_signature("token", url, &p).unwrap();
        assert!(verify_twilio_signature("token", url, &p, &sig));
        assert!(!verify_twilio_signature("token", url, &params(&[("Body", "hellp")]), &sig));
        assert!(!verify_twilio_signature("token", "https://example.com/smt", &p, &sig));
        assert!(!verify_twilio_signature("token", url, &p, "AAAA"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
