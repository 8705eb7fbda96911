//! Request signing for webhook deliveries.
//!
//! Every delivery is signed with the endpoint's shared secret so receivers
//! can verify origin and integrity before trusting the payload.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the payload signature, `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "X-Ledaas-Signature";

/// Header carrying the notification event ID. At-least-once delivery means
/// receivers deduplicate on this value.
pub const EVENT_ID_HEADER: &str = "X-Ledaas-Event-Id";

/// Header carrying the 1-based delivery attempt number.
pub const ATTEMPT_HEADER: &str = "X-Ledaas-Attempt";

type HmacSha256 = Hmac<Sha256>;

/// Computes the signature header value for a payload.
#[must_use]
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a received signature header value against a payload.
#[must_use]
pub fn verify(secret: &str, payload: &[u8], header_value: &str) -> bool {
    let Some(received) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(received) = hex::decode(received) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(payload);
    mac.verify_slice(&received).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_format_and_determinism() {
        let sig = sign("whsec_topsecret", b"{\"id\":\"tx-1\"}");
        assert!(sig.starts_with("sha256="));
        assert_eq!(sig.len(), "sha256=".len() + 64);
        assert_eq!(sig, sign("whsec_topsecret", b"{\"id\":\"tx-1\"}"));
    }

    #[test]
    fn test_signature_depends_on_secret_and_payload() {
        let sig = sign("whsec_a", b"payload");
        assert_ne!(sig, sign("whsec_b", b"payload"));
        assert_ne!(sig, sign("whsec_a", b"payload2"));
    }

    #[test]
    fn test_verify_roundtrip() {
        let sig = sign("whsec_a", b"payload");
        assert!(verify("whsec_a", b"payload", &sig));
        assert!(!verify("whsec_b", b"payload", &sig));
        assert!(!verify("whsec_a", b"tampered", &sig));
        assert!(!verify("whsec_a", b"payload", "md5=deadbeef"));
        assert!(!verify("whsec_a", b"payload", "sha256=not-hex"));
    }
}
