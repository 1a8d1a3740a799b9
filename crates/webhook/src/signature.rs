//! HMAC-SHA256 webhook signature verification, following
//! `integrations::webhooks::verify_webhook_signature`'s hex-decode +
//! constant-time-compare shape, adapted for the `sha256=<hex>` header form.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies `header_value` (the raw `X-Hub-Signature-256` header, including
/// its `sha256=` prefix) against `HMAC-SHA256(secret, body)`.
#[must_use]
pub fn verify_webhook_signature(body: &[u8], header_value: &str, secret: &str) -> bool {
    let Some(hex_sig) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    computed.as_slice().ct_eq(&signature_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(body: &[u8], secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn valid_signature_is_accepted() {
        let body = b"test payload";
        let secret = "test-secret";
        let header = sign(body, secret);
        assert!(verify_webhook_signature(body, &header, secret));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let body = b"test payload";
        let header = format!("sha256={}", "0".repeat(64));
        assert!(!verify_webhook_signature(body, &header, "test-secret"));
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(!verify_webhook_signature(b"test payload", "not-hex", "test-secret"));
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let body = b"test payload";
        let secret = "test-secret";
        let header = sign(body, secret);
        let without_prefix = header.strip_prefix("sha256=").unwrap();
        assert!(!verify_webhook_signature(body, without_prefix, secret));
    }

    #[test]
    fn different_body_fails_verification() {
        let secret = "test-secret";
        let header = sign(b"original payload", secret);
        assert!(!verify_webhook_signature(b"tampered payload", &header, secret));
    }
}
