//! Webhook signature verification.
//!
//! Deliveries are signed with HMAC-SHA256 over the exact raw request body,
//! hex encoded, and sent in the `X-Signature` header. Verification must run
//! against the same raw bytes the sender signed, before any parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the lowercase hex HMAC-SHA256 digest of a payload.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        // Unreachable: HMAC-SHA256 accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex HMAC-SHA256 signature against a payload.
///
/// # Arguments
///
/// * `secret` - The shared webhook secret
/// * `payload` - The exact raw request body bytes
/// * `signature_hex` - The hex digest provided in the `X-Signature` header
///
/// # Returns
///
/// `true` only when the signature decodes as hex and matches the HMAC of
/// the payload. Malformed input yields `false`, never an error.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let provided = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    // verify_slice compares in constant time.
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let signature = compute_signature(b"secret", b"payload bytes");
        assert!(verify_signature(b"secret", b"payload bytes", &signature));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signature = compute_signature(b"secret", b"payload bytes");
        assert!(!verify_signature(b"secret", b"payload byteZ", &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signature = compute_signature(b"secret", b"payload bytes");
        assert!(!verify_signature(b"other-secret", b"payload bytes", &signature));
    }

    #[test]
    fn test_malformed_hex_rejected() {
        assert!(!verify_signature(b"secret", b"payload", "not hex at all"));
        assert!(!verify_signature(b"secret", b"payload", "abc"));
        assert!(!verify_signature(b"secret", b"payload", ""));
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let signature = compute_signature(b"secret", b"payload");
        assert!(!verify_signature(b"secret", b"payload", &signature[..32]));
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let signature = compute_signature(b"secret", b"payload");
        assert_eq!(signature.len(), 64);
        assert!(signature
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
