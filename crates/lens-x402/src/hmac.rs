//! HMAC-SHA256 request signing between the resource server and facilitator.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length")
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign_body(secret: &[u8], body: &[u8]) -> String {
    let mut mac = keyed(secret);
    mac.update(body);
    alloy::hex::encode(mac.finalize().into_bytes())
}

/// Check a hex HMAC against `body`. Constant-time; malformed hex is compared
/// as zeros so it takes the same path as a wrong MAC.
pub fn verify_body(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let mut mac = keyed(secret);
    mac.update(body);

    let expected = alloy::hex::decode(signature.trim()).unwrap_or_else(|_| vec![0u8; 32]);

    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_body_verifies() {
        let sig = sign_body(b"shared", br#"{"paymentPayloadBase64":"x"}"#);
        assert_eq!(sig.len(), 64);
        assert!(verify_body(b"shared", br#"{"paymentPayloadBase64":"x"}"#, &sig));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sig = sign_body(b"secret-1", b"body");
        assert!(!verify_body(b"secret-2", b"body", &sig));
    }

    #[test]
    fn test_tampered_body_fails() {
        let sig = sign_body(b"shared", b"original");
        assert!(!verify_body(b"shared", b"tampered", &sig));
    }

    #[test]
    fn test_invalid_hex_fails() {
        assert!(!verify_body(b"shared", b"body", "not-hex-zz"));
        assert!(!verify_body(b"shared", b"body", ""));
    }
}
