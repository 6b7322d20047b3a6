//! Base64-JSON framing for the `X-PAYMENT` and `X-PAYMENT-RESPONSE` headers.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::payment::AuthorizationPayload;
use crate::response::SettlementReceipt;
use crate::X402Error;

/// Upper bound on an encoded header before any decoding work is done.
pub const MAX_ENCODED_LEN: usize = 8 * 1024;

pub fn encode_payment(payload: &AuthorizationPayload) -> Result<String, X402Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(STANDARD.encode(json))
}

/// Decode and structurally validate a payment header. Fails closed: any
/// malformed input is an error, never a partially filled payload.
pub fn decode_payment(encoded: &str) -> Result<AuthorizationPayload, X402Error> {
    let bytes = decode_base64(encoded)?;
    let payload: AuthorizationPayload = serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::InvalidPayment(format!("malformed payload JSON: {e}")))?;
    payload.validate()?;
    Ok(payload)
}

pub fn encode_receipt(receipt: &SettlementReceipt) -> Result<String, X402Error> {
    let json = serde_json::to_vec(receipt)?;
    Ok(STANDARD.encode(json))
}

pub fn decode_receipt(encoded: &str) -> Result<SettlementReceipt, X402Error> {
    let bytes = decode_base64(encoded)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| X402Error::InvalidPayment(format!("malformed receipt JSON: {e}")))
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, X402Error> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(X402Error::InvalidPayment("empty header".into()));
    }
    if trimmed.len() > MAX_ENCODED_LEN {
        return Err(X402Error::InvalidPayment("header too large".into()));
    }
    STANDARD
        .decode(trimmed)
        .map_err(|e| X402Error::InvalidPayment(format!("invalid base64: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};

    fn payload() -> AuthorizationPayload {
        AuthorizationPayload {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x02),
            value: "100000".into(),
            valid_after: 1,
            valid_before: 121,
            nonce: B256::repeat_byte(0x07),
            chain_id: crate::AMOY_CHAIN_ID,
            verifying_contract: crate::DEFAULT_ASSET,
            signature: format!("0x{}", "11".repeat(65)),
        }
    }

    #[test]
    fn test_payment_header_decodes() {
        let encoded = encode_payment(&payload()).unwrap();
        assert_eq!(decode_payment(&encoded).unwrap(), payload());
    }

    #[test]
    fn test_rejects_non_base64() {
        assert!(decode_payment("not base64!!").is_err());
        assert!(decode_payment("").is_err());
    }

    #[test]
    fn test_rejects_json_with_missing_fields() {
        let encoded = STANDARD.encode(br#"{"from":"0x0101010101010101010101010101010101010101"}"#);
        assert!(decode_payment(&encoded).is_err());
    }

    #[test]
    fn test_rejects_bad_nonce_length() {
        let mut json = serde_json::to_value(payload()).unwrap();
        json["nonce"] = serde_json::json!("0x1234");
        let encoded = STANDARD.encode(serde_json::to_vec(&json).unwrap());
        assert!(decode_payment(&encoded).is_err());
    }

    #[test]
    fn test_rejects_oversized_header() {
        let big = "A".repeat(MAX_ENCODED_LEN + 4);
        assert!(decode_payment(&big).is_err());
    }

    #[test]
    fn test_receipt_header() {
        let receipt = SettlementReceipt {
            success: true,
            transaction: None,
            network: crate::AMOY_NETWORK.to_string(),
            payer: Some(Address::repeat_byte(0x01)),
        };
        let header = encode_receipt(&receipt).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&STANDARD.decode(&header).unwrap()).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["network"], "polygon-amoy");
        assert_eq!(decode_receipt(&header).unwrap(), receipt);
    }
}
