use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::{TransferWithAuthorization, X402Error};

/// EIP-712 domain metadata of the asset, carried in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementExtra {
    pub name: String,
    pub version: String,
}

/// A single entry in the `accepts` array of a 402 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub pay_to: Address,
    /// Smallest-unit decimal string.
    pub max_amount_required: String,
    pub max_timeout_seconds: u64,
    pub asset: Address,
    pub extra: RequirementExtra,
}

impl PaymentRequirements {
    /// The required amount as an integer.
    pub fn amount(&self) -> Result<U256, X402Error> {
        parse_decimal_amount(&self.max_amount_required)
    }
}

/// The 402 response body returned by the resource server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub x402_version: u32,
    pub accepts: Vec<PaymentRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Signed EIP-3009 authorization, sent base64-encoded in the `X-PAYMENT` header.
///
/// The payload carries no server-side state; its nonce alone prevents reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationPayload {
    pub from: Address,
    pub to: Address,
    /// Smallest-unit decimal string.
    pub value: String,
    pub valid_after: u64,
    pub valid_before: u64,
    pub nonce: B256,
    pub chain_id: u64,
    pub verifying_contract: Address,
    /// 65-byte hex signature (r ‖ s ‖ v).
    pub signature: String,
}

impl AuthorizationPayload {
    pub fn amount(&self) -> Result<U256, X402Error> {
        parse_decimal_amount(&self.value)
    }

    /// The typed tuple the signature commits to.
    pub fn authorization(&self) -> Result<TransferWithAuthorization, X402Error> {
        Ok(TransferWithAuthorization {
            from: self.from,
            to: self.to,
            value: self.amount()?,
            validAfter: U256::from(self.valid_after),
            validBefore: U256::from(self.valid_before),
            nonce: self.nonce,
        })
    }

    /// Structural checks applied by the decoder. Semantic checks (time window,
    /// chain, signature) belong to the verifier.
    pub fn validate(&self) -> Result<(), X402Error> {
        if self.from == Address::ZERO {
            return Err(X402Error::InvalidPayment("from is the zero address".into()));
        }
        if self.to == Address::ZERO {
            return Err(X402Error::InvalidPayment("to is the zero address".into()));
        }
        if self.verifying_contract == Address::ZERO {
            return Err(X402Error::InvalidPayment(
                "verifyingContract is the zero address".into(),
            ));
        }
        if self.amount()?.is_zero() {
            return Err(X402Error::InvalidPayment("value must be positive".into()));
        }
        if self.valid_after > self.valid_before {
            return Err(X402Error::InvalidPayment(
                "validAfter is later than validBefore".into(),
            ));
        }
        if self.signature.trim().is_empty() {
            return Err(X402Error::InvalidPayment("signature is empty".into()));
        }
        Ok(())
    }

    /// First 8 hex chars of the nonce, for log lines.
    pub fn short_nonce(&self) -> String {
        nonce_prefix(&self.nonce)
    }
}

pub(crate) fn nonce_prefix(nonce: &B256) -> String {
    let hex = alloy::hex::encode(nonce);
    hex[..8].to_string()
}

/// Parse a smallest-unit decimal string. Digits only; no sign, no hex.
pub fn parse_decimal_amount(s: &str) -> Result<U256, X402Error> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(X402Error::InvalidPayment(format!(
            "amount must be a decimal integer: {s:?}"
        )));
    }
    U256::from_str_radix(s, 10)
        .map_err(|e| X402Error::InvalidPayment(format!("amount out of range: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AuthorizationPayload {
        AuthorizationPayload {
            from: Address::repeat_byte(0x11),
            to: Address::repeat_byte(0x22),
            value: "100000".into(),
            valid_after: 100,
            valid_before: 220,
            nonce: B256::repeat_byte(0xab),
            chain_id: 80002,
            verifying_contract: crate::DEFAULT_ASSET,
            signature: format!("0x{}", "00".repeat(65)),
        }
    }

    #[test]
    fn test_wire_field_names_are_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        for key in [
            "from",
            "to",
            "value",
            "validAfter",
            "validBefore",
            "nonce",
            "chainId",
            "verifyingContract",
            "signature",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        sample().validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_inverted_window() {
        let mut p = sample();
        p.valid_after = 300;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_value() {
        let mut p = sample();
        p.value = "0".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_parse_decimal_amount_rejects_non_digits() {
        assert!(parse_decimal_amount("").is_err());
        assert!(parse_decimal_amount("-5").is_err());
        assert!(parse_decimal_amount("0x10").is_err());
        assert!(parse_decimal_amount("1_000").is_err());
        assert_eq!(parse_decimal_amount("100000").unwrap(), U256::from(100_000u64));
    }

    #[test]
    fn test_short_nonce() {
        assert_eq!(sample().short_nonce(), "abababab");
    }
}
