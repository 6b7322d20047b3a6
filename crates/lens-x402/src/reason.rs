//! Machine-readable rejection codes shared by the verifier, settler and gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reason a payment authorization was refused. Serialized snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InvalidPayload,
    InvalidChain,
    NotYetValid,
    Expired,
    NonceReplay,
    SignatureMismatch,
    SignatureVerificationFailed,
    AmountInsufficient,
    RecipientMismatch,
    AssetMismatch,
    SettleError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidPayload => "invalid_payload",
            RejectReason::InvalidChain => "invalid_chain",
            RejectReason::NotYetValid => "not_yet_valid",
            RejectReason::Expired => "expired",
            RejectReason::NonceReplay => "nonce_replay",
            RejectReason::SignatureMismatch => "signature_mismatch",
            RejectReason::SignatureVerificationFailed => "signature_verification_failed",
            RejectReason::AmountInsufficient => "amount_insufficient",
            RejectReason::RecipientMismatch => "recipient_mismatch",
            RejectReason::AssetMismatch => "asset_mismatch",
            RejectReason::SettleError => "settle_error",
        }
    }

}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "invalid_payload" => RejectReason::InvalidPayload,
            "invalid_chain" => RejectReason::InvalidChain,
            "not_yet_valid" => RejectReason::NotYetValid,
            "expired" => RejectReason::Expired,
            "nonce_replay" => RejectReason::NonceReplay,
            "signature_mismatch" => RejectReason::SignatureMismatch,
            "signature_verification_failed" => RejectReason::SignatureVerificationFailed,
            "amount_insufficient" => RejectReason::AmountInsufficient,
            "recipient_mismatch" => RejectReason::RecipientMismatch,
            "asset_mismatch" => RejectReason::AssetMismatch,
            "settle_error" => RejectReason::SettleError,
            other => return Err(format!("unknown reject reason: {other}")),
        })
    }
}
