use alloy::primitives::U256;
use thiserror::Error;

use crate::reason::RejectReason;

/// Errors returned by x402 operations.
#[derive(Debug, Error)]
pub enum X402Error {
    #[error("signature error: {0}")]
    SignatureError(String),

    #[error("chain error: {0}")]
    ChainError(String),

    #[error("invalid payment: {0}")]
    InvalidPayment(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("http error: {0}")]
    HttpError(String),

    #[error("required amount {required} exceeds policy maximum {max}")]
    AmountExceedsPolicy { required: U256, max: U256 },

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Why a settlement did not produce a receipt.
#[derive(Debug, Error)]
pub enum SettleError {
    /// Refused before any transfer was attempted.
    #[error("settlement refused: {0}")]
    Rejected(RejectReason),

    /// The nonce was consumed but the ledger transfer failed.
    #[error("settle_error: {0}")]
    Transfer(String),
}

impl SettleError {
    pub fn reason(&self) -> RejectReason {
        match self {
            SettleError::Rejected(reason) => *reason,
            SettleError::Transfer(_) => RejectReason::SettleError,
        }
    }

    /// Wire error list: `["nonce_replay"]` or `["settle_error", cause]`.
    pub fn error_codes(&self) -> Vec<String> {
        match self {
            SettleError::Rejected(reason) => vec![reason.to_string()],
            SettleError::Transfer(cause) => {
                vec![RejectReason::SettleError.to_string(), cause.clone()]
            }
        }
    }
}
