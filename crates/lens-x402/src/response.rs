use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::payment::PaymentRequirements;

/// Body of `POST /verify`. The payload may instead arrive in `X-PAYMENT`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_payload_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_requirements: Option<PaymentRequirements>,
}

/// Body of `POST /settle`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_payload_base64: Option<String>,
}

/// Response from the facilitator's `/verify` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<Address>,
}

/// Response from the facilitator's `/settle` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    /// Transaction hash, if settlement confirmed on chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// Proof of settlement handed back to the client in `X-PAYMENT-RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub success: bool,
    /// `None` when the ledger is simulated.
    pub transaction: Option<String>,
    pub network: String,
    pub payer: Option<Address>,
}

/// Response from the facilitator's `/supported` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    pub networks: Vec<SupportedNetwork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedNetwork {
    pub name: String,
    pub chain_id: u64,
    pub schemes: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub simulated: bool,
}
