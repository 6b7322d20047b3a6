use alloy::primitives::{address, Address};

/// Polygon Amoy testnet chain ID.
pub const AMOY_CHAIN_ID: u64 = 80002;

/// Network name carried in requirements and receipts.
pub const AMOY_NETWORK: &str = "polygon-amoy";

/// The only payment scheme this crate speaks.
pub const SCHEME_EXACT: &str = "exact";

/// Protocol version advertised in 402 bodies.
pub const X402_VERSION: u32 = 1;

/// Test USDC (FiatTokenV2) on Polygon Amoy.
pub const DEFAULT_ASSET: Address = address!("41e94eb019c0762f9bfcf9fb1e58725bfb0e7582");

/// USDC has 6 decimal places.
pub const TOKEN_DECIMALS: u32 = 6;

/// Default RPC endpoint for Polygon Amoy.
pub const RPC_URL: &str = "https://rpc-amoy.polygon.technology";

/// Request header carrying the base64 authorization payload.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Response header carrying the base64 settlement receipt.
pub const PAYMENT_RESPONSE_HEADER: &str = "X-PAYMENT-RESPONSE";

/// Response header set when content is released without settlement.
pub const DEMO_BYPASS_HEADER: &str = "X-PAYMENT-DEMO-BYPASS";

/// HMAC header on resource server → facilitator calls.
pub const FACILITATOR_AUTH_HEADER: &str = "X-Facilitator-Auth";

/// Seconds a consumed nonce is retained past its `validBefore`.
pub const DEFAULT_NONCE_RETENTION_SECS: u64 = 3600;

/// Runtime chain configuration shared by the signer, verifier and settler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub network: String,
    pub scheme_name: String,
    pub default_asset: Address,
    pub token_decimals: u32,
    pub rpc_url: String,
    pub eip712_domain_name: String,
    pub eip712_domain_version: String,
}

impl Default for ChainConfig {
    /// Defaults to Polygon Amoy with test USDC.
    fn default() -> Self {
        Self {
            chain_id: AMOY_CHAIN_ID,
            network: AMOY_NETWORK.to_string(),
            scheme_name: SCHEME_EXACT.to_string(),
            default_asset: DEFAULT_ASSET,
            token_decimals: TOKEN_DECIMALS,
            rpc_url: RPC_URL.to_string(),
            eip712_domain_name: "USDC".to_string(),
            eip712_domain_version: "2".to_string(),
        }
    }
}

