//! x402 client for pay-per-access content.
//!
//! Handles the HTTP 402 flow automatically: request -> 402 -> sign an
//! EIP-3009 authorization -> retry with `X-PAYMENT` -> read the receipt.
//!
//! # Quick Example
//!
//! ```no_run
//! use alloy::signers::local::PrivateKeySigner;
//! use x402_client::{ExactSchemeClient, X402Client};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let signer: PrivateKeySigner = "0xYOUR_KEY".parse().unwrap();
//! let client = X402Client::new(ExactSchemeClient::new(signer)).unwrap();
//!
//! let (resp, receipt) = client
//!     .fetch("http://localhost:5402/a2a/content/abc123", reqwest::Method::GET)
//!     .await
//!     .unwrap();
//!
//! if let Some(r) = receipt {
//!     println!("paid, tx: {:?}", r.transaction);
//! }
//! # }
//! ```

mod http_client;
mod scheme_client;
mod topic;

pub use http_client::{decode_receipt_header, X402Client};
pub use scheme_client::{AuthorizationPolicy, ExactSchemeClient, SchemeClient};
pub use topic::TopicMatcher;

// Re-export commonly needed types from core
pub use x402::{
    AuthorizationPayload, ChainConfig, PaymentRequiredBody, PaymentRequirements,
    SettlementReceipt, X402Error, AMOY_NETWORK, DEFAULT_ASSET, SCHEME_EXACT,
};
