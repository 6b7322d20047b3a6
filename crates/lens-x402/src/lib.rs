//! x402 "exact" payment scheme for pay-per-access HTTP content.
//!
//! A client presents an EIP-712 signed, time-bounded, single-use
//! EIP-3009 `transferWithAuthorization` before a protected resource is
//! released. Settlement is a delegated transfer on the asset contract; the
//! facilitator key only pays gas.
//!
//! # Three-party model
//!
//! - **Client** (`x402_client::ExactSchemeClient`): signs payment authorizations
//! - **Resource server** ([`RequirementBuilder`]): gates content, answers 402 with a requirement
//! - **Facilitator** ([`Facilitator`]): verifies authorizations and settles them exactly once
//!
//! # Quick example (facilitator)
//!
//! ```no_run
//! use x402::{Facilitator, SimulatedLedger};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let facilitator = Facilitator::new(SimulatedLedger::new());
//! let outcome = facilitator.verify_encoded("eyJ...", None);
//! if outcome.is_accepted() {
//!     let receipt = facilitator.settle_encoded("eyJ...").await;
//!     println!("{receipt:?}");
//! }
//! # }
//! ```

// Core types
pub mod codec;
pub mod constants;
pub mod error;
pub mod payment;
pub mod reason;
pub mod response;

// Signing and verification
pub mod eip712;
pub mod requirement;

// Settlement
pub mod facilitator;
pub mod ledger;
pub mod nonce_ledger;

// Transport helpers
pub mod facilitator_client;
pub mod hmac;
pub mod security;

use alloy::sol;

// EIP-3009 typed struct. The sol! macro derives SolStruct, which provides
// eip712_signing_hash() with the struct name as the primary type.
sol! {
    #[derive(Debug, serde::Serialize, serde::Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
}

// EIP-3009 surface of the asset contract (USDC FiatTokenV2_2 bytes overload).
sol! {
    #[sol(rpc)]
    interface IEIP3009 {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            bytes signature
        ) external;
    }
}

/// Current unix time in seconds. A clock before the epoch reads as 0, which
/// makes every authorization look not yet valid.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// Re-exports
pub use constants::ChainConfig;
pub use constants::*;
pub use error::{SettleError, X402Error};
pub use facilitator::{Facilitator, VerifyOutcome};
pub use ledger::{Eip3009Ledger, Ledger, SimulatedLedger};
pub use nonce_ledger::{InMemoryNonceLedger, NonceLedger, SqliteNonceLedger};
pub use payment::{AuthorizationPayload, PaymentRequiredBody, PaymentRequirements, RequirementExtra};
pub use reason::RejectReason;
pub use requirement::RequirementBuilder;
pub use response::SettlementReceipt;
