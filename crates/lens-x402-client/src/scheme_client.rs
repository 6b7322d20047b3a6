use std::future::Future;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use x402::eip712::{encode_signature_hex, random_nonce, requirement_domain, signing_hash};
use x402::{unix_now, AuthorizationPayload, ChainConfig, PaymentRequirements, X402Error};

/// Client-side scheme: turns a requirement into a signed payload.
pub trait SchemeClient: Send + Sync {
    /// Scheme name this client can pay with.
    fn scheme(&self) -> &str;

    /// Network this client signs for.
    fn network(&self) -> &str;

    fn create_payment(
        &self,
        requirements: &PaymentRequirements,
    ) -> impl Future<Output = Result<AuthorizationPayload, X402Error>> + Send;
}

/// Caller-side spending limits. Not part of the protocol.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationPolicy {
    /// Refuse requirements asking for more than this (smallest units).
    pub max_amount: Option<U256>,
    /// Upper bound on `validBefore - validAfter`, on top of the requirement's own.
    pub max_validity_secs: Option<u64>,
}

/// Signs EIP-3009 `transferWithAuthorization` payloads for the "exact" scheme.
///
/// Use with [`X402Client`](crate::X402Client) to pay for content automatically.
pub struct ExactSchemeClient {
    signer: PrivateKeySigner,
    config: ChainConfig,
    policy: AuthorizationPolicy,
}

impl ExactSchemeClient {
    /// Create a client with Amoy defaults and no spending limit.
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self::with_chain_config(signer, ChainConfig::default())
    }

    pub fn with_chain_config(signer: PrivateKeySigner, config: ChainConfig) -> Self {
        Self {
            signer,
            config,
            policy: AuthorizationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AuthorizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a fresh authorization for `requirement`, valid from now.
    pub fn authorize(
        &self,
        requirement: &PaymentRequirements,
    ) -> Result<AuthorizationPayload, X402Error> {
        self.authorize_at(requirement, unix_now())
    }

    /// Sign a fresh authorization with `validAfter = now`.
    pub fn authorize_at(
        &self,
        requirement: &PaymentRequirements,
        now: u64,
    ) -> Result<AuthorizationPayload, X402Error> {
        if requirement.scheme != self.config.scheme_name {
            return Err(X402Error::UnsupportedScheme(requirement.scheme.clone()));
        }
        if requirement.network != self.config.network {
            return Err(X402Error::UnsupportedScheme(format!(
                "{} on {}",
                requirement.scheme, requirement.network
            )));
        }

        let value = requirement.amount()?;
        if value.is_zero() {
            return Err(X402Error::InvalidPayment("required amount is zero".into()));
        }
        if let Some(max) = self.policy.max_amount {
            if value > max {
                return Err(X402Error::AmountExceedsPolicy {
                    required: value,
                    max,
                });
            }
        }

        let window = match self.policy.max_validity_secs {
            Some(cap) => requirement.max_timeout_seconds.min(cap),
            None => requirement.max_timeout_seconds,
        };
        if window == 0 {
            return Err(X402Error::InvalidPayment("validity window is zero".into()));
        }

        let mut payload = AuthorizationPayload {
            from: self.signer.address(),
            to: requirement.pay_to,
            value: value.to_string(),
            valid_after: now,
            valid_before: now.saturating_add(window),
            nonce: random_nonce(),
            chain_id: self.config.chain_id,
            verifying_contract: requirement.asset,
            signature: String::new(),
        };

        let domain = requirement_domain(requirement, self.config.chain_id);
        let hash = signing_hash(&payload.authorization()?, &domain);
        let sig = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| X402Error::SignatureError(format!("signing failed: {e}")))?;
        payload.signature = encode_signature_hex(&sig);

        tracing::debug!(
            payer = %payload.from,
            to = %payload.to,
            value = %payload.value,
            nonce = %payload.short_nonce(),
            "signed payment authorization"
        );
        Ok(payload)
    }
}

impl SchemeClient for ExactSchemeClient {
    fn scheme(&self) -> &str {
        &self.config.scheme_name
    }

    fn network(&self) -> &str {
        &self.config.network
    }

    async fn create_payment(
        &self,
        requirements: &PaymentRequirements,
    ) -> Result<AuthorizationPayload, X402Error> {
        self.authorize(requirements)
    }
}
