//! Resource-server side: prices and per-request payment requirements.

use alloy::primitives::{Address, U256};

use crate::payment::{PaymentRequirements, RequirementExtra};
use crate::{ChainConfig, X402Error};

/// Default window a client may choose for `validBefore - validAfter`.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 120;

/// Builds the requirement a 402 challenge advertises for one resource.
#[derive(Debug, Clone)]
pub struct RequirementBuilder {
    config: ChainConfig,
    max_timeout_seconds: u64,
    description: Option<String>,
    mime_type: Option<String>,
}

impl RequirementBuilder {
    pub fn new() -> Self {
        Self::with_chain_config(ChainConfig::default())
    }

    pub fn with_chain_config(config: ChainConfig) -> Self {
        Self {
            config,
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
            description: None,
            mime_type: Some("application/json".to_string()),
        }
    }

    pub fn max_timeout_seconds(mut self, secs: u64) -> Self {
        self.max_timeout_seconds = secs;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    /// Build the requirement for `resource`. The amount is the price of this
    /// specific resource instance.
    pub fn build(
        &self,
        resource: &str,
        pay_to: Address,
        asset: Address,
        amount: U256,
    ) -> Result<PaymentRequirements, X402Error> {
        if resource.trim().is_empty() {
            return Err(X402Error::InvalidPayment(
                "resource locator must not be empty".into(),
            ));
        }
        if amount.is_zero() {
            return Err(X402Error::InvalidPayment("amount must be positive".into()));
        }
        if pay_to == Address::ZERO {
            return Err(X402Error::InvalidPayment("payTo is the zero address".into()));
        }
        if self.max_timeout_seconds == 0 {
            return Err(X402Error::ConfigError("maxTimeoutSeconds must be positive".into()));
        }

        Ok(PaymentRequirements {
            scheme: self.config.scheme_name.clone(),
            network: self.config.network.clone(),
            resource: resource.to_string(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            pay_to,
            max_amount_required: amount.to_string(),
            max_timeout_seconds: self.max_timeout_seconds,
            asset,
            extra: RequirementExtra {
                name: self.config.eip712_domain_name.clone(),
                version: self.config.eip712_domain_version.clone(),
            },
        })
    }
}

impl Default for RequirementBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a human price ("$0.10", "0.25", "$1") into smallest units.
/// Integer-only; digits past `decimals` are truncated.
pub fn parse_price(price: &str, decimals: u32) -> Result<U256, X402Error> {
    let invalid = |why: &str| X402Error::InvalidPayment(format!("invalid price '{price}': {why}"));

    let cleaned = price.trim();
    let cleaned = cleaned.strip_prefix('$').unwrap_or(cleaned).trim();
    if cleaned.is_empty() {
        return Err(invalid("no numeric content"));
    }

    let (integer_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned, ""));
    if integer_part.is_empty() && fractional_part.is_empty() {
        return Err(invalid("no numeric content"));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(integer_part) || !all_digits(fractional_part) {
        return Err(invalid("unexpected character"));
    }

    let decimals = decimals as usize;
    let mut frac: String = fractional_part.chars().take(decimals).collect();
    while frac.len() < decimals {
        frac.push('0');
    }

    let digits = format!("{integer_part}{frac}");
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| invalid("overflow"))
}
