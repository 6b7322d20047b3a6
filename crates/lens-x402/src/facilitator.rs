use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};

use crate::codec::decode_payment;
use crate::eip712::{authorization_domain, decode_signature_hex, recover_signer, SignatureFault};
use crate::ledger::Ledger;
use crate::nonce_ledger::{InMemoryNonceLedger, NonceLedger};
use crate::payment::{AuthorizationPayload, PaymentRequirements};
use crate::response::SettlementReceipt;
use crate::{unix_now, ChainConfig, RejectReason, SettleError, X402Error};

/// Result of verifying one authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accepted { payer: Address },
    Rejected { reasons: Vec<RejectReason> },
}

impl VerifyOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, VerifyOutcome::Accepted { .. })
    }

    pub fn reasons(&self) -> &[RejectReason] {
        match self {
            VerifyOutcome::Accepted { .. } => &[],
            VerifyOutcome::Rejected { reasons } => reasons,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        VerifyOutcome::Rejected {
            reasons: vec![reason],
        }
    }
}

/// Verifies authorizations and settles them at most once.
pub struct Facilitator<L> {
    ledger: L,
    config: ChainConfig,
    /// Pluggable nonce ledger for replay protection.
    nonces: Arc<dyn NonceLedger>,
}

impl<L> Facilitator<L> {
    /// Create a facilitator with Amoy defaults and an in-memory nonce ledger.
    ///
    /// # Warning
    /// The in-memory ledger loses every consumed nonce on restart. For
    /// production use, chain `.with_nonce_ledger(sqlite_ledger)`.
    pub fn new(ledger: L) -> Self {
        Self::with_chain_config(ledger, ChainConfig::default())
    }

    pub fn with_chain_config(ledger: L, config: ChainConfig) -> Self {
        Self {
            ledger,
            config,
            nonces: Arc::new(InMemoryNonceLedger::new()),
        }
    }

    /// Set a custom nonce ledger (e.g. SqliteNonceLedger for persistence).
    pub fn with_nonce_ledger(mut self, nonces: Arc<dyn NonceLedger>) -> Self {
        self.nonces = nonces;
        self
    }

    pub fn chain_config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn is_nonce_consumed(&self, nonce: &B256) -> bool {
        self.nonces.contains(nonce)
    }

    /// Start a background task that evicts expired nonces every 60 seconds.
    pub fn start_nonce_cleanup(&self) {
        let nonces = Arc::clone(&self.nonces);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let evicted = nonces.evict_expired(unix_now());
                if evicted > 0 {
                    tracing::info!(evicted, "evicted expired nonces");
                }
            }
        });
    }

    /// Verify a base64 `X-PAYMENT` header value.
    pub fn verify_encoded(
        &self,
        encoded: &str,
        requirement: Option<&PaymentRequirements>,
    ) -> VerifyOutcome {
        match decode_payment(encoded) {
            Ok(payload) => self.verify(&payload, requirement),
            Err(e) => {
                tracing::debug!(error = %e, "undecodable payment payload");
                VerifyOutcome::rejected(RejectReason::InvalidPayload)
            }
        }
    }

    pub fn verify(
        &self,
        payload: &AuthorizationPayload,
        requirement: Option<&PaymentRequirements>,
    ) -> VerifyOutcome {
        self.verify_at(payload, requirement, unix_now())
    }

    /// Verify against an explicit clock reading. Never touches the ledger.
    ///
    /// Every check runs; all failures are reported together.
    pub fn verify_at(
        &self,
        payload: &AuthorizationPayload,
        requirement: Option<&PaymentRequirements>,
        now: u64,
    ) -> VerifyOutcome {
        let auth = match payload.authorization() {
            Ok(auth) => auth,
            Err(_) => return VerifyOutcome::rejected(RejectReason::InvalidPayload),
        };

        let mut reasons = Vec::new();

        if payload.chain_id != self.config.chain_id {
            reasons.push(RejectReason::InvalidChain);
        }
        if now < payload.valid_after {
            reasons.push(RejectReason::NotYetValid);
        }
        if now > payload.valid_before {
            reasons.push(RejectReason::Expired);
        }
        if self.nonces.contains(&payload.nonce) {
            tracing::warn!(
                nonce = %payload.short_nonce(),
                payer = %payload.from,
                "replayed nonce rejected"
            );
            reasons.push(RejectReason::NonceReplay);
        }

        let domain = authorization_domain(&self.config, payload.verifying_contract);
        match decode_signature_hex(&payload.signature) {
            Err(_) => reasons.push(RejectReason::SignatureVerificationFailed),
            Ok(sig_bytes) => match recover_signer(&auth, &sig_bytes, &domain) {
                Ok(signer) if signer == payload.from => {}
                Ok(_) => reasons.push(RejectReason::SignatureMismatch),
                Err(SignatureFault::Malformed(_)) => {
                    reasons.push(RejectReason::SignatureVerificationFailed)
                }
                Err(SignatureFault::Unrecoverable(_)) => {
                    reasons.push(RejectReason::SignatureMismatch)
                }
            },
        }

        if let Some(req) = requirement {
            reasons.extend(binding_failures(payload, auth.value, req));
        }

        if reasons.is_empty() {
            VerifyOutcome::Accepted {
                payer: payload.from,
            }
        } else {
            tracing::info!(
                payer = %payload.from,
                nonce = %payload.short_nonce(),
                reasons = ?reasons,
                "authorization rejected"
            );
            VerifyOutcome::Rejected { reasons }
        }
    }
}

/// Checks tying the authorization to what the resource server asked for.
fn binding_failures(
    payload: &AuthorizationPayload,
    value: U256,
    req: &PaymentRequirements,
) -> Vec<RejectReason> {
    let mut reasons = Vec::new();
    // An unparseable requirement amount can be satisfied by nothing.
    match req.amount() {
        Ok(required) if value >= required => {}
        _ => reasons.push(RejectReason::AmountInsufficient),
    }
    if payload.to != req.pay_to {
        reasons.push(RejectReason::RecipientMismatch);
    }
    if payload.verifying_contract != req.asset {
        reasons.push(RejectReason::AssetMismatch);
    }
    reasons
}

impl<L> Facilitator<L>
where
    L: Ledger,
{
    /// Settle a base64 `X-PAYMENT` header value.
    pub async fn settle_encoded(&self, encoded: &str) -> Result<SettlementReceipt, SettleError> {
        let payload = decode_payment(encoded).map_err(|e| {
            tracing::debug!(error = %e, "undecodable payment payload");
            SettleError::Rejected(RejectReason::InvalidPayload)
        })?;
        self.settle(&payload).await
    }

    /// Re-check the payload, consume the nonce, then execute the transfer.
    ///
    /// The nonce stays consumed whatever the transfer does; a failed
    /// transfer is a `settle_error` and the payer must sign a new
    /// authorization.
    pub async fn settle(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<SettlementReceipt, SettleError> {
        if payload.validate().is_err() {
            return Err(SettleError::Rejected(RejectReason::InvalidPayload));
        }

        // Nothing unverifiable may consume a nonce. Expired payloads stop
        // here too, so a nonce dropped after its retention cannot be replayed.
        if let VerifyOutcome::Rejected { reasons } = self.verify(payload, None) {
            let reason = if reasons.contains(&RejectReason::NonceReplay) {
                RejectReason::NonceReplay
            } else {
                reasons[0]
            };
            return Err(SettleError::Rejected(reason));
        }

        if !self.nonces.reserve(payload.nonce, payload.valid_before) {
            tracing::warn!(
                nonce = %payload.short_nonce(),
                payer = %payload.from,
                "settlement replay rejected"
            );
            return Err(SettleError::Rejected(RejectReason::NonceReplay));
        }

        match self.ledger.transfer_with_authorization(payload).await {
            Ok(transaction) => {
                tracing::info!(
                    payer = %payload.from,
                    to = %payload.to,
                    value = %payload.value,
                    nonce = %payload.short_nonce(),
                    tx = transaction.as_deref().unwrap_or("simulated"),
                    "payment settled"
                );
                Ok(SettlementReceipt {
                    success: true,
                    transaction,
                    network: self.config.network.clone(),
                    payer: Some(payload.from),
                })
            }
            Err(e) => {
                tracing::error!(
                    payer = %payload.from,
                    nonce = %payload.short_nonce(),
                    error = %e,
                    "settlement transfer failed, nonce remains consumed"
                );
                Err(SettleError::Transfer(e.to_string()))
            }
        }
    }

    /// Ledger reachability.
    pub async fn health_check(&self) -> Result<u64, X402Error> {
        self.ledger.health_check().await
    }
}
