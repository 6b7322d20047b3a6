//! Settlement ledgers: where a consumed authorization turns into a transfer.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::Bytes;
use alloy::providers::Provider;

use crate::eip712::decode_signature_hex;
use crate::payment::AuthorizationPayload;
use crate::{X402Error, IEIP3009};

/// Seconds allowed for the RPC to accept the transaction.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Seconds allowed for the transaction to be mined.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Worst case for one on-chain transfer. Callers of `/settle` must wait longer.
pub const TRANSFER_TIMEOUT: Duration =
    Duration::from_secs(SEND_TIMEOUT.as_secs() + RECEIPT_TIMEOUT.as_secs());

/// A ledger able to execute an EIP-3009 delegated transfer.
pub trait Ledger: Send + Sync {
    /// Execute the transfer the payload authorizes. Returns the transaction
    /// hash, or `None` when the ledger has no chain behind it.
    fn transfer_with_authorization(
        &self,
        payload: &AuthorizationPayload,
    ) -> impl Future<Output = Result<Option<String>, X402Error>> + Send;

    /// Reachability probe. Returns the latest block number.
    fn health_check(&self) -> impl Future<Output = Result<u64, X402Error>> + Send;

    /// Whether transfers are simulated.
    fn is_simulated(&self) -> bool {
        false
    }
}

/// Settles on an EVM chain by calling `transferWithAuthorization` on the
/// asset contract. The provider's wallet pays gas; funds move from the
/// payer's balance per their signature.
pub struct Eip3009Ledger<P> {
    provider: P,
    send_timeout: Duration,
    receipt_timeout: Duration,
}

impl<P> Eip3009Ledger<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            send_timeout: SEND_TIMEOUT,
            receipt_timeout: RECEIPT_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, send: Duration, receipt: Duration) -> Self {
        self.send_timeout = send;
        self.receipt_timeout = receipt;
        self
    }

}

impl<P> Ledger for Eip3009Ledger<P>
where
    P: Provider + Send + Sync,
{
    async fn transfer_with_authorization(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<Option<String>, X402Error> {
        let auth = payload.authorization()?;
        let signature = Bytes::from(decode_signature_hex(&payload.signature)?);
        let contract = IEIP3009::new(payload.verifying_contract, &self.provider);

        let call = contract.transferWithAuthorization(
            auth.from,
            auth.to,
            auth.value,
            auth.validAfter,
            auth.validBefore,
            auth.nonce,
            signature,
        );

        let pending = tokio::time::timeout(self.send_timeout, call.send())
            .await
            .map_err(|_| {
                X402Error::ChainError(format!(
                    "transferWithAuthorization send timed out after {}s",
                    self.send_timeout.as_secs()
                ))
            })?
            .map_err(|e| X402Error::ChainError(format!("transferWithAuthorization send failed: {e}")))?;

        let receipt = tokio::time::timeout(self.receipt_timeout, pending.get_receipt())
            .await
            .map_err(|_| {
                X402Error::ChainError(format!(
                    "transferWithAuthorization receipt timed out after {}s",
                    self.receipt_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                X402Error::ChainError(format!("transferWithAuthorization receipt failed: {e}"))
            })?;

        if !receipt.status() {
            return Err(X402Error::ChainError(
                "transferWithAuthorization reverted".to_string(),
            ));
        }

        Ok(Some(format!("{:#x}", receipt.transaction_hash)))
    }

    async fn health_check(&self) -> Result<u64, X402Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| X402Error::ChainError(format!("health check failed: {e}")))
    }
}

/// Accepts every transfer without touching a chain. For local demos only.
#[derive(Debug, Default)]
pub struct SimulatedLedger {
    transfers: AtomicU64,
    latency: Duration,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stand in for block confirmation time before each transfer completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of transfers accepted so far.
    pub fn transfers(&self) -> u64 {
        self.transfers.load(Ordering::SeqCst)
    }
}

impl Ledger for SimulatedLedger {
    async fn transfer_with_authorization(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<Option<String>, X402Error> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.transfers.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            payer = %payload.from,
            value = %payload.value,
            nonce = %payload.short_nonce(),
            "simulated settlement, no transaction sent"
        );
        Ok(None)
    }

    async fn health_check(&self) -> Result<u64, X402Error> {
        Ok(0)
    }

    fn is_simulated(&self) -> bool {
        true
    }
}
