//! Build a facilitator [`AppState`] from configuration.
//!
//! Used by the facilitator binary and by the resource server's embedded
//! mode, so both open the nonce ledger the same way.

use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use alloy::signers::local::PrivateKeySigner;
use x402::{Eip3009Ledger, Facilitator, NonceLedger, SimulatedLedger, SqliteNonceLedger};

use crate::config::FacilitatorConfig;
use crate::state::{AppState, LedgerBackend};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid FACILITATOR_PRIVATE_KEY")]
    InvalidPrivateKey,

    #[error("invalid RPC_URL: {0}")]
    InvalidRpcUrl(String),

    #[error("failed to open nonce ledger at {path}: {source}")]
    NonceLedger {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Open the SQLite nonce ledger and the settlement ledger, and assemble
/// the shared state. Never falls back to an in-memory nonce ledger.
pub fn build_state(config: &FacilitatorConfig) -> Result<AppState, BootstrapError> {
    let nonces = SqliteNonceLedger::open_with_retention(
        &config.nonce_db_path,
        config.nonce_retention_secs,
    )
    .map_err(|source| BootstrapError::NonceLedger {
        path: config.nonce_db_path.clone(),
        source,
    })?;
    tracing::info!(path = %config.nonce_db_path, "nonce ledger: SQLite");
    let nonces: Arc<dyn NonceLedger> = Arc::new(nonces);

    let ledger = match (&config.private_key, config.simulate_settlement) {
        (_, true) => {
            tracing::warn!("SIMULATE_SETTLEMENT=true: transfers are accepted without a chain");
            LedgerBackend::Simulated(SimulatedLedger::new())
        }
        (Some(key), false) => {
            let signer: PrivateKeySigner =
                key.parse().map_err(|_| BootstrapError::InvalidPrivateKey)?;
            tracing::info!(address = %signer.address(), "facilitator gas wallet");
            let rpc_url = config
                .chain
                .rpc_url
                .parse()
                .map_err(|_| BootstrapError::InvalidRpcUrl(config.chain.rpc_url.clone()))?;
            let provider = ProviderBuilder::new()
                .wallet(alloy::network::EthereumWallet::from(signer))
                .connect_http(rpc_url);
            LedgerBackend::Chain(Eip3009Ledger::new(provider))
        }
        (None, false) => return Err(BootstrapError::InvalidPrivateKey),
    };

    let facilitator =
        Facilitator::with_chain_config(ledger, config.chain.clone()).with_nonce_ledger(nonces);

    Ok(AppState {
        facilitator,
        hmac_secret: config.hmac_secret.clone(),
        metrics_token: config.metrics_token.clone(),
        public_metrics: config.public_metrics,
    })
}

/// [`build_state`] plus the periodic nonce eviction task. Requires a tokio runtime.
pub fn bootstrap(config: &FacilitatorConfig) -> Result<Arc<AppState>, BootstrapError> {
    let state = build_state(config)?;
    state.facilitator.start_nonce_cleanup();
    Ok(Arc::new(state))
}
