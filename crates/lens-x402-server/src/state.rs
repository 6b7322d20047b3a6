use std::sync::Arc;

use alloy::primitives::{Address, U256};
use x402::facilitator_client::FacilitatorClient;
use x402::RequirementBuilder;

use crate::config::{ContentSource, FacilitatorMode, GateConfig};
use crate::content::{ContentError, ContentStore, InMemoryContentStore, SqliteContentStore};
use crate::gate::{FacilitatorBackend, Gate};

/// Shared state for the resource server.
pub struct ServerState {
    pub gate: Gate,
    pub content: Arc<dyn ContentStore>,
    pub requirements: RequirementBuilder,
    pub evm_address: Address,
    pub asset: Address,
    pub default_price: U256,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Content(#[from] ContentError),

    #[error(transparent)]
    Facilitator(#[from] x402_facilitator::bootstrap::BootstrapError),

    #[error(transparent)]
    Client(#[from] x402::X402Error),
}

impl ServerState {
    /// Open the content store and connect the facilitator backend.
    /// Embedded mode starts the nonce cleanup task, so call inside a runtime.
    pub fn from_config(config: &GateConfig) -> Result<Self, StartupError> {
        let content: Arc<dyn ContentStore> = match &config.content {
            ContentSource::Demo => {
                tracing::warn!("no CONTENT_SEED_PATH or CONTENT_DB_PATH: serving sample records");
                Arc::new(InMemoryContentStore::demo()?)
            }
            ContentSource::SeedFile(path) => {
                let store = InMemoryContentStore::from_seed_file(path)?;
                tracing::info!(path = %path, records = store.len(), "content store: JSON seed");
                Arc::new(store)
            }
            ContentSource::Sqlite(path) => {
                tracing::info!(path = %path, "content store: SQLite (read-only)");
                Arc::new(SqliteContentStore::open(path)?)
            }
        };

        let (backend, chain) = match &config.facilitator {
            FacilitatorMode::Remote {
                url,
                hmac_secret,
                chain,
            } => {
                let mut client = FacilitatorClient::new(url)?;
                if let Some(secret) = hmac_secret {
                    client = client.with_hmac_secret(secret.clone());
                }
                tracing::info!(url = %url, network = %chain.network, "facilitator: remote");
                (FacilitatorBackend::Remote(client), chain.clone())
            }
            FacilitatorMode::Embedded(facilitator_config) => {
                let state = x402_facilitator::bootstrap::bootstrap(facilitator_config)?;
                tracing::info!("facilitator: embedded in-process");
                (
                    FacilitatorBackend::Embedded(state),
                    facilitator_config.chain.clone(),
                )
            }
        };

        Ok(Self::new(
            Gate::new(backend, chain.network.clone()).with_demo_bypass(config.demo_bypass_unreachable),
            content,
            RequirementBuilder::with_chain_config(chain)
                .max_timeout_seconds(config.max_timeout_seconds),
            config,
        ))
    }

    pub fn new(
        gate: Gate,
        content: Arc<dyn ContentStore>,
        requirements: RequirementBuilder,
        config: &GateConfig,
    ) -> Self {
        Self {
            gate,
            content,
            requirements,
            evm_address: config.evm_address,
            asset: config.asset,
            default_price: config.default_price,
            metrics_token: config.metrics_token.clone(),
            public_metrics: config.public_metrics,
        }
    }
}
