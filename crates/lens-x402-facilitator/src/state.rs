use alloy::network::EthereumWallet;
use alloy::providers::{
    fillers::{
        BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
    },
    Identity, RootProvider,
};

use x402::{AuthorizationPayload, Eip3009Ledger, Facilitator, Ledger, SimulatedLedger, X402Error};

/// Concrete provider type from `ProviderBuilder::new().wallet(...).connect_http(...)`.
pub type WalletProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider,
>;

/// Ledger chosen at startup: a real chain, or the simulation switch.
pub enum LedgerBackend {
    Chain(Eip3009Ledger<WalletProvider>),
    Simulated(SimulatedLedger),
}

impl Ledger for LedgerBackend {
    async fn transfer_with_authorization(
        &self,
        payload: &AuthorizationPayload,
    ) -> Result<Option<String>, X402Error> {
        match self {
            LedgerBackend::Chain(ledger) => ledger.transfer_with_authorization(payload).await,
            LedgerBackend::Simulated(ledger) => ledger.transfer_with_authorization(payload).await,
        }
    }

    async fn health_check(&self) -> Result<u64, X402Error> {
        match self {
            LedgerBackend::Chain(ledger) => ledger.health_check().await,
            LedgerBackend::Simulated(ledger) => ledger.health_check().await,
        }
    }

    fn is_simulated(&self) -> bool {
        matches!(self, LedgerBackend::Simulated(_))
    }
}

/// Shared application state for the facilitator server.
pub struct AppState {
    pub facilitator: Facilitator<LedgerBackend>,
    /// HMAC shared secret for `/verify` and `/settle`. `None` only when
    /// explicitly disabled with `X402_INSECURE_NO_HMAC=true`.
    pub hmac_secret: Option<Vec<u8>>,
    /// Separate bearer token for /metrics endpoint (not the HMAC secret).
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured.
    pub public_metrics: bool,
}

impl AppState {
    /// State around an in-memory simulated facilitator, for demos and tests.
    pub fn simulated(hmac_secret: Option<Vec<u8>>) -> Self {
        Self {
            facilitator: Facilitator::new(LedgerBackend::Simulated(SimulatedLedger::new())),
            hmac_secret,
            metrics_token: None,
            public_metrics: false,
        }
    }
}
