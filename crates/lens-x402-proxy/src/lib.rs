//! x402 service agent: a transparent relay in front of the resource server.
//!
//! `GET /a2a/content/{hash}` is forwarded to `GET /api/content/{hash}` with
//! the client's `X-PAYMENT` header untouched. Status, body and
//! `X-PAYMENT-RESPONSE` come back exactly as the resource server sent them;
//! the relay makes no payment decisions of its own.

pub mod config;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod routes;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use proxy::Relay;

pub struct ProxyState {
    pub relay: Relay,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl ProxyState {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Ok(Self {
            relay: Relay::new(&config.resource_server_url)?,
            metrics_token: config.metrics_token.clone(),
            public_metrics: config.public_metrics,
        })
    }
}
