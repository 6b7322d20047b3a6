use alloy::primitives::{Address, U256};
use x402::requirement::{parse_price, DEFAULT_MAX_TIMEOUT_SECONDS};
use x402::{DEFAULT_ASSET, TOKEN_DECIMALS};
use x402::ChainConfig;
use x402_facilitator::config::{chain_from_lookup, FacilitatorConfig};

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_PRICE: &str = "$0.10";
const DEFAULT_FACILITATOR_URL: &str = "http://localhost:5401";
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

/// Where content records come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Bundled sample records.
    Demo,
    /// JSON array of records loaded into memory.
    SeedFile(String),
    /// Read-only SQLite database owned by the content service.
    Sqlite(String),
}

/// How the gate reaches a facilitator.
#[derive(Clone)]
pub enum FacilitatorMode {
    Remote {
        url: String,
        hmac_secret: Option<Vec<u8>>,
        /// Chain and domain the remote facilitator verifies against.
        chain: ChainConfig,
    },
    /// In-process verify and settle, no HTTP hop.
    Embedded(Box<FacilitatorConfig>),
}

impl std::fmt::Debug for FacilitatorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FacilitatorMode::Remote {
                url,
                hmac_secret,
                chain,
            } => f
                .debug_struct("Remote")
                .field("url", url)
                .field("hmac_secret", &hmac_secret.as_ref().map(|_| "[REDACTED]"))
                .field("chain", chain)
                .finish(),
            FacilitatorMode::Embedded(config) => f.debug_tuple("Embedded").field(config).finish(),
        }
    }
}

#[derive(Clone)]
pub struct GateConfig {
    /// Payee for records without an uploader address.
    pub evm_address: Address,
    pub asset: Address,
    /// Price in token units for records without their own price.
    pub default_price: U256,
    pub max_timeout_seconds: u64,
    pub facilitator: FacilitatorMode,
    pub content: ContentSource,
    /// Serve content when the facilitator cannot be reached. Demo use only.
    pub demo_bypass_unreachable: bool,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub port: u16,
}

impl std::fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateConfig")
            .field("evm_address", &self.evm_address)
            .field("asset", &self.asset)
            .field("default_price", &self.default_price)
            .field("max_timeout_seconds", &self.max_timeout_seconds)
            .field("facilitator", &self.facilitator)
            .field("content", &self.content)
            .field("demo_bypass_unreachable", &self.demo_bypass_unreachable)
            .field("metrics_token", &self.metrics_token.as_ref().map(|_| "[REDACTED]"))
            .field("public_metrics", &self.public_metrics)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("allowed_origins", &self.allowed_origins)
            .field("port", &self.port)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("invalid address for {0}")]
    InvalidAddress(&'static str),

    #[error("invalid price {0:?}")]
    InvalidPrice(String),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("embedded facilitator: {0}")]
    Facilitator(#[from] x402_facilitator::config::ConfigError),
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn flag(value: Option<String>) -> bool {
    value.map(|v| v == "true" || v == "1").unwrap_or(false)
}

fn number<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match non_empty(value) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let evm_address = non_empty(get("EVM_ADDRESS"))
            .ok_or(ConfigError::MissingRequired("EVM_ADDRESS"))?
            .parse()
            .map_err(|_| ConfigError::InvalidAddress("EVM_ADDRESS"))?;
        let asset = match non_empty(get("ASSET_ADDRESS")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("ASSET_ADDRESS"))?,
            None => DEFAULT_ASSET,
        };

        let price = non_empty(get("DEFAULT_PRICE")).unwrap_or_else(|| DEFAULT_PRICE.to_string());
        let default_price = parse_price(&price, TOKEN_DECIMALS)
            .ok()
            .filter(|p| !p.is_zero())
            .ok_or(ConfigError::InvalidPrice(price))?;

        let max_timeout_seconds = number(
            "MAX_TIMEOUT_SECONDS",
            get("MAX_TIMEOUT_SECONDS"),
            DEFAULT_MAX_TIMEOUT_SECONDS,
        )?;

        let embedded = non_empty(get("FACILITATOR_PRIVATE_KEY")).is_some()
            || flag(get("SIMULATE_SETTLEMENT"));
        let facilitator = if embedded {
            FacilitatorMode::Embedded(Box::new(FacilitatorConfig::embedded_from_lookup(&get)?))
        } else {
            let hmac_secret = non_empty(get("FACILITATOR_SHARED_SECRET")).map(String::into_bytes);
            if hmac_secret.is_none() {
                tracing::warn!(
                    "FACILITATOR_SHARED_SECRET not set: facilitator calls are not HMAC-signed"
                );
            }
            FacilitatorMode::Remote {
                url: non_empty(get("FACILITATOR_URL"))
                    .unwrap_or_else(|| DEFAULT_FACILITATOR_URL.to_string()),
                hmac_secret,
                chain: chain_from_lookup(&get)?,
            }
        };

        let content = match (non_empty(get("CONTENT_DB_PATH")), non_empty(get("CONTENT_SEED_PATH"))) {
            (Some(db), _) => ContentSource::Sqlite(db),
            (None, Some(seed)) => ContentSource::SeedFile(seed),
            (None, None) => ContentSource::Demo,
        };

        let demo_bypass_unreachable = flag(get("X402_DEMO_BYPASS_UNREACHABLE"));
        if demo_bypass_unreachable {
            tracing::warn!(
                "X402_DEMO_BYPASS_UNREACHABLE=true: content is served when the facilitator is down. \
                 DO NOT use this in production!"
            );
        }

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            evm_address,
            asset,
            default_price,
            max_timeout_seconds,
            facilitator,
            content,
            demo_bypass_unreachable,
            metrics_token: non_empty(get("METRICS_TOKEN")).map(String::into_bytes),
            public_metrics: flag(get("X402_PUBLIC_METRICS")),
            rate_limit_rpm: number("RATE_LIMIT_RPM", get("RATE_LIMIT_RPM"), DEFAULT_RATE_LIMIT_RPM)?,
            allowed_origins,
            port: number("PORT", get("PORT"), DEFAULT_PORT)?,
        })
    }
}
