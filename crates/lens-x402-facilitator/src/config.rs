use x402::{ChainConfig, DEFAULT_NONCE_RETENTION_SECS};

const DEFAULT_PORT: u16 = 5401;
const DEFAULT_NONCE_DB_PATH: &str = "./x402-nonces.db";
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

#[derive(Clone)]
pub struct FacilitatorConfig {
    /// Gas-paying key. `None` only when settlement is simulated.
    pub private_key: Option<String>,
    /// Accept every transfer without a chain (`SIMULATE_SETTLEMENT=true`).
    pub simulate_settlement: bool,
    pub chain: ChainConfig,
    /// SQLite nonce database path.
    pub nonce_db_path: String,
    /// Seconds a consumed nonce outlives its `validBefore`.
    pub nonce_retention_secs: u64,
    /// HMAC shared secret (None only with `X402_INSECURE_NO_HMAC=true`).
    pub hmac_secret: Option<Vec<u8>>,
    /// Bearer token required for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub port: u16,
}

impl std::fmt::Debug for FacilitatorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("simulate_settlement", &self.simulate_settlement)
            .field("chain", &self.chain)
            .field("nonce_db_path", &self.nonce_db_path)
            .field("nonce_retention_secs", &self.nonce_retention_secs)
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "[REDACTED]"))
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

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("insecure configuration: {0}")]
    Insecure(String),
}

fn flag(value: Option<String>) -> bool {
    value.map(|v| v == "true" || v == "1").unwrap_or(false)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parsed<T: std::str::FromStr>(
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

/// Chain and EIP-712 domain from `CHAIN_ID`, `NETWORK`, `RPC_URL`,
/// `DOMAIN_NAME` and `DOMAIN_VERSION`, defaulting to Amoy USDC.
pub fn chain_from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<ChainConfig, ConfigError> {
    let defaults = ChainConfig::default();
    Ok(ChainConfig {
        chain_id: parsed("CHAIN_ID", get("CHAIN_ID"), defaults.chain_id)?,
        network: non_empty(get("NETWORK")).unwrap_or(defaults.network),
        rpc_url: non_empty(get("RPC_URL")).unwrap_or(defaults.rpc_url),
        eip712_domain_name: non_empty(get("DOMAIN_NAME")).unwrap_or(defaults.eip712_domain_name),
        eip712_domain_version: non_empty(get("DOMAIN_VERSION"))
            .unwrap_or(defaults.eip712_domain_version),
        ..defaults
    })
}

impl FacilitatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Self::load(get, true)
    }

    /// Configuration for a facilitator embedded in another process. There is
    /// no HTTP hop to authenticate, so no shared secret is required.
    pub fn embedded_from_lookup(
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::load(get, false)
    }

    fn load(
        get: impl Fn(&str) -> Option<String>,
        require_hmac: bool,
    ) -> Result<Self, ConfigError> {
        let simulate_settlement = flag(get("SIMULATE_SETTLEMENT"));
        let private_key = non_empty(get("FACILITATOR_PRIVATE_KEY"));
        if private_key.is_none() && !simulate_settlement {
            return Err(ConfigError::MissingRequired("FACILITATOR_PRIVATE_KEY"));
        }

        let chain = chain_from_lookup(&get)?;

        let nonce_db_path =
            non_empty(get("NONCE_DB_PATH")).unwrap_or_else(|| DEFAULT_NONCE_DB_PATH.to_string());
        if nonce_db_path == ":memory:" && !simulate_settlement {
            return Err(ConfigError::Insecure(
                "NONCE_DB_PATH=:memory: loses consumed nonces on restart".to_string(),
            ));
        }
        let nonce_retention_secs = parsed(
            "NONCE_RETENTION_SECS",
            get("NONCE_RETENTION_SECS"),
            DEFAULT_NONCE_RETENTION_SECS,
        )?;

        let hmac_secret = non_empty(get("FACILITATOR_SHARED_SECRET")).map(String::into_bytes);
        let insecure_no_hmac = flag(get("X402_INSECURE_NO_HMAC"));
        match &hmac_secret {
            Some(secret) if secret.len() < 32 => tracing::warn!(
                "FACILITATOR_SHARED_SECRET is only {} bytes (minimum 32 recommended): \
                 use `openssl rand -hex 32` to generate a secure secret",
                secret.len()
            ),
            Some(_) => {}
            None if !require_hmac => {}
            None if insecure_no_hmac => tracing::warn!(
                "X402_INSECURE_NO_HMAC=true: /verify and /settle are UNAUTHENTICATED. \
                 DO NOT use this in production!"
            ),
            None => return Err(ConfigError::MissingRequired("FACILITATOR_SHARED_SECRET")),
        }

        let metrics_token = non_empty(get("METRICS_TOKEN")).map(String::into_bytes);
        let public_metrics = flag(get("X402_PUBLIC_METRICS"));

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
            private_key,
            simulate_settlement,
            chain,
            nonce_db_path,
            nonce_retention_secs,
            hmac_secret,
            metrics_token,
            public_metrics,
            rate_limit_rpm: parsed("RATE_LIMIT_RPM", get("RATE_LIMIT_RPM"), DEFAULT_RATE_LIMIT_RPM)?,
            allowed_origins,
            port: parsed("PORT", get("PORT"), DEFAULT_PORT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<FacilitatorConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FacilitatorConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_private_key_required_unless_simulated() {
        let err = config(&[("FACILITATOR_SHARED_SECRET", "s")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("FACILITATOR_PRIVATE_KEY")));

        let cfg = config(&[("SIMULATE_SETTLEMENT", "true"), ("FACILITATOR_SHARED_SECRET", "s")])
            .unwrap();
        assert!(cfg.simulate_settlement);
        assert!(cfg.private_key.is_none());
    }

    #[test]
    fn test_hmac_secret_required_unless_insecure() {
        let err = config(&[("SIMULATE_SETTLEMENT", "true")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired("FACILITATOR_SHARED_SECRET")));

        let cfg = config(&[("SIMULATE_SETTLEMENT", "true"), ("X402_INSECURE_NO_HMAC", "1")])
            .unwrap();
        assert!(cfg.hmac_secret.is_none());
    }

    #[test]
    fn test_embedded_needs_no_shared_secret() {
        let cfg = FacilitatorConfig::embedded_from_lookup(|k| match k {
            "SIMULATE_SETTLEMENT" => Some("true".into()),
            _ => None,
        })
        .unwrap();
        assert!(cfg.hmac_secret.is_none());
    }

    #[test]
    fn test_in_memory_nonce_db_refused_for_real_settlement() {
        let err = config(&[
            ("FACILITATOR_PRIVATE_KEY", "0xkey"),
            ("FACILITATOR_SHARED_SECRET", "s"),
            ("NONCE_DB_PATH", ":memory:"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Insecure(_)));
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("SIMULATE_SETTLEMENT", "true"), ("FACILITATOR_SHARED_SECRET", "s")])
            .unwrap();
        assert_eq!(cfg.port, 5401);
        assert_eq!(cfg.chain.chain_id, 80002);
        assert_eq!(cfg.chain.network, "polygon-amoy");
        assert_eq!(cfg.nonce_retention_secs, 3600);
        assert_eq!(cfg.nonce_db_path, "./x402-nonces.db");
    }

    #[test]
    fn test_invalid_port() {
        let err = config(&[
            ("SIMULATE_SETTLEMENT", "true"),
            ("FACILITATOR_SHARED_SECRET", "s"),
            ("PORT", "not-a-port"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "PORT", .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cfg = config(&[
            ("FACILITATOR_PRIVATE_KEY", "0xsupersecret"),
            ("FACILITATOR_SHARED_SECRET", "hmac-secret-value"),
        ])
        .unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("supersecret"));
        assert!(!debug.contains("hmac-secret-value"));
    }
}
