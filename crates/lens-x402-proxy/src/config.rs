const DEFAULT_RESOURCE_SERVER_URL: &str = "http://localhost:3001";
const DEFAULT_PORT: u16 = 5402;
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

#[derive(Clone)]
pub struct ProxyConfig {
    pub resource_server_url: String,
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
    pub port: u16,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("resource_server_url", &self.resource_server_url)
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
    #[error("invalid URL for RESOURCE_SERVER_URL: {0}")]
    InvalidUrl(String),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let resource_server_url = non_empty(get("RESOURCE_SERVER_URL"))
            .unwrap_or_else(|| DEFAULT_RESOURCE_SERVER_URL.to_string());
        if !(resource_server_url.starts_with("http://") || resource_server_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidUrl(resource_server_url));
        }

        let port = match non_empty(get("PORT")) {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                var: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let rate_limit_rpm = match non_empty(get("RATE_LIMIT_RPM")) {
            Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| ConfigError::Invalid {
                var: "RATE_LIMIT_RPM",
                reason: e.to_string(),
            })?,
            None => DEFAULT_RATE_LIMIT_RPM,
        };

        Ok(Self {
            resource_server_url: resource_server_url.trim_end_matches('/').to_string(),
            metrics_token: non_empty(get("METRICS_TOKEN")).map(String::into_bytes),
            public_metrics: get("X402_PUBLIC_METRICS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            rate_limit_rpm,
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ProxyConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.resource_server_url, "http://localhost:3001");
        assert_eq!(cfg.port, 5402);
    }

    #[test]
    fn test_trailing_slash_trimmed_and_scheme_required() {
        let cfg = ProxyConfig::from_lookup(|k| {
            (k == "RESOURCE_SERVER_URL").then(|| "http://content:3001/".to_string())
        })
        .unwrap();
        assert_eq!(cfg.resource_server_url, "http://content:3001");

        assert!(matches!(
            ProxyConfig::from_lookup(|k| (k == "RESOURCE_SERVER_URL").then(|| "content:3001".into())),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
