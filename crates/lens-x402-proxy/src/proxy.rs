use std::time::{Duration, Instant};

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use x402::facilitator_client::{SETTLE_TIMEOUT, VERIFY_TIMEOUT};
use x402::{PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};

use crate::error::ProxyError;
use crate::metrics;

/// Resource server round-trip limit. Longer than the gate's own verify plus
/// settle budget, so the gate's answer always arrives before the relay gives up.
pub const RELAY_TIMEOUT: Duration =
    Duration::from_secs(VERIFY_TIMEOUT.as_secs() + SETTLE_TIMEOUT.as_secs() + 20);

/// Maximum upstream response body size (10 MB).
const MAX_RESPONSE_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Response headers passed back to the client. Everything else stays upstream.
const ALLOWED_RESPONSE_HEADERS: &[&str] = &[
    "content-type",
    "cache-control",
    "etag",
    "last-modified",
    "x-payment-response",
    "x-payment-demo-bypass",
];

/// Relays content requests to the resource server. Carries the client's
/// payment header unmodified and never inspects or rewrites payments.
#[derive(Clone, Debug)]
pub struct Relay {
    http: reqwest::Client,
    base_url: String,
}

impl Relay {
    pub fn new(base_url: &str) -> Result<Self, ProxyError> {
        let http = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Upstream(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET {base}/api/content/{hash}`, returning status, body and the
    /// allowlisted headers exactly as the resource server sent them.
    pub async fn content(
        &self,
        hash: &str,
        payment: Option<&str>,
    ) -> Result<HttpResponse, ProxyError> {
        let url = format!(
            "{}/api/content/{}",
            self.base_url,
            urlencoding::encode(hash)
        );
        let mut request = self.http.get(&url);
        if let Some(payment) = payment {
            request = request.header(PAYMENT_HEADER, payment);
        }

        let started = Instant::now();
        let result = self.forward(request).await;
        metrics::RELAY_LATENCY.observe(started.elapsed().as_secs_f64());
        match &result {
            Ok(resp) => metrics::RELAYS
                .with_label_values(&[resp.status().as_str()])
                .inc(),
            Err(_) => metrics::RELAYS.with_label_values(&["error"]).inc(),
        }
        result
    }

    async fn forward(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse, ProxyError> {
        let mut response = request
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(format!("request failed: {e}")))?;

        let status = response.status();
        let headers = response.headers().clone();

        if let Some(cl) = response.content_length() {
            if cl > MAX_RESPONSE_BODY_SIZE as u64 {
                return Err(ProxyError::TooLarge(cl as usize));
            }
        }
        let mut body = Vec::with_capacity(
            response
                .content_length()
                .map(|cl| cl as usize)
                .unwrap_or(8192)
                .min(MAX_RESPONSE_BODY_SIZE),
        );
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProxyError::Upstream(format!("body read failed: {e}")))?
        {
            if body.len() + chunk.len() > MAX_RESPONSE_BODY_SIZE {
                return Err(ProxyError::TooLarge(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }

        let mut builder = HttpResponse::build(
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
        );
        for (name, value) in headers.iter() {
            if ALLOWED_RESPONSE_HEADERS.contains(&name.as_str()) {
                if let Ok(value) = value.to_str() {
                    builder.insert_header((name.as_str(), value));
                }
            }
        }
        if headers.contains_key(PAYMENT_RESPONSE_HEADER) {
            tracing::debug!(status = status.as_u16(), "relayed settlement receipt");
        }
        Ok(builder.body(bytes::Bytes::from(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_response_headers() {
        assert!(ALLOWED_RESPONSE_HEADERS.contains(&"x-payment-response"));
        assert!(ALLOWED_RESPONSE_HEADERS.contains(&"content-type"));
        assert!(!ALLOWED_RESPONSE_HEADERS.contains(&"server"));
        assert!(!ALLOWED_RESPONSE_HEADERS.contains(&"set-cookie"));
    }

    #[test]
    fn test_relay_outlasts_gate() {
        assert!(RELAY_TIMEOUT > VERIFY_TIMEOUT + SETTLE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let relay = Relay::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            relay.content("abc123", None).await,
            Err(ProxyError::Upstream(_))
        ));
    }
}
