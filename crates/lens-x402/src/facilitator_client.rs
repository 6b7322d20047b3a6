//! HTTP client for a remote facilitator's `/verify` and `/settle` endpoints.
//!
//! Used by the resource server when the facilitator runs as a separate
//! process (not embedded in-process).

use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::constants::{FACILITATOR_AUTH_HEADER, PAYMENT_RESPONSE_HEADER};
use crate::ledger::TRANSFER_TIMEOUT;
use crate::payment::PaymentRequirements;
use crate::response::{
    SettleRequest, SettleResponse, SupportedResponse, VerifyRequest, VerifyResponse,
};
use crate::X402Error;

/// Bound on a `/verify` round trip.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on a `/settle` round trip. Exceeds the facilitator's own chain
/// budget so a slow confirmation still comes back as an answer.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(TRANSFER_TIMEOUT.as_secs() + 30);

/// Failure to get a usable answer from the facilitator.
#[derive(Debug, Error)]
pub enum FacilitatorError {
    /// No connection could be made, or the facilitator reported an outage.
    #[error("facilitator unreachable: {0}")]
    Unreachable(String),

    /// The request was delivered but no answer arrived in time. A settlement
    /// may still complete on the facilitator side.
    #[error("facilitator timed out: {0}")]
    Timeout(String),

    #[error("facilitator authentication failed")]
    Unauthorized,

    /// The facilitator answered with something that is not a protocol response.
    #[error("facilitator protocol error: {0}")]
    Protocol(String),
}

/// A parsed `/settle` reply, including the receipt header when present.
#[derive(Debug, Clone)]
pub struct SettleReply {
    pub status: u16,
    pub body: SettleResponse,
    pub payment_response: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FacilitatorClient {
    http: reqwest::Client,
    base_url: String,
    hmac_secret: Option<Vec<u8>>,
    verify_timeout: Duration,
    settle_timeout: Duration,
}

impl FacilitatorClient {
    pub fn new(base_url: &str) -> Result<Self, X402Error> {
        let http = reqwest::Client::builder()
            .timeout(SETTLE_TIMEOUT)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| X402Error::HttpError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            hmac_secret: None,
            verify_timeout: VERIFY_TIMEOUT,
            settle_timeout: SETTLE_TIMEOUT,
        })
    }

    /// Sign every request body with this shared secret.
    pub fn with_hmac_secret(mut self, secret: Vec<u8>) -> Self {
        self.hmac_secret = Some(secret);
        self
    }

    pub fn with_timeouts(mut self, verify: Duration, settle: Duration) -> Self {
        self.verify_timeout = verify;
        self.settle_timeout = settle;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn verify(
        &self,
        payment_payload_base64: &str,
        requirement: Option<&PaymentRequirements>,
    ) -> Result<VerifyResponse, FacilitatorError> {
        let body = VerifyRequest {
            payment_payload_base64: Some(payment_payload_base64.to_string()),
            payment_requirements: requirement.cloned(),
        };
        let resp = self.post("verify", &body, self.verify_timeout).await?;
        let status = resp.status().as_u16();
        match status {
            200 | 400 => parse_json(resp).await,
            500..=599 => Err(FacilitatorError::Unreachable(format!("verify returned {status}"))),
            _ => Err(FacilitatorError::Protocol(format!("verify returned {status}"))),
        }
    }

    pub async fn settle(
        &self,
        payment_payload_base64: &str,
    ) -> Result<SettleReply, FacilitatorError> {
        let body = SettleRequest {
            payment_payload_base64: Some(payment_payload_base64.to_string()),
        };
        let resp = self.post("settle", &body, self.settle_timeout).await?;
        let status = resp.status().as_u16();
        let payment_response = resp
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match status {
            200 | 400 => Ok(SettleReply {
                status,
                body: parse_json(resp).await?,
                payment_response,
            }),
            // A 500 with a settle_error body is a protocol answer; anything else is an outage.
            500..=599 => match parse_json::<SettleResponse>(resp).await {
                Ok(body) => Ok(SettleReply {
                    status,
                    body,
                    payment_response,
                }),
                Err(_) => Err(FacilitatorError::Unreachable(format!(
                    "settle returned {status}"
                ))),
            },
            _ => Err(FacilitatorError::Protocol(format!("settle returned {status}"))),
        }
    }

    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorError> {
        let resp = self
            .http
            .get(format!("{}/supported", self.base_url))
            .timeout(self.verify_timeout)
            .send()
            .await
            .map_err(|e| transport_error("supported", e))?;
        if !resp.status().is_success() {
            return Err(FacilitatorError::Protocol(format!(
                "supported returned {}",
                resp.status()
            )));
        }
        parse_json(resp).await
    }

    async fn post<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response, FacilitatorError> {
        let url = format!("{}/{path}", self.base_url);
        let body_bytes = serde_json::to_vec(body)
            .map_err(|e| FacilitatorError::Protocol(format!("serialization failed: {e}")))?;

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(timeout);

        if let Some(secret) = &self.hmac_secret {
            request = request.header(FACILITATOR_AUTH_HEADER, crate::hmac::sign_body(secret, &body_bytes));
        }

        let resp = request
            .body(body_bytes)
            .send()
            .await
            .map_err(|e| transport_error(path, e))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(FacilitatorError::Unauthorized);
        }
        Ok(resp)
    }
}

/// A connect failure means nothing was delivered; any other timeout means
/// the facilitator has the request and is still working on it.
fn transport_error(path: &str, e: reqwest::Error) -> FacilitatorError {
    if e.is_timeout() && !e.is_connect() {
        FacilitatorError::Timeout(format!("{path} request timed out: {e}"))
    } else {
        FacilitatorError::Unreachable(format!("{path} request failed: {e}"))
    }
}

async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FacilitatorError> {
    resp.json::<T>().await.map_err(|e| {
        if e.is_timeout() {
            FacilitatorError::Timeout(format!("response body timed out: {e}"))
        } else {
            FacilitatorError::Protocol(format!("response parse failed: {e}"))
        }
    })
}
