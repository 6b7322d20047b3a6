use std::time::Duration;

use x402::codec::{decode_receipt, encode_payment};
use x402::{
    PaymentRequiredBody, SettlementReceipt, X402Error, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER,
};

use crate::scheme_client::SchemeClient;

/// HTTP client that pays for 402 responses automatically.
///
/// On a 402, it picks the first requirement its [`SchemeClient`] can pay,
/// signs an authorization and retries once with `X-PAYMENT`.
pub struct X402Client<S: SchemeClient> {
    http: reqwest::Client,
    scheme: S,
}

impl<S: SchemeClient> X402Client<S> {
    pub fn new(scheme: S) -> Result<Self, X402Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| X402Error::HttpError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, scheme })
    }

    /// Create a client with a custom reqwest::Client.
    pub fn with_http_client(scheme: S, http: reqwest::Client) -> Self {
        Self { http, scheme }
    }

    pub fn scheme(&self) -> &S {
        &self.scheme
    }

    /// Make a request, paying if the server answers 402.
    /// Returns the final response and the settlement receipt, if one came back.
    pub async fn fetch(
        &self,
        url: &str,
        method: reqwest::Method,
    ) -> Result<(reqwest::Response, Option<SettlementReceipt>), X402Error> {
        let resp = self
            .http
            .request(method.clone(), url)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("request failed: {e}")))?;

        if resp.status().as_u16() != 402 {
            return Ok((resp, None));
        }

        let challenge: PaymentRequiredBody = resp
            .json()
            .await
            .map_err(|e| X402Error::HttpError(format!("failed to parse 402 body: {e}")))?;

        let header = self.pay(&challenge).await?;
        self.fetch_with_payment(url, method, &header).await
    }

    /// Sign a payment for the first acceptable requirement in a 402 body.
    /// Returns the encoded `X-PAYMENT` header value.
    pub async fn pay(&self, challenge: &PaymentRequiredBody) -> Result<String, X402Error> {
        let requirement = challenge
            .accepts
            .iter()
            .find(|r| r.scheme == self.scheme.scheme() && r.network == self.scheme.network())
            .ok_or_else(|| {
                X402Error::UnsupportedScheme(format!(
                    "no supported scheme found in {:?}",
                    challenge
                        .accepts
                        .iter()
                        .map(|r| format!("{}/{}", r.scheme, r.network))
                        .collect::<Vec<_>>()
                ))
            })?;

        let payload = self.scheme.create_payment(requirement).await?;
        encode_payment(&payload)
    }

    /// Send a request carrying an already encoded `X-PAYMENT` header.
    pub async fn fetch_with_payment(
        &self,
        url: &str,
        method: reqwest::Method,
        payment_header: &str,
    ) -> Result<(reqwest::Response, Option<SettlementReceipt>), X402Error> {
        let resp = self
            .http
            .request(method, url)
            .header(PAYMENT_HEADER, payment_header)
            .send()
            .await
            .map_err(|e| X402Error::HttpError(format!("paid request failed: {e}")))?;

        let receipt = resp
            .headers()
            .get(PAYMENT_RESPONSE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(decode_receipt_header);

        Ok((resp, receipt))
    }
}

/// Read an `X-PAYMENT-RESPONSE` value: base64 JSON, falling back to plain JSON.
pub fn decode_receipt_header(value: &str) -> Option<SettlementReceipt> {
    decode_receipt(value)
        .ok()
        .or_else(|| serde_json::from_str::<SettlementReceipt>(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use x402::codec::encode_receipt;

    fn receipt() -> SettlementReceipt {
        SettlementReceipt {
            success: true,
            transaction: Some("0xabc".into()),
            network: "polygon-amoy".into(),
            payer: None,
        }
    }

    #[test]
    fn test_receipt_header_base64() {
        let header = encode_receipt(&receipt()).unwrap();
        assert_eq!(decode_receipt_header(&header), Some(receipt()));
    }

    #[test]
    fn test_receipt_header_plain_json_fallback() {
        let header = serde_json::to_string(&receipt()).unwrap();
        assert_eq!(decode_receipt_header(&header), Some(receipt()));
    }

    #[test]
    fn test_receipt_header_garbage() {
        assert_eq!(decode_receipt_header("???"), None);
    }
}
