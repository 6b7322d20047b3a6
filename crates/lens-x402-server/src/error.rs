use actix_web::{HttpResponse, ResponseError};
use x402::{PaymentRequiredBody, RejectReason};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No payment presented; carries the challenge.
    #[error("payment required")]
    PaymentRequired(Box<PaymentRequiredBody>),

    #[error("invalid payment header")]
    InvalidPaymentHeader,

    #[error("payment verification failed: {0:?}")]
    VerificationFailed(Vec<String>),

    #[error("payment settlement failed: {0:?}")]
    SettlementFailed(Vec<String>),

    #[error("facilitator unreachable: {0}")]
    FacilitatorUnreachable(String),

    /// Request delivered, answer late. The outcome is unknown, so this never
    /// qualifies for the demo bypass.
    #[error("facilitator timed out: {0}")]
    FacilitatorTimeout(String),

    #[error("facilitator error: {0}")]
    Facilitator(String),

    #[error("invalid content hash")]
    InvalidHash,

    #[error("content not found: {0}")]
    ContentNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Label for the denial metric.
    pub fn label(&self) -> &'static str {
        match self {
            GateError::PaymentRequired(_) => "payment_required",
            GateError::InvalidPaymentHeader => "invalid_payment_header",
            GateError::VerificationFailed(_) => "payment_verification_failed",
            GateError::SettlementFailed(_) => "payment_settlement_failed",
            GateError::FacilitatorUnreachable(_) => "facilitator_unreachable",
            GateError::FacilitatorTimeout(_) => "facilitator_timeout",
            GateError::Facilitator(_) => "facilitator_error",
            GateError::InvalidHash => "invalid_content_hash",
            GateError::ContentNotFound(_) => "content_not_found",
            GateError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for GateError {
    fn error_response(&self) -> HttpResponse {
        match self {
            GateError::PaymentRequired(body) => HttpResponse::PaymentRequired().json(body),
            GateError::InvalidPaymentHeader => HttpResponse::BadRequest().json(serde_json::json!({
                "error": self.label(),
                "details": [RejectReason::InvalidPayload],
            })),
            GateError::VerificationFailed(details) | GateError::SettlementFailed(details) => {
                HttpResponse::PaymentRequired().json(serde_json::json!({
                    "error": self.label(),
                    "details": details,
                }))
            }
            GateError::FacilitatorUnreachable(cause) => {
                tracing::error!(error = %cause, "facilitator unreachable");
                HttpResponse::BadGateway().json(serde_json::json!({ "error": self.label() }))
            }
            GateError::FacilitatorTimeout(cause) => {
                tracing::error!(error = %cause, "facilitator timed out, settlement outcome unknown");
                HttpResponse::GatewayTimeout().json(serde_json::json!({ "error": self.label() }))
            }
            GateError::Facilitator(cause) => {
                tracing::error!(error = %cause, "facilitator protocol error");
                HttpResponse::BadGateway().json(serde_json::json!({ "error": self.label() }))
            }
            GateError::InvalidHash => HttpResponse::BadRequest().json(serde_json::json!({
                "error": self.label(),
                "message": "content hash must be 1-128 ASCII alphanumerics"
            })),
            GateError::ContentNotFound(_) => HttpResponse::NotFound().json(serde_json::json!({
                "error": self.label(),
            })),
            GateError::Internal(cause) => {
                tracing::error!(error = %cause, "internal error");
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": self.label(),
                    "message": "An internal error occurred"
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::MessageBody;

    fn body_json(err: GateError) -> (u16, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status().as_u16();
        let bytes = resp.into_body().try_into_bytes().unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_invalid_header_is_400_with_reason() {
        let (status, body) = body_json(GateError::InvalidPaymentHeader);
        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_payment_header");
        assert_eq!(body["details"][0], "invalid_payload");
    }

    #[test]
    fn test_upstream_failures_are_502_without_internals() {
        let (status, body) =
            body_json(GateError::FacilitatorUnreachable("connect 10.0.0.7:5401".into()));
        assert_eq!(status, 502);
        assert_eq!(body, serde_json::json!({ "error": "facilitator_unreachable" }));

        let (status, body) = body_json(GateError::FacilitatorTimeout("settle after 120s".into()));
        assert_eq!(status, 504);
        assert_eq!(body, serde_json::json!({ "error": "facilitator_timeout" }));

        let (status, body) = body_json(GateError::Internal("db path /var/x".into()));
        assert_eq!(status, 500);
        assert!(!body.to_string().contains("/var/x"));
    }

    #[test]
    fn test_denials_are_402_with_details() {
        let (status, body) = body_json(GateError::SettlementFailed(vec!["nonce_replay".into()]));
        assert_eq!(status, 402);
        assert_eq!(body["error"], "payment_settlement_failed");
        assert_eq!(body["details"][0], "nonce_replay");
    }
}
