use actix_web::{HttpResponse, ResponseError};

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Resource server unreachable, timed out, or unreadable.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream response too large: {0} bytes")]
    TooLarge(usize),

    #[error("invalid content hash")]
    InvalidHash,
}

impl ResponseError for ProxyError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ProxyError::Upstream(cause) => {
                tracing::error!(error = %cause, "relay to resource server failed");
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "proxy_error",
                    "message": "Failed to reach resource server"
                }))
            }
            ProxyError::TooLarge(len) => {
                tracing::error!(len, "upstream response over relay limit");
                HttpResponse::BadGateway().json(serde_json::json!({
                    "error": "proxy_error",
                    "message": "Upstream response too large"
                }))
            }
            ProxyError::InvalidHash => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "invalid_content_hash"
            })),
        }
    }
}
