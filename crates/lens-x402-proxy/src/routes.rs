use actix_web::{get, web, HttpRequest, HttpResponse};
use x402::PAYMENT_HEADER;

use crate::error::ProxyError;
use crate::metrics;
use crate::ProxyState;

/// Path segments the relay will forward.
fn is_forwardable_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.len() <= 128 && hash.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[get("/a2a/content/{hash}")]
pub async fn relay_content(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<ProxyState>,
) -> Result<HttpResponse, ProxyError> {
    let hash = path.into_inner();
    if !is_forwardable_hash(&hash) {
        return Err(ProxyError::InvalidHash);
    }
    let payment = req
        .headers()
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok());
    tracing::debug!(hash = %hash, paid = payment.is_some(), "relaying content request");
    state.relay.content(&hash, payment).await
}

#[get("/health")]
pub async fn health(state: web::Data<ProxyState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "x402-proxy",
        "resource": state.relay.base_url(),
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<ProxyState>) -> HttpResponse {
    let bearer = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    match &state.metrics_token {
        Some(token) => {
            let authorized = bearer
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| x402::security::constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);
            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if state.public_metrics => {}
        None => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or X402_PUBLIC_METRICS=true to access /metrics"
            }));
        }
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}
