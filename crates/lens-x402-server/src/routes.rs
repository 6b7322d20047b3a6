use actix_web::{get, web, HttpRequest, HttpResponse};
use alloy::primitives::{Address, U256};
use x402::requirement::parse_price;
use x402::{DEMO_BYPASS_HEADER, PAYMENT_HEADER, PAYMENT_RESPONSE_HEADER};

use crate::content::{is_valid_hash, ContentRecord};
use crate::error::GateError;
use crate::gate::{FacilitatorBackend, Grant};
use crate::metrics;
use crate::state::ServerState;

/// Uploader's address when it parses, otherwise the configured payee.
fn payee(record: &ContentRecord, fallback: Address) -> Address {
    record
        .user_address
        .as_deref()
        .and_then(|a| a.trim().parse::<Address>().ok())
        .filter(|a| *a != Address::ZERO)
        .unwrap_or(fallback)
}

fn price(record: &ContentRecord, state: &ServerState) -> Result<U256, GateError> {
    match record.price.as_deref() {
        None => Ok(state.default_price),
        Some(raw) => {
            let decimals = state.requirements.chain_config().token_decimals;
            parse_price(raw, decimals)
                .ok()
                .filter(|p| !p.is_zero())
                .ok_or_else(|| {
                    GateError::Internal(format!(
                        "record {} has unusable price {raw:?}",
                        record.content_hash
                    ))
                })
        }
    }
}

#[get("/api/content/{hash}")]
pub async fn get_content(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<ServerState>,
) -> Result<HttpResponse, GateError> {
    let hash = path.into_inner();
    if !is_valid_hash(&hash) {
        metrics::GATE_DENIALS
            .with_label_values(&[GateError::InvalidHash.label()])
            .inc();
        return Err(GateError::InvalidHash);
    }

    let record = state
        .content
        .get_by_hash(&hash)
        .map_err(|e| GateError::Internal(e.to_string()))?
        .ok_or_else(|| GateError::ContentNotFound(hash.clone()))?;

    let resource = {
        let info = req.connection_info();
        format!("{}://{}{}", info.scheme(), info.host(), req.path())
    };
    let requirement = state
        .requirements
        .clone()
        .description(format!("Access to content: {}", record.title))
        .build(
            &resource,
            payee(&record, state.evm_address),
            state.asset,
            price(&record, &state)?,
        )
        .map_err(|e| GateError::Internal(e.to_string()))?;

    let payment = req
        .headers()
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.gate.admit(&requirement, payment).await? {
        Grant::Paid { receipt_header, .. } => Ok(HttpResponse::Ok()
            .insert_header((PAYMENT_RESPONSE_HEADER, receipt_header))
            .json(serde_json::json!({ "content": record }))),
        Grant::Bypassed => Ok(HttpResponse::Ok()
            .insert_header((DEMO_BYPASS_HEADER, "facilitator_unreachable"))
            .json(serde_json::json!({ "content": record }))),
    }
}

#[get("/health")]
pub async fn health(state: web::Data<ServerState>) -> HttpResponse {
    let backend = state.gate.backend();
    let healthy = match backend {
        FacilitatorBackend::Embedded(app) => app.facilitator.health_check().await.is_ok(),
        FacilitatorBackend::Remote(client) => client.supported().await.is_ok(),
    };
    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "service": "x402-server",
        "facilitator": backend.kind(),
    });
    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    match &state.metrics_token {
        Some(expected) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|token| x402::security::constant_time_eq(token.as_bytes(), expected))
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
