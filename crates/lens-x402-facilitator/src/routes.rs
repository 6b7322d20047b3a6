use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use x402::{
    codec::encode_receipt,
    response::{
        SettleRequest, SettleResponse, SupportedNetwork, SupportedResponse, VerifyRequest,
        VerifyResponse,
    },
    Ledger, RejectReason, SettleError, VerifyOutcome, FACILITATOR_AUTH_HEADER, PAYMENT_HEADER,
    PAYMENT_RESPONSE_HEADER,
};

use crate::metrics;
use crate::state::AppState;

/// Check `X-Facilitator-Auth` against the raw body when a secret is configured.
fn validate_hmac(req: &HttpRequest, body: &[u8], state: &AppState) -> Result<(), HttpResponse> {
    let Some(secret) = &state.hmac_secret else {
        return Ok(());
    };

    match req
        .headers()
        .get(FACILITATOR_AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(sig) if x402::hmac::verify_body(secret, body, sig) => Ok(()),
        Some(_) => {
            tracing::warn!("HMAC verification failed: signature mismatch");
            metrics::HMAC_FAILURES.with_label_values(&["invalid"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication failed"
            })))
        }
        None => {
            tracing::warn!("HMAC header missing on authenticated endpoint");
            metrics::HMAC_FAILURES.with_label_values(&["missing"]).inc();
            Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "authentication required"
            })))
        }
    }
}

/// Empty bodies are allowed; the payload may travel in `X-PAYMENT` instead.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Option<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Some(T::default());
    }
    serde_json::from_slice(body).ok()
}

fn payment_from(req: &HttpRequest, in_body: Option<String>) -> Option<String> {
    in_body.filter(|s| !s.is_empty()).or_else(|| {
        req.headers()
            .get(PAYMENT_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    })
}

fn record_rejections(stage: &str, reasons: &[RejectReason]) {
    for reason in reasons {
        metrics::REJECT_REASONS
            .with_label_values(&[stage, reason.as_str()])
            .inc();
    }
}

fn verify_rejected(reasons: Vec<RejectReason>) -> HttpResponse {
    record_rejections("verify", &reasons);
    metrics::VERIFY_REQUESTS
        .with_label_values(&["rejected"])
        .inc();
    HttpResponse::BadRequest().json(VerifyResponse {
        success: false,
        errors: Some(reasons.iter().map(ToString::to_string).collect()),
        payer: None,
    })
}

fn settle_rejected(reason: RejectReason) -> HttpResponse {
    record_rejections("settle", &[reason]);
    metrics::SETTLE_REQUESTS
        .with_label_values(&["rejected"])
        .inc();
    HttpResponse::BadRequest().json(SettleResponse {
        success: false,
        transaction: None,
        errors: Some(vec![reason.to_string()]),
    })
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let simulated = state.facilitator.ledger().is_simulated();
    match state.facilitator.health_check().await {
        Ok(block) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "x402-facilitator",
            "network": &state.facilitator.chain_config().network,
            "simulated": simulated,
            "latestBlock": block.to_string(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "degraded",
                "service": "x402-facilitator",
                "error": "ledger unreachable",
            }))
        }
    }
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let header = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok());
            let authorized = header
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

#[get("/supported")]
pub async fn supported(state: web::Data<AppState>) -> HttpResponse {
    let config = state.facilitator.chain_config();
    HttpResponse::Ok().json(SupportedResponse {
        networks: vec![SupportedNetwork {
            name: config.network.clone(),
            chain_id: config.chain_id,
            schemes: vec![config.scheme_name.clone()],
            simulated: state.facilitator.ledger().is_simulated(),
        }],
    })
}

#[post("/verify")]
pub async fn verify(req: HttpRequest, state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, &body, &state) {
        return resp;
    }

    let Some(parsed) = parse_body::<VerifyRequest>(&body) else {
        return verify_rejected(vec![RejectReason::InvalidPayload]);
    };
    let Some(encoded) = payment_from(&req, parsed.payment_payload_base64) else {
        return verify_rejected(vec![RejectReason::InvalidPayload]);
    };

    match state
        .facilitator
        .verify_encoded(&encoded, parsed.payment_requirements.as_ref())
    {
        VerifyOutcome::Accepted { payer } => {
            metrics::VERIFY_REQUESTS
                .with_label_values(&["accepted"])
                .inc();
            tracing::debug!(%payer, "authorization verified");
            HttpResponse::Ok().json(VerifyResponse {
                success: true,
                errors: None,
                payer: Some(payer),
            })
        }
        VerifyOutcome::Rejected { reasons } => {
            tracing::info!(
                reasons = ?reasons.iter().map(RejectReason::as_str).collect::<Vec<_>>(),
                "authorization rejected"
            );
            verify_rejected(reasons)
        }
    }
}

#[post("/settle")]
pub async fn settle(req: HttpRequest, state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    if let Err(resp) = validate_hmac(&req, &body, &state) {
        return resp;
    }

    let Some(parsed) = parse_body::<SettleRequest>(&body) else {
        return settle_rejected(RejectReason::InvalidPayload);
    };
    let Some(encoded) = payment_from(&req, parsed.payment_payload_base64) else {
        return settle_rejected(RejectReason::InvalidPayload);
    };

    // Once the nonce is reserved the transfer must finish even if the caller
    // hangs up, so it runs on its own task.
    let app = state.into_inner();
    let start = std::time::Instant::now();
    let settled = tokio::spawn(async move { app.facilitator.settle_encoded(&encoded).await }).await;
    let elapsed = start.elapsed().as_secs_f64();
    let result = match settled {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(error = %e, "settlement task failed");
            metrics::SETTLE_REQUESTS.with_label_values(&["error"]).inc();
            return HttpResponse::InternalServerError().json(SettleResponse {
                success: false,
                transaction: None,
                errors: Some(vec![RejectReason::SettleError.to_string()]),
            });
        }
    };

    match result {
        Ok(receipt) => {
            metrics::SETTLE_REQUESTS
                .with_label_values(&["success"])
                .inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&["success"])
                .observe(elapsed);

            let mut resp = HttpResponse::Ok();
            match encode_receipt(&receipt) {
                Ok(header) => {
                    resp.insert_header((PAYMENT_RESPONSE_HEADER, header));
                }
                Err(e) => tracing::error!(error = %e, "failed to encode settlement receipt"),
            }
            resp.json(SettleResponse {
                success: true,
                transaction: receipt.transaction,
                errors: None,
            })
        }
        Err(SettleError::Rejected(reason)) => {
            metrics::SETTLE_LATENCY
                .with_label_values(&["rejected"])
                .observe(elapsed);
            settle_rejected(reason)
        }
        Err(err @ SettleError::Transfer(_)) => {
            record_rejections("settle", &[RejectReason::SettleError]);
            metrics::SETTLE_REQUESTS.with_label_values(&["error"]).inc();
            metrics::SETTLE_LATENCY
                .with_label_values(&["error"])
                .observe(elapsed);
            HttpResponse::InternalServerError().json(SettleResponse {
                success: false,
                transaction: None,
                errors: Some(err.error_codes()),
            })
        }
    }
}
