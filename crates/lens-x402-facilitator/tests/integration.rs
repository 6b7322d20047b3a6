use std::time::Duration;

use actix_web::{test, web, App};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;

use x402::codec::{decode_receipt, encode_payment};
use x402::response::{SettleRequest, VerifyRequest};
use x402::{Facilitator, PaymentRequirements, RequirementBuilder, SimulatedLedger, DEFAULT_ASSET};
use x402_client::ExactSchemeClient;
use x402_facilitator::routes;
use x402_facilitator::state::{AppState, LedgerBackend};

const SECRET: &[u8] = b"integration-test-shared-secret-32b";

fn make_state(hmac_secret: Option<&[u8]>) -> web::Data<AppState> {
    web::Data::new(AppState::simulated(hmac_secret.map(<[u8]>::to_vec)))
}

fn requirement(amount: u64) -> PaymentRequirements {
    RequirementBuilder::new()
        .build(
            "/api/content/abc123",
            Address::repeat_byte(0x42),
            DEFAULT_ASSET,
            U256::from(amount),
        )
        .unwrap()
}

fn signed_header(amount: u64) -> String {
    let client = ExactSchemeClient::new(PrivateKeySigner::random());
    let payload = client.authorize(&requirement(amount)).unwrap();
    encode_payment(&payload).unwrap()
}

fn signed_post(uri: &str, body: Vec<u8>) -> test::TestRequest {
    let sig = x402::hmac::sign_body(SECRET, &body);
    test::TestRequest::post()
        .uri(uri)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", sig))
        .set_payload(body)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state)
                .service(routes::health)
                .service(routes::metrics_endpoint)
                .service(routes::supported)
                .service(routes::verify)
                .service(routes::settle),
        )
        .await
    };
}

#[actix_rt::test]
async fn test_supported_returns_network_and_scheme() {
    let app = app!(make_state(Some(SECRET)));

    let req = test::TestRequest::get().uri("/supported").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["networks"][0]["name"], "polygon-amoy");
    assert_eq!(body["networks"][0]["chainId"], 80002);
    assert_eq!(body["networks"][0]["schemes"][0], "exact");
    assert_eq!(body["networks"][0]["simulated"], true);
}

#[actix_rt::test]
async fn test_health_reports_simulated_ledger() {
    let app = app!(make_state(None));

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["simulated"], true);
}

#[actix_rt::test]
async fn test_verify_requires_hmac_when_configured() {
    let app = app!(make_state(Some(SECRET)));

    let req = test::TestRequest::post()
        .uri("/verify")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{}")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication required");
}

#[actix_rt::test]
async fn test_settle_rejects_bad_hmac() {
    let app = app!(make_state(Some(SECRET)));

    let req = test::TestRequest::post()
        .uri("/settle")
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", "deadbeef"))
        .set_payload("{}")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication failed");
}

#[actix_rt::test]
async fn test_valid_hmac_without_payload_is_invalid_payload() {
    let app = app!(make_state(Some(SECRET)));

    let req = signed_post("/verify", b"{}".to_vec()).to_request();
    let resp = test::call_service(&app, req).await;

    // Authentication passed; the missing payload is a 400, not a 401.
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0], "invalid_payload");
}

#[actix_rt::test]
async fn test_verify_settle_then_replay() {
    let app = app!(make_state(Some(SECRET)));
    let header = signed_header(100_000);

    let verify_body = serde_json::to_vec(&VerifyRequest {
        payment_payload_base64: Some(header.clone()),
        payment_requirements: Some(requirement(100_000)),
    })
    .unwrap();
    let resp = test::call_service(&app, signed_post("/verify", verify_body).to_request()).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert!(body["payer"].is_string());

    let settle_body = serde_json::to_vec(&SettleRequest {
        payment_payload_base64: Some(header.clone()),
    })
    .unwrap();
    let resp = test::call_service(
        &app,
        signed_post("/settle", settle_body.clone()).to_request(),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let receipt_header = resp
        .headers()
        .get("X-PAYMENT-RESPONSE")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("settle must return X-PAYMENT-RESPONSE");
    let receipt = decode_receipt(&receipt_header).unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.network, "polygon-amoy");
    assert!(receipt.transaction.is_none());

    let resp = test::call_service(&app, signed_post("/settle", settle_body).to_request()).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"][0], "nonce_replay");

    // Verification sees the consumed nonce too.
    let verify_body = serde_json::to_vec(&VerifyRequest {
        payment_payload_base64: Some(header),
        payment_requirements: None,
    })
    .unwrap();
    let resp = test::call_service(&app, signed_post("/verify", verify_body).to_request()).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["errors"][0], "nonce_replay");
}

#[actix_rt::test]
async fn test_verify_reads_payment_header_when_body_is_empty() {
    let app = app!(make_state(None));

    let req = test::TestRequest::post()
        .uri("/verify")
        .insert_header(("X-PAYMENT", signed_header(100_000)))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn test_verify_reports_binding_failures() {
    let app = app!(make_state(None));

    let body = serde_json::to_vec(&VerifyRequest {
        payment_payload_base64: Some(signed_header(100_000)),
        payment_requirements: Some(PaymentRequirements {
            pay_to: Address::repeat_byte(0x77),
            ..requirement(500_000)
        }),
    })
    .unwrap();
    let req = test::TestRequest::post()
        .uri("/verify")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    let errors: Vec<String> = serde_json::from_value(body["errors"].clone()).unwrap();
    assert!(errors.contains(&"amount_insufficient".to_string()));
    assert!(errors.contains(&"recipient_mismatch".to_string()));
}

#[actix_rt::test]
async fn test_settle_rejects_garbage_payload() {
    let app = app!(make_state(None));

    let body = serde_json::to_vec(&SettleRequest {
        payment_payload_base64: Some("!!not-base64!!".into()),
    })
    .unwrap();
    let req = test::TestRequest::post()
        .uri("/settle")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["errors"][0], "invalid_payload");
}

#[actix_rt::test]
async fn test_metrics_forbidden_without_token() {
    let app = app!(make_state(Some(SECRET)));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 403);
}

#[actix_rt::test]
async fn test_metrics_requires_bearer_token() {
    let mut state = AppState::simulated(None);
    state.metrics_token = Some(b"metrics-token".to_vec());
    let app = app!(web::Data::new(state));

    let req = test::TestRequest::get().uri("/metrics").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer metrics-token"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_rt::test]
async fn test_settle_completes_after_caller_disconnects() {
    let state = web::Data::new(AppState {
        facilitator: Facilitator::new(LedgerBackend::Simulated(
            SimulatedLedger::new().with_latency(Duration::from_millis(300)),
        )),
        hmac_secret: None,
        metrics_token: None,
        public_metrics: false,
    });
    let app = app!(state.clone());
    let header = signed_header(100_000);
    let body = serde_json::to_vec(&SettleRequest {
        payment_payload_base64: Some(header.clone()),
    })
    .unwrap();

    // The caller's budget runs out while the transfer is in flight.
    let req = test::TestRequest::post()
        .uri("/settle")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.clone())
        .to_request();
    let cut = tokio::time::timeout(Duration::from_millis(50), test::call_service(&app, req)).await;
    assert!(cut.is_err());

    tokio::time::sleep(Duration::from_millis(600)).await;
    let LedgerBackend::Simulated(ledger) = state.facilitator.ledger() else {
        panic!("simulated backend expected");
    };
    assert_eq!(ledger.transfers(), 1);

    let req = test::TestRequest::post()
        .uri("/settle")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["errors"][0], "nonce_replay");
    assert_eq!(ledger.transfers(), 1);
}
