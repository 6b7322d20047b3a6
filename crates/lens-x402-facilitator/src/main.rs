use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_facilitator::bootstrap::bootstrap;
use x402_facilitator::config::FacilitatorConfig;
use x402_facilitator::routes;

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
        // Default: http://localhost on any port
        Cors::default().allowed_origin_fn(|origin, _| {
            origin
                .to_str()
                .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                .unwrap_or(false)
        })
    } else {
        origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["content-type", "authorization", "x-facilitator-auth", "x-payment"])
        .expose_headers(vec!["x-payment-response"])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match FacilitatorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "facilitator configuration");

    let state = match bootstrap(&config) {
        Ok(state) => state,
        Err(e) => {
            // Never fall back to an in-memory nonce ledger: restarts would re-open replay.
            tracing::error!("refusing to start: {e}");
            std::process::exit(1);
        }
    };
    let state = web::Data::from(state);

    if config.metrics_token.is_none() && !config.public_metrics {
        tracing::info!("METRICS_TOKEN not set: /metrics returns 403");
    }

    let governor_conf = match GovernorConfigBuilder::default()
        .requests_per_minute(config.rate_limit_rpm)
        .finish()
    {
        Some(conf) => conf,
        None => {
            tracing::error!("invalid RATE_LIMIT_RPM: {}", config.rate_limit_rpm);
            std::process::exit(1);
        }
    };

    let port = config.port;
    let origins = config.allowed_origins.clone();

    tracing::info!(
        network = %config.chain.network,
        chain_id = config.chain.chain_id,
        simulated = config.simulate_settlement,
        "x402 facilitator listening on port {port}"
    );
    tracing::info!("Rate limit: {} req/min per IP", config.rate_limit_rpm);
    tracing::info!("  GET  http://localhost:{port}/supported");
    tracing::info!("  POST http://localhost:{port}/verify");
    tracing::info!("  POST http://localhost:{port}/settle");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(65_536))
            .service(routes::health)
            .service(routes::metrics_endpoint)
            .service(routes::supported)
            .service(routes::verify)
            .service(routes::settle)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
