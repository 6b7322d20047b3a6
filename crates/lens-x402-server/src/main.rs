use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::http::header::{HeaderName, ACCEPT, CONTENT_TYPE};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_server::{routes, GateConfig, ServerState};

fn build_cors(origins: &[String]) -> Cors {
    let allowed = origins.to_vec();
    Cors::default()
        .allowed_origin_fn(move |origin, _| {
            let origin = origin.to_str().unwrap_or("");
            if allowed.is_empty() {
                origin == "http://localhost" || origin.starts_with("http://localhost:")
            } else {
                allowed.iter().any(|a| a == origin)
            }
        })
        .allowed_methods(vec!["GET"])
        .allowed_headers(vec![
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("x-payment"),
        ])
        .expose_headers(vec![
            HeaderName::from_static("x-payment-response"),
            HeaderName::from_static("x-payment-demo-bypass"),
        ])
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

    let config = match GateConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    tracing::debug!(?config, "resource server configuration");

    let state = match ServerState::from_config(&config) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            tracing::error!("refusing to start: {e}");
            std::process::exit(1);
        }
    };

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
        payee = %config.evm_address,
        asset = %config.asset,
        default_price = %config.default_price,
        "x402 resource server listening on port {port}"
    );
    tracing::info!("  GET  http://localhost:{port}/api/content/{{hash}}");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .service(routes::get_content)
            .service(routes::health)
            .service(routes::metrics_endpoint)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
