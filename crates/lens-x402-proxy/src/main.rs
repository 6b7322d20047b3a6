use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402_proxy::{routes, ProxyConfig, ProxyState};

fn build_cors(origins: &[String]) -> Cors {
    let cors = if origins.is_empty() {
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
    cors.allowed_methods(vec!["GET"])
        .allowed_headers(vec!["content-type", "x-payment"])
        .expose_headers(vec!["x-payment-response", "x-payment-demo-bypass"])
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

    let config = match ProxyConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };
    let state = match ProxyState::from_config(&config) {
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
        resource = %config.resource_server_url,
        "x402 service agent listening on port {port}"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(state.clone())
            .service(routes::relay_content)
            .service(routes::health)
            .service(routes::metrics_endpoint)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
