use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use x402::requirement::parse_price;
use x402::{ChainConfig, X402Error};
use x402_client::{AuthorizationPolicy, ExactSchemeClient, TopicMatcher, X402Client};

/// Fetch pay-per-access content through the service agent, paying on 402.
#[derive(Parser, Debug)]
#[command(name = "x402-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Content hash to fetch.
    #[arg(long, conflicts_with = "topic")]
    hash: Option<String>,

    /// Topic to resolve to a content hash through the matcher.
    #[arg(long)]
    topic: Option<String>,

    /// Base URL of the service agent (proxy).
    #[arg(long, env = "SERVICE_AGENT_URL", default_value = "http://localhost:5402")]
    service_url: String,

    /// Topic matcher endpoint.
    #[arg(long, env = "MATCH_TOPIC_URL")]
    match_url: Option<String>,

    /// Largest price this client will pay, e.g. "$5.00".
    #[arg(long, env = "MAX_PAYMENT", default_value = "$5.00")]
    max_payment: String,

    /// Longest authorization validity this client will sign, in seconds.
    #[arg(long, default_value = "300")]
    max_validity_secs: u64,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), X402Error> {
    let key = std::env::var("EVM_PRIVATE_KEY")
        .map_err(|_| X402Error::ConfigError("EVM_PRIVATE_KEY is required".into()))?;
    let signer: PrivateKeySigner = key
        .trim()
        .parse()
        .map_err(|e| X402Error::ConfigError(format!("invalid EVM_PRIVATE_KEY: {e}")))?;

    let config = ChainConfig::default();
    let policy = AuthorizationPolicy {
        max_amount: Some(parse_price(&cli.max_payment, config.token_decimals)?),
        max_validity_secs: Some(cli.max_validity_secs),
    };
    let scheme = ExactSchemeClient::with_chain_config(signer, config).with_policy(policy);
    tracing::info!(payer = %scheme.address(), "client ready");

    let hash = match (cli.hash, cli.topic) {
        (Some(hash), _) => hash,
        (None, Some(topic)) => {
            let url = cli.match_url.ok_or_else(|| {
                X402Error::ConfigError("--topic needs MATCH_TOPIC_URL or --match-url".into())
            })?;
            let hash = TopicMatcher::new(&url)?.best_match(&topic).await?;
            tracing::info!(topic = %topic, hash = %hash, "topic matched");
            hash
        }
        (None, None) => {
            return Err(X402Error::ConfigError("pass --hash or --topic".into()));
        }
    };

    let url = format!(
        "{}/a2a/content/{}",
        cli.service_url.trim_end_matches('/'),
        hash
    );
    let client = X402Client::new(scheme)?;
    let (resp, receipt) = client.fetch(&url, reqwest::Method::GET).await?;

    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| X402Error::HttpError(format!("response parse failed: {e}")))?;

    if !status.is_success() {
        return Err(X402Error::HttpError(format!("{status}: {body}")));
    }

    match receipt {
        Some(r) => tracing::info!(
            success = r.success,
            tx = r.transaction.as_deref().unwrap_or("none"),
            network = %r.network,
            "payment settled"
        ),
        None => tracing::info!("content released without a receipt"),
    }

    let pretty = serde_json::to_string_pretty(&body)?;
    println!("{pretty}");
    Ok(())
}
