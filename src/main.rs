use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resume_proxy::config::{load_config, validate_config, ProxyConfig};
use resume_proxy::http::ProxyServer;
use resume_proxy::net::Listener;

#[derive(Parser)]
#[command(name = "resume-proxy")]
#[command(about = "Reverse proxy that resumes interrupted upstream responses", long_about = None)]
struct Cli {
    /// Listening host (empty binds all interfaces)
    #[arg(long, env = "WEB_HOST")]
    host: Option<String>,

    /// HTTP listening port
    #[arg(long, env = "WEB_PORT")]
    port: Option<u16>,

    /// Upstream origin base URL
    #[arg(long, env = "UPSTREAM")]
    upstream: Option<String>,

    /// Optional TOML configuration file; CLI flags override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resume_proxy=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("resume-proxy v0.1.0 starting");

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(host) = cli.host {
        config.listener.host = host;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream.url = upstream;
    }

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "invalid configuration");
        }
        return Err("configuration validation failed".into());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        upstream = %config.upstream.url,
        max_attempts = config.retries.max_attempts,
        "Configuration loaded"
    );

    let server = ProxyServer::new(&config)?;
    let listener = Listener::bind(&config.listener).await?;

    // Ctrl+C closes the listener; close is idempotent.
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.trigger();
        }
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
