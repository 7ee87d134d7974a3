//! Air-quality service - HTTP API with background collector.
//!
//! Run with: `cargo run -p airq-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use airq_service::{AppState, Collector, Config, OpenWeatherClient, api, seed};
use airq_store::Store;

/// Air-quality service - caching façade over the OpenWeatherMap air pollution API.
#[derive(Parser, Debug)]
#[command(name = "airq-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable background collector (API only mode).
    #[arg(long)]
    no_collector: bool,

    /// Skip seeding historical data on startup.
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airq_service=info".parse()?)
                .add_directive("airq_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration: file, then environment, then CLI
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env();

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if args.no_collector {
        config.collector.enabled = false;
    }
    if args.no_seed {
        config.history.seed_on_startup = false;
    }
    config.validate()?;

    if config.upstream.api_key.is_none() {
        warn!("No upstream API key configured, all data will be synthetic");
    }
    if config.security.api_key_enabled && config.security.api_key.is_none() {
        warn!(
            "API key authentication enabled but no key configured, all requests will be rejected"
        );
    }

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let provider = Arc::new(OpenWeatherClient::new(&config.upstream)?);
    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config, provider);

    if state.config.history.seed_on_startup {
        seed::seed_history(&state).await;
    }

    // Start the background collector
    let collector = Collector::new(Arc::clone(&state));
    if state.config.collector.enabled {
        collector.start();
    } else {
        info!("Background collector disabled");
    }

    let app = api::app(Arc::clone(&state));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    collector.stop().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
