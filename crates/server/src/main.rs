//! depot server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_core::config::AppConfig;
use depot_server::exporter::{StatsExporter, spawn_exporter_loop};
use depot_server::gc::{GarbageCollector, spawn_gc_loop};
use depot_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// depot - versioned content-addressable archive
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "DEPOT_CONFIG", default_value = "config/depot.toml")]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `DEPOT_` variables.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::debug!("No config file found at {}", path);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("DEPOT_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    Ok(config)
}

async fn shutdown_signal(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("depot v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    depot_server::metrics::register_metrics();

    let blobs = depot_storage::from_config(&config.storage)
        .await
        .context("failed to initialize blob store")?;
    blobs
        .health_check()
        .await
        .context("blob store health check failed")?;
    tracing::info!(bucket = %config.storage.bucket, "Blob store connectivity verified");

    let metadata = depot_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    // Background jobs read the uncached store.
    if config.gc.enabled {
        let gc = Arc::new(GarbageCollector::new(metadata.clone(), config.gc.clone()));
        tasks.push(spawn_gc_loop(gc, cancel.clone()));
    } else {
        tracing::info!("Garbage collection disabled");
    }

    if config.exporter.enabled {
        let exporter = StatsExporter::new(metadata.clone());
        tasks.push(spawn_exporter_loop(
            exporter,
            config.exporter.interval(),
            cancel.clone(),
        ));
    }

    let state = AppState::new(config.clone(), metadata, blobs);
    let app = create_router(state);

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}
