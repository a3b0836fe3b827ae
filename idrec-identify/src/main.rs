//! idrec-identify - identity reconciliation microservice
//!
//! Serves `POST /identify` and the contact administration endpoints over a
//! SQLite contact store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use idrec_common::config::{ConfigOverrides, ServiceConfig};
use idrec_common::db::SqliteContactStore;
use idrec_identify::{build_router, AppState, IdentityEngine};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for idrec-identify
#[derive(Parser, Debug)]
#[command(name = "idrec-identify")]
#[command(about = "Identity reconciliation service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "IDREC_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "IDREC_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Folder holding the contact database
    #[arg(short, long, env = "IDREC_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Explicit config file (default: ~/.config/idrec/config.toml)
    #[arg(short, long, env = "IDREC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "idrec_identify=info,idrec_common=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting idrec-identify v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let config = ServiceConfig::resolve(&ConfigOverrides {
        root_folder: args.root_folder,
        config_file: args.config,
        bind_addr: args.bind_addr,
        port: args.port,
    });
    info!("Database path: {}", config.database_path.display());

    let store = SqliteContactStore::open(&config.database_path, &config.store)
        .await
        .context("Failed to open contact database")?;
    info!("✓ Connected to contact database");

    let engine = IdentityEngine::new(Arc::new(store), config.transaction_timeout);
    let app = build_router(AppState::new(engine));

    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("idrec-identify listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
