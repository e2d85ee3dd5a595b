#![allow(missing_docs)]

//! wabridge: HTTP and dashboard bridge for a WhatsApp Web sidecar.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use wabridge::commands::CommandTable;
use wabridge::config::Config;
use wabridge::logging;
use wabridge::server::{self, AppState};
use wabridge::status::StatusHub;
use wabridge::whatsapp::client::BridgeClientFactory;
use wabridge::whatsapp::session::SessionManager;

/// Expose a WhatsApp Web session over HTTP.
#[derive(Debug, Parser)]
#[command(name = "wabridge", version, about)]
struct Cli {
    /// Config file (default: $WABRIDGE_CONFIG_PATH or ./wabridge.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening port, overriding config and $PORT.
    #[arg(long)]
    port: Option<u16>,

    /// Sidecar base URL, overriding config and $WABRIDGE_BRIDGE_URL.
    #[arg(long)]
    bridge_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Precedence: CLI flags > env vars > config file > defaults.
    // The configured subscriber depends on the config, so loading logs to a
    // temporary one.
    let mut config = logging::with_bootstrap("info", || match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    })
    .context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.bridge_url {
        config.whatsapp.bridge_url = url;
        config.validate().context("invalid --bridge-url")?;
    }

    let _log_guard = if config.logging.logs_dir.is_empty() {
        logging::init_cli(&config.logging.level);
        None
    } else {
        let dir = PathBuf::from(&config.logging.logs_dir);
        Some(logging::init_production(&dir, &config.logging.level)?)
    };

    info!(
        bridge = %config.whatsapp.bridge_url,
        port = config.server.port,
        "wabridge starting"
    );

    let factory = Arc::new(BridgeClientFactory::new(config.whatsapp.bridge_url.clone()));
    let session = SessionManager::start(
        factory,
        StatusHub::default(),
        Arc::new(CommandTable::with_defaults()),
    )
    .await;

    let state = Arc::new(AppState {
        session: Arc::clone(&session),
        default_country_code: config.whatsapp.default_country_code.clone(),
    });
    let app = server::router(state, config.server.cors);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;

    server::serve(listener, app, shutdown_signal()).await?;

    session.shutdown().await;
    info!("wabridge shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("received shutdown signal, initiating graceful shutdown");
}
