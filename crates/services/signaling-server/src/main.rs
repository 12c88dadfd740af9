//! Phonecast signaling server binary
//!
//! # Usage
//!
//! ```bash
//! # Defaults (0.0.0.0:8080)
//! cargo run -p phonecast-signaling
//!
//! # From a config file, overriding the port
//! cargo run -p phonecast-signaling -- --config phonecast.toml --port 9000
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use phonecast_signaling::{
    api::{build_router, AppState},
    config::Config,
    metrics::Metrics,
    sweeper::LivenessSweeper,
    SessionCoordinator,
};

/// Phonecast signaling server
///
/// Pairs phones with desktop viewers and relays WebRTC negotiation between them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (falls back to PHONECAST_* environment variables)
    #[arg(short, long, env = "PHONECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(args.config.as_ref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let config = Arc::new(config);

    tracing::info!(
        "Configuration: bind={}, sweep_interval={}s, inactivity_timeout={}s",
        config.server.bind_addr(),
        config.sweeper.interval_secs,
        config.sweeper.inactivity_timeout_secs
    );

    let coordinator = Arc::new(SessionCoordinator::new(Arc::new(Metrics::new())));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let sweeper_handle = {
        let sweeper = LivenessSweeper::new(Arc::clone(&coordinator), &config.sweeper);
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(sweeper.run(shutdown_rx))
    };

    let router = build_router(AppState::new(coordinator, Arc::clone(&config)));

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Signaling server listening on {}", bind_addr);

    let shutdown_tx_clone = shutdown_tx.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
            let _ = shutdown_tx_clone.send(());
        })
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = sweeper_handle.await {
        tracing::error!("Liveness sweeper task failed: {}", e);
    }

    tracing::info!("Signaling server shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
