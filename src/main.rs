// gemchat - Multimodal chat endpoint backed by a Gemini conversation session
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use gemchat::chat::{SessionGateway, ValidationLimits};
use gemchat::cli::Args;
use gemchat::config::AppConfig;
use gemchat::gemini;
use gemchat::server::create_router;
use gemchat::storage::LocalBlobStore;
use gemchat::utils::logging;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;
    info!("Starting gemchat v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Build the conversation session (once, before serving)
    let session = gemini::bootstrap(&config.gemini);
    if session.is_none() {
        warn!("Running in degraded mode: every chat request will get 503");
    }

    // Phase 4: Wire the gateway
    let blob_store = Arc::new(LocalBlobStore::new(&config.upload));
    info!("Storing uploads under {}", blob_store.root().display());
    let gateway = SessionGateway::new(session, blob_store, ValidationLimits::from(&config.upload));

    // Phase 5: Build and start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(config, gateway)?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
