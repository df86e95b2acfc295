//! ImageAuth Server - REST API for morph-aware image registration
//!
//! Exposes imageauth-core functionality via HTTP endpoints:
//! - POST /upload - Detect and register an image
//! - POST /verify - Look a registration up by content hash

use std::net::SocketAddr;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use imageauth_server::{create_router_with_config, AppState, Config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("imageauth_server=info,imageauth_core=info,tower_http=info")
        }))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Server terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let state = AppState::from_config(&config).await?;
    let app = create_router_with_config(&config, state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        "ImageAuth server listening"
    );
    tracing::info!("  POST /upload  - Register image (multipart: image, metadata?)");
    tracing::info!("  POST /verify  - Verify registration (json: hash)");
    tracing::info!("  GET  /health  - Health check");
    tracing::info!("  GET  /api-docs/openapi.json - OpenAPI document");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating shutdown..."),
    }
}
