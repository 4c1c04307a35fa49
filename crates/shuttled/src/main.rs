//! shuttled: streaming file-transfer daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use shuttle_core::config::ShuttleConfig;
use shuttle_services::{FileStore, Server};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = ShuttleConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ShuttleConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ShuttleConfig::default()
    });

    let listen_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config.network.listen_addr.clone());
    tracing::info!(listen_addr, "shuttled starting");

    // Store
    let store = FileStore::new(&config.storage.root, config.storage.extension.as_str())
        .with_context(|| {
            format!(
                "failed to prepare storage root {}",
                config.storage.root.display()
            )
        })?;
    tracing::info!(
        root = %store.root().display(),
        extension = %config.storage.extension,
        "file store ready"
    );

    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;

    let server = Server::new(Arc::new(store)).with_shutdown_grace(config.server.shutdown_grace());

    // ── Run until interrupted ────────────────────────────────────────────────

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown signal received");
        })
        .await?;

    tracing::info!("shuttled stopped");
    Ok(())
}
