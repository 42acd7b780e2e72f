//! The `captionist serve` command.

use anyhow::Context;
use captionist_core::{CaptionService, Config};
use clap::Args;

use crate::server;

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Load the model, build the service, and serve until Ctrl+C.
pub async fn execute(args: ServeArgs) -> anyhow::Result<()> {
    let config = Config::load()?;

    let load_config = config.clone();
    let service = tokio::task::spawn_blocking(move || CaptionService::from_config(&load_config))
        .await
        .context("Model loading task panicked")??;
    let app = server::router(service, config.server.max_upload_bytes());

    let host = args.host.unwrap_or(config.server.host);
    let port = args.port.unwrap_or(config.server.port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);
    tracing::info!("Press Ctrl+C to stop the server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
    }
}
