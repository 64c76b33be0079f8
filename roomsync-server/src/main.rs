use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use roomsync_core::config::Settings;
use roomsync_server::{AppState, build_router, tasks};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roomsync-server")]
#[command(about = "Practice-room booking calendar: Google Calendar sync, pricing and statistics")]
struct Args {
    /// Settings file (default: ~/.config/roomsync/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let mut settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server.host / server.port")?;

    let state = AppState::from_settings(settings)?;
    let _loops = tasks::spawn_all(&state);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("roomsync-server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
