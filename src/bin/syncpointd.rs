//! syncpointd: runs the coordination engine and drives graceful shutdown.
//!
//! The transport that feeds requests into the engine is wired by the
//! embedding layer; this binary exists so the engine can be started, drained,
//! and inspected standalone.

use clap::Parser;
use syncpoint::cli::Args;
use syncpoint::{Engine, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if !args.base_dirs.is_empty() {
        settings.crud.base_directories = args.base_dirs.clone();
    }
    if args.persist {
        settings.persistence.enabled = true;
    }
    if args.no_watcher {
        settings.watcher.enabled = false;
    }

    let engine = Engine::start(settings).await?;
    tracing::info!("syncpointd ready: {}", engine.health());

    tokio::signal::ctrl_c().await?;
    tracing::info!("received ctrl-c");
    engine.shutdown().await;

    Ok(())
}
