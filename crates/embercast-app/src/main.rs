use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod hud;

#[tokio::main]
async fn main() -> Result<()> {
    // Use RUST_LOG=debug for frame-level detail
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .init();

    info!("Embercast Receiver v{}", env!("CARGO_PKG_VERSION"));
    info!("Starting...");

    match app::run().await {
        Ok(()) => {
            info!("Embercast Receiver exited cleanly.");
            Ok(())
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}
