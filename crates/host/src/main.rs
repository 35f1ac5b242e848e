//! Resonance host binary.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rh_host::{api, build_state};

#[derive(Debug, Parser)]
#[command(name = "resonance-host", about = "Local AI host: agent loop, skills, sentinels")]
struct Cli {
    /// Data directory (config/, sessions/, SKILLS/, vector_store/).
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Listen address override (defaults to the configured value).
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let state = build_state(&cli.base_dir).await?;

    let listen = cli
        .listen
        .unwrap_or_else(|| state.config.snapshot().system.listen_addr.clone());
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(addr = %listen, "resonance host listening");

    let app = api::router(state);
    axum::serve(listener, app).await?;
    Ok(())
}
