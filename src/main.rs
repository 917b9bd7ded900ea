use anyhow::Context;
use clap::Parser;
use recapnote::{api, config, logging, processing::ProcessingService};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::net::TcpListener;

const DEFAULT_PORT: u16 = 8000;

/// RecapNote HTTP server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Port to listen on; overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // `RUST_LOG` and `RECAPNOTE_LOG_FILE` may come from `.env`.
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let config = config::load().context("Failed to load configuration")?;

    let service = ProcessingService::from_config(&config).context("Failed to build services")?;
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let port = cli.port.or(config.server_port).unwrap_or(DEFAULT_PORT);
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
