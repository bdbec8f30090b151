use anyhow::Context;
use clap::Parser;
use medscan::{api, config, logging, pipeline::ScanPipeline};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Identify medicines from package photos over HTTP.
#[derive(Debug, Parser)]
#[command(name = "medscan", version)]
struct Args {
    /// Port to listen on (overrides SERVER_PORT / PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Directory for temporary uploads (overrides UPLOAD_DIR).
    #[arg(long)]
    upload_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_tracing();

    let mut config = config::load_config().context("Failed to load config from environment")?;
    if let Some(port) = args.port {
        config.server_port = port;
    }
    if let Some(dir) = args.upload_dir {
        config.upload_dir = dir;
    }

    let pipeline = ScanPipeline::from_config(&config)?;
    let app = api::create_router(Arc::new(pipeline), config.max_upload_bytes);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.server_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.server_port))?;
    tracing::info!("Server is running at http://localhost:{}", config.server_port);
    axum::serve(listener, app).await?;
    Ok(())
}
