//! hexmap API service.
//!
//! Raster tiles and H3 hexagon aggregations over configured GeoTIFF sources.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use batch::{FetchConfig, Fetcher};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hexmap_api::{
    build_router,
    config::ServiceConfig,
    state::{AppState, ServiceSettings},
};

#[derive(Parser, Debug)]
#[command(name = "hexmap-api")]
#[command(about = "Raster tile and H3 hex aggregation service")]
struct Args {
    /// Listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Source registry (YAML)
    #[arg(long, env = "SOURCES_CONFIG", default_value = "config/sources.yaml")]
    sources: PathBuf,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Tile edge in pixels
    #[arg(long, env = "TILE_SIZE", default_value = "256")]
    tile_size: usize,

    /// Default parallelism for batch requests
    #[arg(long, env = "MAX_WORKERS", default_value = "4")]
    max_workers: usize,

    /// Viewport edge in pixels used to pick a zoom for a bbox
    #[arg(long, default_value = "1024")]
    viewport_px: u32,

    /// Timeout for fetching remote sources, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value = "120")]
    fetch_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", args.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting hexmap-api");

    let config = ServiceConfig::load(&args.sources)?;
    let fetcher = Fetcher::new(FetchConfig {
        request_timeout: Duration::from_secs(args.fetch_timeout_secs),
        ..FetchConfig::default()
    })?;
    let settings = ServiceSettings {
        tile_size: args.tile_size,
        max_workers: args.max_workers,
        viewport_px: args.viewport_px,
    };
    let state = Arc::new(AppState::new(config, settings, fetcher)?);

    let app = build_router(state);

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal");
        })
        .await?;

    Ok(())
}
