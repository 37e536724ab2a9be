//! hexmap HTTP service library.
//!
//! Serves colorized raster tiles and H3 hex aggregations of configured
//! GeoTIFF sources, plus tile/H3 helper endpoints and batch jobs.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use state::AppState;

/// Build the service router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        // Tile / H3 helpers
        .route("/tiles/bbox", get(handlers::tiles_bbox_handler))
        .route("/h3/resolution", get(handlers::h3_resolution_handler))
        .route("/h3/cover", get(handlers::h3_cover_handler))
        // Raster tiles
        .route("/raster/:source/:z/:x/:y", get(handlers::raster_png_handler))
        .route(
            "/raster/:source/:z/:x/:y/array",
            get(handlers::raster_array_handler),
        )
        // Hex aggregation
        .route("/hex/:source/:z/:x/:y", get(handlers::hex_tile_handler))
        .route(
            "/hex/join/:left/:right/:z/:x/:y",
            get(handlers::hex_join_handler),
        )
        .route("/batch/hex", post(handlers::batch_hex_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
