//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::header,
    response::{IntoResponse, Json, Response},
};
use batch::{run_parallel, FailurePolicy};
use geo_common::{
    count_tiles_for_bbox, estimate_zoom, tiles_for_bbox, BoundingBox, GeoError, GeoResult,
    TileCoord, MAX_ZOOM,
};
use hexgrid::{
    aggregate_raster, cells_for_bbox, join, to_resolution, Aggregation, DecimationHeuristic,
    HexRow, HexTable, JoinKind, JoinedRow, Resolution,
};
use raster::{render_tile, ChannelFirstArray, RasterGrid, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::ApiResult;
use crate::state::AppState;

/// Upper bound on tiles listed by `/tiles/bbox`.
pub const MAX_LISTED_TILES: u64 = 10_000;
/// Upper bound on tiles in one batch request.
pub const MAX_BATCH_TILES: usize = 1024;
pub const MAX_BATCH_WORKERS: usize = 32;

// ============================================================================
// Helpers
// ============================================================================

fn require_bbox(bbox: Option<&str>) -> GeoResult<BoundingBox> {
    let raw = bbox.ok_or_else(|| GeoError::MissingParameter("bbox".to_string()))?;
    Ok(BoundingBox::from_query_string(raw)?)
}

fn parse_agg(agg: Option<&str>) -> GeoResult<Aggregation> {
    match agg {
        Some(s) => Ok(s.parse::<Aggregation>()?),
        None => Ok(Aggregation::default()),
    }
}

fn check_zoom(zoom: f64) -> GeoResult<f64> {
    if zoom.is_finite() && (0.0..=MAX_ZOOM as f64).contains(&zoom) {
        Ok(zoom)
    } else {
        Err(GeoError::invalid(
            "zoom",
            format!("{} is outside 0..={}", zoom, MAX_ZOOM),
        ))
    }
}

/// `"12.png"` → 12. A bare number is accepted too.
fn parse_tile_y(y: &str, ext: &str) -> GeoResult<u32> {
    let digits = match y.rsplit_once('.') {
        Some((d, e)) if e.eq_ignore_ascii_case(ext) => d,
        Some(_) => {
            return Err(GeoError::InvalidTile(format!(
                "unsupported format in '{}', expected .{}",
                y, ext
            )))
        }
        None => y,
    };
    digits
        .parse()
        .map_err(|_| GeoError::InvalidTile(format!("invalid y '{}'", y)))
}

fn resolution_for(state: &AppState, res: Option<u8>, zoom: u32) -> GeoResult<Resolution> {
    match res {
        Some(r) => Ok(to_resolution(r)?),
        None => Ok(state.resolution.resolution_for_zoom(zoom as f64)),
    }
}

/// Run CPU-bound work off the async runtime.
async fn blocking<T, F>(f: F) -> GeoResult<T>
where
    F: FnOnce() -> GeoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GeoError::InternalError(format!("worker task failed: {}", e)))?
}

/// Aggregate the part of `grid` under `tile` into hex bins.
///
/// Low zooms read a block-averaged copy of the window, so counts there are
/// in decimated pixels.
pub fn hex_table_for_tile(
    grid: &RasterGrid,
    tile: &TileCoord,
    resolution: Resolution,
    decimation: &DecimationHeuristic,
) -> HexTable {
    match grid.window(&tile.bounds()) {
        Some(window) => {
            let factor = decimation.factor_for_zoom(tile.z);
            aggregate_raster(&window.decimate(factor), resolution)
        }
        None => HexTable::new(resolution),
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sources: usize,
    pub loaded: Vec<String>,
}

pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sources: state.sources.len(),
        loaded: state.loaded_sources().await,
    })
}

// ============================================================================
// Tile and H3 helpers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TilesQuery {
    pub bbox: Option<String>,
    pub zoom: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct TileInfo {
    pub z: u32,
    pub x: u32,
    pub y: u32,
    pub quadkey: String,
    pub bbox: [f64; 4],
}

#[derive(Debug, Serialize)]
pub struct TilesResponse {
    pub zoom: u32,
    pub count: usize,
    pub tiles: Vec<TileInfo>,
}

/// `GET /tiles/bbox?bbox=&zoom=`; zoom defaults to the one that fits the viewport.
pub async fn tiles_bbox_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<TilesQuery>,
) -> ApiResult<Json<TilesResponse>> {
    let bbox = require_bbox(params.bbox.as_deref())?;
    let zoom = match params.zoom {
        Some(z) => z,
        None => estimate_zoom(
            &bbox,
            state.settings.tile_size as u32,
            state.settings.viewport_px,
        ),
    };
    let count = count_tiles_for_bbox(&bbox, zoom)?;
    if count > MAX_LISTED_TILES {
        return Err(GeoError::invalid(
            "zoom",
            format!(
                "bbox covers {} tiles at zoom {}, limit is {}",
                count, zoom, MAX_LISTED_TILES
            ),
        )
        .into());
    }

    let tiles: Vec<TileInfo> = tiles_for_bbox(&bbox, zoom)?
        .into_iter()
        .map(|t| {
            let b = t.bounds();
            TileInfo {
                z: t.z,
                x: t.x,
                y: t.y,
                quadkey: t.quadkey(),
                bbox: [b.min_x, b.min_y, b.max_x, b.max_y],
            }
        })
        .collect();

    Ok(Json(TilesResponse {
        zoom,
        count: tiles.len(),
        tiles,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResolutionQuery {
    pub zoom: Option<f64>,
    pub bbox: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResolutionResponse {
    pub zoom: f64,
    pub resolution: u8,
    pub edge_length_km: f64,
    pub area_km2: f64,
}

/// `GET /h3/resolution?zoom=` or `?bbox=`.
pub async fn h3_resolution_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ResolutionQuery>,
) -> ApiResult<Json<ResolutionResponse>> {
    let zoom = match (params.zoom, params.bbox.as_deref()) {
        (Some(z), _) => check_zoom(z)?,
        (None, Some(raw)) => {
            let bbox = BoundingBox::from_query_string(raw).map_err(GeoError::from)?;
            estimate_zoom(
                &bbox,
                state.settings.tile_size as u32,
                state.settings.viewport_px,
            ) as f64
        }
        (None, None) => return Err(GeoError::MissingParameter("zoom or bbox".to_string()).into()),
    };

    let res = state.resolution.resolution_for_zoom(zoom);
    Ok(Json(ResolutionResponse {
        zoom,
        resolution: u8::from(res),
        edge_length_km: res.edge_length_km(),
        area_km2: res.area_km2(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CoverQuery {
    pub bbox: Option<String>,
    pub res: Option<u8>,
    pub zoom: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CoverResponse {
    pub resolution: u8,
    pub count: usize,
    pub cells: Vec<String>,
}

/// `GET /h3/cover?bbox=&res=`; `zoom` may stand in for `res`.
pub async fn h3_cover_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<CoverQuery>,
) -> ApiResult<Json<CoverResponse>> {
    let bbox = require_bbox(params.bbox.as_deref())?;
    let res = match (params.res, params.zoom) {
        (Some(r), _) => to_resolution(r).map_err(GeoError::from)?,
        (None, Some(z)) => state.resolution.resolution_for_zoom(check_zoom(z)?),
        (None, None) => return Err(GeoError::MissingParameter("res".to_string()).into()),
    };

    let cells = blocking(move || Ok(cells_for_bbox(&bbox, res)?)).await?;
    let cells: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
    Ok(Json(CoverResponse {
        resolution: u8::from(res),
        count: cells.len(),
        cells,
    }))
}

// ============================================================================
// Raster tiles
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    pub colormap: Option<String>,
    pub vmin: Option<f32>,
    pub vmax: Option<f32>,
}

/// Colorize one tile of `source`. Request parameters override the source defaults.
#[instrument(skip(state, params))]
async fn render_source_tile(
    state: &AppState,
    source: &str,
    tile: TileCoord,
    params: &RenderQuery,
) -> GeoResult<RgbaImage> {
    let config = state.source(source)?;
    let cmap_name = params
        .colormap
        .as_deref()
        .or(config.colormap.as_deref())
        .unwrap_or("viridis");
    let colormap = state.colormap(cmap_name)?;

    let vmin = params.vmin.or(config.vmin);
    let vmax = params.vmax.or(config.vmax);
    if let (Some(lo), Some(hi)) = (vmin, vmax) {
        if lo >= hi {
            return Err(GeoError::invalid(
                "vmin",
                format!("vmin {} must be below vmax {}", lo, hi),
            ));
        }
    }

    let grid = state.raster(source).await?;
    let size = state.settings.tile_size;
    blocking(move || {
        let range = match (vmin, vmax) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            (lo, hi) => grid
                .value_range()
                .map(|(min, max)| (lo.unwrap_or(min), hi.unwrap_or(max))),
        };
        Ok(render_tile(&grid, &tile, size, &colormap, range))
    })
    .await
}

/// `GET /raster/{source}/{z}/{x}/{y}.png`
pub async fn raster_png_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((source, z, x, y)): Path<(String, u32, u32, String)>,
    Query(params): Query<RenderQuery>,
) -> ApiResult<Response> {
    let tile = TileCoord::checked(z, x, parse_tile_y(&y, "png")?)?;
    let image = render_source_tile(&state, &source, tile, &params).await?;
    let png = image.to_png()?;
    debug!(source = %source, z, x, bytes = png.len(), "Rendered PNG tile");

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        png,
    )
        .into_response())
}

/// `GET /raster/{source}/{z}/{x}/{y}/array`: the tile as a `[4, h, w]` array.
pub async fn raster_array_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((source, z, x, y)): Path<(String, u32, u32, u32)>,
    Query(params): Query<RenderQuery>,
) -> ApiResult<Json<ChannelFirstArray>> {
    let tile = TileCoord::checked(z, x, y)?;
    let image = render_source_tile(&state, &source, tile, &params).await?;
    Ok(Json(image.to_channel_first()))
}

// ============================================================================
// Hex aggregation
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct HexQuery {
    pub agg: Option<String>,
    pub res: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct HexTileResponse {
    pub source: String,
    pub tile: TileCoord,
    pub resolution: u8,
    pub agg: Aggregation,
    pub count: usize,
    pub rows: Vec<HexRow>,
}

/// `GET /hex/{source}/{z}/{x}/{y}?agg=&res=`
pub async fn hex_tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((source, z, x, y)): Path<(String, u32, u32, u32)>,
    Query(params): Query<HexQuery>,
) -> ApiResult<Json<HexTileResponse>> {
    let tile = TileCoord::checked(z, x, y)?;
    let agg = parse_agg(params.agg.as_deref())?;
    let res = resolution_for(&state, params.res, z)?;
    let grid = state.raster(&source).await?;
    let decimation = state.decimation;

    let rows = blocking(move || {
        Ok(hex_table_for_tile(&grid, &tile, res, &decimation).to_rows(agg))
    })
    .await?;

    Ok(Json(HexTileResponse {
        source,
        tile,
        resolution: u8::from(res),
        agg,
        count: rows.len(),
        rows,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinQuery {
    /// Aggregation for both sides unless overridden below.
    pub agg: Option<String>,
    pub left_agg: Option<String>,
    pub right_agg: Option<String>,
    pub kind: Option<String>,
    pub res: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub left: String,
    pub right: String,
    pub tile: TileCoord,
    pub resolution: u8,
    pub kind: JoinKind,
    pub count: usize,
    pub rows: Vec<JoinedRow>,
}

/// `GET /hex/join/{left}/{right}/{z}/{x}/{y}?agg=&kind=`
pub async fn hex_join_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((left, right, z, x, y)): Path<(String, String, u32, u32, u32)>,
    Query(params): Query<JoinQuery>,
) -> ApiResult<Json<JoinResponse>> {
    let tile = TileCoord::checked(z, x, y)?;
    let default_agg = parse_agg(params.agg.as_deref())?;
    let left_agg = match params.left_agg.as_deref() {
        Some(s) => parse_agg(Some(s))?,
        None => default_agg,
    };
    let right_agg = match params.right_agg.as_deref() {
        Some(s) => parse_agg(Some(s))?,
        None => default_agg,
    };
    let kind = match params.kind.as_deref() {
        Some(s) => s.parse::<JoinKind>().map_err(GeoError::from)?,
        None => JoinKind::default(),
    };
    let res = resolution_for(&state, params.res, z)?;

    let left_grid = state.raster(&left).await?;
    let right_grid = state.raster(&right).await?;
    let decimation = state.decimation;

    let rows = blocking(move || {
        let l = hex_table_for_tile(&left_grid, &tile, res, &decimation);
        let r = hex_table_for_tile(&right_grid, &tile, res, &decimation);
        Ok(join(&l, &r, left_agg, right_agg, kind)?)
    })
    .await?;

    Ok(Json(JoinResponse {
        left,
        right,
        tile,
        resolution: u8::from(res),
        kind,
        count: rows.len(),
        rows,
    }))
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BatchHexRequest {
    pub source: String,
    pub tiles: Vec<TileCoord>,
    #[serde(default)]
    pub agg: Aggregation,
    /// Fixed resolution; otherwise picked per tile from its zoom.
    #[serde(default)]
    pub res: Option<u8>,
    #[serde(default)]
    pub max_workers: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct BatchTileFailure {
    pub index: usize,
    pub tile: TileCoord,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchHexResponse {
    pub source: String,
    pub agg: Aggregation,
    pub tiles: usize,
    pub succeeded: usize,
    pub count: usize,
    pub rows: Vec<HexRow>,
    pub failures: Vec<BatchTileFailure>,
}

/// `POST /batch/hex`: aggregate many tiles of one source in parallel.
///
/// Tiles that fail are skipped and listed in `failures`; rows of the
/// remaining tiles are concatenated.
pub async fn batch_hex_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<BatchHexRequest>,
) -> ApiResult<Json<BatchHexResponse>> {
    if request.tiles.len() > MAX_BATCH_TILES {
        return Err(GeoError::invalid(
            "tiles",
            format!("{} tiles exceeds the limit of {}", request.tiles.len(), MAX_BATCH_TILES),
        )
        .into());
    }
    let fixed_res = request.res.map(to_resolution).transpose().map_err(GeoError::from)?;
    let max_workers = request
        .max_workers
        .unwrap_or(state.settings.max_workers)
        .min(MAX_BATCH_WORKERS);

    let grid = state.raster(&request.source).await?;
    let heuristic = state.resolution;
    let decimation = state.decimation;
    let agg = request.agg;
    let tiles = request.tiles.clone();
    let total = tiles.len();

    let outcome = blocking(move || {
        let outcome = run_parallel(
            tiles,
            max_workers,
            |t: TileCoord| -> GeoResult<Vec<HexRow>> {
                let tile = TileCoord::checked(t.z, t.x, t.y)?;
                let res = fixed_res.unwrap_or_else(|| heuristic.resolution_for_zoom(tile.z as f64));
                Ok(hex_table_for_tile(&grid, &tile, res, &decimation).to_rows(agg))
            },
            FailurePolicy::Skip,
        )?;
        Ok(outcome)
    })
    .await?;

    let failures: Vec<BatchTileFailure> = outcome
        .failures
        .iter()
        .map(|f| BatchTileFailure {
            index: f.index,
            tile: request.tiles[f.index],
            error: f.error.to_string(),
        })
        .collect();
    let succeeded = outcome.successes.len();
    let rows = outcome.concat();

    info!(
        source = %request.source,
        tiles = total,
        succeeded,
        failed = failures.len(),
        rows = rows.len(),
        "Batch hex aggregation complete"
    );

    Ok(Json(BatchHexResponse {
        source: request.source,
        agg,
        tiles: total,
        succeeded,
        count: rows.len(),
        rows,
        failures,
    }))
}
