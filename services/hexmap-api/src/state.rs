//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use batch::Fetcher;
use geo_common::{GeoError, GeoResult};
use hexgrid::{DecimationHeuristic, ResolutionHeuristic};
use raster::{read_geotiff, Colormap, RasterGrid};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{ServiceConfig, SourceConfig};

/// Runtime knobs that come from the command line rather than the YAML file.
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub tile_size: usize,
    pub max_workers: usize,
    /// Viewport edge in pixels used to turn a bbox into a zoom level.
    pub viewport_px: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            tile_size: 256,
            max_workers: 4,
            viewport_px: 1024,
        }
    }
}

pub struct AppState {
    pub sources: HashMap<String, SourceConfig>,
    pub colormaps: HashMap<String, Colormap>,
    pub resolution: ResolutionHeuristic,
    pub decimation: DecimationHeuristic,
    pub settings: ServiceSettings,
    pub fetcher: Fetcher,
    /// Decoded rasters, kept for the process lifetime.
    rasters: RwLock<HashMap<String, Arc<RasterGrid>>>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        settings: ServiceSettings,
        fetcher: Fetcher,
    ) -> anyhow::Result<Self> {
        let resolution = config.resolution.heuristic()?;
        anyhow::ensure!(settings.max_workers > 0, "max_workers must be at least 1");
        anyhow::ensure!(settings.tile_size > 0, "tile_size must be positive");

        let colormaps = config
            .colormaps
            .into_iter()
            .map(|c| (c.name.to_ascii_lowercase(), c))
            .collect();

        Ok(Self {
            sources: config.sources,
            colormaps,
            resolution,
            decimation: DecimationHeuristic::default(),
            settings,
            fetcher,
            rasters: RwLock::new(HashMap::new()),
        })
    }

    pub fn source(&self, name: &str) -> GeoResult<&SourceConfig> {
        self.sources
            .get(name)
            .ok_or_else(|| GeoError::SourceNotFound(name.to_string()))
    }

    /// Configured colormap by name, then the built-in ramps.
    pub fn colormap(&self, name: &str) -> GeoResult<Colormap> {
        if let Some(cmap) = self.colormaps.get(&name.to_ascii_lowercase()) {
            return Ok(cmap.clone());
        }
        Ok(Colormap::named(name)?)
    }

    /// Load a source's raster, decoding it on first use.
    #[instrument(skip(self))]
    pub async fn raster(&self, name: &str) -> GeoResult<Arc<RasterGrid>> {
        if let Some(grid) = self.rasters.read().await.get(name) {
            return Ok(grid.clone());
        }

        let source = self.source(name)?;
        let bytes = self.fetcher.fetch_bytes(&source.uri).await?;
        let nodata = source.nodata;
        let grid = tokio::task::spawn_blocking(move || {
            read_geotiff(&bytes).map(|g| match nodata {
                Some(v) => g.with_nodata(Some(v)),
                None => g,
            })
        })
        .await
        .map_err(|e| GeoError::InternalError(e.to_string()))??;

        info!(
            source = %name,
            width = grid.width,
            height = grid.height,
            "Loaded raster source"
        );

        let grid = Arc::new(grid);
        // A concurrent request may have loaded it first; keep the existing one.
        let mut rasters = self.rasters.write().await;
        Ok(rasters
            .entry(name.to_string())
            .or_insert(grid)
            .clone())
    }

    pub async fn loaded_sources(&self) -> Vec<String> {
        let mut names: Vec<_> = self.rasters.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
