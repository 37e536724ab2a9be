//! Source registry loaded from `sources.yaml`.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use hexgrid::ResolutionHeuristic;
use raster::Colormap;
use serde::Deserialize;
use tracing::{debug, info};

/// Root of the YAML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub resolution: ResolutionConfig,
    /// Extra colormaps, looked up before the built-in ones.
    #[serde(default)]
    pub colormaps: Vec<Colormap>,
    #[serde(default)]
    pub sources: HashMap<String, SourceConfig>,
}

/// One raster dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub uri: String,
    #[serde(default)]
    pub colormap: Option<String>,
    #[serde(default)]
    pub vmin: Option<f32>,
    #[serde(default)]
    pub vmax: Option<f32>,
    /// Overrides the no-data value stored in the file.
    #[serde(default)]
    pub nodata: Option<f32>,
}

/// Zoom → H3 resolution parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_offset")]
    pub offset: f64,
    #[serde(default = "default_divisor")]
    pub divisor: f64,
    #[serde(default = "default_min_res")]
    pub min_res: u8,
    #[serde(default = "default_max_res")]
    pub max_res: u8,
}

fn default_offset() -> f64 {
    3.0
}

fn default_divisor() -> f64 {
    1.5
}

fn default_min_res() -> u8 {
    2
}

fn default_max_res() -> u8 {
    12
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            offset: default_offset(),
            divisor: default_divisor(),
            min_res: default_min_res(),
            max_res: default_max_res(),
        }
    }
}

impl ResolutionConfig {
    pub fn heuristic(&self) -> Result<ResolutionHeuristic> {
        ResolutionHeuristic::new(self.offset, self.divisor, self.min_res, self.max_res)
            .context("Invalid resolution settings")
    }
}

impl ServiceConfig {
    /// Parse YAML text. Relative source paths are resolved against `base_dir`.
    pub fn from_yaml(yaml: &str, base_dir: Option<&Path>) -> Result<Self> {
        let mut config: ServiceConfig =
            serde_yaml::from_str(yaml).context("Failed to parse sources config")?;

        for cmap in &config.colormaps {
            cmap.validate()
                .with_context(|| format!("Invalid colormap '{}'", cmap.name))?;
        }

        if let Some(base) = base_dir {
            for source in config.sources.values_mut() {
                source.uri = resolve_uri(&source.uri, base);
            }
        }

        for (name, source) in &config.sources {
            if let (Some(vmin), Some(vmax)) = (source.vmin, source.vmax) {
                anyhow::ensure!(vmin < vmax, "Source '{}' has vmin >= vmax", name);
            }
            debug!(source = %name, uri = %source.uri, "Configured source");
        }

        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_yaml(&yaml, path.parent())?;
        info!(
            path = %path.display(),
            sources = config.sources.len(),
            colormaps = config.colormaps.len(),
            "Loaded sources config"
        );
        Ok(config)
    }
}

/// Join relative local paths onto `base`; URLs and absolute paths pass through.
fn resolve_uri(uri: &str, base: &Path) -> String {
    if uri.contains("://") || Path::new(uri).is_absolute() {
        uri.to_string()
    } else {
        base.join(uri).display().to_string()
    }
}
