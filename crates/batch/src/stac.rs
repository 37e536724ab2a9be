//! Minimal STAC API search client.
//!
//! Only the fields the tile pipeline needs are modelled. Item properties
//! are kept as raw JSON.

use std::collections::{HashMap, HashSet};

use geo_common::{BoundingBox, TileCoord};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{run_concurrent, BatchError, BatchOutcome, BatchResult, FailurePolicy, Fetcher};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StacAsset {
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StacItem {
    pub id: String,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

impl StacItem {
    pub fn datetime(&self) -> Option<&str> {
        self.properties.get("datetime").and_then(|v| v.as_str())
    }

    /// First asset whose roles include `role`, falling back to an asset keyed by `role`.
    pub fn asset_with_role(&self, role: &str) -> Option<&StacAsset> {
        self.assets
            .values()
            .find(|a| a.roles.iter().any(|r| r == role))
            .or_else(|| self.assets.get(role))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// RFC 3339 instant or `start/end` interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SearchRequest {
    pub fn with_bbox(&self, bbox: &BoundingBox) -> Self {
        Self {
            bbox: Some([bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y]),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct StacClient {
    fetcher: Fetcher,
    base_url: String,
}

impl StacClient {
    pub fn new(fetcher: Fetcher, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { fetcher, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base}/search`
    #[instrument(skip(self), fields(base = %self.base_url))]
    pub async fn search(&self, request: &SearchRequest) -> BatchResult<ItemCollection> {
        let url = format!("{}/search", self.base_url);
        let response = self.fetcher.client().post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BatchError::Status {
                status: status.as_u16(),
                url,
            });
        }
        let collection: ItemCollection = response.json().await?;
        debug!(items = collection.features.len(), "STAC search complete");
        Ok(collection)
    }

    /// Run one search per tile, narrowing `request` to each tile's bounds.
    ///
    /// Items returned for several tiles appear once. Tiles whose search
    /// failed are reported in the outcome's failures.
    pub async fn search_tiles(
        &self,
        tiles: &[TileCoord],
        request: &SearchRequest,
        max_workers: usize,
    ) -> BatchResult<BatchOutcome<StacItem, BatchError>> {
        let outcome = run_concurrent(
            tiles.to_vec(),
            max_workers,
            |tile| async move {
                let narrowed = request.with_bbox(&tile.bounds());
                self.search(&narrowed).await
            },
            FailurePolicy::Skip,
        )
        .await?;

        let mut seen = HashSet::new();
        let successes = outcome
            .successes
            .into_iter()
            .flat_map(|c| c.features)
            .filter(|item| seen.insert(item.id.clone()))
            .collect();

        Ok(BatchOutcome {
            successes,
            failures: outcome.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = r#"{
        "type": "Feature",
        "stac_version": "1.0.0",
        "id": "S2B_T33UUP_20240601",
        "collection": "sentinel-2-l2a",
        "bbox": [12.0, 52.0, 13.5, 53.0],
        "properties": {"datetime": "2024-06-01T10:15:00Z", "eo:cloud_cover": 3.2},
        "assets": {
            "B04": {"href": "https://example.com/B04.tif", "type": "image/tiff; application=geotiff", "roles": ["data"]},
            "thumbnail": {"href": "https://example.com/thumb.png", "roles": ["thumbnail"]}
        }
    }"#;

    #[test]
    fn test_item_parses() {
        let item: StacItem = serde_json::from_str(ITEM).unwrap();
        assert_eq!(item.id, "S2B_T33UUP_20240601");
        assert_eq!(item.datetime(), Some("2024-06-01T10:15:00Z"));
        assert_eq!(item.assets.len(), 2);
        assert_eq!(item.asset_with_role("data").unwrap().href, "https://example.com/B04.tif");
        assert!(item.asset_with_role("overview").is_none());
    }

    #[test]
    fn test_request_serialization_skips_empty() {
        let req = SearchRequest {
            collections: vec!["sentinel-2-l2a".into()],
            limit: Some(10),
            ..Default::default()
        };
        let json = serde_json::to_value(req.with_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0))).unwrap();
        assert_eq!(json["bbox"], serde_json::json!([0.0, 0.0, 1.0, 1.0]));
        assert!(json.get("datetime").is_none());
    }

    #[test]
    fn test_base_url_trimmed() {
        let fetcher = Fetcher::new(Default::default()).unwrap();
        let client = StacClient::new(fetcher, "https://stac.example.com/v1/");
        assert_eq!(client.base_url(), "https://stac.example.com/v1");
    }
}
