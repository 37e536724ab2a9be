//! Router-level tests against a GeoTIFF written to a temp dir.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use batch::{FetchConfig, Fetcher};
use geo_common::BoundingBox;
use hexmap_api::{
    build_router,
    config::ServiceConfig,
    state::{AppState, ServiceSettings},
};
use raster::{write_geotiff, RasterGrid};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

/// 80×80 grid over lon/lat -10..10, value = column index.
fn setup() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let bbox = BoundingBox::new(-10.0, -10.0, 10.0, 10.0);
    let data = (0..80 * 80).map(|i| (i % 80) as f32).collect();
    let grid = RasterGrid::from_bounds(&bbox, 80, 80, data).unwrap();
    std::fs::write(dir.path().join("cols.tif"), write_geotiff(&grid).unwrap()).unwrap();

    let yaml = r#"
sources:
  cols:
    uri: cols.tif
    colormap: viridis
    vmin: 0
    vmax: 79
"#;
    let config = ServiceConfig::from_yaml(yaml, Some(dir.path())).unwrap();
    let settings = ServiceSettings {
        tile_size: 64,
        max_workers: 2,
        viewport_px: 1024,
    };
    let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
    let state = Arc::new(AppState::new(config, settings, fetcher).unwrap());
    (dir, build_router(state))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (_dir, app) = setup();
    let (status, json) = get_json(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sources"], 1);
}

#[tokio::test]
async fn test_tiles_for_bbox() {
    let (_dir, app) = setup();
    let (status, json) = get_json(&app, "/tiles/bbox?bbox=-180,-85,180,85&zoom=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 16);
    assert_eq!(json["tiles"].as_array().unwrap().len(), 16);

    let (status, json) = get_json(&app, "/tiles/bbox?zoom=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "MissingParameter");

    let (status, _) = get_json(&app, "/tiles/bbox?bbox=-180,-85,180,85&zoom=20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_h3_resolution_and_cover() {
    let (_dir, app) = setup();
    let (status, json) = get_json(&app, "/h3/resolution?zoom=9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["resolution"], 9);

    let (status, json) = get_json(&app, "/h3/resolution").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "MissingParameter");

    let (status, json) = get_json(&app, "/h3/cover?bbox=0,0,0.5,0.5&res=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["resolution"], 5);
    assert!(json["count"].as_u64().unwrap() > 0);

    let (status, _) = get_json(&app, "/h3/cover?bbox=0,0,0.5,0.5&res=16").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_png_tile() {
    let (_dir, app) = setup();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/raster/cols/2/1/1.png?colormap=magma")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_raster_errors() {
    let (_dir, app) = setup();
    let (status, json) = get_json(&app, "/raster/missing/2/1/1.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "SourceNotFound");

    let (status, json) = get_json(&app, "/raster/cols/2/1/1.png?colormap=rainbow").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "ColormapNotFound");

    let (status, json) = get_json(&app, "/raster/cols/2/9/1.png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidTile");

    let (status, _) = get_json(&app, "/raster/cols/2/1/1.png?vmin=5&vmax=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_array_tile_is_channel_first() {
    let (_dir, app) = setup();
    let (status, json) = get_json(&app, "/raster/cols/2/1/1/array").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["shape"], json!([4, 64, 64]));
    assert_eq!(json["data"].as_array().unwrap().len(), 4 * 64 * 64);
}

#[tokio::test]
async fn test_hex_tile() {
    let (_dir, app) = setup();
    // z5 tile covering lon -11.25..0, lat 0..11.2
    let (status, json) = get_json(&app, "/hex/cols/5/15/15?agg=count&res=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["resolution"], 3);
    assert_eq!(json["agg"], "count");
    let rows = json["rows"].as_array().unwrap();
    assert!(!rows.is_empty());
    let total: u64 = rows.iter().map(|r| r["count"].as_u64().unwrap()).sum();
    assert!(total >= 1);

    // Row centers stay on the grid's lon -10..0, lat 0..10 quarter.
    for row in rows {
        let (lat, lng) = (row["lat"].as_f64().unwrap(), row["lng"].as_f64().unwrap());
        assert!((-11.0..=1.0).contains(&lng), "lng {lng}");
        assert!((-1.0..=11.0).contains(&lat), "lat {lat}");
    }

    // far away from the grid
    let (status, json) = get_json(&app, "/hex/cols/5/30/5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);

    let (status, json) = get_json(&app, "/hex/cols/5/15/15?agg=median").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidParameter");
}

#[tokio::test]
async fn test_self_join_matches() {
    let (_dir, app) = setup();
    let (status, hex) = get_json(&app, "/hex/cols/5/15/15?res=4").await;
    assert_eq!(status, StatusCode::OK);
    let (status, joined) = get_json(&app, "/hex/join/cols/cols/5/15/15?res=4&kind=inner").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(joined["count"], hex["count"]);
    for row in joined["rows"].as_array().unwrap() {
        assert_eq!(row["left"], row["right"]);
    }

    let (status, json) = get_json(&app, "/hex/join/cols/cols/5/15/15?kind=outer").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidParameter");
}

#[tokio::test]
async fn test_batch_hex_skips_bad_tiles() {
    let (_dir, app) = setup();
    let body = json!({
        "source": "cols",
        "agg": "sum",
        "res": 3,
        "max_workers": 2,
        "tiles": [
            {"z": 5, "x": 15, "y": 15},
            {"z": 5, "x": 16, "y": 15},
            {"z": 30, "x": 0, "y": 0}
        ]
    });
    let (status, json) = post_json(&app, "/batch/hex", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tiles"], 3);
    assert_eq!(json["succeeded"], 2);
    let failures = json["failures"].as_array().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["index"], 2);
    assert!(json["count"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_batch_rejects_zero_workers() {
    let (_dir, app) = setup();
    let body = json!({"source": "cols", "max_workers": 0, "tiles": [{"z": 1, "x": 0, "y": 0}]});
    let (status, json) = post_json(&app, "/batch/hex", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "InvalidParameter");
}
