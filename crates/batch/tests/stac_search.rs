//! STAC client against an in-process search endpoint.

use axum::{http::StatusCode, routing::post, Json, Router};
use batch::{FetchConfig, Fetcher, SearchRequest, StacClient};
use geo_common::TileCoord;
use serde_json::{json, Value};

async fn search(Json(req): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let min_x = req["bbox"][0].as_f64().ok_or(StatusCode::BAD_REQUEST)?;
    if min_x >= 90.0 {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    let tile_item = format!("item-{}", min_x.round() as i64);
    Ok(Json(json!({
        "type": "FeatureCollection",
        "features": [
            {"id": "shared", "properties": {"datetime": "2024-01-01T00:00:00Z"}, "assets": {}},
            {"id": tile_item, "collection": req["collections"][0], "assets": {
                "data": {"href": "https://example.com/data.tif", "roles": ["data"]}
            }}
        ]
    })))
}

async fn spawn_server() -> String {
    let app = Router::new().route("/search", post(search));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base: &str) -> StacClient {
    StacClient::new(Fetcher::new(FetchConfig::default()).unwrap(), base)
}

#[tokio::test]
async fn test_search_posts_request() {
    let base = spawn_server().await;
    let req = SearchRequest {
        collections: vec!["landsat".into()],
        bbox: Some([10.0, 0.0, 20.0, 10.0]),
        ..Default::default()
    };
    let items = client(&base).search(&req).await.unwrap();
    assert_eq!(items.features.len(), 2);
    assert_eq!(items.features[1].id, "item-10");
    assert_eq!(items.features[1].collection.as_deref(), Some("landsat"));
    assert_eq!(items.features[0].datetime(), Some("2024-01-01T00:00:00Z"));
}

#[tokio::test]
async fn test_search_tiles_dedups_by_id() {
    let base = spawn_server().await;
    // z2 tiles with distinct western edges: -180, -90, 0
    let tiles = vec![
        TileCoord::new(2, 0, 1),
        TileCoord::new(2, 1, 1),
        TileCoord::new(2, 2, 1),
    ];
    let outcome = client(&base)
        .search_tiles(&tiles, &SearchRequest::default(), 2)
        .await
        .unwrap();
    assert!(outcome.failures.is_empty());
    let mut ids: Vec<_> = outcome.successes.iter().map(|i| i.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["item--180", "item--90", "item-0", "shared"]);
}

#[tokio::test]
async fn test_search_tiles_reports_failed_tiles() {
    let base = spawn_server().await;
    // western edge at +90 makes the server fail
    let tiles = vec![TileCoord::new(2, 0, 0), TileCoord::new(2, 3, 0)];
    let outcome = client(&base)
        .search_tiles(&tiles, &SearchRequest::default(), 4)
        .await
        .unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].index, 1);
    assert_eq!(outcome.successes.len(), 2);
}
