//! Byte fetching from HTTP(S) URLs and local paths.
//!
//! Requests are single-shot: a failed request is reported, not retried.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::{run_concurrent, BatchError, BatchOutcome, BatchResult, FailurePolicy};

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Whole-request timeout
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("hexmap/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> BatchResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetch the full body behind `uri`.
    ///
    /// `http://` and `https://` go over the network, `file://` URIs and bare
    /// paths are read from disk.
    #[instrument(skip(self))]
    pub async fn fetch_bytes(&self, uri: &str) -> BatchResult<Bytes> {
        if is_remote(uri) {
            let response = self.client.get(uri).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(BatchError::Status {
                    status: status.as_u16(),
                    url: uri.to_string(),
                });
            }
            let body = response.bytes().await?;
            debug!(bytes = body.len(), "Fetched remote object");
            Ok(body)
        } else {
            let path = local_path(uri);
            let body = tokio::fs::read(path).await?;
            debug!(bytes = body.len(), path = %path.display(), "Read local object");
            Ok(Bytes::from(body))
        }
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, uri: &str) -> BatchResult<T> {
        let body = self.fetch_bytes(uri).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch several URIs with at most `max_workers` requests in flight.
    ///
    /// Successes are `(uri, body)` pairs in completion order.
    pub async fn fetch_many(
        &self,
        uris: Vec<String>,
        max_workers: usize,
        policy: FailurePolicy,
    ) -> BatchResult<BatchOutcome<(String, Bytes), BatchError>> {
        run_concurrent(
            uris,
            max_workers,
            |uri| async move {
                let body = self.fetch_bytes(&uri).await?;
                Ok::<_, BatchError>((uri, body))
            },
            policy,
        )
        .await
    }
}

fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

fn local_path(uri: &str) -> &Path {
    Path::new(uri.strip_prefix("file://").unwrap_or(uri))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_kinds() {
        assert!(is_remote("https://example.com/a.tif"));
        assert!(!is_remote("/data/a.tif"));
        assert_eq!(local_path("file:///data/a.tif"), Path::new("/data/a.tif"));
        assert_eq!(local_path("data/a.tif"), Path::new("data/a.tif"));
    }

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item.json");
        std::fs::write(&path, br#"{"id": "abc"}"#).unwrap();

        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let uri = format!("file://{}", path.display());
        let bytes = fetcher.fetch_bytes(&uri).await.unwrap();
        assert_eq!(bytes.len(), 13);

        let value: serde_json::Value = fetcher.fetch_json(path.to_str().unwrap()).await.unwrap();
        assert_eq!(value["id"], "abc");
    }

    #[tokio::test]
    async fn test_fetch_many_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.bin");
        std::fs::write(&good, [1u8, 2, 3]).unwrap();
        let missing = dir.path().join("missing.bin");

        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let uris = vec![
            good.display().to_string(),
            missing.display().to_string(),
            good.display().to_string(),
        ];
        let outcome = fetcher.fetch_many(uris, 2, FailurePolicy::Skip).await.unwrap();
        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert!(matches!(outcome.failures[0].error, BatchError::Io(_)));
    }
}
