//! Remote file fetching for URL-backed sources

use crate::error::{Result, WorkbenchError};
use async_trait::async_trait;
use tracing::debug;

/// Body and content type of a successful fetch
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait UrlFetcher: Send + Sync {
    /// Fetch `url`; any non-success status is an error
    async fn fetch(&self, url: &str) -> Result<FetchedFile>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFile> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkbenchError::Fetch {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let bytes = response.bytes().await?.to_vec();
        debug!(url = %url, bytes = bytes.len(), "fetched remote file");

        Ok(FetchedFile { bytes, content_type })
    }
}

/// File name for a fetched body: the last path segment without query or
/// fragment, else `fallback`
pub fn file_name_from_url(url: &str, fallback: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = match without_query.find("://") {
        Some(idx) => {
            let rest = &without_query[idx + 3..];
            rest.find('/').map(|slash| &rest[slash..]).unwrap_or("")
        }
        None => without_query,
    };

    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned bodies and counts requests
    #[derive(Default)]
    pub(crate) struct MockFetcher {
        bodies: HashMap<String, Vec<u8>>,
        requests: AtomicUsize,
    }

    impl MockFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn serve(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }

        pub(crate) fn requests(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UrlFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedFile> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            match self.bodies.get(url) {
                Some(bytes) => Ok(FetchedFile {
                    bytes: bytes.clone(),
                    content_type: Some("text/csv".to_string()),
                }),
                None => Err(WorkbenchError::Fetch {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/data/people.csv?token=abc", "fallback"),
            "people.csv"
        );
        assert_eq!(file_name_from_url("https://example.com/a/b.parquet#frag", "x"), "b.parquet");
        assert_eq!(file_name_from_url("https://example.com/", "Sales"), "Sales");
        assert_eq!(file_name_from_url("https://example.com", "Sales"), "Sales");
        assert_eq!(file_name_from_url("files/orders.json", "x"), "orders.json");
    }

    #[tokio::test]
    async fn test_mock_fetcher_reports_missing_as_status() {
        let fetcher = mock::MockFetcher::new().serve("https://x/a.csv", b"a\n1\n");
        assert_eq!(fetcher.fetch("https://x/a.csv").await.unwrap().bytes, b"a\n1\n");
        let err = fetcher.fetch("https://x/b.csv").await.unwrap_err();
        assert!(matches!(err, WorkbenchError::Fetch { status: 404, .. }));
        assert_eq!(fetcher.requests(), 2);
    }
}
