//! Feed retrieval over HTTP.

use std::time::Duration;

use crate::error::FetchError;

/// Per-request timeout. A slow feed fails on its own without delaying others.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("shiftsync/", env!("CARGO_PKG_VERSION"));

/// Fetches raw feed text from a subscription URL.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    /// Fetcher with the standard per-request timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    /// Fetcher with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError {
                status: None,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(FeedFetcher { client })
    }

    /// Fetch the feed body as text. Any failure mode (bad URL, network error,
    /// timeout, non-2xx status) comes back as a typed [`FetchError`].
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let url = url::Url::parse(url).map_err(|e| FetchError {
            status: None,
            message: format!("invalid feed url '{url}': {e}"),
        })?;

        let response = self.client.get(url).send().await.map_err(|e| FetchError {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError {
                status: Some(status.as_u16()),
                message: format!("HTTP {status}"),
            });
        }

        response.text().await.map_err(|e| FetchError {
            status: Some(status.as_u16()),
            message: format!("failed to read feed body: {e}"),
        })
    }
}
