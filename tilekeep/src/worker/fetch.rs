//! Network fetch abstraction for testability.
//!
//! The worker never calls the network directly; it goes through the
//! [`TileFetcher`] trait. This is the worker's explicit interception point:
//! response timing and hit/miss accounting happen around these calls, so no
//! global fetch machinery is patched and tests can inject a mock.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from a network tile fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// Performs HTTP GET requests for tiles and static assets.
///
/// Implementations must be `Send + Sync`; the worker shares one fetcher
/// across concurrent preload tasks. Uses `Pin<Box<dyn Future>>` so the
/// fetcher can be held as `Arc<dyn TileFetcher>`.
pub trait TileFetcher: Send + Sync {
    /// Fetch the resource at `url`, returning the response body.
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// Default timeout for tile requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Real fetcher backed by reqwest.
pub struct HttpTileFetcher {
    client: reqwest::Client,
}

impl HttpTileFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl TileFetcher for HttpTileFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Http(format!("Request failed: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            response
                .bytes()
                .await
                .map_err(|e| FetchError::Http(format!("Failed to read response: {}", e)))
        })
    }
}
