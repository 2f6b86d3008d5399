//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::debug;

use super::Fetcher;
use crate::error::{CacheError, CacheResult};
use crate::request::{Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request
const USER_AGENT: &str = concat!("shellcache/", env!("CARGO_PKG_VERSION"));

/// Fetcher for real network requests.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> CacheResult<Self> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> CacheResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> CacheResult<Response> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            CacheError::InvalidRequest(format!("method {:?}", request.method))
        })?;

        let mut builder = self.client.request(method, &request.url);
        if request.reload {
            builder = builder
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut cached = Response::new(status, Vec::new());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                cached = cached.with_header(name.as_str(), value);
            }
        }
        cached.body = response.bytes().await?.to_vec();

        debug!(url = %request.url, status, bytes = cached.body.len(), "Fetched");
        Ok(cached)
    }
}
