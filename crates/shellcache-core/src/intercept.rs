//! Request interception for manifest resources.
//!
//! The root document is served network-first so a new deployment is picked
//! up as soon as the network allows; every other manifest resource is served
//! cache-first and cached lazily on a successful fetch.

use tracing::{debug, warn};

use crate::error::CacheResult;
use crate::manifest::ResourceManifest;
use crate::network::Fetcher;
use crate::origin::{Origin, ROOT_KEY};
use crate::request::{Request, Response};
use crate::storage::{CacheStorage, RegionNames};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
}

#[derive(Debug, Clone)]
pub struct Intercepted {
    pub key: String,
    pub response: Response,
    pub source: ResponseSource,
}

pub struct Interceptor<'a> {
    pub storage: &'a dyn CacheStorage,
    pub regions: &'a RegionNames,
    pub origin: &'a Origin,
    pub manifest: &'a ResourceManifest,
    pub fetcher: &'a dyn Fetcher,
}

impl Interceptor<'_> {
    /// Answer a request, or return `None` to let the platform handle it.
    pub async fn handle(&self, request: &Request) -> CacheResult<Option<Intercepted>> {
        if !request.is_get() {
            return Ok(None);
        }
        let key = self.origin.request_key(&request.url);
        if !self.manifest.contains(&key) {
            debug!(url = %request.url, "Not a manifest resource; passing through");
            return Ok(None);
        }

        let (response, source) = if key == ROOT_KEY {
            self.online_first(request).await?
        } else {
            self.cache_first(request).await?
        };
        Ok(Some(Intercepted {
            key,
            response,
            source,
        }))
    }

    async fn online_first(&self, request: &Request) -> CacheResult<(Response, ResponseSource)> {
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let persistent = self.storage.open(&self.regions.persistent).await?;
                if let Err(e) = persistent.put(&request.url, response.clone()).await {
                    warn!(url = %request.url, error = %e, "Failed to cache root document");
                }
                Ok((response, ResponseSource::Network))
            }
            Err(network_error) => {
                let persistent = self.storage.open(&self.regions.persistent).await?;
                match persistent.get(&request.url).await? {
                    Some(cached) => {
                        debug!(url = %request.url, error = %network_error, "Offline; serving cached root document");
                        Ok((cached, ResponseSource::Cache))
                    }
                    None => Err(network_error),
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> CacheResult<(Response, ResponseSource)> {
        let persistent = self.storage.open(&self.regions.persistent).await?;
        if let Some(cached) = persistent.get(&request.url).await? {
            return Ok((cached, ResponseSource::Cache));
        }

        let response = self.fetcher.fetch(request).await?;
        if response.is_ok() {
            if let Err(e) = persistent.put(&request.url, response.clone()).await {
                warn!(url = %request.url, error = %e, "Failed to cache resource");
            }
        }
        Ok((response, ResponseSource::Network))
    }
}
