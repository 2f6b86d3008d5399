//! Named cache regions behind an async capability interface.
//!
//! This module provides:
//! - `CacheStorage` / `Region`: open, probe and delete regions; get, put,
//!   delete and list entries; bulk-fetch a batch of requests
//! - `MemoryStorage`: in-memory store with an operation journal
//! - `DiskStorage`: on-disk store, one directory per region
//!
//! Entries are keyed by absolute request URL. A handle whose region has
//! been deleted is detached: it reads as empty and refuses writes.

pub mod disk;
pub mod memory;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::network::Fetcher;
use crate::request::{Request, Response};

pub use disk::DiskStorage;
pub use memory::{MemoryStorage, StorageOp};

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a region, creating it if absent.
    async fn open(&self, name: &str) -> CacheResult<Box<dyn Region>>;

    async fn has(&self, name: &str) -> CacheResult<bool>;

    /// Delete a region and all of its entries. Returns whether it existed.
    async fn delete(&self, name: &str) -> CacheResult<bool>;
}

#[async_trait]
pub trait Region: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, url: &str) -> CacheResult<Option<Response>>;

    async fn put(&self, url: &str, response: Response) -> CacheResult<()>;

    async fn delete(&self, url: &str) -> CacheResult<bool>;

    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Fetch every request and store the responses. Nothing is stored
    /// unless every fetch succeeds with a 2xx status.
    async fn add_all(&self, requests: &[Request], fetcher: &dyn Fetcher) -> CacheResult<()> {
        let responses = try_join_all(requests.iter().map(|request| fetcher.fetch(request))).await?;

        for (request, response) in requests.iter().zip(&responses) {
            if !response.is_ok() {
                return Err(CacheError::from_status(
                    &request.url,
                    response.status,
                    &response.body,
                ));
            }
        }

        for (request, response) in requests.iter().zip(responses) {
            self.put(&request.url, response).await?;
        }
        debug!(region = self.name(), count = requests.len(), "Stored bulk fetch");
        Ok(())
    }
}

/// Default name of the long-lived region serving fetches
pub const DEFAULT_PERSISTENT_REGION: &str = "shell-app-cache";

/// Default name of the install-time staging region
pub const DEFAULT_STAGING_REGION: &str = "shell-temp-cache";

/// Default name of the region holding the stored manifest record
pub const DEFAULT_MANIFEST_REGION: &str = "shell-app-manifest";

/// The three region names a worker owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionNames {
    pub persistent: String,
    pub staging: String,
    pub manifest: String,
}

impl Default for RegionNames {
    fn default() -> Self {
        Self {
            persistent: DEFAULT_PERSISTENT_REGION.to_string(),
            staging: DEFAULT_STAGING_REGION.to_string(),
            manifest: DEFAULT_MANIFEST_REGION.to_string(),
        }
    }
}

impl RegionNames {
    pub fn validate(&self) -> CacheResult<()> {
        let names = [&self.persistent, &self.staging, &self.manifest];
        if names.iter().any(|n| n.is_empty()) {
            return Err(CacheError::Storage("region names must not be empty".into()));
        }
        if self.persistent == self.staging
            || self.persistent == self.manifest
            || self.staging == self.manifest
        {
            return Err(CacheError::Storage("region names must be distinct".into()));
        }
        Ok(())
    }

    pub fn all(&self) -> [&str; 3] {
        [
            self.persistent.as_str(),
            self.staging.as_str(),
            self.manifest.as_str(),
        ]
    }
}
