//! Bulk prefetch of every manifest resource not yet cached.

use std::collections::HashSet;

use tracing::info;

use crate::error::CacheResult;
use crate::manifest::ResourceManifest;
use crate::network::Fetcher;
use crate::origin::Origin;
use crate::request::Request;
use crate::storage::{CacheStorage, RegionNames};

/// Fetch and store every manifest key missing from the persistent region.
/// Returns the keys fetched. The bulk fetch is all-or-nothing.
pub async fn download_offline(
    storage: &dyn CacheStorage,
    regions: &RegionNames,
    origin: &Origin,
    manifest: &ResourceManifest,
    fetcher: &dyn Fetcher,
) -> CacheResult<Vec<String>> {
    let persistent = storage.open(&regions.persistent).await?;
    let cached: HashSet<String> = persistent
        .keys()
        .await?
        .iter()
        .map(|url| origin.resource_key(url))
        .collect();

    let missing: Vec<String> = manifest
        .keys()
        .filter(|key| !cached.contains(*key))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        return Ok(missing);
    }

    let requests: Vec<Request> = missing
        .iter()
        .map(|key| Request::get(origin.resolve(key)))
        .collect();
    persistent.add_all(&requests, fetcher).await?;

    info!(count = missing.len(), "Downloaded resources for offline use");
    Ok(missing)
}
