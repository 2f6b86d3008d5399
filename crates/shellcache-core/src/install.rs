//! Install step: stage the shell set before the worker can activate.

use tracing::info;

use crate::error::CacheResult;
use crate::manifest::ShellSet;
use crate::network::Fetcher;
use crate::origin::Origin;
use crate::request::Request;
use crate::storage::{CacheStorage, RegionNames};

/// Fetch every shell key into the staging region, bypassing HTTP caches.
/// All-or-nothing: a single failed fetch fails the install.
pub async fn install(
    storage: &dyn CacheStorage,
    regions: &RegionNames,
    origin: &Origin,
    shell: &ShellSet,
    fetcher: &dyn Fetcher,
) -> CacheResult<()> {
    let staging = storage.open(&regions.staging).await?;
    let requests: Vec<Request> = shell
        .keys()
        .map(|key| Request::get(origin.resolve(key)).reload())
        .collect();

    staging.add_all(&requests, fetcher).await?;
    info!(region = %regions.staging, count = requests.len(), "Staged shell files");
    Ok(())
}
