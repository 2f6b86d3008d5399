//! Cache reconciliation run once per activation.
//!
//! Brings the persistent region into agreement with the current manifest:
//! entries whose fingerprint is unchanged since the stored manifest record
//! are kept, everything else is pruned, and the staged shell files are
//! copied over the result. Any failure discards all three regions so the
//! next activation starts from a clean first install.

use tracing::{debug, error, info, warn};

use crate::error::CacheResult;
use crate::manifest::ResourceManifest;
use crate::origin::Origin;
use crate::request::Response;
use crate::storage::{CacheStorage, Region, RegionNames};

/// Key of the stored manifest record inside the manifest region
pub const MANIFEST_RECORD_KEY: &str = "manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// No stored manifest record; the next activation is a first install.
    NoManifest,
    Reconciling,
    Active,
    /// The last activation failed and discarded every region.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
    FirstInstall,
    Upgrade,
}

/// What a successful reconciliation did, by logical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub kind: ReconcileKind,
    /// Entries deleted from the persistent region.
    pub pruned: Vec<String>,
    /// Entries left in place because their fingerprint is unchanged.
    pub reused: Vec<String>,
    /// Entries copied from staging into the persistent region.
    pub promoted: Vec<String>,
}

impl ReconcileReport {
    fn new(kind: ReconcileKind) -> Self {
        Self {
            kind,
            pruned: Vec::new(),
            reused: Vec::new(),
            promoted: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum ActivationOutcome {
    Active(ReconcileReport),
    /// Reconciliation failed; all regions were discarded.
    Failed(crate::error::CacheError),
}

impl ActivationOutcome {
    pub fn state(&self) -> ActivationState {
        match self {
            ActivationOutcome::Active(_) => ActivationState::Active,
            ActivationOutcome::Failed(_) => ActivationState::Failed,
        }
    }

    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            ActivationOutcome::Active(report) => Some(report),
            ActivationOutcome::Failed(_) => None,
        }
    }
}

pub struct Reconciler<'a> {
    manifest: &'a ResourceManifest,
    regions: &'a RegionNames,
}

impl<'a> Reconciler<'a> {
    pub fn new(manifest: &'a ResourceManifest, regions: &'a RegionNames) -> Self {
        Self { manifest, regions }
    }

    /// Probe the store: `Active` if a manifest record exists, else `NoManifest`.
    pub async fn state(&self, storage: &dyn CacheStorage) -> CacheResult<ActivationState> {
        if !storage.has(&self.regions.manifest).await? {
            return Ok(ActivationState::NoManifest);
        }
        let store = storage.open(&self.regions.manifest).await?;
        Ok(match store.get(MANIFEST_RECORD_KEY).await? {
            Some(_) => ActivationState::Active,
            None => ActivationState::NoManifest,
        })
    }

    /// Run reconciliation. Never returns an error: a failure discards all
    /// three regions and is reported as `ActivationOutcome::Failed`.
    pub async fn activate(
        &self,
        storage: &dyn CacheStorage,
        origin: &Origin,
    ) -> ActivationOutcome {
        match self.reconcile(storage, origin).await {
            Ok(report) => {
                info!(
                    kind = ?report.kind,
                    pruned = report.pruned.len(),
                    reused = report.reused.len(),
                    promoted = report.promoted.len(),
                    "Cache reconciled"
                );
                ActivationOutcome::Active(report)
            }
            Err(e) => {
                error!(error = %e, "Failed to upgrade cache; discarding all regions");
                self.discard(storage).await;
                ActivationOutcome::Failed(e)
            }
        }
    }

    async fn reconcile(
        &self,
        storage: &dyn CacheStorage,
        origin: &Origin,
    ) -> CacheResult<ReconcileReport> {
        let mut persistent = storage.open(&self.regions.persistent).await?;
        let staging = storage.open(&self.regions.staging).await?;
        let manifest_store = storage.open(&self.regions.manifest).await?;

        let mut report = match manifest_store.get(MANIFEST_RECORD_KEY).await? {
            None => {
                // Without a prior manifest nothing in the persistent region can be trusted
                storage.delete(&self.regions.persistent).await?;
                persistent = storage.open(&self.regions.persistent).await?;
                ReconcileReport::new(ReconcileKind::FirstInstall)
            }
            Some(record) => {
                let previous = ResourceManifest::from_json(&record.text())?;
                let mut report = ReconcileReport::new(ReconcileKind::Upgrade);
                self.prune(persistent.as_ref(), &previous, origin, &mut report)
                    .await?;
                report
            }
        };

        report.promoted = promote(staging.as_ref(), persistent.as_ref(), origin).await?;
        storage.delete(&self.regions.staging).await?;

        let record = Response::ok(self.manifest.to_json()?)
            .with_header("content-type", "application/json");
        manifest_store.put(MANIFEST_RECORD_KEY, record).await?;

        Ok(report)
    }

    async fn prune(
        &self,
        persistent: &dyn Region,
        previous: &ResourceManifest,
        origin: &Origin,
        report: &mut ReconcileReport,
    ) -> CacheResult<()> {
        for url in persistent.keys().await? {
            let key = origin.resource_key(&url);
            if self.manifest.is_unchanged_since(previous, &key) {
                debug!(key = %key, "Reusing cached entry");
                report.reused.push(key);
            } else {
                debug!(key = %key, "Pruning stale entry");
                persistent.delete(&url).await?;
                report.pruned.push(key);
            }
        }
        Ok(())
    }

    async fn discard(&self, storage: &dyn CacheStorage) {
        for name in self.regions.all() {
            if let Err(e) = storage.delete(name).await {
                warn!(region = name, error = %e, "Failed to delete region");
            }
        }
    }
}

/// Copy every staged entry into the persistent region, overwriting.
async fn promote(
    staging: &dyn Region,
    persistent: &dyn Region,
    origin: &Origin,
) -> CacheResult<Vec<String>> {
    let mut promoted = Vec::new();
    for url in staging.keys().await? {
        if let Some(response) = staging.get(&url).await? {
            persistent.put(&url, response).await?;
            promoted.push(origin.resource_key(&url));
        }
    }
    Ok(promoted)
}
