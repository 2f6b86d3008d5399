//! Client-side cache manager for a packaged web application.
//!
//! A deployment ships a resource manifest (logical key → fingerprint) and a
//! shell set. The worker stages the shell on install, reconciles the
//! persistent cache against the previous manifest on activation, and then
//! serves manifest resources from cache with network fallback.
//!
//! Storage and network access go through the `CacheStorage`, `Region` and
//! `Fetcher` traits, and client signals through `ClientController`, so the
//! same logic runs against `MemoryStorage` in tests, `DiskStorage` in the
//! CLI, or any host-provided binding.

pub mod error;
pub mod install;
pub mod intercept;
pub mod manifest;
pub mod network;
pub mod origin;
pub mod prefetch;
pub mod reconcile;
pub mod request;
pub mod storage;
pub mod worker;

pub use error::{CacheError, CacheResult};
pub use intercept::{Intercepted, Interceptor, ResponseSource};
pub use manifest::{Deployment, ResourceManifest, ShellSet};
pub use network::{Fetcher, HttpFetcher};
pub use origin::{Origin, ROOT_KEY};
pub use reconcile::{
    ActivationOutcome, ActivationState, ReconcileKind, ReconcileReport, Reconciler,
    MANIFEST_RECORD_KEY,
};
pub use request::{Request, Response};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage, Region, RegionNames, StorageOp};
pub use worker::{ClientController, EventOutcome, LifecycleEvent, Message, Worker};
