//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shellcache_core::{
    CacheError, CacheResult, CacheStorage, ClientController, Fetcher, MemoryStorage, Origin,
    Region, Request, ResourceManifest, Response,
};

pub const ORIGIN: &str = "https://app.test";

pub fn origin() -> Origin {
    Origin::parse(ORIGIN).unwrap()
}

pub fn url(key: &str) -> String {
    origin().resolve(key)
}

pub fn manifest(pairs: &[(&str, &str)]) -> ResourceManifest {
    pairs.iter().copied().collect()
}

/// Put `(key, body)` pairs into a region of `storage`.
pub async fn seed(storage: &MemoryStorage, region: &str, entries: &[(&str, &str)]) {
    let handle = storage.open(region).await.unwrap();
    for (key, body) in entries {
        handle.put(&url(key), Response::ok(*body)).await.unwrap();
    }
}

/// Logical keys currently in a region, sorted.
pub async fn keys_of(storage: &MemoryStorage, region: &str) -> Vec<String> {
    let origin = origin();
    let mut keys: Vec<String> = storage
        .entries(region)
        .await
        .unwrap_or_default()
        .keys()
        .map(|u| origin.resource_key(u))
        .collect();
    keys.sort();
    keys
}

pub async fn body_of(storage: &MemoryStorage, region: &str, key: &str) -> Option<String> {
    storage
        .entries(region)
        .await
        .and_then(|entries| entries.get(&url(key)).map(Response::text))
}

/// Fetcher answering from a fixed table. Unknown URLs get a 404.
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    requests: Mutex<Vec<Request>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, key: &str, body: &str) -> &Self {
        self.serve_url(&url(key), Response::ok(body))
    }

    pub fn serve_url(&self, url: &str, response: Response) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: &Request) -> CacheResult<Response> {
        self.requests.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::FetchFailed {
                url: request.url.clone(),
                reason: "offline".to_string(),
            });
        }
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Response::new(404, "not found")))
    }
}

#[derive(Default)]
pub struct RecordingClients {
    pub claims: AtomicUsize,
    pub skips: AtomicUsize,
}

impl RecordingClients {
    pub fn claims(&self) -> usize {
        self.claims.load(Ordering::SeqCst)
    }

    pub fn skips(&self) -> usize {
        self.skips.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientController for RecordingClients {
    async fn claim(&self) -> CacheResult<()> {
        self.claims.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn skip_waiting(&self) -> CacheResult<()> {
        self.skips.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Storage wrapper that fails the `fail_at`-th operation (0-based) once.
/// Existence probes are not counted.
pub struct FailingStorage {
    inner: MemoryStorage,
    fail_at: usize,
    ops: Arc<AtomicUsize>,
}

impl FailingStorage {
    pub fn new(inner: MemoryStorage, fail_at: usize) -> Self {
        Self {
            inner,
            fail_at,
            ops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn ops(&self) -> usize {
        self.ops.load(Ordering::SeqCst)
    }
}

fn tick(ops: &AtomicUsize, fail_at: usize) -> CacheResult<()> {
    let n = ops.fetch_add(1, Ordering::SeqCst);
    if n == fail_at {
        return Err(CacheError::Storage(format!("injected failure at op {}", n)));
    }
    Ok(())
}

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, name: &str) -> CacheResult<Box<dyn Region>> {
        tick(&self.ops, self.fail_at)?;
        let inner = self.inner.open(name).await?;
        Ok(Box::new(FailingRegion {
            inner,
            fail_at: self.fail_at,
            ops: Arc::clone(&self.ops),
        }))
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        tick(&self.ops, self.fail_at)?;
        self.inner.delete(name).await
    }
}

struct FailingRegion {
    inner: Box<dyn Region>,
    fail_at: usize,
    ops: Arc<AtomicUsize>,
}

#[async_trait]
impl Region for FailingRegion {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, url: &str) -> CacheResult<Option<Response>> {
        tick(&self.ops, self.fail_at)?;
        self.inner.get(url).await
    }

    async fn put(&self, url: &str, response: Response) -> CacheResult<()> {
        tick(&self.ops, self.fail_at)?;
        self.inner.put(url, response).await
    }

    async fn delete(&self, url: &str) -> CacheResult<bool> {
        tick(&self.ops, self.fail_at)?;
        self.inner.delete(url).await
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        tick(&self.ops, self.fail_at)?;
        self.inner.keys().await
    }
}
