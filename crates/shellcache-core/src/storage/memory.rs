use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheStorage, Region};
use crate::error::{CacheError, CacheResult};
use crate::request::Response;

/// A mutating operation applied to a `MemoryStorage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    CreateRegion(String),
    DeleteRegion(String),
    Put { region: String, url: String },
    Delete { region: String, url: String },
}

struct RegionData {
    generation: u64,
    entries: BTreeMap<String, Response>,
}

#[derive(Default)]
struct State {
    regions: BTreeMap<String, RegionData>,
    next_generation: u64,
    journal: Vec<StorageOp>,
}

impl State {
    /// Entries of `name` if it is still the region the handle was opened on.
    fn attached(&mut self, name: &str, generation: u64) -> Option<&mut BTreeMap<String, Response>> {
        self.regions
            .get_mut(name)
            .filter(|data| data.generation == generation)
            .map(|data| &mut data.entries)
    }
}

/// In-memory cache storage. Clones share the same regions.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutating operation applied so far, in order.
    pub async fn journal(&self) -> Vec<StorageOp> {
        self.state.lock().await.journal.clone()
    }

    pub async fn clear_journal(&self) {
        self.state.lock().await.journal.clear();
    }

    /// Snapshot of a region's entries, or `None` if it does not exist.
    pub async fn entries(&self, name: &str) -> Option<BTreeMap<String, Response>> {
        self.state
            .lock()
            .await
            .regions
            .get(name)
            .map(|data| data.entries.clone())
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> CacheResult<Box<dyn Region>> {
        let mut state = self.state.lock().await;
        let generation = match state.regions.get(name) {
            Some(data) => data.generation,
            None => {
                state.next_generation += 1;
                let generation = state.next_generation;
                state.regions.insert(
                    name.to_string(),
                    RegionData {
                        generation,
                        entries: BTreeMap::new(),
                    },
                );
                state.journal.push(StorageOp::CreateRegion(name.to_string()));
                generation
            }
        };
        Ok(Box::new(MemoryRegion {
            name: name.to_string(),
            generation,
            state: Arc::clone(&self.state),
        }))
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        Ok(self.state.lock().await.regions.contains_key(name))
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        let mut state = self.state.lock().await;
        let existed = state.regions.remove(name).is_some();
        state.journal.push(StorageOp::DeleteRegion(name.to_string()));
        Ok(existed)
    }
}

struct MemoryRegion {
    name: String,
    generation: u64,
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Region for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, url: &str) -> CacheResult<Option<Response>> {
        let mut state = self.state.lock().await;
        Ok(state
            .attached(&self.name, self.generation)
            .and_then(|entries| entries.get(url).cloned()))
    }

    async fn put(&self, url: &str, response: Response) -> CacheResult<()> {
        let mut state = self.state.lock().await;
        let entries = state
            .attached(&self.name, self.generation)
            .ok_or_else(|| CacheError::RegionClosed(self.name.clone()))?;
        entries.insert(url.to_string(), response);
        state.journal.push(StorageOp::Put {
            region: self.name.clone(),
            url: url.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, url: &str) -> CacheResult<bool> {
        let mut state = self.state.lock().await;
        let existed = state
            .attached(&self.name, self.generation)
            .is_some_and(|entries| entries.remove(url).is_some());
        state.journal.push(StorageOp::Delete {
            region: self.name.clone(),
            url: url.to_string(),
        });
        Ok(existed)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut state = self.state.lock().await;
        Ok(state
            .attached(&self.name, self.generation)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }
}
