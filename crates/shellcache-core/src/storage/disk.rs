//! On-disk cache storage.
//!
//! ```text
//! {root}/{region}/
//!   index.json     # url -> status, headers, stored_at, body file
//!   {id}.body      # raw response body
//! ```
//!
//! The index carries a generation stamp written when the region is
//! created, so handles opened before a delete stay detached after the
//! region is recreated.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CacheStorage, Region};
use crate::error::{CacheError, CacheResult};
use crate::request::Response;

/// Index file name inside each region directory
const INDEX_FILE: &str = "index.json";

static CREATED_REGIONS: AtomicU64 = AtomicU64::new(0);

fn new_generation() -> String {
    format!(
        "{}-{}",
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        CREATED_REGIONS.fetch_add(1, Ordering::Relaxed)
    )
}

#[derive(Debug, Serialize, Deserialize)]
struct RegionIndex {
    generation: String,
    next_id: u64,
    entries: BTreeMap<String, IndexEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    file: String,
    #[serde(flatten)]
    response: Response,
}

#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
    // Serializes index read-modify-write across every handle
    lock: Arc<Mutex<()>>,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn region_dir(&self, name: &str) -> CacheResult<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
        {
            return Err(CacheError::Storage(format!("invalid region name: {:?}", name)));
        }
        Ok(self.root.join(name))
    }
}

async fn load_index(dir: &Path) -> CacheResult<Option<RegionIndex>> {
    match fs::read_to_string(dir.join(INDEX_FILE)).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn save_index(dir: &Path, index: &RegionIndex) -> CacheResult<()> {
    let contents = serde_json::to_string_pretty(index)?;
    let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
    fs::write(&tmp, contents).await?;
    fs::rename(&tmp, dir.join(INDEX_FILE)).await?;
    Ok(())
}

async fn remove_file_if_present(path: &Path) -> CacheResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> CacheResult<Box<dyn Region>> {
        let dir = self.region_dir(name)?;
        let _guard = self.lock.lock().await;

        let generation = match load_index(&dir).await? {
            Some(index) => index.generation,
            None => {
                fs::create_dir_all(&dir).await?;
                let index = RegionIndex {
                    generation: new_generation(),
                    next_id: 0,
                    entries: BTreeMap::new(),
                };
                save_index(&dir, &index).await?;
                debug!(region = name, "Created region");
                index.generation
            }
        };

        Ok(Box::new(DiskRegion {
            name: name.to_string(),
            dir,
            generation,
            lock: Arc::clone(&self.lock),
        }))
    }

    async fn has(&self, name: &str) -> CacheResult<bool> {
        let dir = self.region_dir(name)?;
        Ok(fs::try_exists(dir.join(INDEX_FILE)).await?)
    }

    async fn delete(&self, name: &str) -> CacheResult<bool> {
        let dir = self.region_dir(name)?;
        let _guard = self.lock.lock().await;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(region = name, "Deleted region");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

struct DiskRegion {
    name: String,
    dir: PathBuf,
    generation: String,
    lock: Arc<Mutex<()>>,
}

impl DiskRegion {
    /// The region's index, if the region this handle was opened on still exists.
    async fn attached_index(&self) -> CacheResult<Option<RegionIndex>> {
        Ok(load_index(&self.dir)
            .await?
            .filter(|index| index.generation == self.generation))
    }
}

#[async_trait]
impl Region for DiskRegion {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, url: &str) -> CacheResult<Option<Response>> {
        let _guard = self.lock.lock().await;
        let Some(index) = self.attached_index().await? else {
            return Ok(None);
        };
        let Some(entry) = index.entries.get(url) else {
            return Ok(None);
        };

        let mut response = entry.response.clone();
        response.body = fs::read(self.dir.join(&entry.file)).await?;
        Ok(Some(response))
    }

    async fn put(&self, url: &str, response: Response) -> CacheResult<()> {
        let _guard = self.lock.lock().await;
        let mut index = self
            .attached_index()
            .await?
            .ok_or_else(|| CacheError::RegionClosed(self.name.clone()))?;

        index.next_id += 1;
        let file = format!("{}.body", index.next_id);
        fs::write(self.dir.join(&file), &response.body).await?;

        let replaced = index
            .entries
            .insert(url.to_string(), IndexEntry { file, response });
        save_index(&self.dir, &index).await?;

        if let Some(old) = replaced {
            remove_file_if_present(&self.dir.join(old.file)).await?;
        }
        Ok(())
    }

    async fn delete(&self, url: &str) -> CacheResult<bool> {
        let _guard = self.lock.lock().await;
        let Some(mut index) = self.attached_index().await? else {
            return Ok(false);
        };
        let Some(entry) = index.entries.remove(url) else {
            return Ok(false);
        };

        save_index(&self.dir, &index).await?;
        remove_file_if_present(&self.dir.join(entry.file)).await?;
        Ok(true)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .attached_index()
            .await?
            .map(|index| index.entries.into_keys().collect())
            .unwrap_or_default())
    }
}
