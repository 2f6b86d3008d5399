//! Resource manifest and shell set for one deployment.
//!
//! A manifest maps every logical resource key (a path relative to the
//! origin, with the origin root stored as `"/"`) to an opaque content
//! fingerprint. It is regenerated wholesale for each build. The shell set
//! is the ordered subset of keys fetched eagerly during install.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceManifest(BTreeMap<String, String>);

impl ResourceManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, fingerprint: impl Into<String>) {
        self.0.insert(key.into(), fingerprint.into());
    }

    pub fn fingerprint(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a cached entry for `key` can be kept across an upgrade from
    /// `previous`. The key must still be listed and its fingerprint must be
    /// identical in both manifests.
    pub fn is_unchanged_since(&self, previous: &ResourceManifest, key: &str) -> bool {
        match (self.fingerprint(key), previous.fingerprint(key)) {
            (Some(current), Some(old)) => current == old,
            _ => false,
        }
    }

    pub fn from_json(json: &str) -> CacheResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> CacheResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResourceManifest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShellSet(Vec<String>);

impl ShellSet {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<K> for ShellSet {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Everything a build ships: the full manifest plus its shell set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    resources: ResourceManifest,
    shell: ShellSet,
}

#[derive(Deserialize)]
struct RawDeployment {
    resources: ResourceManifest,
    #[serde(default)]
    shell: ShellSet,
}

impl Deployment {
    pub fn new(resources: ResourceManifest, shell: ShellSet) -> CacheResult<Self> {
        let mut seen = HashSet::new();
        for key in shell.keys() {
            if !resources.contains(key) {
                return Err(CacheError::InvalidDeployment(format!(
                    "shell key '{}' is not in the resource manifest",
                    key
                )));
            }
            if !seen.insert(key) {
                return Err(CacheError::InvalidDeployment(format!(
                    "shell key '{}' is listed twice",
                    key
                )));
            }
        }
        Ok(Self { resources, shell })
    }

    /// Parse `{"resources": {...}, "shell": [...]}`.
    pub fn from_json(json: &str) -> CacheResult<Self> {
        let raw: RawDeployment = serde_json::from_str(json)?;
        Self::new(raw.resources, raw.shell)
    }

    pub fn resources(&self) -> &ResourceManifest {
        &self.resources
    }

    pub fn shell(&self) -> &ShellSet {
        &self.shell
    }
}
