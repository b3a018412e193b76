//! TTL caching of external lookups
//!
//! Network calls (extension downloads, forge lookups) are synchronous and
//! block the pipeline; they are fronted by a time-to-live cache keyed by
//! `(category, key)` with a per-category retention window. The cache is
//! loaded once at startup and persisted once after the data-generation
//! stage. A crash before persistence loses newly-fetched entries only: the
//! cache is a pure optimization, never a correctness dependency.
//!
//! On save the in-memory state is merged over whatever is on disk, newest
//! timestamp winning, so concurrent repositories sharing a store do not
//! clobber each other's entries.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One cached value with its fetch time (seconds since the epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub timestamp: u64,
    pub data: Value,
}

/// Per-category retention windows, in seconds. Categories not listed fall
/// back to `default_retention`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default)]
    pub default_retention: u64,
    #[serde(default)]
    pub categories: BTreeMap<String, u64>,
}

impl RetentionPolicy {
    pub fn with_default(default_retention: u64) -> Self {
        Self {
            default_retention,
            categories: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, category: &str, seconds: u64) {
        self.categories.insert(category.to_string(), seconds);
    }

    fn window(&self, category: &str) -> u64 {
        self.categories
            .get(category)
            .copied()
            .unwrap_or(self.default_retention)
    }
}

/// The persisted TTL cache: `{category: {key: {timestamp, data}}}`.
#[derive(Debug, Clone, Default)]
pub struct TtlCache {
    entries: BTreeMap<String, BTreeMap<String, CacheEntry>>,
    retention: RetentionPolicy,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl TtlCache {
    /// Create an empty cache with the given retention policy.
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            retention,
        }
    }

    /// Load a cache store from disk. A missing file yields an empty cache.
    pub fn load(path: &Path, retention: RetentionPolicy) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::new(retention));
        }
        let raw = fs::read_to_string(path)?;
        let entries = serde_json::from_str(&raw).map_err(|e| Error::Cache {
            message: format!("invalid cache store '{}': {}", path.display(), e),
        })?;
        Ok(Self { entries, retention })
    }

    /// Get a live value, or `None` if absent or older than the category's
    /// retention window.
    pub fn get(&self, category: &str, key: &str) -> Option<&Value> {
        let entry = self.entries.get(category)?.get(key)?;
        let window = self.retention.window(category);
        if now_secs().saturating_sub(entry.timestamp) <= window {
            Some(&entry.data)
        } else {
            None
        }
    }

    /// Insert a value with the current timestamp.
    pub fn insert(&mut self, category: &str, key: &str, data: Value) {
        self.entries
            .entry(category.to_string())
            .or_default()
            .insert(
                key.to_string(),
                CacheEntry {
                    timestamp: now_secs(),
                    data,
                },
            );
    }

    /// Get a live value or compute, cache, and return it.
    pub fn get_or_fetch<F>(&mut self, category: &str, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(value) = self.get(category, key) {
            return Ok(value.clone());
        }
        let value = fetch()?;
        self.insert(category, key, value.clone());
        Ok(value)
    }

    /// Soft-failing variant of [`TtlCache::get_or_fetch`] for optional
    /// enrichment data: a failed fetch logs a warning and yields null
    /// instead of aborting the run. The failure is not cached, so the next
    /// run retries.
    pub fn get_or_fetch_soft<F>(&mut self, category: &str, key: &str, fetch: F) -> Value
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(value) = self.get(category, key) {
            return value.clone();
        }
        match fetch() {
            Ok(value) => {
                self.insert(category, key, value.clone());
                value
            }
            Err(e) => {
                warn!("optional lookup '{}/{}' failed: {}", category, key, e);
                Value::Null
            }
        }
    }

    /// Persist to disk, merging over any existing store (newest timestamp
    /// wins per entry).
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut merged: BTreeMap<String, BTreeMap<String, CacheEntry>> = if path.is_file() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            BTreeMap::new()
        };
        for (category, entries) in &self.entries {
            let bucket = merged.entry(category.clone()).or_default();
            for (key, entry) in entries {
                match bucket.get(key) {
                    Some(existing) if existing.timestamp > entry.timestamp => {}
                    _ => {
                        bucket.insert(key.clone(), entry.clone());
                    }
                }
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = serde_json::to_string_pretty(&merged).map_err(|e| Error::Cache {
            message: format!("failed to serialize cache store: {}", e),
        })?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Number of entries across all categories.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
