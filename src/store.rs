//! Snapshot persistence.
//!
//! The [`DurableStore`] trait abstracts where a serialized snapshot lives.
//! [`JsonFileStore`] keeps it in `<cache dir>/data.json`; [`MemoryStore`]
//! keeps it in process, for tests and cache-less runs.
//!
//! [`CacheManager`] fronts a durable store with a short-lived in-memory
//! layer and applies the staleness and schema-version policy: entries older
//! than the configured max age, or written under a different
//! [`SCHEMA_VERSION`], load as absent. Read and decode failures are
//! returned to the caller, which decides whether to fall back.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::CatalogSnapshot;
use crate::ttl_cache::TtlCache;

/// Version tag written with every durable entry.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// File name of the durable snapshot inside the cache directory.
pub const CACHE_FILE: &str = "data.json";

const SNAPSHOT_KEY: &str = "catalog";

/// Durable envelope around a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub snapshot: CatalogSnapshot,
    pub saved_at: DateTime<Utc>,
    pub schema_version: String,
}

impl CacheEntry {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            snapshot,
            saved_at: Utc::now(),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }
}

/// Where durable snapshots are kept.
///
/// A missing entry is `Ok(None)`, not an error.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load(&self) -> Result<Option<CacheEntry>, StoreError>;

    async fn save(&self, entry: &CacheEntry) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    /// Human-readable location, for stats and logs.
    fn location(&self) -> String;
}

/// JSON file store at `<dir>/data.json`.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn load(&self) -> Result<Option<CacheEntry>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(entry)?;
        // Atomic replace.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    entry: Mutex<Option<CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<CacheEntry>> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self) -> Result<Option<CacheEntry>, StoreError> {
        Ok(self.slot().clone())
    }

    async fn save(&self, entry: &CacheEntry) -> Result<(), StoreError> {
        *self.slot() = Some(entry.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Durable entries older than this are stale.
    pub max_age: Duration,
    pub memory_ttl: Duration,
    pub memory_capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(24 * 60 * 60),
            memory_ttl: Duration::from_secs(10 * 60),
            memory_capacity: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub location: String,
}

/// Two-level snapshot cache: memory first, then the durable store.
pub struct CacheManager {
    durable: Box<dyn DurableStore>,
    memory: Mutex<TtlCache<&'static str, CacheEntry>>,
    max_age: Duration,
}

impl CacheManager {
    pub fn new(durable: Box<dyn DurableStore>, settings: CacheSettings) -> Self {
        Self {
            durable,
            memory: Mutex::new(TtlCache::new(settings.memory_capacity, settings.memory_ttl)),
            max_age: settings.max_age,
        }
    }

    fn memory(&self) -> MutexGuard<'_, TtlCache<&'static str, CacheEntry>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the current snapshot, or `None` when absent, stale, or written
    /// under another schema version.
    pub async fn load(&self) -> Result<Option<CatalogSnapshot>, StoreError> {
        let cached = self.memory().get(&SNAPSHOT_KEY);
        if let Some(entry) = cached {
            if !self.is_stale(&entry) {
                tracing::debug!("snapshot served from memory cache");
                return Ok(Some(entry.snapshot));
            }
            self.memory().clear();
        }

        let Some(entry) = self.durable.load().await? else {
            return Ok(None);
        };

        if entry.schema_version != SCHEMA_VERSION {
            tracing::info!(
                found = %entry.schema_version,
                expected = SCHEMA_VERSION,
                "cached snapshot has a different schema version; ignoring"
            );
            return Ok(None);
        }

        if self.is_stale(&entry) {
            tracing::info!(saved_at = %entry.saved_at, "cached snapshot is stale");
            return Ok(None);
        }

        tracing::debug!(
            location = %self.durable.location(),
            services = entry.snapshot.services.len(),
            "snapshot loaded from durable cache"
        );
        self.memory().insert(SNAPSHOT_KEY, entry.clone());
        Ok(Some(entry.snapshot))
    }

    /// Older than `max_age`, measured from when the entry was saved.
    fn is_stale(&self, entry: &CacheEntry) -> bool {
        Utc::now()
            .signed_duration_since(entry.saved_at)
            .to_std()
            .map(|age| age > self.max_age)
            .unwrap_or(false)
    }

    /// Persist `snapshot` and refresh the memory layer.
    pub async fn save(&self, snapshot: &CatalogSnapshot) -> Result<(), StoreError> {
        let entry = CacheEntry::new(snapshot.clone());
        self.memory().insert(SNAPSHOT_KEY, entry.clone());
        self.durable.save(&entry).await?;
        tracing::debug!(location = %self.durable.location(), "snapshot saved");
        Ok(())
    }

    /// Drop both layers.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.memory().clear();
        self.durable.clear().await
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.memory();
        CacheStats {
            memory_entries: memory.len(),
            memory_capacity: memory.capacity(),
            location: self.durable.location(),
        }
    }
}
