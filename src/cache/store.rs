use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    cache::key::CacheKey,
    foundation::error::{ClipforgeError, ClipforgeResult},
    media::reference::MediaReference,
};

#[async_trait]
/// Content-addressed store of resolved media, keyed by [`CacheKey`].
pub trait MediaCache: Send + Sync {
    /// Look up `key`. Expired or unreadable entries are misses.
    async fn get(&self, key: &CacheKey) -> ClipforgeResult<Option<MediaReference>>;

    /// Store `value` under `key`.
    async fn set(&self, key: &CacheKey, value: &MediaReference) -> ClipforgeResult<()>;

    /// Directory where generated bytes are materialized before storing, if any.
    fn media_dir(&self) -> Option<PathBuf> {
        None
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// On-disk record of one cache entry.
pub struct CacheEntry {
    /// Cached reference.
    pub value: MediaReference,
    /// Expiry instant; `None` never expires.
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Whether the entry is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

#[derive(Clone, Debug)]
/// Durable cache: one `<digest>.json` file per key in a flat directory.
pub struct FsMediaCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl FsMediaCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ttl: None,
        }
    }

    /// Expire entries `ttl` after they are written.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.digest()))
    }

    /// Delete expired and unparsable records. Returns how many files were removed.
    pub async fn purge_expired(&self) -> ClipforgeResult<usize> {
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(ClipforgeError::cache_io(format!(
                    "list cache dir '{}': {e}",
                    self.dir.display()
                )));
            }
        };
        let now = Utc::now();
        let mut removed = 0usize;
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| ClipforgeError::cache_io(format!("list cache dir: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stale = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                    .map(|e| e.is_expired(now))
                    .unwrap_or(true),
                Err(_) => continue,
            };
            if stale {
                tokio::fs::remove_file(&path).await.map_err(|e| {
                    ClipforgeError::cache_io(format!("remove '{}': {e}", path.display()))
                })?;
                removed += 1;
            }
        }
        tracing::debug!(removed, dir = %self.dir.display(), "purged cache");
        Ok(removed)
    }
}

#[async_trait]
impl MediaCache for FsMediaCache {
    async fn get(&self, key: &CacheKey) -> ClipforgeResult<Option<MediaReference>> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ClipforgeError::cache_io(format!(
                    "read cache entry '{}': {e}",
                    path.display()
                )));
            }
        };
        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "unparsable cache entry");
                return Ok(None);
            }
        };
        if entry.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &CacheKey, value: &MediaReference) -> ClipforgeResult<()> {
        let expires_at = match self.ttl {
            Some(ttl) => Some(
                Utc::now()
                    + chrono::Duration::from_std(ttl)
                        .map_err(|e| ClipforgeError::cache_io(format!("cache ttl: {e}")))?,
            ),
            None => None,
        };
        let entry = CacheEntry {
            value: value.clone(),
            expires_at,
        };
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| ClipforgeError::cache_io(format!("encode cache entry: {e}")))?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ClipforgeError::cache_io(format!("create cache dir '{}': {e}", self.dir.display()))
        })?;
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("json.tmp{}", std::process::id()));
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            ClipforgeError::cache_io(format!("write cache entry '{}': {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            ClipforgeError::cache_io(format!("commit cache entry '{}': {e}", path.display()))
        })
    }

    fn media_dir(&self) -> Option<PathBuf> {
        Some(self.dir.join("media"))
    }
}

#[derive(Debug, Default)]
/// Process-local cache used when no cache directory is configured.
pub struct MemoryMediaCache {
    entries: RwLock<HashMap<String, MediaReference>>,
}

impl MemoryMediaCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl MediaCache for MemoryMediaCache {
    async fn get(&self, key: &CacheKey) -> ClipforgeResult<Option<MediaReference>> {
        Ok(self.entries.read().await.get(&key.digest()).cloned())
    }

    async fn set(&self, key: &CacheKey, value: &MediaReference) -> ClipforgeResult<()> {
        self.entries
            .write()
            .await
            .insert(key.digest(), value.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;
