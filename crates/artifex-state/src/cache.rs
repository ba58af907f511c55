//! Content-addressed artifact cache using moka
//!
//! `store` resolves in three tiers before touching the network:
//! 1. in-memory entries keyed by hash (size-bounded LRU with TTL)
//! 2. the process-wide hash -> key index, shared by all sessions and bounded
//!    by entry count
//! 3. an in-flight upload for the same hash, which is awaited rather than
//!    repeated
//!
//! Only when all three miss does an upload start. The upload runs in its own
//! task, so a caller that goes away does not strand the others waiting on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use artifex_core::obs::{emit_cache_evicted, emit_cache_stored};
use artifex_core::{ContentDigest, Language};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::sync::Cache as IndexCache;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::{ObjectMetadata, ObjectStore, StoredArtifact};

/// URLs closer than this to expiry are re-signed on a cache hit.
pub const URL_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound on cached source bytes
    pub max_bytes: u64,
    /// Time-to-live of an in-memory entry
    pub ttl: Duration,
    /// Lifetime of presigned access URLs
    pub url_ttl: Duration,
    /// First segment of every object key
    pub key_prefix: String,
    /// Upper bound on hash -> key index entries
    pub max_index_entries: u64,
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_bytes: env_u64("ARTIFEX_CACHE_MAX_BYTES").unwrap_or(64 * 1024 * 1024),
            ttl: Duration::from_secs(env_u64("ARTIFEX_CACHE_TTL_SECS").unwrap_or(3600)),
            url_ttl: Duration::from_secs(env_u64("ARTIFEX_CACHE_URL_TTL_SECS").unwrap_or(3600)),
            key_prefix: std::env::var("ARTIFEX_CACHE_PREFIX")
                .unwrap_or_else(|_| "artifacts".to_string()),
            max_index_entries: env_u64("ARTIFEX_CACHE_INDEX_ENTRIES").unwrap_or(100_000),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_url_ttl(mut self, url_ttl: Duration) -> Self {
        self.url_ttl = url_ttl;
        self
    }

    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.trim_matches('/').to_string();
        self
    }

    pub fn with_max_index_entries(mut self, entries: u64) -> Self {
        self.max_index_entries = entries;
        self
    }
}

/// Per-call options for [`ArtifactCache::store`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Recorded as object metadata when the call performs the upload.
    pub session_id: Option<String>,
    /// Title recorded as object metadata.
    pub title: Option<String>,
}

impl StoreOptions {
    pub fn for_session(session_id: &str) -> Self {
        Self {
            session_id: Some(session_id.to_string()),
            title: None,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub weighted_bytes: u64,
    pub index_entries: u64,
    pub memory_hits: u64,
    pub index_hits: u64,
    pub uploads: u64,
    pub in_flight: usize,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    stored: StoredArtifact,
    code: Arc<str>,
}

type UploadOutcome = Option<StorageResult<StoredArtifact>>;

#[derive(Default)]
struct SharedState {
    in_flight: HashMap<String, watch::Receiver<UploadOutcome>>,
}

struct Inner {
    store: Arc<dyn ObjectStore>,
    config: CacheConfig,
    entries: Cache<String, CachedEntry>,
    /// hash -> (key, size); outlives in-memory eviction. Written before the
    /// in-flight slot is released, read under the `state` lock.
    index: IndexCache<String, (String, u64)>,
    state: Mutex<SharedState>,
    memory_hits: AtomicU64,
    index_hits: AtomicU64,
    uploads: AtomicU64,
}

/// Content-addressed artifact cache in front of an [`ObjectStore`].
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ArtifactCache {
    inner: Arc<Inner>,
}

enum Tier {
    Indexed { key: String, size: u64 },
    Wait(watch::Receiver<UploadOutcome>),
    Upload(watch::Sender<UploadOutcome>),
}

/// Object key for a hash: `<prefix>/<hash[..2]>/<hash>.<ext>`.
pub fn object_key(prefix: &str, hash: &str, language: &Language) -> String {
    let shard = hash.get(..2).unwrap_or(hash);
    format!("{prefix}/{shard}/{hash}.{}", language.extension())
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn ObjectStore>, config: CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_bytes)
            .weigher(|_hash: &String, entry: &CachedEntry| -> u32 {
                u32::try_from(entry.stored.size).unwrap_or(u32::MAX).max(1)
            })
            .time_to_live(config.ttl)
            .eviction_listener(|hash: Arc<String>, _entry, cause| {
                emit_cache_evicted(&hash, &format!("{cause:?}"));
            })
            .build();
        let index = IndexCache::builder()
            .max_capacity(config.max_index_entries)
            .build();
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                entries,
                index,
                state: Mutex::new(SharedState::default()),
                memory_hits: AtomicU64::new(0),
                index_hits: AtomicU64::new(0),
                uploads: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Store `code`, returning its location. Identical code always yields the
    /// same hash and at most one upload, even when calls race.
    pub async fn store(
        &self,
        code: &str,
        language: &Language,
        options: StoreOptions,
    ) -> StorageResult<StoredArtifact> {
        let digest = ContentDigest::compute(code.as_bytes());
        let hash = digest.short().to_string();

        if let Some(entry) = self.inner.entries.get(&hash).await {
            self.inner.memory_hits.fetch_add(1, Ordering::Relaxed);
            return self.refresh_if_expiring(entry).await;
        }

        let tier = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((key, size)) = self.inner.index.get(&hash) {
                Tier::Indexed { key, size }
            } else if let Some(rx) = state.in_flight.get(&hash) {
                Tier::Wait(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                state.in_flight.insert(hash.clone(), rx);
                Tier::Upload(tx)
            }
        };

        match tier {
            Tier::Indexed { key, size } => {
                self.inner.index_hits.fetch_add(1, Ordering::Relaxed);
                let stored = self.sign(key, hash.clone(), size).await?;
                self.remember(&hash, &stored, code).await;
                Ok(stored)
            }
            Tier::Wait(rx) => {
                debug!(hash = %hash, "awaiting in-flight upload");
                wait_for_upload(rx, &hash).await
            }
            Tier::Upload(tx) => {
                let rx = tx.subscribe();
                let cache = self.clone();
                let code = code.to_string();
                let language = language.clone();
                let upload_hash = hash.clone();
                tokio::spawn(async move {
                    let outcome = cache.upload(&upload_hash, &code, &language, &options).await;
                    if let Ok(stored) = &outcome {
                        cache.remember(&upload_hash, stored, &code).await;
                        cache
                            .inner
                            .index
                            .insert(upload_hash.clone(), (stored.key.clone(), stored.size));
                    }
                    {
                        let mut state = cache.inner.state.lock().unwrap_or_else(|e| e.into_inner());
                        state.in_flight.remove(&upload_hash);
                    }
                    tx.send_replace(Some(outcome));
                });
                wait_for_upload(rx, &hash).await
            }
        }
    }

    async fn upload(
        &self,
        hash: &str,
        code: &str,
        language: &Language,
        options: &StoreOptions,
    ) -> StorageResult<StoredArtifact> {
        let key = object_key(&self.inner.config.key_prefix, hash, language);
        let mut metadata = ObjectMetadata::new(language.content_type())
            .with_attribute("language", language.as_str())
            .with_attribute("hash", hash);
        if let Some(session_id) = &options.session_id {
            metadata = metadata.with_attribute("session-id", session_id.as_str());
        }
        if let Some(title) = &options.title {
            metadata = metadata.with_attribute("title", title.as_str());
        }

        self.inner.uploads.fetch_add(1, Ordering::Relaxed);
        self.inner
            .store
            .put(&key, code.as_bytes(), &metadata)
            .await?;
        let stored = self.sign(key, hash.to_string(), code.len() as u64).await?;
        emit_cache_stored(hash, &stored.key, stored.size, true);
        Ok(stored)
    }

    async fn sign(&self, key: String, hash: String, size: u64) -> StorageResult<StoredArtifact> {
        let ttl = self.inner.config.url_ttl;
        let url = self.inner.store.presign(&key, ttl).await?;
        Ok(StoredArtifact {
            key,
            url,
            hash,
            size,
            url_expires_at: Utc::now() + to_chrono(ttl),
        })
    }

    async fn remember(&self, hash: &str, stored: &StoredArtifact, code: &str) {
        let entry = CachedEntry {
            stored: stored.clone(),
            code: Arc::from(code),
        };
        self.inner.entries.insert(hash.to_string(), entry).await;
    }

    async fn refresh_if_expiring(&self, entry: CachedEntry) -> StorageResult<StoredArtifact> {
        if !expires_within(entry.stored.url_expires_at, URL_REFRESH_MARGIN) {
            return Ok(entry.stored);
        }
        let old = entry.stored;
        let stored = self.sign(old.key, old.hash.clone(), old.size).await?;
        debug!(hash = %old.hash, "refreshed expiring access url");
        let refreshed = CachedEntry {
            stored: stored.clone(),
            code: entry.code,
        };
        self.inner.entries.insert(old.hash, refreshed).await;
        Ok(stored)
    }

    /// Fetch source by object key, from memory when possible.
    pub async fn retrieve(&self, key: &str) -> StorageResult<String> {
        if let Some(hash) = hash_from_key(key) {
            if let Some(entry) = self.inner.entries.get(hash).await {
                if entry.stored.key == key {
                    return Ok(entry.code.to_string());
                }
            }
        }
        let bytes = self.inner.store.get(key).await?;
        String::from_utf8(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Drop every in-memory entry and the hash index. Stored objects remain.
    pub fn clear(&self) {
        self.inner.entries.invalidate_all();
        self.inner.index.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        let in_flight = self
            .inner
            .state
            .lock()
            .map(|s| s.in_flight.len())
            .unwrap_or_default();
        CacheStats {
            entry_count: self.inner.entries.entry_count(),
            weighted_bytes: self.inner.entries.weighted_size(),
            index_entries: self.inner.index.entry_count(),
            memory_hits: self.inner.memory_hits.load(Ordering::Relaxed),
            index_hits: self.inner.index_hits.load(Ordering::Relaxed),
            uploads: self.inner.uploads.load(Ordering::Relaxed),
            in_flight,
        }
    }

    /// Flush moka's pending maintenance (eviction, counts). Mostly for tests.
    pub async fn run_pending_tasks(&self) {
        self.inner.entries.run_pending_tasks().await;
        self.inner.index.run_pending_tasks();
    }
}

async fn wait_for_upload(
    mut rx: watch::Receiver<UploadOutcome>,
    hash: &str,
) -> StorageResult<StoredArtifact> {
    let abandoned = || StorageError::UploadAbandoned {
        hash: hash.to_string(),
    };
    let outcome = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| abandoned())?
        .clone();
    outcome.unwrap_or_else(|| Err(abandoned()))
}

fn expires_within(expires_at: DateTime<Utc>, margin: Duration) -> bool {
    expires_at - Utc::now() < to_chrono(margin)
}

/// The hash part of `<prefix>/<shard>/<hash>.<ext>`.
fn hash_from_key(key: &str) -> Option<&str> {
    let file = key.rsplit('/').next()?;
    file.split('.').next().filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryObjectStore;

    fn cache_with(store: Arc<MemoryObjectStore>, config: CacheConfig) -> ArtifactCache {
        ArtifactCache::new(store, config)
    }

    fn config() -> CacheConfig {
        CacheConfig {
            max_bytes: 1024 * 1024,
            ttl: Duration::from_secs(600),
            url_ttl: Duration::from_secs(600),
            key_prefix: "artifacts".to_string(),
            max_index_entries: 1000,
        }
    }

    #[test]
    fn test_object_key_layout() {
        assert_eq!(
            object_key("artifacts", "abcdef0123456789", &Language::Jsx),
            "artifacts/ab/abcdef0123456789.jsx"
        );
        assert_eq!(hash_from_key("artifacts/ab/abcdef0123456789.jsx"), Some("abcdef0123456789"));
    }

    #[tokio::test]
    async fn test_store_then_hit_memory() {
        let store = Arc::new(MemoryObjectStore::new());
        let cache = cache_with(store.clone(), config());
        let a = cache.store("console.log(1)", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        let b = cache.store("console.log(1)", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.put_count(), 1);
        assert_eq!(cache.stats().memory_hits, 1);
        assert_eq!(a.size, 14);
        let meta = store.metadata(&a.key).unwrap();
        assert_eq!(meta.attributes["language"], "javascript");
        assert_eq!(meta.attributes["hash"], a.hash);
    }

    #[tokio::test]
    async fn test_index_survives_memory_clear_of_entries() {
        let store = Arc::new(MemoryObjectStore::new());
        let cache = cache_with(store.clone(), config());
        let a = cache.store("let x = 42;", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        cache.inner.entries.invalidate_all();
        cache.run_pending_tasks().await;
        let b = cache.store("let x = 42;", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(store.put_count(), 1);
        assert_eq!(cache.stats().index_hits, 1);
    }

    #[tokio::test]
    async fn test_index_is_bounded() {
        let store = Arc::new(MemoryObjectStore::new());
        let cache = cache_with(store.clone(), config().with_max_index_entries(2));
        for i in 0..20 {
            let code = format!("console.log('entry {i}');");
            cache.store(&code, &Language::JavaScript, StoreOptions::default()).await.unwrap();
        }
        cache.run_pending_tasks().await;
        assert!(cache.stats().index_entries <= 2);
        assert_eq!(store.put_count(), 20);
    }

    #[tokio::test]
    async fn test_clear_empties_index() {
        let store = Arc::new(MemoryObjectStore::new());
        let cache = cache_with(store.clone(), config());
        cache.store("let w = 7;", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        cache.run_pending_tasks().await;
        assert_eq!(cache.stats().index_entries, 1);
        cache.clear();
        cache.run_pending_tasks().await;
        assert_eq!(cache.stats().index_entries, 0);
    }

    #[tokio::test]
    async fn test_expiring_url_is_refreshed() {
        let store = Arc::new(MemoryObjectStore::new());
        let cache = cache_with(store.clone(), config().with_url_ttl(Duration::from_secs(30)));
        let a = cache.store("let y = 1;", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        let b = cache.store("let y = 1;", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        assert_ne!(a.url, b.url);
        assert_eq!(store.presign_count(), 2);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_prefers_memory() {
        let store = Arc::new(MemoryObjectStore::new());
        let cache = cache_with(store.clone(), config());
        let a = cache.store("<p>hello</p>", &Language::Html, StoreOptions::default()).await.unwrap();
        store.delete(&a.key).await.unwrap();
        assert_eq!(cache.retrieve(&a.key).await.unwrap(), "<p>hello</p>");

        cache.clear();
        assert!(matches!(
            cache.retrieve(&a.key).await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_upload_is_not_indexed() {
        let store = Arc::new(MemoryObjectStore::new());
        store.set_fail_puts(true);
        let cache = cache_with(store.clone(), config());
        assert!(cache.store("let z = 3;", &Language::JavaScript, StoreOptions::default()).await.is_err());
        store.set_fail_puts(false);
        cache.store("let z = 3;", &Language::JavaScript, StoreOptions::default()).await.unwrap();
        assert_eq!(store.put_count(), 2);
        assert_eq!(cache.stats().in_flight, 0);
    }
}
