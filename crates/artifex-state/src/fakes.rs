//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryObjectStore` and `MemoryArtifactRepository` satisfy the trait
//! contracts without any external service, and expose counters so tests can
//! assert how many writes actually happened.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory object store backed by a `HashMap<key, (bytes, metadata)>`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, ObjectMetadata)>>,
    puts: AtomicUsize,
    presigns: AtomicUsize,
    put_delay: Option<Duration>,
    fail_puts: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `put`, widening race windows in tests.
    pub fn with_put_delay(mut self, delay: Duration) -> Self {
        self.put_delay = Some(delay);
        self
    }

    /// Make subsequent `put` calls fail with a backend error.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of `put` calls that reached the store.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn presign_count(&self) -> usize {
        self.presigns.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn metadata(&self, key: &str) -> Option<ObjectMetadata> {
        self.objects.lock().unwrap().get(key).map(|(_, m)| m.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], metadata: &ObjectMetadata) -> StorageResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected put failure".to_string()));
        }
        let mut objects = self.objects.lock().unwrap();
        objects.insert(key.to_string(), (bytes.to_vec(), metadata.clone()));
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        let n = self.presigns.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("memory://{key}?expires={}&sig={n}", ttl.as_secs()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryArtifactRepository
// ---------------------------------------------------------------------------

/// In-memory artifact repository recording every saved record.
#[derive(Debug, Default)]
pub struct MemoryArtifactRepository {
    records: Mutex<Vec<ArtifactRecord>>,
    fail_saves: AtomicBool,
}

impl MemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<ArtifactRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Records saved for one session, in save order.
    pub fn records_for_session(&self, session_id: &str) -> Vec<ArtifactRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ArtifactRepository for MemoryArtifactRepository {
    async fn save(&self, record: &ArtifactRecord) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected save failure".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
