//! Storage trait definitions for Artifex
//!
//! - `ObjectStore`: blob storage addressed by key (put/get/presign/delete)
//! - `ArtifactRepository`: durable hand-off of finalized artifacts
//!
//! Both are async and backend-agnostic. In-memory fakes live in `fakes`.

use std::collections::BTreeMap;
use std::time::Duration;

use artifex_core::{BuildResult, ConsolidatedArtifact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// Metadata written alongside an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub content_type: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ObjectMetadata {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Key-addressed blob storage.
///
/// Guarantees:
/// - `get(key)` returns exactly the bytes of the last successful `put(key, ..)`.
/// - `get` of an absent key fails with `StorageError::NotFound`.
/// - `delete` of an absent key succeeds.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], metadata: &ObjectMetadata) -> StorageResult<()>;

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Time-limited access URL for `key`.
    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Location of an artifact source in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    /// Object key (`<prefix>/<hash[..2]>/<hash>.<ext>`).
    pub key: String,
    pub url: String,
    pub hash: String,
    pub size: u64,
    pub url_expires_at: DateTime<Utc>,
}

/// A finalized artifact with everything the pipeline learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub session_id: String,
    pub artifact: ConsolidatedArtifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<StoredArtifact>,
    pub created_at: DateTime<Utc>,
}

/// Durable persistence for finalized artifacts.
///
/// The pipeline only hands records over; schema and transactions belong to
/// the implementation.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn save(&self, record: &ArtifactRecord) -> StorageResult<()>;
}
