//! Artifex state: object storage collaborators and the content-addressed cache.
//!
//! - [`ObjectStore`] / [`ArtifactRepository`]: narrow collaborator traits
//! - [`fakes`]: in-memory implementations for tests
//! - [`FsObjectStore`] / [`HttpObjectStore`]: real backends
//! - [`ArtifactCache`]: hash-keyed dedup in front of any object store

pub mod cache;
pub mod error;
pub mod fakes;
pub mod fs;
pub mod http;
pub mod storage_traits;

pub use cache::{object_key, ArtifactCache, CacheConfig, CacheStats, StoreOptions};
pub use error::{StorageError, StorageResult};
pub use fakes::{MemoryArtifactRepository, MemoryObjectStore};
pub use fs::FsObjectStore;
pub use http::{HttpObjectStore, HttpObjectStoreConfig};
pub use storage_traits::{
    ArtifactRecord, ArtifactRepository, ObjectMetadata, ObjectStore, StoredArtifact,
};
