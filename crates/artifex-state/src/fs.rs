use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::error::{StorageError, StorageResult};
use crate::storage_traits::{ObjectMetadata, ObjectStore};

const METADATA_SUFFIX: &str = ".meta.json";

/// Filesystem-backed object store.
///
/// Layout: `<root>/<key>` with a `<key>.meta.json` sidecar. Artifact keys are
/// already sharded by hash prefix, so the tree stays shallow.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

fn sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

/// Atomic write: temp file in the same directory, then rename.
fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    let dir = path.parent().ok_or_else(|| StorageError::InvalidKey {
        key: path.display().to_string(),
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| StorageError::from(e.error))?;
    Ok(())
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], metadata: &ObjectMetadata) -> StorageResult<()> {
        let path = self.object_path(key)?;
        let meta = serde_json::to_vec_pretty(metadata)?;
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            write_atomic(&path, &bytes)?;
            write_atomic(&sidecar(&path), &meta)
        })
        .await
        .map_err(|e| StorageError::Backend(format!("write task failed: {e}")))?
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StorageError::from(e)
            }
        })
    }

    /// Local files never expire; the URL is a plain `file://` path.
    async fn presign(&self, key: &str, _ttl: Duration) -> StorageResult<String> {
        let path = self.object_path(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }
        let absolute = std::path::absolute(&path)?;
        Ok(format!("file://{}", absolute.display()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        for p in [sidecar(&path), path] {
            match tokio::fs::remove_file(&p).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
