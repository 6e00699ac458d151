use super::{key_segments, ContentStore, StoreError};
use crate::core::location::LocationReference;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Directory-backed store: `<root>/<container>/<key>`.
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, container: &str, key: &str) -> Result<PathBuf, StoreError> {
        let container_segments = key_segments(container)?;
        if container_segments.len() != 1 {
            return Err(StoreError::InvalidKey {
                key: container.to_string(),
                reason: "container must be a single path segment".to_string(),
            });
        }
        let mut path = self.root.join(container);
        for segment in key_segments(key)? {
            path.push(segment);
        }
        Ok(path)
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<LocationReference, StoreError> {
        let location = LocationReference::new(container, key)?;
        let path = self.object_path(container, key)?;
        atomic_write(&path, &bytes)
            .await
            .map_err(|err| map_io_error(err, &location))?;
        tracing::debug!(path = %path.display(), "stored object");
        Ok(location)
    }

    async fn get(&self, location: &LocationReference) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(location.container(), location.key())?;
        fs::read(&path)
            .await
            .map_err(|err| map_io_error(err, location))
    }
}

fn map_io_error(err: std::io::Error, location: &LocationReference) -> StoreError {
    match err.kind() {
        ErrorKind::NotFound => StoreError::NotFound(location.clone()),
        ErrorKind::PermissionDenied => StoreError::AccessDenied {
            location: location.clone(),
            detail: err.to_string(),
        },
        _ => StoreError::Io(err),
    }
}

async fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, data).await?;
    if let Err(err) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(err);
    }
    Ok(())
}
