//! Local-filesystem implementation of the file-store contract.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncRead;
use url::Url;

use crate::error::StoreError;
use crate::traits::{FileHandle, FileStore};

/// A [`FileStore`] backed by the local filesystem.
///
/// Locations are plain filesystem paths, absolute or relative to the
/// process working directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    /// Creates a new local file store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FileStore for LocalFileStore {
    fn handle(&self, location: &str) -> Result<Box<dyn FileHandle>, StoreError> {
        if location.is_empty() {
            return Err(StoreError::invalid_location("empty path"));
        }
        Ok(Box::new(LocalFileHandle::new(location)))
    }
}

/// A handle addressing a path on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHandle {
    path: PathBuf,
    location: String,
}

impl LocalFileHandle {
    /// Creates a handle for the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let location = path.to_string_lossy().into_owned();
        Self { path, location }
    }

    /// The underlying filesystem path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileHandle for LocalFileHandle {
    fn location(&self) -> &str {
        &self.location
    }

    fn to_url(&self) -> Result<Url, StoreError> {
        let absolute = std::path::absolute(&self.path)
            .map_err(|e| StoreError::io(self.location.clone(), e))?;
        Url::from_file_path(&absolute)
            .map_err(|()| StoreError::invalid_location(self.location.clone()))
    }

    fn child(&self, name: &str) -> Box<dyn FileHandle> {
        Box::new(Self::new(self.path.join(name)))
    }

    async fn exists(&self) -> Result<bool, StoreError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| StoreError::io(self.location.clone(), e))
    }

    async fn mkdirs(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.path)
            .await
            .map_err(|e| StoreError::io(self.location.clone(), e))
    }

    async fn write_all(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StoreError> {
        let mut file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| StoreError::io(self.location.clone(), e))?;
        let written = tokio::io::copy(reader, &mut file)
            .await
            .map_err(|e| StoreError::io(self.location.clone(), e))?;
        tokio::io::AsyncWriteExt::flush(&mut file)
            .await
            .map_err(|e| StoreError::io(self.location.clone(), e))?;
        Ok(written)
    }
}
