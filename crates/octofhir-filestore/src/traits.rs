//! The file-store contract used by the bulk export download path.

use async_trait::async_trait;
use tokio::io::AsyncRead;
use url::Url;

use crate::error::StoreError;

/// Resolves location strings into file handles.
///
/// Implementations must be thread-safe (`Send + Sync`); a single store is
/// shared by all concurrent download workers.
pub trait FileStore: Send + Sync {
    /// Resolves a location string into a handle.
    ///
    /// The location format is implementation-defined (a filesystem path for
    /// the local store, a bucket URL for an object store).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidLocation` if the location cannot be
    /// interpreted by this store.
    fn handle(&self, location: &str) -> Result<Box<dyn FileHandle>, StoreError>;
}

/// A single addressable file or directory within a [`FileStore`].
#[async_trait]
pub trait FileHandle: Send + Sync {
    /// The location this handle addresses, in the store's own format.
    fn location(&self) -> &str;

    /// The location as a URL (e.g. `file:///...`).
    ///
    /// # Errors
    ///
    /// Returns an error if the location cannot be represented as a URL.
    fn to_url(&self) -> Result<Url, StoreError>;

    /// Resolves a child of this handle by name.
    fn child(&self, name: &str) -> Box<dyn FileHandle>;

    /// Checks whether the addressed file or directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues, not for absence.
    async fn exists(&self) -> Result<bool, StoreError>;

    /// Creates the addressed directory and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    async fn mkdirs(&self) -> Result<(), StoreError>;

    /// Streams the reader's contents into the addressed file, replacing any
    /// existing content, and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the copy fails.
    /// A failed write may leave a partial file behind; callers that need
    /// atomicity must layer it on top.
    async fn write_all(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, StoreError>;
}
