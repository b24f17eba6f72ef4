//! Error types for file-store operations.

/// Errors that can occur while resolving handles or writing files.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The location string could not be resolved to a handle.
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// An I/O error occurred while accessing the underlying store.
    #[error("I/O error at {location}: {source}")]
    Io {
        /// The location the operation was addressing.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Creates a new `InvalidLocation` error.
    #[must_use]
    pub fn invalid_location(location: impl Into<String>) -> Self {
        Self::InvalidLocation(location.into())
    }

    /// Creates a new `Io` error for the given location.
    #[must_use]
    pub fn io(location: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }
}
