//! Error types for bulk export operations.
//!
//! A single [`BulkExportError`] covers every failure mode of an export:
//! configuration problems detected before any I/O, protocol-level HTTP
//! errors, malformed server responses, download failures, deadline expiry,
//! and system-level faults. Authentication has its own error type in
//! [`crate::auth`] and folds into this one at the export boundary.

use std::time::Duration;

use octofhir_filestore::StoreError;

use crate::auth::AuthError;
use crate::fhir::OperationOutcome;

/// Errors that can occur while driving a bulk export.
#[derive(Debug, thiserror::Error)]
pub enum BulkExportError {
    /// The client configuration is invalid, or a precondition on the
    /// destination (such as the output directory not existing yet) failed.
    /// Raised before any network I/O for the affected phase.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem, possibly aggregating
        /// several violations.
        message: String,
    },

    /// A protocol call or download returned a non-recoverable HTTP status.
    #[error("HTTP error {status}: {message}")]
    Http {
        /// Description of the failed call.
        message: String,
        /// The HTTP status code.
        status: u16,
        /// The `OperationOutcome` carried by the response body, when one
        /// could be parsed.
        outcome: Option<OperationOutcome>,
        /// The resolved `Retry-After` hint, when the response carried one.
        retry_after: Option<Duration>,
    },

    /// The server violated the async export protocol: a missing
    /// `Content-Location` on an accepted kick-off, an unparseable manifest,
    /// or a malformed download URL.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A download worker failed; wraps the first underlying failure.
    #[error("Download failed: {source}")]
    Download {
        /// The failure that aborted the download phase.
        #[source]
        source: Box<BulkExportError>,
    },

    /// The global deadline expired during polling or downloading.
    #[error("Operation timed out after {limit:?}")]
    Timeout {
        /// The configured wall-clock limit.
        limit: Duration,
    },

    /// Token acquisition failed.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A system-level fault: transport breakdown after retries, task
    /// interruption, or an I/O failure writing to the destination.
    #[error("System error: {message}")]
    System {
        /// Description of the fault.
        message: String,
        /// The underlying error, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BulkExportError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a new `Http` error without an outcome or retry hint.
    #[must_use]
    pub fn http(message: impl Into<String>, status: u16) -> Self {
        Self::Http {
            message: message.into(),
            status,
            outcome: None,
            retry_after: None,
        }
    }

    /// Creates a new `Timeout` error for the given limit.
    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout { limit }
    }

    /// Creates a new `Download` error wrapping the first failure.
    #[must_use]
    pub fn download(source: BulkExportError) -> Self {
        Self::Download {
            source: Box::new(source),
        }
    }

    /// Creates a new `System` error with an underlying cause.
    #[must_use]
    pub fn system(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::System {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new `System` error without a cause.
    #[must_use]
    pub fn system_message(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
            source: None,
        }
    }
}

impl From<StoreError> for BulkExportError {
    fn from(err: StoreError) -> Self {
        Self::system("file store operation failed", err)
    }
}
