//! # octofhir-bulk-client
//!
//! A client for the FHIR Bulk Data Access ("Flat FHIR") export operation.
//!
//! The client drives a remote FHIR server through the asynchronous export
//! protocol — kick-off, status polling with server-driven pacing and a
//! budgeted tolerance for transient errors, then a parallel fan-out
//! download of the result files — and materializes the output in a
//! pluggable file store with deterministic `<Type>.<NNNN>.<ext>` naming.
//! SMART-on-FHIR token acquisition (symmetric and asymmetric client
//! authentication) is built in.
//!
//! ## Modules
//!
//! - [`client`] - the [`BulkExportClient`] builder and `export()` entry point
//! - [`config`] - polling and HTTP options, validation machinery
//! - [`auth`] - SMART discovery and OAuth2 client-credentials tokens
//! - [`protocol`] - the async export protocol surface and state machine
//! - [`download`] - the concurrent download engine
//! - [`fhir`] - the FHIR wire-surface value types
//! - [`timeout`] - global deadline arithmetic
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_bulk_client::BulkExportClient;
//!
//! let result = BulkExportClient::system_builder()
//!     .with_fhir_endpoint_url("https://bulk-data.smarthealthit.org/fhir")
//!     .with_output_dir("target/export-0001")
//!     .with_type("Patient")
//!     .build()?
//!     .export()
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod fhir;
pub mod protocol;
pub mod timeout;

pub use auth::{AuthConfig, AuthError, TokenProvider};
pub use client::{BulkExportClient, BulkExportClientBuilder, BulkExportResult, FileResult};
pub use config::{AsyncConfig, ConstraintViolation, HttpClientConfig};
pub use download::{DownloadEntry, UrlDownloader, output_entries};
pub use error::BulkExportError;
pub use fhir::{FhirInstant, Reference};
pub use protocol::{
    AssociatedData, AsyncExportService, BulkExportManifest, BulkExportRequest, ExportLevel,
    ExportOrchestrator, FileItem, RetryValue,
};
pub use timeout::Deadline;

/// Type alias for bulk export results.
pub type Result<T> = std::result::Result<T, BulkExportError>;
