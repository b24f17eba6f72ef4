//! The FHIR asynchronous request pattern, as used by bulk export.
//!
//! - [`BulkExportRequest`] / [`ExportLevel`] / [`AssociatedData`] - the
//!   kick-off request and its GET/POST renderings
//! - [`AsyncResponse`] / [`BulkExportManifest`] - classified protocol
//!   responses and the completion manifest
//! - [`RetryValue`] - `Retry-After` header parsing
//! - [`AsyncExportService`] - the HTTP transport for kick-off and status
//!   polling
//! - [`ExportOrchestrator`] - the kick-off / poll / manifest state machine
//!
//! # References
//!
//! - [FHIR Bulk Data Export](https://hl7.org/fhir/uv/bulkdata/export.html)
//! - [FHIR Asynchronous Request Pattern](https://hl7.org/fhir/R4/async.html)

mod request;
mod response;
mod retry;
mod service;
mod template;

pub use request::{AssociatedData, BulkExportRequest, ExportLevel};
pub use response::{AcceptedResponse, AsyncResponse, BulkExportManifest, FileItem};
pub use retry::RetryValue;
pub use service::AsyncExportService;
pub use template::ExportOrchestrator;
