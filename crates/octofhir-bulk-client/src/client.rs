//! The bulk export client: configuration surface and the `export()` entry
//! point.
//!
//! A client is assembled through [`BulkExportClientBuilder`], which runs the
//! whole validation pass before any I/O and aggregates every violation into
//! one configuration error. A validated client drives the export end to
//! end: destination preparation, kick-off, polling, parallel download, and
//! the `_SUCCESS` completion marker.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_bulk_client::BulkExportClient;
//!
//! let result = BulkExportClient::system_builder()
//!     .with_fhir_endpoint_url("https://bulk-data.smarthealthit.org/fhir")
//!     .with_output_dir("target/export-0001")
//!     .with_type("Patient")
//!     .with_type("Condition")
//!     .build()?
//!     .export()
//!     .await?;
//! println!("exported {} files", result.results.len());
//! ```

use std::sync::Arc;
use std::time::Duration;

use octofhir_filestore::{FileStore, LocalFileStore};
use url::Url;

use crate::auth::{AuthConfig, TokenProvider};
use crate::config::{AsyncConfig, ConstraintViolation, HttpClientConfig, format_violations};
use crate::download::{UrlDownloader, output_entries};
use crate::error::BulkExportError;
use crate::fhir::{FhirInstant, Reference};
use crate::protocol::{
    AssociatedData, AsyncExportService, BulkExportRequest, ExportLevel, ExportOrchestrator,
};
use crate::timeout::Deadline;

/// Name of the zero-byte marker written after all downloads complete. Its
/// presence is the sole on-disk completion signal.
const SUCCESS_MARKER: &str = "_SUCCESS";

/// The result of a successful export.
#[derive(Debug, Clone)]
pub struct BulkExportResult {
    /// Server time at which the export transactionally applies.
    pub transaction_time: FhirInstant,
    /// One entry per downloaded file, in manifest order.
    pub results: Vec<FileResult>,
}

/// One downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    /// The manifest URL the file was downloaded from.
    pub source: Url,
    /// The destination the file was written to.
    pub destination: Url,
    /// The number of bytes written.
    pub size: u64,
}

/// A client for the FHIR Bulk Data Export API.
///
/// # References
///
/// - [FHIR Bulk Export](https://hl7.org/fhir/uv/bulkdata/export.html)
pub struct BulkExportClient {
    fhir_endpoint_url: String,
    level: ExportLevel,
    output_format: String,
    since: Option<FhirInstant>,
    types: Vec<String>,
    patients: Vec<Reference>,
    elements: Vec<String>,
    type_filters: Vec<String>,
    include_associated_data: Vec<AssociatedData>,
    output_dir: String,
    output_extension: String,
    timeout: Duration,
    max_concurrent_downloads: usize,
    file_store: Arc<dyn FileStore>,
    http_client_config: HttpClientConfig,
    async_config: AsyncConfig,
    auth_config: AuthConfig,
}

impl std::fmt::Debug for BulkExportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkExportClient")
            .field("fhir_endpoint_url", &self.fhir_endpoint_url)
            .field("level", &self.level)
            .field("output_format", &self.output_format)
            .field("since", &self.since)
            .field("types", &self.types)
            .field("patients", &self.patients)
            .field("elements", &self.elements)
            .field("type_filters", &self.type_filters)
            .field("include_associated_data", &self.include_associated_data)
            .field("output_dir", &self.output_dir)
            .field("output_extension", &self.output_extension)
            .field("timeout", &self.timeout)
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("http_client_config", &self.http_client_config)
            .field("async_config", &self.async_config)
            .field("auth_config", &self.auth_config)
            .finish_non_exhaustive()
    }
}

impl BulkExportClient {
    /// Creates a builder for a system-level export.
    #[must_use]
    pub fn system_builder() -> BulkExportClientBuilder {
        BulkExportClientBuilder::new(ExportLevel::System)
    }

    /// Creates a builder for a patient-level export.
    #[must_use]
    pub fn patient_builder() -> BulkExportClientBuilder {
        BulkExportClientBuilder::new(ExportLevel::Patient)
    }

    /// Creates a builder for a group-level export.
    #[must_use]
    pub fn group_builder(group_id: impl Into<String>) -> BulkExportClientBuilder {
        BulkExportClientBuilder::new(ExportLevel::Group {
            id: group_id.into(),
        })
    }

    /// Exports data from the FHIR server into the output directory.
    ///
    /// All resources — the HTTP client, the token provider, the download
    /// pool, and the file store handle — are scoped to this call and
    /// released on every exit path. Partial downloads are not cleaned up on
    /// failure; the `_SUCCESS` marker distinguishes complete directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination already exists, the protocol
    /// fails, a download fails, or the global deadline expires.
    pub async fn export(&self) -> Result<BulkExportResult, BulkExportError> {
        let deadline = Deadline::start(self.timeout);
        tracing::debug!(
            "Starting {} level export to '{}' with timeout {:?}",
            self.level,
            self.output_dir,
            self.timeout
        );

        let endpoint = Url::parse(&self.fhir_endpoint_url).map_err(|e| {
            BulkExportError::configuration(format!(
                "fhir_endpoint_url: must be a valid URL ({e})"
            ))
        })?;

        if self.http_client_config.max_connections_per_route < self.max_concurrent_downloads {
            tracing::warn!(
                "max_connections_per_route is less than max_concurrent_downloads: {} < {}",
                self.http_client_config.max_connections_per_route,
                self.max_concurrent_downloads
            );
        }

        // refuse an overlapping destination before any network work
        let destination_dir = self.file_store.handle(&self.output_dir)?;
        if destination_dir.exists().await? {
            return Err(BulkExportError::configuration(format!(
                "Destination directory already exists: {}",
                destination_dir.location()
            )));
        }
        tracing::debug!(
            "Creating destination directory: {}",
            destination_dir.location()
        );
        destination_dir.mkdirs().await?;

        let http = self.build_http_client()?;
        let token_provider =
            TokenProvider::new(http.clone(), endpoint.clone(), self.auth_config.clone())
                .map(Arc::new);
        let service = AsyncExportService::new(
            http.clone(),
            endpoint,
            token_provider.clone(),
            self.http_client_config.retry_count,
        );
        let orchestrator = ExportOrchestrator::new(service, self.async_config.clone());
        let downloader =
            UrlDownloader::new(http, token_provider, self.max_concurrent_downloads);

        let manifest = orchestrator.export(&self.build_request(), deadline).await?;

        let entries = output_entries(
            &manifest,
            destination_dir.as_ref(),
            &self.output_extension,
        )?;
        let targets: Vec<(Url, Url)> = entries
            .iter()
            .map(|entry| Ok((entry.source.clone(), entry.destination.to_url()?)))
            .collect::<Result<_, BulkExportError>>()?;

        let sizes = downloader.download(entries, deadline).await?;

        let marker = destination_dir.child(SUCCESS_MARKER);
        tracing::debug!("Marking download as complete with: {}", marker.location());
        marker.write_all(&mut tokio::io::empty()).await?;

        let results = targets
            .into_iter()
            .zip(sizes)
            .map(|((source, destination), size)| FileResult {
                source,
                destination,
                size,
            })
            .collect::<Vec<_>>();
        let result = BulkExportResult {
            transaction_time: manifest.transaction_time,
            results,
        };
        tracing::info!(
            "Export successful: {} files, transaction time {}",
            result.results.len(),
            result.transaction_time
        );
        Ok(result)
    }

    /// Builds the protocol request from the configured options.
    fn build_request(&self) -> BulkExportRequest {
        BulkExportRequest {
            level: self.level.clone(),
            output_format: Some(self.output_format.clone()),
            since: self.since,
            types: self.types.clone(),
            elements: self.elements.clone(),
            type_filters: self.type_filters.clone(),
            include_associated_data: self.include_associated_data.clone(),
            patients: self.patients.clone(),
        }
    }

    fn build_http_client(&self) -> Result<reqwest::Client, BulkExportError> {
        reqwest::Client::builder()
            .read_timeout(self.http_client_config.socket_timeout)
            .pool_max_idle_per_host(self.http_client_config.max_connections_per_route)
            .build()
            .map_err(|e| BulkExportError::system("failed to create HTTP client", e))
    }
}

/// A builder for [`BulkExportClient`].
///
/// `build()` runs the full validation pass and reports every violation
/// together, sorted by path.
pub struct BulkExportClientBuilder {
    fhir_endpoint_url: Option<String>,
    output_dir: Option<String>,
    level: ExportLevel,
    output_format: String,
    since: Option<FhirInstant>,
    types: Vec<String>,
    patients: Vec<Reference>,
    elements: Vec<String>,
    type_filters: Vec<String>,
    include_associated_data: Vec<AssociatedData>,
    output_extension: String,
    timeout: Duration,
    max_concurrent_downloads: usize,
    file_store: Arc<dyn FileStore>,
    http_client_config: HttpClientConfig,
    async_config: AsyncConfig,
    auth_config: AuthConfig,
}

impl BulkExportClientBuilder {
    fn new(level: ExportLevel) -> Self {
        Self {
            fhir_endpoint_url: None,
            output_dir: None,
            level,
            output_format: "application/fhir+ndjson".to_string(),
            since: None,
            types: Vec::new(),
            patients: Vec::new(),
            elements: Vec::new(),
            type_filters: Vec::new(),
            include_associated_data: Vec::new(),
            output_extension: "ndjson".to_string(),
            timeout: Duration::ZERO,
            max_concurrent_downloads: 10,
            file_store: Arc::new(LocalFileStore::new()),
            http_client_config: HttpClientConfig::default(),
            async_config: AsyncConfig::default(),
            auth_config: AuthConfig::default(),
        }
    }

    /// Sets the URL of the FHIR server to export from.
    #[must_use]
    pub fn with_fhir_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.fhir_endpoint_url = Some(url.into());
        self
    }

    /// Sets the destination directory, in the format expected by the
    /// configured file store.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<String>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Sets the `_outputFormat` parameter.
    #[must_use]
    pub fn with_output_format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    /// Sets the `_since` lower bound.
    #[must_use]
    pub fn with_since(mut self, since: FhirInstant) -> Self {
        self.since = Some(since);
        self
    }

    /// Adds a resource type to the `_type` parameter.
    #[must_use]
    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.types.push(resource_type.into());
        self
    }

    /// Adds all given resource types to the `_type` parameter.
    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.extend(types.into_iter().map(Into::into));
        self
    }

    /// Adds a patient reference. Non-empty patients force a POST kick-off
    /// and require a patient-supporting level.
    #[must_use]
    pub fn with_patient(mut self, patient: Reference) -> Self {
        self.patients.push(patient);
        self
    }

    /// Adds all given patient references.
    #[must_use]
    pub fn with_patients(mut self, patients: impl IntoIterator<Item = Reference>) -> Self {
        self.patients.extend(patients);
        self
    }

    /// Adds an element to the `_elements` parameter.
    #[must_use]
    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.elements.push(element.into());
        self
    }

    /// Adds a filter to the `_typeFilter` parameter.
    #[must_use]
    pub fn with_type_filter(mut self, filter: impl Into<String>) -> Self {
        self.type_filters.push(filter.into());
        self
    }

    /// Adds an `includeAssociatedData` value.
    #[must_use]
    pub fn with_include_associated_datum(mut self, value: AssociatedData) -> Self {
        self.include_associated_data.push(value);
        self
    }

    /// Adds `includeAssociatedData` values from their string codes.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a code that is neither a known
    /// value nor a `_`-prefixed custom code.
    pub fn with_include_associated_data<I, S>(mut self, codes: I) -> Result<Self, BulkExportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for code in codes {
            self.include_associated_data
                .push(AssociatedData::from_code(code.as_ref())?);
        }
        Ok(self)
    }

    /// Sets the extension for output files.
    #[must_use]
    pub fn with_output_extension(mut self, extension: impl Into<String>) -> Self {
        self.output_extension = extension.into();
        self
    }

    /// Sets the global wall-clock timeout. Zero (the default) disables it.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the download worker-pool width.
    #[must_use]
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max;
        self
    }

    /// Sets the file store the output is written to.
    #[must_use]
    pub fn with_file_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.file_store = store;
        self
    }

    /// Sets the HTTP client configuration.
    #[must_use]
    pub fn with_http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.http_client_config = config;
        self
    }

    /// Sets the async protocol configuration.
    #[must_use]
    pub fn with_async_config(mut self, config: AsyncConfig) -> Self {
        self.async_config = config;
        self
    }

    /// Sets the authentication configuration.
    #[must_use]
    pub fn with_auth_config(mut self, config: AuthConfig) -> Self {
        self.auth_config = config;
        self
    }

    /// Validates the assembled configuration. Pure: no I/O, and the result
    /// depends only on the configuration values.
    #[must_use]
    pub fn validate(&self) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();
        match &self.fhir_endpoint_url {
            None => violations.push(ConstraintViolation::new(
                "fhir_endpoint_url",
                "must be supplied",
            )),
            Some(url) if Url::parse(url).is_err() => violations.push(ConstraintViolation::new(
                "fhir_endpoint_url",
                "must be a valid URL",
            )),
            Some(_) => {}
        }
        if self.output_dir.is_none() {
            violations.push(ConstraintViolation::new("output_dir", "must be supplied"));
        }
        if self.max_concurrent_downloads < 1 {
            violations.push(ConstraintViolation::new(
                "max_concurrent_downloads",
                "must be at least 1",
            ));
        }
        if !self.level.patient_supported() && !self.patients.is_empty() {
            violations.push(ConstraintViolation::new(
                "patient",
                format!("is not supported for a {} level export", self.level),
            ));
        }
        self.auth_config.validate("auth_config", &mut violations);
        violations
    }

    /// Builds a validated client.
    ///
    /// # Errors
    ///
    /// Returns a single configuration error aggregating every violation,
    /// sorted by path.
    pub fn build(self) -> Result<BulkExportClient, BulkExportError> {
        let violations = self.validate();
        if !violations.is_empty() {
            return Err(BulkExportError::configuration(format_violations(
                "Invalid bulk export client configuration",
                &violations,
            )));
        }
        Ok(BulkExportClient {
            fhir_endpoint_url: self.fhir_endpoint_url.unwrap_or_default(),
            level: self.level,
            output_format: self.output_format,
            since: self.since,
            types: self.types,
            patients: self.patients,
            elements: self.elements,
            type_filters: self.type_filters,
            include_associated_data: self.include_associated_data,
            output_dir: self.output_dir.unwrap_or_default(),
            output_extension: self.output_extension,
            timeout: self.timeout,
            max_concurrent_downloads: self.max_concurrent_downloads,
            file_store: self.file_store,
            http_client_config: self.http_client_config,
            async_config: self.async_config,
            auth_config: self.auth_config,
        })
    }
}
