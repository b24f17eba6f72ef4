//! The kick-off request and its GET/POST renderings.

use std::fmt;

use url::Url;

use crate::error::BulkExportError;
use crate::fhir::{FhirInstant, Parameter, Parameters, Reference};

/// The level of an export operation, determining the kick-off path and
/// whether a `patient` list is permitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportLevel {
    /// A system-level export (`$export`).
    System,
    /// A patient-level export (`Patient/$export`).
    Patient,
    /// A group-level export (`Group/{id}/$export`).
    Group {
        /// The group ID.
        id: String,
    },
}

impl ExportLevel {
    /// The export operation path for this level, relative to the FHIR
    /// endpoint.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::System => "$export".to_string(),
            Self::Patient => "Patient/$export".to_string(),
            Self::Group { id } => format!("Group/{id}/$export"),
        }
    }

    /// Whether this level supports patient-specific exports.
    #[must_use]
    pub fn patient_supported(&self) -> bool {
        match self {
            Self::System => false,
            Self::Patient | Self::Group { .. } => true,
        }
    }
}

impl fmt::Display for ExportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Patient => write!(f, "patient"),
            Self::Group { id } => write!(f, "group/{id}"),
        }
    }
}

/// A value of the `includeAssociatedData` parameter: a closed set of named
/// codes plus `_`-prefixed custom codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociatedData {
    /// Include the most recent Provenance resources.
    LatestProvenanceResources,
    /// Include all relevant Provenance resources.
    RelevantProvenanceResources,
    /// A server-defined code, rendered with a `_` prefix.
    Custom(String),
}

impl AssociatedData {
    /// Creates a custom code (without the `_` prefix).
    #[must_use]
    pub fn custom(code: impl Into<String>) -> Self {
        Self::Custom(code.into())
    }

    /// The wire form of this code.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::LatestProvenanceResources => "LatestProvenanceResources".to_string(),
            Self::RelevantProvenanceResources => "RelevantProvenanceResources".to_string(),
            Self::Custom(code) => format!("_{code}"),
        }
    }

    /// Parses a wire-form code: one of the named codes, or a `_`-prefixed
    /// custom code.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for anything else.
    pub fn from_code(code: &str) -> Result<Self, BulkExportError> {
        match code {
            "LatestProvenanceResources" => Ok(Self::LatestProvenanceResources),
            "RelevantProvenanceResources" => Ok(Self::RelevantProvenanceResources),
            custom if custom.starts_with('_') => Ok(Self::Custom(custom[1..].to_string())),
            other => Err(BulkExportError::configuration(format!(
                "unknown includeAssociatedData code: {other}"
            ))),
        }
    }
}

impl fmt::Display for AssociatedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A request to initiate a bulk export operation.
///
/// Lists render comma-joined in their original order; empty lists and unset
/// options are omitted entirely from the wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkExportRequest {
    /// The level of the export operation.
    pub level: ExportLevel,
    /// The `_outputFormat` parameter.
    pub output_format: Option<String>,
    /// The `_since` parameter.
    pub since: Option<FhirInstant>,
    /// The `_type` parameter entries.
    pub types: Vec<String>,
    /// The `_elements` parameter entries.
    pub elements: Vec<String>,
    /// The `_typeFilter` parameter entries.
    pub type_filters: Vec<String>,
    /// The `includeAssociatedData` parameter entries.
    pub include_associated_data: Vec<AssociatedData>,
    /// The `patient` parameter entries. Non-empty forces a POST kick-off.
    pub patients: Vec<Reference>,
}

impl Default for BulkExportRequest {
    fn default() -> Self {
        Self {
            level: ExportLevel::System,
            output_format: None,
            since: None,
            types: Vec::new(),
            elements: Vec::new(),
            type_filters: Vec::new(),
            include_associated_data: Vec::new(),
            patients: Vec::new(),
        }
    }
}

impl BulkExportRequest {
    /// Whether this request must be submitted as a POST with a `Parameters`
    /// body.
    #[must_use]
    pub fn uses_post(&self) -> bool {
        !self.patients.is_empty()
    }

    /// Resolves the kick-off operation URL against the FHIR endpoint,
    /// without query parameters.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the level path cannot be resolved
    /// against the endpoint.
    pub fn kick_off_endpoint(&self, fhir_endpoint: &Url) -> Result<Url, BulkExportError> {
        let base = ensure_trailing_slash(fhir_endpoint);
        base.join(&self.level.path()).map_err(|e| {
            BulkExportError::protocol(format!(
                "cannot resolve export path against {fhir_endpoint}: {e}"
            ))
        })
    }

    /// Renders the GET form: the kick-off URL with query parameters.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the URL cannot be built.
    pub fn kick_off_url(&self, fhir_endpoint: &Url) -> Result<Url, BulkExportError> {
        let mut url = self.kick_off_endpoint(fhir_endpoint)?;
        let params = self.query_parameters();
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    /// The populated query parameters, in wire order.
    #[must_use]
    pub fn query_parameters(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(format) = &self.output_format {
            params.push(("_outputFormat", format.clone()));
        }
        if let Some(since) = &self.since {
            params.push(("_since", since.to_string()));
        }
        if !self.types.is_empty() {
            params.push(("_type", self.types.join(",")));
        }
        if !self.elements.is_empty() {
            params.push(("_elements", self.elements.join(",")));
        }
        if !self.type_filters.is_empty() {
            params.push(("_typeFilter", self.type_filters.join(",")));
        }
        if !self.include_associated_data.is_empty() {
            params.push((
                "includeAssociatedData",
                self.include_associated_data
                    .iter()
                    .map(AssociatedData::code)
                    .collect::<Vec<_>>()
                    .join(","),
            ));
        }
        params
    }

    /// Renders the POST form: a FHIR `Parameters` body with one entry per
    /// populated field and one `patient` entry per reference.
    #[must_use]
    pub fn to_parameters(&self) -> Parameters {
        let mut parameters = Vec::new();
        if let Some(format) = &self.output_format {
            parameters.push(Parameter::string("_outputFormat", format.clone()));
        }
        if let Some(since) = self.since {
            parameters.push(Parameter::instant("_since", since));
        }
        if !self.types.is_empty() {
            parameters.push(Parameter::string("_type", self.types.join(",")));
        }
        if !self.elements.is_empty() {
            parameters.push(Parameter::string("_elements", self.elements.join(",")));
        }
        if !self.type_filters.is_empty() {
            parameters.push(Parameter::string("_typeFilter", self.type_filters.join(",")));
        }
        if !self.include_associated_data.is_empty() {
            parameters.push(Parameter::string(
                "includeAssociatedData",
                self.include_associated_data
                    .iter()
                    .map(AssociatedData::code)
                    .collect::<Vec<_>>()
                    .join(","),
            ));
        }
        parameters.extend(
            self.patients
                .iter()
                .map(|patient| Parameter::reference("patient", patient.clone())),
        );
        Parameters::of(parameters)
    }
}

/// Returns the URL with a guaranteed trailing slash on its path, so that
/// relative resolution appends rather than replaces the final segment.
fn ensure_trailing_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        return url.clone();
    }
    let mut slashed = url.clone();
    slashed.set_path(&format!("{}/", url.path()));
    slashed
}
