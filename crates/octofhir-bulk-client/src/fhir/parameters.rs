//! `Parameters` and `Reference` value carriers for POST kick-off bodies.

use serde::{Deserialize, Serialize};

use super::FhirInstant;

/// A FHIR reference, carried as an opaque reference string
/// (e.g. `Patient/0001`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// The reference string.
    pub reference: String,
}

impl Reference {
    /// Creates a reference from its string form.
    #[must_use]
    pub fn of(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
        }
    }
}

/// A FHIR `Parameters` resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Always `"Parameters"`.
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    /// The parameter entries, in request order.
    pub parameter: Vec<Parameter>,
}

impl Parameters {
    /// Creates a `Parameters` resource from its entries.
    #[must_use]
    pub fn of(parameter: Vec<Parameter>) -> Self {
        Self {
            resource_type: "Parameters".to_string(),
            parameter,
        }
    }
}

/// A single entry in a `Parameters` resource.
///
/// Exactly one of the `value*` fields is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// The parameter name.
    pub name: String,

    /// A string value.
    #[serde(rename = "valueString", skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub value_string: Option<String>,

    /// An instant value.
    #[serde(rename = "valueInstant", skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub value_instant: Option<FhirInstant>,

    /// A reference value.
    #[serde(rename = "valueReference", skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub value_reference: Option<Reference>,
}

impl Parameter {
    /// Creates a string-valued parameter.
    #[must_use]
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_string: Some(value.into()),
            value_instant: None,
            value_reference: None,
        }
    }

    /// Creates an instant-valued parameter.
    #[must_use]
    pub fn instant(name: impl Into<String>, value: FhirInstant) -> Self {
        Self {
            name: name.into(),
            value_string: None,
            value_instant: Some(value),
            value_reference: None,
        }
    }

    /// Creates a reference-valued parameter.
    #[must_use]
    pub fn reference(name: impl Into<String>, value: Reference) -> Self {
        Self {
            name: name.into(),
            value_string: None,
            value_instant: None,
            value_reference: Some(value),
        }
    }
}
