//! The slice of the FHIR data model the export wire protocol requires.
//!
//! Resource type names are opaque strings throughout the client; this module
//! only carries the value types that actually cross the wire: `Parameters`
//! bodies for POST kick-offs, `Reference` values for the `patient`
//! parameter, `OperationOutcome` error payloads, and the FHIR `instant`
//! format.

mod instant;
mod outcome;
mod parameters;

pub use instant::{FhirInstant, InstantParseError, format_fhir_instant, parse_fhir_instant};
pub use outcome::{OperationOutcome, OutcomeIssue};
pub use parameters::{Parameter, Parameters, Reference};
