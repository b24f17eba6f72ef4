//! `OperationOutcome` error payloads and the retryable-issue classification.

use serde::{Deserialize, Serialize};

/// Issue codes that mark a 5xx response as retry-eligible during polling.
const RETRYABLE_ISSUE_CODES: [&str; 3] = ["transient", "throttled", "timeout"];

/// A FHIR `OperationOutcome` resource, as returned with protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Always `"OperationOutcome"`.
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    /// The issues reported by the server.
    #[serde(default)]
    pub issue: Vec<OutcomeIssue>,
}

/// A single issue within an `OperationOutcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutcomeIssue {
    /// Issue severity (`fatal`, `error`, `warning`, `information`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,

    /// Issue type code (e.g. `transient`, `throttled`, `timeout`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Additional diagnostic text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl OutcomeIssue {
    /// Whether this issue's code marks it as retry-eligible.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| RETRYABLE_ISSUE_CODES.contains(&code))
    }
}

impl OperationOutcome {
    /// Quietly parses an `OperationOutcome` from a response body.
    ///
    /// Returns `None` for anything that is not a well-formed
    /// `OperationOutcome` JSON document; error bodies are advisory and a
    /// malformed one must not mask the HTTP error itself.
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|outcome| outcome.resource_type == "OperationOutcome")
    }

    /// Whether any reported issue is retry-eligible.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.issue.iter().any(OutcomeIssue::is_transient)
    }
}
