//! Classified protocol responses and the completion manifest.

use serde::Deserialize;

use crate::fhir::FhirInstant;

use super::retry::RetryValue;

/// The outcome of a protocol-layer HTTP call. Errors are raised, not
/// represented as a variant.
#[derive(Debug, Clone)]
pub enum AsyncResponse {
    /// The server is still computing the export.
    Accepted(AcceptedResponse),
    /// The export is complete and the manifest is available.
    Final(BulkExportManifest),
}

/// A `202 Accepted` response.
#[derive(Debug, Clone, Default)]
pub struct AcceptedResponse {
    /// The status URL from the `Content-Location` header. Required on the
    /// kick-off response; optional on subsequent polls.
    pub content_location: Option<String>,
    /// The `x-progress` header, when present. Logged, never interpreted.
    pub progress: Option<String>,
    /// The parsed `Retry-After` header, when present.
    pub retry_after: Option<RetryValue>,
}

/// The completion manifest returned when status polling yields `200 OK`.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkExportManifest {
    /// Server time at which the export transactionally applies.
    pub transaction_time: FhirInstant,

    /// The kick-off request URL, echoed by the server.
    #[serde(default)]
    pub request: String,

    /// The result files, in server order.
    #[serde(default)]
    pub output: Vec<FileItem>,

    /// Deleted-resource bundles. Not consumed by this client.
    #[serde(default)]
    pub deleted: Vec<FileItem>,

    /// Error outcomes. Not consumed by this client.
    #[serde(default)]
    pub error: Vec<FileItem>,
}

/// A single file entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileItem {
    /// The resource type contained in the file.
    #[serde(rename = "type")]
    pub resource_type: String,

    /// The URL to download the file from.
    pub url: String,

    /// The number of resources in the file, when the server reports it.
    #[serde(default)]
    pub count: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest_with_snake_case_fields() {
        let manifest: BulkExportManifest = serde_json::from_str(
            r#"{
                "transaction_time": "2024-01-01T00:00:00.000Z",
                "request": "http://srv/fhir/$export?_type=Patient",
                "output": [
                    {"type": "Patient", "url": "http://srv/d/1", "count": 10},
                    {"type": "Condition", "url": "http://srv/d/2"}
                ],
                "deleted": [],
                "error": []
            }"#,
        )
        .unwrap();

        assert_eq!(
            manifest.transaction_time.to_string(),
            "2024-01-01T00:00:00.000Z"
        );
        assert_eq!(
            manifest.output,
            vec![
                FileItem {
                    resource_type: "Patient".to_string(),
                    url: "http://srv/d/1".to_string(),
                    count: Some(10),
                },
                FileItem {
                    resource_type: "Condition".to_string(),
                    url: "http://srv/d/2".to_string(),
                    count: None,
                },
            ]
        );
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let manifest: BulkExportManifest =
            serde_json::from_str(r#"{"transaction_time": 1704067200000}"#).unwrap();
        assert_eq!(
            manifest.transaction_time.to_string(),
            "2024-01-01T00:00:00.000Z"
        );
        assert!(manifest.output.is_empty());
        assert!(manifest.deleted.is_empty());
        assert!(manifest.error.is_empty());
    }

    #[test]
    fn manifest_without_transaction_time_is_rejected() {
        assert!(serde_json::from_str::<BulkExportManifest>(r#"{"output": []}"#).is_err());
    }
}
