//! SMART configuration discovery.
//!
//! Resolves the OAuth2 token endpoint by fetching the well-known SMART
//! configuration document from the FHIR server.

use serde::Deserialize;
use url::Url;

use super::AuthError;

/// The subset of the SMART configuration document this client consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct SmartConfiguration {
    /// URL of the OAuth 2.0 token endpoint.
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

/// Builds the discovery URL for a FHIR endpoint:
/// `{endpoint}/.well-known/smart-configuration`.
#[must_use]
pub fn discovery_url(fhir_endpoint: &Url) -> Url {
    let mut url = fhir_endpoint.clone();
    let path = fhir_endpoint.path().trim_end_matches('/');
    url.set_path(&format!("{path}/.well-known/smart-configuration"));
    url.set_query(None);
    url
}

/// Fetches the SMART configuration and returns its token endpoint.
///
/// # Errors
///
/// Returns an error if the document cannot be fetched or parsed, or if it
/// does not advertise a token endpoint.
pub async fn discover_token_endpoint(
    http: &reqwest::Client,
    fhir_endpoint: &Url,
) -> Result<String, AuthError> {
    let url = discovery_url(fhir_endpoint);
    tracing::debug!("Fetching SMART configuration from {}", url);

    let response = http
        .get(url.as_str())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| {
            tracing::warn!("Failed to fetch SMART configuration from {}: {}", url, e);
            AuthError::Network(e.to_string())
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Http(status.as_u16()));
    }

    let configuration: SmartConfiguration = response
        .json()
        .await
        .map_err(|e| AuthError::Parse(e.to_string()))?;

    configuration
        .token_endpoint
        .ok_or_else(|| AuthError::MissingField("token_endpoint".to_string()))
}
