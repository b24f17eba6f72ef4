//! The HTTP transport for the async export protocol.
//!
//! Issues kick-off and status-poll calls, injects the bearer token, retries
//! socket-level failures, and classifies every response into
//! [`AsyncResponse`] or an error.

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LOCATION, CONTENT_TYPE, RETRY_AFTER};
use url::Url;

use crate::auth::TokenProvider;
use crate::error::BulkExportError;
use crate::fhir::OperationOutcome;

use super::request::BulkExportRequest;
use super::response::{AcceptedResponse, AsyncResponse, BulkExportManifest};
use super::retry::RetryValue;

const APPLICATION_FHIR_JSON: &str = "application/fhir+json";
const FHIR_JSON_UTF8: &str = "application/fhir+json; charset=UTF-8";
const X_PROGRESS_HEADER: &str = "x-progress";

/// The transport for kick-off and status-poll calls against one FHIR
/// endpoint.
pub struct AsyncExportService {
    http: reqwest::Client,
    fhir_endpoint: Url,
    token_provider: Option<Arc<TokenProvider>>,
    retry_count: u32,
}

impl AsyncExportService {
    /// Creates a service for the given endpoint.
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        fhir_endpoint: Url,
        token_provider: Option<Arc<TokenProvider>>,
        retry_count: u32,
    ) -> Self {
        Self {
            http,
            fhir_endpoint,
            token_provider,
            retry_count,
        }
    }

    /// Submits the kick-off request: GET with query parameters, or POST
    /// with a `Parameters` body when patient references are present.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid request combinations, transport
    /// breakdown, or any non-2xx response.
    pub async fn kick_off(
        &self,
        request: &BulkExportRequest,
    ) -> Result<AsyncResponse, BulkExportError> {
        if !request.level.patient_supported() && !request.patients.is_empty() {
            return Err(BulkExportError::configuration(format!(
                "'patient' is not supported for a {} level export",
                request.level
            )));
        }

        let (url, builder) = if request.uses_post() {
            let url = request.kick_off_endpoint(&self.fhir_endpoint)?;
            let body = serde_json::to_string(&request.to_parameters()).map_err(|e| {
                BulkExportError::system("failed to encode Parameters body", e)
            })?;
            let builder = self
                .http
                .post(url.clone())
                .header(CONTENT_TYPE, FHIR_JSON_UTF8)
                .body(body);
            (url, builder)
        } else {
            let url = request.kick_off_url(&self.fhir_endpoint)?;
            (url.clone(), self.http.get(url))
        };

        tracing::debug!(
            "Kicking off bulk export: {} {}",
            if request.uses_post() { "POST" } else { "GET" },
            url
        );
        let builder = builder
            .header(ACCEPT, APPLICATION_FHIR_JSON)
            .header("prefer", "respond-async");
        self.execute(builder, &url).await
    }

    /// Polls the status URL. A `200 OK` carries the completion manifest.
    ///
    /// # Errors
    ///
    /// Returns an error for transport breakdown or any non-2xx response.
    pub async fn check_status(&self, status_url: &Url) -> Result<AsyncResponse, BulkExportError> {
        let builder = self
            .http
            .get(status_url.clone())
            .header(ACCEPT, "application/json");
        self.execute(builder, status_url).await
    }

    /// Sends the request with auth injection and bounded socket-level
    /// retries, then classifies the response.
    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<AsyncResponse, BulkExportError> {
        let builder = self.authorize(builder).await?;

        let mut attempt = 0;
        loop {
            let request = builder.try_clone().ok_or_else(|| {
                BulkExportError::system_message("request body cannot be retried")
            })?;
            match request.send().await {
                Ok(response) => return classify(response, url).await,
                Err(e) if is_socket_error(&e) && attempt < self.retry_count => {
                    attempt += 1;
                    tracing::warn!(
                        "Socket error on {} (attempt {}/{}): {}",
                        url,
                        attempt,
                        self.retry_count,
                        e
                    );
                }
                Err(e) => {
                    return Err(BulkExportError::system(
                        format!("request to {url} failed"),
                        e,
                    ));
                }
            }
        }
    }

    /// Adds the bearer token to a protocol request. Unlike downloads,
    /// kick-off and status polls always carry the token: the status URL may
    /// legitimately live on a different origin than the FHIR endpoint.
    async fn authorize(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, BulkExportError> {
        match &self.token_provider {
            Some(provider) => {
                let token = provider.bearer_token().await?;
                Ok(builder.header(AUTHORIZATION, format!("Bearer {token}")))
            }
            None => Ok(builder),
        }
    }
}

/// Whether a transport error is a socket-level failure worth retrying.
fn is_socket_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Classifies an HTTP response per the async request pattern.
async fn classify(
    response: reqwest::Response,
    url: &Url,
) -> Result<AsyncResponse, BulkExportError> {
    let status = response.status();
    match status.as_u16() {
        200 => {
            let body = response.text().await.map_err(|e| {
                BulkExportError::system(format!("failed to read response from {url}"), e)
            })?;
            let manifest: BulkExportManifest = serde_json::from_str(&body).map_err(|e| {
                BulkExportError::protocol(format!("invalid completion manifest from {url}: {e}"))
            })?;
            Ok(AsyncResponse::Final(manifest))
        }
        202 => {
            let accepted = AcceptedResponse {
                content_location: header_value(&response, CONTENT_LOCATION.as_str()),
                progress: header_value(&response, X_PROGRESS_HEADER),
                retry_after: header_value(&response, RETRY_AFTER.as_str())
                    .and_then(|v| RetryValue::parse_http_value(&v)),
            };
            Ok(AsyncResponse::Accepted(accepted))
        }
        code => {
            let retry_after = header_value(&response, RETRY_AFTER.as_str())
                .and_then(|v| RetryValue::parse_http_value(&v))
                .map(|v| v.delay());
            let is_json = header_value(&response, CONTENT_TYPE.as_str())
                .is_some_and(|ct| ct.contains("json"));
            let outcome = if is_json {
                response
                    .text()
                    .await
                    .ok()
                    .and_then(|body| OperationOutcome::parse(&body))
            } else {
                None
            };
            tracing::debug!("HTTP error {} from {}", code, url);
            Err(BulkExportError::Http {
                message: format!("async request to {url} failed"),
                status: code,
                outcome,
                retry_after,
            })
        }
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}
