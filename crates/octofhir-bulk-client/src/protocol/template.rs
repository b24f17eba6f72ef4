//! The kick-off / poll / manifest state machine.
//!
//! One orchestrator drives a single export to its manifest: submit the
//! kick-off, then poll the status URL with server-driven pacing and a
//! budgeted tolerance for transient errors, all under the global deadline.
//! Downloading is the caller's concern; the orchestrator's job ends when
//! the manifest is in hand.

use std::time::Duration;

use url::Url;

use crate::config::AsyncConfig;
use crate::error::BulkExportError;
use crate::timeout::Deadline;

use super::request::BulkExportRequest;
use super::response::{AsyncResponse, BulkExportManifest};
use super::service::AsyncExportService;

/// Drives the asynchronous export protocol to completion.
pub struct ExportOrchestrator {
    service: AsyncExportService,
    config: AsyncConfig,
}

impl ExportOrchestrator {
    /// Creates an orchestrator over the given transport.
    #[must_use]
    pub fn new(service: AsyncExportService, config: AsyncConfig) -> Self {
        Self { service, config }
    }

    /// Runs kick-off and polling until the completion manifest is
    /// available.
    ///
    /// # Errors
    ///
    /// Returns an error when the kick-off or a poll fails fatally, the
    /// transient-error budget is exhausted, or the deadline expires.
    pub async fn export(
        &self,
        request: &BulkExportRequest,
        deadline: Deadline,
    ) -> Result<BulkExportManifest, BulkExportError> {
        match self.service.kick_off(request).await? {
            AsyncResponse::Final(manifest) => {
                // permitted by the async pattern for servers that complete
                // synchronously
                tracing::warn!("Kick-off returned a final response without polling");
                Ok(manifest)
            }
            AsyncResponse::Accepted(accepted) => {
                let location = accepted.content_location.ok_or_else(|| {
                    BulkExportError::protocol(
                        "accepted kick-off response is missing the Content-Location header",
                    )
                })?;
                let status_url = Url::parse(&location).map_err(|e| {
                    BulkExportError::protocol(format!("invalid status URL '{location}': {e}"))
                })?;
                tracing::debug!("Bulk export accepted, polling status at {}", status_url);
                self.poll(&status_url, deadline).await
            }
        }
    }

    /// The poll loop. The transient counter is a budget over the whole
    /// poll; it is never reset by a subsequent success.
    async fn poll(
        &self,
        status_url: &Url,
        deadline: Deadline,
    ) -> Result<BulkExportManifest, BulkExportError> {
        let mut transient_errors: u32 = 0;
        loop {
            if deadline.has_expired() {
                tracing::warn!(
                    "Export timed out after {:?} while polling {}",
                    deadline.limit(),
                    status_url
                );
                return Err(BulkExportError::timeout(deadline.limit()));
            }

            match self.service.check_status(status_url).await {
                Ok(AsyncResponse::Final(manifest)) => {
                    tracing::debug!("Export complete with {} output files", manifest.output.len());
                    return Ok(manifest);
                }
                Ok(AsyncResponse::Accepted(accepted)) => {
                    if let Some(progress) = &accepted.progress {
                        tracing::info!("Export progress: {}", progress);
                    }
                    let delay = self.polling_delay(accepted.retry_after.map(|v| v.delay()));
                    tracing::debug!("Export not ready, sleeping for {:?}", delay);
                    tokio::time::sleep(deadline.cap_sleep(delay)).await;
                }
                Err(err) => match transient_retry_after(&err) {
                    Some(retry_after) => {
                        transient_errors += 1;
                        tracing::warn!(
                            "Transient error {}/{} while polling {}",
                            transient_errors,
                            self.config.max_transient_errors,
                            status_url
                        );
                        if transient_errors > self.config.max_transient_errors {
                            return Err(err);
                        }
                        let delay = self.polling_delay(retry_after);
                        tokio::time::sleep(deadline.cap_sleep(delay)).await;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    /// Server-driven pacing: honor `Retry-After` when present, fall back to
    /// the configured minimum, and clamp to the configured ceiling.
    fn polling_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.config.min_polling_delay)
            .min(self.config.max_polling_delay)
    }
}

/// When the error is a retry-eligible transient (5xx with a retryable
/// `OperationOutcome`), returns its `Retry-After` hint.
fn transient_retry_after(err: &BulkExportError) -> Option<Option<Duration>> {
    match err {
        BulkExportError::Http {
            status,
            outcome: Some(outcome),
            retry_after,
            ..
        } if *status >= 500 && outcome.is_transient() => Some(*retry_after),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn orchestrator(server_uri: &str, config: AsyncConfig) -> ExportOrchestrator {
        let endpoint = Url::parse(&format!("{server_uri}/fhir")).unwrap();
        let service = AsyncExportService::new(reqwest::Client::new(), endpoint, None, 0);
        ExportOrchestrator::new(service, config)
    }

    fn fast_config() -> AsyncConfig {
        AsyncConfig::new()
            .with_min_polling_delay(Duration::from_millis(10))
            .with_max_polling_delay(Duration::from_millis(50))
    }

    fn manifest_body() -> serde_json::Value {
        serde_json::json!({
            "transaction_time": "2024-01-01T00:00:00.000Z",
            "request": "http://srv/fhir/$export",
            "output": []
        })
    }

    fn transient_outcome() -> serde_json::Value {
        serde_json::json!({
            "resourceType": "OperationOutcome",
            "issue": [{"severity": "error", "code": "transient"}]
        })
    }

    async fn mount_kick_off(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/fhir/$export"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("content-location", format!("{}/poll/1", server.uri())),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn missing_content_location_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fhir/$export"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let err = orchestrator(&server.uri(), fast_config())
            .export(&BulkExportRequest::default(), Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, BulkExportError::Protocol { .. }));
    }

    #[tokio::test]
    async fn synchronous_final_response_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fhir/$export"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()))
            .mount(&server)
            .await;

        let manifest = orchestrator(&server.uri(), fast_config())
            .export(&BulkExportRequest::default(), Deadline::none())
            .await
            .unwrap();
        assert!(manifest.output.is_empty());
    }

    #[tokio::test]
    async fn polls_until_final_response() {
        let server = MockServer::start().await;
        mount_kick_off(&server).await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-progress", "busy"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()))
            .mount(&server)
            .await;

        let manifest = orchestrator(&server.uri(), fast_config())
            .export(&BulkExportRequest::default(), Deadline::none())
            .await
            .unwrap();
        assert_eq!(manifest.request, "http://srv/fhir/$export");
    }

    #[tokio::test]
    async fn recovers_from_transient_errors_within_budget() {
        let server = MockServer::start().await;
        mount_kick_off(&server).await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("retry-after", "0")
                    .set_body_json(transient_outcome()),
            )
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()))
            .mount(&server)
            .await;

        let config = fast_config().with_max_transient_errors(3);
        orchestrator(&server.uri(), config)
            .export(&BulkExportRequest::default(), Deadline::none())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exhausted_transient_budget_surfaces_the_http_error() {
        let server = MockServer::start().await;
        mount_kick_off(&server).await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("retry-after", "0")
                    .set_body_json(transient_outcome()),
            )
            .mount(&server)
            .await;

        let config = fast_config().with_max_transient_errors(1);
        let err = orchestrator(&server.uri(), config)
            .export(&BulkExportRequest::default(), Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, BulkExportError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn non_transient_errors_fail_immediately() {
        let server = MockServer::start().await;
        mount_kick_off(&server).await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = orchestrator(&server.uri(), fast_config())
            .export(&BulkExportRequest::default(), Deadline::none())
            .await
            .unwrap_err();
        assert!(matches!(err, BulkExportError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn deadline_expiry_during_polling_raises_timeout() {
        let server = MockServer::start().await;
        mount_kick_off(&server).await;
        Mock::given(method("GET"))
            .and(path("/poll/1"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let deadline = Deadline::start(Duration::from_millis(200));
        let err = orchestrator(&server.uri(), fast_config())
            .export(&BulkExportRequest::default(), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, BulkExportError::Timeout { .. }));
    }
}
