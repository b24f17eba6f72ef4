//! End-to-end export scenarios against a mock FHIR server.

use std::time::{Duration, Instant};

use octofhir_bulk_client::{
    AsyncConfig, AuthConfig, BulkExportClient, BulkExportError, Reference,
};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_async_config() -> AsyncConfig {
    AsyncConfig::new()
        .with_min_polling_delay(Duration::from_millis(10))
        .with_max_polling_delay(Duration::from_millis(100))
}

fn manifest_with_outputs(outputs: &[(&str, String)]) -> serde_json::Value {
    let output: Vec<serde_json::Value> = outputs
        .iter()
        .map(|(resource_type, url)| serde_json::json!({"type": resource_type, "url": url}))
        .collect();
    serde_json::json!({
        "transaction_time": "2024-01-01T00:00:00.000Z",
        "request": "http://srv/fhir/$export",
        "output": output,
        "deleted": [],
        "error": []
    })
}

fn transient_outcome() -> serde_json::Value {
    serde_json::json!({
        "resourceType": "OperationOutcome",
        "issue": [{"severity": "error", "code": "transient"}]
    })
}

#[tokio::test]
async fn system_export_without_auth_writes_files_and_success_marker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .and(query_param("_type", "Patient,Condition"))
        .and(header("accept", "application/fhir+json"))
        .and(header("prefer", "respond-async"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", format!("{}/poll/1", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_with_outputs(&[
            ("Patient", format!("{}/d/1", server.uri())),
            ("Condition", format!("{}/d/2", server.uri())),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":\"p1\"}\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":\"c1\"}\n"))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("export");

    let result = BulkExportClient::system_builder()
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(output_dir.to_str().unwrap())
        .with_types(["Patient", "Condition"])
        .with_async_config(fast_async_config())
        .build()
        .unwrap()
        .export()
        .await
        .unwrap();

    assert_eq!(
        result.transaction_time.to_string(),
        "2024-01-01T00:00:00.000Z"
    );
    assert_eq!(result.results.len(), 2);
    assert_eq!(result.results[0].size, 12);
    assert_eq!(result.results[1].size, 12);

    let patient = std::fs::read_to_string(output_dir.join("Patient.0000.ndjson")).unwrap();
    assert_eq!(patient, "{\"id\":\"p1\"}\n");
    assert!(output_dir.join("Condition.0000.ndjson").exists());
    assert!(output_dir.join("_SUCCESS").exists());
    assert_eq!(
        std::fs::metadata(output_dir.join("_SUCCESS")).unwrap().len(),
        0
    );
}

#[tokio::test]
async fn group_export_with_patients_posts_a_parameters_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/fhir/Group/id0001/$export"))
        .and(header("accept", "application/fhir+json"))
        .and(header("prefer", "respond-async"))
        .and(header("content-type", "application/fhir+json; charset=UTF-8"))
        .and(body_json(serde_json::json!({
            "resourceType": "Parameters",
            "parameter": [
                {"name": "_outputFormat", "valueString": "application/fhir+ndjson"},
                {"name": "_type", "valueString": "Patient,Condition"},
                {"name": "patient", "valueReference": {"reference": "Patient/0001"}}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", format!("{}/poll/1", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_with_outputs(&[(
            "Patient",
            format!("{}/d/1", server.uri()),
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}\n"))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("export");

    let result = BulkExportClient::group_builder("id0001")
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(output_dir.to_str().unwrap())
        .with_types(["Patient", "Condition"])
        .with_patient(Reference::of("Patient/0001"))
        .with_async_config(fast_async_config())
        .build()
        .unwrap()
        .export()
        .await
        .unwrap();

    assert_eq!(result.results.len(), 1);
    assert!(output_dir.join("_SUCCESS").exists());
}

#[tokio::test]
async fn recovers_from_transient_errors_and_honors_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", format!("{}/poll/1", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("retry-after", "1")
                .set_body_json(transient_outcome()),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_with_outputs(&[])))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("export");

    let started = Instant::now();
    let result = BulkExportClient::system_builder()
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(output_dir.to_str().unwrap())
        // default max_polling_delay so the Retry-After hint is not clamped
        .with_async_config(AsyncConfig::new().with_max_transient_errors(3))
        .build()
        .unwrap()
        .export()
        .await
        .unwrap();

    // two Retry-After: 1 hints must be honored
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(result.results.is_empty());
    assert!(output_dir.join("_SUCCESS").exists());
}

#[tokio::test]
async fn exhausted_transient_budget_fails_without_downloading() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", format!("{}/poll/1", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("retry-after", "0")
                .set_body_json(transient_outcome()),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("export");

    let err = BulkExportClient::system_builder()
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(output_dir.to_str().unwrap())
        .with_async_config(fast_async_config().with_max_transient_errors(1))
        .build()
        .unwrap()
        .export()
        .await
        .unwrap_err();

    assert!(matches!(err, BulkExportError::Http { status: 503, .. }));
    assert!(!output_dir.join("_SUCCESS").exists());
}

#[tokio::test]
async fn deadline_during_download_raises_timeout_and_leaves_no_marker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", format!("{}/poll/1", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_with_outputs(&[
            ("Patient", format!("{}/d/1", server.uri())),
            ("Condition", format!("{}/d/2", server.uri())),
        ])))
        .mount(&server)
        .await;
    for download in ["/d/1", "/d/2"] {
        Mock::given(method("GET"))
            .and(path(download))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;
    }

    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("export");

    let started = Instant::now();
    let err = BulkExportClient::system_builder()
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(output_dir.to_str().unwrap())
        .with_timeout(Duration::from_secs(5))
        .with_async_config(fast_async_config())
        .build()
        .unwrap()
        .export()
        .await
        .unwrap_err();

    let elapsed = started.elapsed();
    assert!(matches!(err, BulkExportError::Timeout { .. }));
    assert!(elapsed >= Duration::from_secs(4));
    assert!(elapsed < Duration::from_secs(9));
    assert!(!output_dir.join("_SUCCESS").exists());
}

#[tokio::test]
async fn existing_destination_directory_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();

    let err = BulkExportClient::system_builder()
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(tmp.path().to_str().unwrap())
        .build()
        .unwrap()
        .export()
        .await
        .unwrap_err();

    assert!(matches!(err, BulkExportError::Configuration { .. }));
}

#[tokio::test]
async fn authenticated_export_sends_bearer_only_to_the_fhir_origin() {
    let server = MockServer::start().await;
    let cdn = MockServer::start().await;
    let bearer = "Bearer token-abc";

    Mock::given(method("GET"))
        .and(path("/fhir/.well-known/smart-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "token_endpoint": format!("{}/auth/token", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-abc",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fhir/$export"))
        .and(header("authorization", bearer))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("content-location", format!("{}/poll/1", server.uri())),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/poll/1"))
        .and(header("authorization", bearer))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_with_outputs(&[
            ("Patient", format!("{}/d/1", server.uri())),
            ("Condition", format!("{}/d/2", cdn.uri())),
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/1"))
        .and(header("authorization", bearer))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}\n"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}\n"))
        .expect(1)
        .mount(&cdn)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let output_dir = tmp.path().join("export");

    BulkExportClient::system_builder()
        .with_fhir_endpoint_url(format!("{}/fhir", server.uri()))
        .with_output_dir(output_dir.to_str().unwrap())
        .with_async_config(fast_async_config())
        .with_auth_config(
            AuthConfig::new()
                .with_enabled(true)
                .with_use_smart(true)
                .with_client_id("client-id")
                .with_client_secret("client-secret")
                .with_scope("system/*.read"),
        )
        .build()
        .unwrap()
        .export()
        .await
        .unwrap();

    // the cross-origin download must not have seen the bearer token
    let cdn_requests = cdn.received_requests().await.unwrap();
    assert_eq!(cdn_requests.len(), 1);
    assert!(!cdn_requests[0].headers.contains_key("authorization"));

    assert!(output_dir.join("Patient.0000.ndjson").exists());
    assert!(output_dir.join("Condition.0000.ndjson").exists());
    assert!(output_dir.join("_SUCCESS").exists());
}
