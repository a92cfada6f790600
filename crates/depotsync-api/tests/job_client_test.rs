// Integration tests for `JobClient` using wiremock.
#![allow(clippy::unwrap_used)]

use std::time::Duration;

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use depotsync_api::{Error, JobClient, JobKind, JobStatus, PollConfig, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, JobClient) {
    let server = MockServer::start().await;
    let base = Url::parse(&format!("{}/v1", server.uri())).unwrap();
    let client = JobClient::with_client(reqwest::Client::new(), base);
    (server, client)
}

fn fast(kind: JobKind, max_attempts: u32) -> JobKind {
    JobKind {
        poll: PollConfig::new(Duration::from_millis(5), max_attempts),
        ..kind
    }
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_job_polls_until_done() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/simulation"))
        .and(body_json(json!({ "years": 10 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sim-1" })))
        .expect(1)
        .mount(&server)
        .await;

    // First two polls are pending, the third is done.
    Mock::given(method("GET"))
        .and(path("/v1/simulation/sim-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/simulation/sim-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "done", "paths": [[1.0, 1.1]] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let kind = fast(JobKind::simulation(), 5);
    let result = client.run_job(&kind, &json!({ "years": 10 }), &[]).await.unwrap();

    assert_eq!(result.status, JobStatus::Done);
    assert_eq!(result.payload["paths"], json!([[1.0, 1.1]]));
}

#[tokio::test]
async fn test_run_job_returns_terminal_creation_response() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/correlation-matrix"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "insufficient_data", "missing": ["ISIN1"] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client
        .run_job(&JobKind::correlation_matrix(), &json!({}), &[])
        .await
        .unwrap();

    assert_eq!(result.status, JobStatus::InsufficientData);
    assert_eq!(result.payload["missing"], json!(["ISIN1"]));
}

#[tokio::test]
async fn test_job_status_forwards_query_params() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/risk-parity/rp-9"))
        .and(query_param("currency", "EUR"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "done" })))
        .expect(1)
        .mount(&server)
        .await;

    let handle = client
        .job_status(&JobKind::risk_parity(), "rp-9", &[("currency", "EUR")])
        .await
        .unwrap();
    assert_eq!(handle.status, JobStatus::Done);
}

// ── Failure modes ───────────────────────────────────────────────────

#[tokio::test]
async fn test_run_job_exhausts_attempt_budget() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/simulation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sim-2" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/simulation/sim-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .expect(3)
        .mount(&server)
        .await;

    let kind = fast(JobKind::simulation(), 3);
    let err = client.run_job(&kind, &json!({}), &[]).await.unwrap_err();

    assert!(matches!(err, Error::PollExhausted { attempts: 3 }), "got {err:?}");
}

#[tokio::test]
async fn test_insufficient_data_keeps_polling_when_not_terminal() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/simulation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "sim-3" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/simulation/sim-3"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "insufficient_data" })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let kind = fast(JobKind::simulation(), 2);
    let err = client.run_job(&kind, &json!({}), &[]).await.unwrap_err();
    assert!(matches!(err, Error::PollExhausted { attempts: 2 }));
}

#[tokio::test]
async fn test_http_error_aborts_polling() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/optimization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "opt-1" })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/optimization/opt-1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("solver crashed"))
        .expect(1)
        .mount(&server)
        .await;

    let kind = fast(JobKind::optimization(), 10);
    let err = client.run_job(&kind, &json!({}), &[]).await.unwrap_err();

    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "solver crashed");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/portfolio-construction"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client
        .create_job(&JobKind::portfolio_construction(), &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }));
}

#[tokio::test]
async fn test_creation_without_id_or_terminal_status_fails() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/v1/simulation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "pending" })))
        .mount(&server)
        .await;

    let err = client
        .run_job(&JobKind::simulation(), &json!({}), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Deserialization { .. }));
}

#[tokio::test]
async fn test_garbage_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/v1/simulation/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client
        .job_status(&JobKind::simulation(), "x", &[])
        .await
        .unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected Deserialization, got {other:?}"),
    }
}

// ── Credential ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_bearer_token_is_attached() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/simulation/s"))
        .and(header("authorization", "Bearer opaque-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "done" })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TransportConfig::default().with_token(SecretString::from("opaque-token".to_owned()));
    let client = JobClient::new(
        Url::parse(&format!("{}/v1", server.uri())).unwrap(),
        &transport,
    )
    .unwrap();

    let handle = client
        .job_status(&JobKind::simulation(), "s", &[])
        .await
        .unwrap();
    assert_eq!(handle.status, JobStatus::Done);
}
