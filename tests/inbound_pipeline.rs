//! End-to-end tests of the inbound middleware chain.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use serde_json::Value;
use uuid::Uuid;

use service_pipeline::http::middleware::{AuthError, Authenticator, Identity};

mod common;
use common::{Backend, EXAMPLE_API_KEY, TEST_TOKEN};

#[tokio::test]
async fn supplied_request_id_is_echoed() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;

    let res = common::http_client()
        .get(format!("http://{addr}/status"))
        .header("X-Request-ID", "client-supplied-1")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-request-id"], "client-supplied-1");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "up");
}

#[tokio::test]
async fn missing_request_id_is_generated_per_request() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;
    let client = common::http_client();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let res = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        let id = res.headers()["x-request-id"].to_str().unwrap().to_string();
        Uuid::parse_str(&id).expect("generated request id is a UUID");
        ids.push(id);
    }
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn index_names_the_service() {
    let backend = Backend::start().await;
    let mut config = common::test_config(&backend);
    config.observability.service_name = "orders".into();
    let addr = common::spawn_app(common::app_state(config)).await;

    let body: Value = common::http_client()
        .get(format!("http://{addr}/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["orders"], "online");
}

#[tokio::test]
async fn protected_endpoint_rejects_missing_and_unknown_tokens() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;
    let client = common::http_client();
    let url = format!("http://{addr}/example-endpoint");

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client.get(&url).bearer_auth("wrong").send().await.unwrap();
    assert_eq!(res.status(), 401);

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn example_endpoint_forwards_ids_downstream() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;

    let res = common::http_client()
        .get(format!("http://{addr}/example-endpoint"))
        .bearer_auth(TEST_TOKEN)
        .header("X-Request-ID", "req-abc")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "example endpoint hit");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let downstream = &requests[0];
    assert_eq!(downstream.method, "POST");
    assert_eq!(downstream.path, "/api/v1");
    assert_eq!(
        &downstream.body[..],
        br#"{"eventType":"","payload":{"key":"value"}}"#
    );
    assert_eq!(downstream.headers["content-type"], "application/json");
    assert_eq!(
        downstream.headers["authorization"],
        format!("Bearer {EXAMPLE_API_KEY}").as_str()
    );
    assert_eq!(downstream.headers["x-request-id"], "req-abc");
    let correlation = downstream.headers["x-correlation-id"].to_str().unwrap();
    Uuid::parse_str(correlation).expect("correlation id is a UUID");
    assert!(downstream.headers.contains_key("traceparent"));
}

#[tokio::test]
async fn downstream_failure_becomes_internal_error() {
    let backend = Backend::start().await;
    backend.respond_with(500);
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;

    let res = common::http_client()
        .get(format!("http://{addr}/example-endpoint"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unexpected status code: 500");
}

#[tokio::test]
async fn redirect_class_status_from_downstream_is_a_failure() {
    let backend = Backend::start().await;
    backend.respond_with(226);
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;

    let res = common::http_client()
        .get(format!("http://{addr}/example-endpoint"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
}

struct PanickingAuthenticator;

impl Authenticator for PanickingAuthenticator {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<Identity, AuthError> {
        panic!("authenticator exploded");
    }
}

#[tokio::test]
async fn panic_is_recovered_and_server_keeps_serving() {
    let backend = Backend::start().await;
    let state = common::app_state(common::test_config(&backend))
        .with_authenticator(Arc::new(PanickingAuthenticator));
    let addr = common::spawn_app(state).await;
    let client = common::http_client();

    let res = client
        .get(format!("http://{addr}/example-endpoint"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body = res.text().await.unwrap();
    assert!(!body.contains("exploded"));

    let res = client.get(format!("http://{addr}/status")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn trailing_slash_is_stripped_before_routing() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;

    let res = common::http_client()
        .get(format!("http://{addr}/status/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn metrics_count_requests_by_method_path_and_status() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;
    let client = common::http_client();

    for _ in 0..2 {
        client.get(format!("http://{addr}/status")).send().await.unwrap();
    }
    client
        .get(format!("http://{addr}/example-endpoint"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();

    let res = client.get(format!("http://{addr}/metrics")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let rendered = res.text().await.unwrap();

    assert_eq!(
        common::sample(
            &rendered,
            "service_processed_ops_count",
            &["method=\"GET\"", "url=\"/status\"", "status=\"200\""]
        ),
        Some(2.0)
    );
    assert_eq!(
        common::sample(
            &rendered,
            "service_processed_ops_count",
            &["url=\"/example-endpoint\"", "status=\"200\""]
        ),
        Some(1.0)
    );
    let downstream = format!("url=\"{}\"", backend.addr);
    assert_eq!(
        common::sample(
            &rendered,
            "example_client_processed_ops_count",
            &["method=\"POST\"", downstream.as_str(), "status=\"200\""]
        ),
        Some(1.0)
    );
    assert!(common::sample(&rendered, "service_processed_ops_total", &[]).unwrap() >= 3.0);
    assert!(rendered.contains("service_processed_ops_http_latency_bucket"));
}

#[tokio::test]
async fn docs_are_served_from_the_configured_directory() {
    let backend = Backend::start().await;
    let addr = common::spawn_app(common::app_state(common::test_config(&backend))).await;

    let res = common::http_client()
        .get(format!("http://{addr}/docs/index.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().contains("API documentation"));
}

#[tokio::test]
async fn missing_docs_directory_answers_internal_error() {
    let backend = Backend::start().await;
    let mut config = common::test_config(&backend);
    config.server.docs_path = "tests/fixtures/no-such-docs".into();
    let addr = common::spawn_app(common::app_state(config)).await;

    let res = common::http_client()
        .get(format!("http://{addr}/docs/index.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn slow_requests_time_out() {
    let backend = Backend::start().await;
    backend.delay(Duration::from_secs(3));
    let mut config = common::test_config(&backend);
    config.server.request_timeout_secs = 1;
    let addr = common::spawn_app(common::app_state(config)).await;

    let res = common::http_client()
        .get(format!("http://{addr}/example-endpoint"))
        .bearer_auth(TEST_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 408);
}
