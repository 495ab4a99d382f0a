// Prometheus client against a fake HTTP backend: params, Host override, error taxonomy

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use common::{matrix_body, spawn_server, window};
use meshperf::error::QueryError;
use meshperf::prom_client::{MetricsBackend, PromClient};

#[derive(Clone, Default)]
struct Seen {
    params: Arc<Mutex<Vec<HashMap<String, String>>>>,
    hosts: Arc<Mutex<Vec<String>>>,
}

async fn fixed_response(
    seen: Seen,
    status: StatusCode,
    body: serde_json::Value,
    params: HashMap<String, String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    seen.params.lock().unwrap().push(params);
    if let Some(host) = headers.get(axum::http::header::HOST) {
        seen.hosts
            .lock()
            .unwrap()
            .push(host.to_str().unwrap_or_default().to_string());
    }
    (status, Json(body))
}

async fn serve(status: StatusCode, body: serde_json::Value) -> (String, Seen) {
    let seen = Seen::default();
    let range_body = body.clone();
    let range_seen = seen.clone();
    let instant_seen = seen.clone();
    let app = Router::new()
        .route(
            "/api/v1/query_range",
            get(move |Query(params): Query<HashMap<String, String>>, headers: HeaderMap| {
                fixed_response(range_seen.clone(), status, range_body.clone(), params, headers)
            }),
        )
        .route(
            "/api/v1/query",
            get(move |Query(params): Query<HashMap<String, String>>, headers: HeaderMap| {
                fixed_response(instant_seen.clone(), status, body.clone(), params, headers)
            }),
        )
        .with_state(());
    let url = spawn_server(app).await;
    (url, seen)
}

fn client(url: &str, host: Option<&str>) -> PromClient {
    PromClient::new(url, host.map(String::from), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn fetch_range_sends_window_and_decodes_matrix() {
    let body = matrix_body(serde_json::json!([
        {
            "metric": {"pod_name": "fortioserver-aaaa-1", "container_name": "istio-proxy"},
            "values": [[99400, "0.25"], [99415, "0.5"]]
        }
    ]));
    let (url, seen) = serve(StatusCode::OK, body).await;
    let w = window();

    let series = client(&url, None).fetch_range("up", &w).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].label("pod_name"), Some("fortioserver-aaaa-1"));
    assert_eq!(series[0].values(), vec![0.25, 0.5]);
    assert_eq!(series[0].samples[1].timestamp, 99415.0);

    let params = seen.params.lock().unwrap()[0].clone();
    assert_eq!(params.get("query").map(String::as_str), Some("up"));
    assert_eq!(params.get("start"), Some(&w.start().to_string()));
    assert_eq!(params.get("end"), Some(&w.end().to_string()));
    assert_eq!(params.get("step").map(String::as_str), Some("15"));
}

#[tokio::test]
async fn host_header_override_is_sent() {
    let (url, seen) = serve(StatusCode::OK, matrix_body(serde_json::json!([]))).await;
    client(&url, Some("prometheus.mesh.example"))
        .fetch_range("up", &window())
        .await
        .unwrap();
    assert_eq!(
        seen.hosts.lock().unwrap().first().map(String::as_str),
        Some("prometheus.mesh.example")
    );
}

#[tokio::test]
async fn non_success_http_status_is_query_error() {
    let body = serde_json::json!({"status": "error", "errorType": "bad_data", "error": "parse error"});
    let (url, _) = serve(StatusCode::BAD_REQUEST, body).await;
    let err = client(&url, None)
        .fetch_range("rate(", &window())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::HttpStatus { status: 400, .. }));
}

#[tokio::test]
async fn backend_error_status_is_query_error() {
    let body = serde_json::json!({"status": "error", "errorType": "timeout", "error": "query timed out"});
    let (url, _) = serve(StatusCode::OK, body).await;
    let err = client(&url, None)
        .fetch_range("up", &window())
        .await
        .unwrap_err();
    match err {
        QueryError::Unsuccessful {
            status, error_type, ..
        } => {
            assert_eq!(status, "error");
            assert_eq!(error_type, "timeout");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn vector_result_for_range_query_is_unexpected_type() {
    let body = serde_json::json!({
        "status": "success",
        "data": {"resultType": "vector", "result": []}
    });
    let (url, _) = serve(StatusCode::OK, body).await;
    let err = client(&url, None)
        .fetch_range("up", &window())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        QueryError::UnexpectedResultType { expected: "matrix", ref actual } if actual == "vector"
    ));
}

#[tokio::test]
async fn unparseable_sample_is_query_error() {
    let body = matrix_body(serde_json::json!([
        {"metric": {}, "values": [[1, "not-a-number"]]}
    ]));
    let (url, _) = serve(StatusCode::OK, body).await;
    let err = client(&url, None)
        .fetch_range("up", &window())
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidSample { ref raw } if raw == "not-a-number"));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let err = client("http://127.0.0.1:1", None)
        .fetch_instant("up")
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Transport { .. }));
}

#[tokio::test]
async fn instant_vector_returns_first_value() {
    let body = serde_json::json!({
        "status": "success",
        "data": {"resultType": "vector", "result": [
            {"metric": {}, "value": [1, "42.5"]},
            {"metric": {}, "value": [1, "7"]}
        ]}
    });
    let (url, seen) = serve(StatusCode::OK, body).await;
    let v = client(&url, None)
        .fetch_instant("count(up)")
        .await
        .unwrap();
    assert_eq!(v, 42.5);
    let params = seen.params.lock().unwrap()[0].clone();
    assert_eq!(params.get("query").map(String::as_str), Some("count(up)"));
    assert!(!params.contains_key("step"));
}

#[tokio::test]
async fn instant_empty_result_defaults_to_zero() {
    let body = serde_json::json!({
        "status": "success",
        "data": {"resultType": "vector", "result": []}
    });
    let (url, _) = serve(StatusCode::OK, body).await;
    assert_eq!(client(&url, None).fetch_instant("rare").await.unwrap(), 0.0);
}

#[tokio::test]
async fn instant_scalar_is_decoded() {
    let body = serde_json::json!({
        "status": "success",
        "data": {"resultType": "scalar", "result": [1, "3"]}
    });
    let (url, _) = serve(StatusCode::OK, body).await;
    assert_eq!(client(&url, None).fetch_instant("scalar(1)").await.unwrap(), 3.0);
}

#[tokio::test]
async fn instant_matrix_result_is_unexpected_type() {
    let (url, _) = serve(StatusCode::OK, matrix_body(serde_json::json!([]))).await;
    let err = client(&url, None).fetch_instant("up[5m]").await.unwrap_err();
    match err {
        QueryError::UnexpectedResultType { expected, actual } => {
            assert_eq!(expected, "vector or scalar");
            assert_eq!(actual, "matrix");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn instant_string_result_is_unexpected_type() {
    let body = serde_json::json!({
        "status": "success",
        "data": {"resultType": "string", "result": [1, "hello"]}
    });
    let (url, _) = serve(StatusCode::OK, body).await;
    let err = client(&url, None).fetch_instant("\"hello\"").await.unwrap_err();
    match err {
        QueryError::UnexpectedResultType { expected, actual } => {
            assert_eq!(expected, "vector or scalar");
            assert_eq!(actual, "string");
        }
        other => panic!("unexpected error: {other}"),
    }
}
