mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{hosts, ready_session, verified_us, Script, ScriptedEngine, Tail};
use http_body_util::BodyExt;
use proxy_broker::api::{create_router, AppState};
use proxy_broker::relay::CollectionLimits;
use proxy_broker::Session;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(engine: Arc<ScriptedEngine>) -> Router {
    create_router(AppState::new(ready_session(engine)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let request = Request::get("/").body(Body::empty()).unwrap();
    let (status, body) = send(app(ScriptedEngine::new(vec![])), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["find"], "/api/v1/find");
    assert_eq!(body["endpoints"]["grab"], "/api/v1/grab");
    assert_eq!(body["active_requests"], 0);
}

#[tokio::test]
async fn test_health_follows_session_state() {
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(ScriptedEngine::new(vec![])), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let session = Arc::new(Session::new(
        ScriptedEngine::new(vec![]),
        CollectionLimits::default(),
    ));
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, _) = send(create_router(AppState::new(session)), request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(start_paused = true)]
async fn test_find_returns_wire_records() {
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Finish).push_every(
        Duration::from_millis(100),
        vec![verified_us("198.51.100.1", 3128)],
    )]);
    let request = post_json(
        "/api/v1/find",
        json!({ "types": ["HTTP"], "countries": ["us"], "limit": 1 }),
    );
    let (status, body) = send(app(engine), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{
            "host": "198.51.100.1",
            "port": 3128,
            "types": ["HTTP"],
            "geo": {
                "country": { "code": "US", "name": "United States" },
                "city": null,
                "continent": null,
                "latitude": null,
                "longitude": null,
                "timezone": null
            },
            "is_working": true,
            "avg_resp_time": 0.5,
            "error_rate": 0.0
        }])
    );
}

#[tokio::test(start_paused = true)]
async fn test_grab_uses_default_limit() {
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Finish).push_every(Duration::from_millis(10), hosts("10.9.0", 15))
    ]);
    let (status, body) = send(app(engine), post_json("/api/v1/grab", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 10);
    assert!(records[0]["is_working"].is_null());
}

#[tokio::test]
async fn test_invalid_type_is_bad_request() {
    let engine = ScriptedEngine::new(vec![]);
    let request = post_json("/api/v1/find", json!({ "types": ["FTP"] }));
    let (status, body) = send(app(engine.clone()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_FILTER");
    assert!(body["detail"].as_str().unwrap().contains("FTP"));
    assert_eq!(engine.starts(), 0);
}

#[tokio::test]
async fn test_unreadable_body_is_bad_request() {
    let engine = ScriptedEngine::new(vec![]);

    let request = post_json("/api/v1/find", json!({ "types": "HTTP" }));
    let (status, body) = send(app(engine.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_FILTER");
    assert!(body["detail"].is_string());

    let request = Request::post("/api/v1/grab")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(engine.clone()), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_FILTER");

    assert_eq!(engine.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_is_not_found() {
    let request = post_json("/api/v1/find", json!({ "types": ["SOCKS5"], "limit": 3 }));
    let (status, body) = send(app(ScriptedEngine::new(vec![])), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
    assert_eq!(body["detail"], "No proxies found matching the criteria");
}

#[tokio::test(start_paused = true)]
async fn test_engine_failure_is_bad_gateway() {
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Fail("no sources".into()))]);
    let request = post_json("/api/v1/grab", json!({ "limit": 5 }));
    let (status, body) = send(app(engine), request).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "DISCOVERY_FAILED");
}

#[tokio::test]
async fn test_uninitialized_session_is_unavailable() {
    let engine = ScriptedEngine::new(vec![]);
    let session = Arc::new(Session::new(engine, CollectionLimits::default()));
    let request = post_json("/api/v1/find", json!({ "types": ["HTTP"] }));
    let (status, body) = send(create_router(AppState::new(session)), request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Broker not initialized");
}
