//! Integration tests for the query endpoints and viewer page

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use benchstream::dashboard::types::MetricsPayload;
use benchstream::dashboard::{Event, EventKind, Phase, RunSummary, StatusUpdate};
use common::{body_json, make_router, sample_snapshot, wait_distributed};
use tower::Service;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_status_reflects_latest_update() {
    let (mut app, state) = make_router();
    state.status.apply(
        StatusUpdate::new()
            .phase(Phase::Running)
            .scenario("D(100,100)")
            .progress(25.0),
    );

    let response = app.call(get("/api/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["phase"], "running");
    assert_eq!(json["current_scenario"], "D(100,100)");
    assert_eq!(json["progress_percentage"], 25.0);
}

#[tokio::test]
async fn test_status_before_any_update_is_idle() {
    let (mut app, _state) = make_router();
    let json = body_json(app.call(get("/api/status")).await.unwrap()).await;

    assert_eq!(json["phase"], "idle");
    assert_eq!(json["progress_percentage"], 0.0);
    assert!(json["current_scenario"].is_null());
}

#[tokio::test]
async fn test_historical_data_empty_sequence() {
    let (mut app, _state) = make_router();
    let response = app.call(get("/api/historical-data")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["historical_data"], serde_json::json!([]));
}

#[tokio::test]
async fn test_historical_data_lists_completed_runs() {
    let (mut app, state) = make_router();
    let mut summary = RunSummary::new("run-a");
    summary.total_requests = 42;
    state.history.push(summary);

    let json = body_json(app.call(get("/api/historical-data")).await.unwrap()).await;
    let runs = json["historical_data"].as_array().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["run_name"], "run-a");
    assert_eq!(runs[0]["total_requests"], 42);
    assert!(runs[0]["completed_at"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_metrics_placeholder_then_latest_snapshot() {
    let (mut app, state) = make_router();

    let json = body_json(app.call(get("/api/metrics")).await.unwrap()).await;
    assert_eq!(json["available"], false);

    state.broadcaster.start();
    let event = Event::new(
        EventKind::Metrics,
        &MetricsPayload {
            live_metrics: sample_snapshot(),
            requests: Default::default(),
        },
    )
    .unwrap();
    state.broadcaster.publish(event);
    wait_distributed(&state.broadcaster, 1).await;

    let json = body_json(app.call(get("/api/metrics")).await.unwrap()).await;
    assert_eq!(json["available"], true);
    assert!(json["timestamp"].as_f64().is_some());
    assert_eq!(json["data"]["live_metrics"]["stats"]["ttft"]["count"], 4);
    state.broadcaster.stop().await;
}

#[tokio::test]
async fn test_history_includes_seed_events() {
    let (mut app, state) = make_router();
    state.broadcaster.start();
    state.broadcaster.publish(common::log_event("warming up"));
    wait_distributed(&state.broadcaster, 1).await;

    let json = body_json(app.call(get("/api/history")).await.unwrap()).await;
    assert_eq!(json["recent_events"][0]["event_type"], "log");
    assert_eq!(json["recent_events"][0]["data"]["message"], "warming up");
    assert_eq!(json["historical_data"], serde_json::json!([]));
    state.broadcaster.stop().await;
}

#[tokio::test]
async fn test_connection_info_reports_pipeline() {
    let (mut app, state) = make_router();
    let _viewer = state.broadcaster.subscribe();

    let json = body_json(app.call(get("/api/connection-info")).await.unwrap()).await;
    assert_eq!(json["connected_viewers"], 1);
    assert_eq!(json["websocket_path"], "/ws");
    assert_eq!(json["pipeline"]["dropped"], 0);
}

#[tokio::test]
async fn test_index_serves_html() {
    let (mut app, _state) = make_router();
    let response = app.call(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/html"));
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    let (mut app, _state) = make_router();
    let response = app.call(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (mut app, _state) = make_router();
    let response = app.call(get("/api/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_allows_remote_viewer_pages() {
    let (mut app, _state) = make_router();
    let request = Request::builder()
        .uri("/api/status")
        .header("Origin", "http://viewer.example")
        .body(Body::empty())
        .unwrap();

    let response = app.call(request).await.unwrap();
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
