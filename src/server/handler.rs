//! HTTP handlers for the viewer page and query endpoints

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use rust_embed::RustEmbed;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::dashboard::broadcaster::BroadcasterStats;
use crate::dashboard::history::RunSummary;
use crate::dashboard::types::{Event, EventKind, LiveMetricsSnapshot, MetricsPayload, RequestCounters};
use crate::server::AppState;

const INITIAL_DATA_PLACEHOLDER: &str =
    r#"<script id="initial-data" type="application/json">{}</script>"#;

/// Embedded viewer assets from the dashboard/ directory
#[derive(RustEmbed)]
#[folder = "dashboard/"]
struct ViewerAssets;

/// Response of `GET /api/metrics`
#[derive(Debug, Clone, Serialize)]
pub struct LatestMetrics {
    /// False until the first metrics event has been distributed
    pub available: bool,
    pub timestamp: Option<f64>,
    pub data: serde_json::Value,
}

/// Response of `GET /api/connection-info`
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub websocket_path: &'static str,
    pub connected_viewers: usize,
    /// Push connection tasks alive, including ones still closing
    pub open_connections: usize,
    pub uptime_seconds: u64,
    pub pipeline: BroadcasterStats,
}

/// Response of `GET /api/history`
#[derive(Debug, Clone, Serialize)]
pub struct HistoryView {
    pub recent_events: Vec<Event>,
    pub historical_data: Vec<RunSummary>,
}

/// Serves the viewer page with the current status injected as initial data
pub async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(content) = ViewerAssets::get("index.html") else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Viewer page not found").into_response();
    };
    let Ok(html) = std::str::from_utf8(&content.data) else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid HTML encoding").into_response();
    };

    let initial = json!({
        "status": state.status.snapshot(),
        "websocket_path": "/ws",
    });
    let initial = serde_json::to_string(&initial).unwrap_or_else(|_| "{}".to_string());
    let page = html.replace(
        INITIAL_DATA_PLACEHOLDER,
        &format!(
            r#"<script id="initial-data" type="application/json">{}</script>"#,
            initial
        ),
    );

    Html(page).into_response()
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.status.snapshot()).into_response()
}

/// Completed run summaries, oldest first. Empty list when nothing completed yet.
pub async fn historical_data_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({ "historical_data": state.history.get_all() })).into_response()
}

/// Latest distributed metrics snapshot, or an explicit empty placeholder
pub async fn latest_metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let latest = match state.broadcaster.latest(EventKind::Metrics) {
        Some(event) => LatestMetrics {
            available: true,
            timestamp: Some(event.timestamp),
            data: event.data.clone(),
        },
        None => LatestMetrics {
            available: false,
            timestamp: None,
            data: serde_json::to_value(MetricsPayload {
                live_metrics: LiveMetricsSnapshot::default(),
                requests: RequestCounters::default(),
            })
            .unwrap_or_else(|_| json!({})),
        },
    };
    Json(latest).into_response()
}

pub async fn history_handler(State(state): State<Arc<AppState>>) -> Response {
    let view = HistoryView {
        recent_events: state
            .broadcaster
            .recent_events()
            .iter()
            .map(|event| (**event).clone())
            .collect(),
        historical_data: state.history.get_all(),
    };
    Json(view).into_response()
}

pub async fn connection_info_handler(State(state): State<Arc<AppState>>) -> Response {
    let pipeline = state.broadcaster.stats();
    let port = state
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(state.config.server.port);

    Json(ConnectionInfo {
        host: state.config.server.host.clone(),
        port,
        websocket_path: "/ws",
        connected_viewers: pipeline.subscribers,
        open_connections: state.open_connections(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pipeline,
    })
    .into_response()
}

/// Pipeline counters in Prometheus text format
pub async fn prometheus_handler(State(state): State<Arc<AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
        .into_response()
}
