//! Shared helpers for benchstream integration tests.

#![allow(dead_code)]

use benchstream::config::BenchStreamConfig;
use benchstream::dashboard::broadcaster::{BroadcastConfig, EventBroadcaster};
use benchstream::dashboard::types::{metric_names, LogPayload, ProgressPayload};
use benchstream::dashboard::{
    Event, EventKind, HistoricalRecord, LiveMetricsSnapshot, LogLevel, StatusTracker,
};
use benchstream::server::{create_router, AppState};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Config bound to an ephemeral loopback port
pub fn loopback_config() -> BenchStreamConfig {
    let mut config = BenchStreamConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// Fresh state for router tests; nothing is bound
pub fn make_state() -> Arc<AppState> {
    Arc::new(AppState::new(
        Arc::new(loopback_config()),
        Arc::new(EventBroadcaster::new(BroadcastConfig::default())),
        Arc::new(StatusTracker::new()),
        Arc::new(HistoricalRecord::new(100)),
    ))
}

pub fn make_router() -> (axum::Router, Arc<AppState>) {
    let state = make_state();
    (create_router(Arc::clone(&state)), state)
}

pub fn log_event(message: &str) -> Event {
    Event::new(
        EventKind::Log,
        &LogPayload {
            message: message.to_string(),
            level: LogLevel::Info,
        },
    )
    .unwrap()
}

pub fn progress_event(progress: f64) -> Event {
    Event::new(EventKind::Progress, &ProgressPayload { progress }).unwrap()
}

/// Snapshot with a few TTFT and output latency samples
pub fn sample_snapshot() -> LiveMetricsSnapshot {
    let mut samples = BTreeMap::new();
    samples.insert(metric_names::TTFT.to_string(), vec![0.1, 0.12, 0.15, 0.2]);
    samples.insert(
        metric_names::OUTPUT_LATENCY.to_string(),
        vec![0.02, 0.021, 0.025, 0.03],
    );
    LiveMetricsSnapshot::from_samples(samples)
}

/// Wait until the distribution task has processed `count` events
pub async fn wait_distributed(broadcaster: &EventBroadcaster, count: u64) {
    for _ in 0..400 {
        if broadcaster.stats().distributed >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "distribution stalled at {} of {} events",
        broadcaster.stats().distributed,
        count
    );
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
