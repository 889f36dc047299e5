//! Benchmark dashboards
//!
//! The benchmark engine talks to a [`Dashboard`] and never knows where its
//! output goes. Two variants exist, chosen once at startup:
//!
//! - [`StreamingDashboard`] publishes typed events to an [`EventBroadcaster`]
//!   and serves them to remote viewers over WebSocket and a JSON query API.
//! - [`PassiveDashboard`] renders compact panels to a local terminal.
//!
//! # Collaborator contract
//!
//! The engine calls `start()` before anything else and `stop()` exactly once
//! when the run ends or aborts. [`run_scoped`] and [`run_with_fallback`]
//! guarantee the `stop()` even when the engine fails or panics.

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod histogram;
pub mod history;
pub mod passive;
pub mod status;
pub mod streaming;
pub mod types;

pub use broadcaster::{
    BroadcastConfig, BroadcasterStats, EventBroadcaster, PublishOutcome, SubscriptionHandle,
};
pub use error::DashboardError;
pub use histogram::HistogramData;
pub use history::{HistoricalRecord, RunSummary};
pub use passive::PassiveDashboard;
pub use status::{BenchmarkStatus, Phase, StatusTracker, StatusUpdate};
pub use streaming::StreamingDashboard;
pub use types::{
    Event, EventKind, IterationThroughput, LiveMetricsSnapshot, LogLevel, ScatterSample,
    StatsSummary,
};

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::config::BenchStreamConfig;

/// Call surface the benchmark engine drives during a run.
///
/// All update operations are fire-and-forget: they never block on I/O and
/// never report telemetry failures back to the engine.
#[async_trait]
pub trait Dashboard: Send + Sync {
    /// Live statistics after new samples were collected
    fn update_metrics_panels(&self, snapshot: &LiveMetricsSnapshot);

    /// Latency distributions built from the snapshot's raw samples
    fn update_histogram_panel(&self, snapshot: &LiveMetricsSnapshot);

    /// One scatter point; `None` is ignored
    fn update_scatter_plot_panel(&self, sample: Option<ScatterSample>);

    /// Requests-per-second vs latency point for a finished iteration.
    /// Skipped when `run_time` or `total_requests` is not positive or no
    /// latency metric is available.
    fn update_iteration_rps_vs_latency(
        &self,
        concurrency: u32,
        snapshot: &LiveMetricsSnapshot,
        run_time: f64,
        total_requests: u64,
    );

    /// Clear per-run panels and request counters before the next scenario
    fn reset_panels(&self);

    /// Apply a partial status update (last writer wins per field)
    fn update_benchmark_status(&self, update: StatusUpdate);

    /// Set run progress in percent, clamped to [0, 100]
    fn update_benchmark_progress_bars(&self, progress: f64);

    fn add_log_message(&self, message: &str, level: LogLevel);

    /// Called after every completed request. Failed requests (`error_code`
    /// set) are counted and logged but do not update metric panels.
    fn handle_single_request(
        &self,
        snapshot: &LiveMetricsSnapshot,
        total_requests: u64,
        error_code: Option<u16>,
    );

    /// Record a completed run for the historical view
    fn add_historical_data(&self, summary: RunSummary);

    /// Current run status
    fn status(&self) -> BenchmarkStatus;

    /// Acquire resources. The streaming variant has bound its port when this returns.
    async fn start(&self) -> Result<(), DashboardError>;

    /// Release resources. Idempotent and safe after a failed `start`.
    async fn stop(&self);
}

/// Build the dashboard variant selected by configuration (not yet started)
pub fn create_dashboard(config: &BenchStreamConfig) -> Arc<dyn Dashboard> {
    if config.streaming.enabled {
        Arc::new(StreamingDashboard::new(config.clone()))
    } else {
        Arc::new(PassiveDashboard::stderr(config.streaming.history_capacity))
    }
}

/// Start `dashboard`, run `body`, then stop the dashboard no matter how `body` ends.
///
/// A failed start is returned without running `body`. Panics in `body` are
/// re-raised after the dashboard has been stopped.
pub async fn run_scoped<T, F, Fut>(dashboard: Arc<dyn Dashboard>, body: F) -> Result<T, DashboardError>
where
    F: FnOnce(Arc<dyn Dashboard>) -> Fut,
    Fut: Future<Output = T>,
{
    if let Err(e) = dashboard.start().await {
        dashboard.stop().await;
        return Err(e);
    }
    Ok(guarded(dashboard, body).await)
}

/// Like [`run_scoped`], but a streaming dashboard that cannot bind is replaced
/// by a [`PassiveDashboard`] so the benchmark still runs.
pub async fn run_with_fallback<T, F, Fut>(config: &BenchStreamConfig, body: F) -> T
where
    F: FnOnce(Arc<dyn Dashboard>) -> Fut,
    Fut: Future<Output = T>,
{
    let dashboard = create_dashboard(config);
    let dashboard = match dashboard.start().await {
        Ok(()) => dashboard,
        Err(e) => {
            dashboard.stop().await;
            tracing::warn!(error = %e, "Streaming dashboard unavailable, falling back to terminal output");

            let passive: Arc<dyn Dashboard> =
                Arc::new(PassiveDashboard::stderr(config.streaming.history_capacity));
            if let Err(e) = passive.start().await {
                tracing::warn!(error = %e, "Terminal dashboard failed to start");
            }
            passive
        }
    };
    guarded(dashboard, body).await
}

async fn guarded<T, F, Fut>(dashboard: Arc<dyn Dashboard>, body: F) -> T
where
    F: FnOnce(Arc<dyn Dashboard>) -> Fut,
    Fut: Future<Output = T>,
{
    let outcome = AssertUnwindSafe(body(Arc::clone(&dashboard)))
        .catch_unwind()
        .await;
    dashboard.stop().await;

    match outcome {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
