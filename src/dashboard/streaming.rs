//! Network-broadcasting dashboard
//!
//! Turns benchmark callbacks into typed [`Event`]s for the [`EventBroadcaster`]
//! and owns the [`TransportServer`] that delivers them to viewers.

use async_trait::async_trait;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::BenchStreamConfig;
use crate::dashboard::broadcaster::EventBroadcaster;
use crate::dashboard::error::DashboardError;
use crate::dashboard::histogram::HistogramData;
use crate::dashboard::history::{HistoricalRecord, RunSummary};
use crate::dashboard::status::{BenchmarkStatus, StatusTracker, StatusUpdate};
use crate::dashboard::types::{
    metric_names, Event, EventKind, HistogramPayload, IterationThroughput, LiveMetricsSnapshot,
    LogLevel, LogPayload, MetricsPayload, ProgressPayload, RequestCounters, ScatterSample,
};
use crate::dashboard::Dashboard;
use crate::server::{AppState, TransportServer};

/// Dashboard that streams every update to connected viewers.
///
/// Built from a disabled configuration it holds nothing: every operation
/// returns immediately and nothing is bound.
///
/// ```rust,no_run
/// use benchstream::config::BenchStreamConfig;
/// use benchstream::dashboard::{Dashboard, Phase, StatusUpdate, StreamingDashboard};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let dashboard = StreamingDashboard::new(BenchStreamConfig::default());
/// dashboard.start().await?;
/// dashboard.update_benchmark_status(StatusUpdate::new().phase(Phase::Running));
/// dashboard.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct StreamingDashboard {
    inner: Option<Inner>,
}

struct Inner {
    config: Arc<BenchStreamConfig>,
    broadcaster: Arc<EventBroadcaster>,
    status: Arc<StatusTracker>,
    history: Arc<HistoricalRecord>,
    total_requests: AtomicU64,
    error_requests: AtomicU64,
    server: tokio::sync::Mutex<Option<TransportServer>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl StreamingDashboard {
    /// Create a dashboard owning a fresh broadcaster sized from `config`
    pub fn new(config: BenchStreamConfig) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new((&config.streaming).into()));
        Self::with_broadcaster(config, broadcaster)
    }

    /// Create a dashboard publishing into an existing broadcaster owned by the run context
    pub fn with_broadcaster(config: BenchStreamConfig, broadcaster: Arc<EventBroadcaster>) -> Self {
        if !config.streaming.enabled {
            return Self::disabled();
        }

        let history = Arc::new(HistoricalRecord::new(config.streaming.history_capacity));
        Self {
            inner: Some(Inner {
                config: Arc::new(config),
                broadcaster,
                status: Arc::new(StatusTracker::new()),
                history,
                total_requests: AtomicU64::new(0),
                error_requests: AtomicU64::new(0),
                server: tokio::sync::Mutex::new(None),
                local_addr: Mutex::new(None),
            }),
        }
    }

    /// A dashboard on which every operation is a no-op
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn broadcaster(&self) -> Option<&Arc<EventBroadcaster>> {
        self.inner.as_ref().map(|inner| &inner.broadcaster)
    }

    pub fn history(&self) -> Option<&Arc<HistoricalRecord>> {
        self.inner.as_ref().map(|inner| &inner.history)
    }

    /// Address the transport server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.as_ref().and_then(|inner| {
            *inner
                .local_addr
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
        })
    }
}

impl Inner {
    fn emit<T: Serialize>(&self, kind: EventKind, payload: &T) {
        match Event::new(kind, payload) {
            Ok(event) => {
                self.broadcaster.publish(event);
            }
            Err(e) => {
                tracing::warn!(%kind, error = %e, "Dropping telemetry event that could not be encoded");
            }
        }
    }

    fn request_counters(&self) -> RequestCounters {
        RequestCounters {
            total: self.total_requests.load(Ordering::Relaxed),
            errors: self.error_requests.load(Ordering::Relaxed),
        }
    }

    fn publish_metrics(&self, snapshot: &LiveMetricsSnapshot) {
        if let Err(e) = snapshot.validate() {
            tracing::warn!(error = %e, "Dropping malformed metrics snapshot");
            return;
        }
        self.emit(
            EventKind::Metrics,
            &MetricsPayload {
                live_metrics: snapshot.clone(),
                requests: self.request_counters(),
            },
        );
    }

    fn publish_histograms(&self, snapshot: &LiveMetricsSnapshot) {
        if let Err(e) = snapshot.validate() {
            tracing::warn!(error = %e, "Dropping malformed histogram snapshot");
            return;
        }
        self.emit(
            EventKind::Histogram,
            &HistogramPayload {
                ttft_histogram: HistogramData::from_values(snapshot.samples(metric_names::TTFT)),
                output_latency_histogram: HistogramData::from_values(
                    snapshot.samples(metric_names::OUTPUT_LATENCY),
                ),
            },
        );
    }
}

#[async_trait]
impl Dashboard for StreamingDashboard {
    fn update_metrics_panels(&self, snapshot: &LiveMetricsSnapshot) {
        if let Some(inner) = &self.inner {
            inner.publish_metrics(snapshot);
        }
    }

    fn update_histogram_panel(&self, snapshot: &LiveMetricsSnapshot) {
        if let Some(inner) = &self.inner {
            inner.publish_histograms(snapshot);
        }
    }

    fn update_scatter_plot_panel(&self, sample: Option<ScatterSample>) {
        let (Some(inner), Some(sample)) = (&self.inner, sample) else {
            return;
        };
        match sample.validate() {
            Ok(()) => inner.emit(EventKind::Scatter, &sample),
            Err(e) => tracing::warn!(error = %e, "Dropping malformed scatter sample"),
        }
    }

    fn update_iteration_rps_vs_latency(
        &self,
        concurrency: u32,
        snapshot: &LiveMetricsSnapshot,
        run_time: f64,
        total_requests: u64,
    ) {
        let Some(inner) = &self.inner else {
            return;
        };
        match IterationThroughput::from_iteration(concurrency, snapshot, run_time, total_requests) {
            Some(point) => {
                tracing::info!(
                    concurrency,
                    rps = point.rps,
                    e2e_latency = point.e2e_latency,
                    "Iteration throughput recorded"
                );
                inner.emit(EventKind::Scatter, &point);
            }
            None => tracing::debug!(
                concurrency,
                run_time,
                total_requests,
                "No usable run time or latency for iteration, skipping"
            ),
        }
    }

    fn reset_panels(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.total_requests.store(0, Ordering::Relaxed);
        inner.error_requests.store(0, Ordering::Relaxed);
        inner.publish_metrics(&LiveMetricsSnapshot::default());
        self.update_benchmark_progress_bars(0.0);
    }

    fn update_benchmark_status(&self, update: StatusUpdate) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.status.apply_then(update, |status| {
            tracing::debug!(phase = %status.phase, scenario = ?status.current_scenario, "Benchmark status updated");
            inner.emit(EventKind::Status, status);
        });
    }

    fn update_benchmark_progress_bars(&self, progress: f64) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner
            .status
            .apply_then(StatusUpdate::new().progress(progress), |status| {
                inner.emit(
                    EventKind::Progress,
                    &ProgressPayload {
                        progress: status.progress_percentage,
                    },
                );
            });
    }

    fn add_log_message(&self, message: &str, level: LogLevel) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.emit(
            EventKind::Log,
            &LogPayload {
                message: message.to_string(),
                level,
            },
        );
    }

    fn handle_single_request(
        &self,
        snapshot: &LiveMetricsSnapshot,
        total_requests: u64,
        error_code: Option<u16>,
    ) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.total_requests.store(total_requests, Ordering::Relaxed);

        match error_code {
            None => {
                inner.publish_metrics(snapshot);
                inner.publish_histograms(snapshot);
            }
            Some(code) => {
                inner.error_requests.fetch_add(1, Ordering::Relaxed);
                inner.emit(
                    EventKind::Log,
                    &LogPayload {
                        message: format!("Request {} failed with error code {}", total_requests, code),
                        level: LogLevel::Warning,
                    },
                );
            }
        }
    }

    fn add_historical_data(&self, summary: RunSummary) {
        if let Some(inner) = &self.inner {
            tracing::debug!(run_name = %summary.run_name, "Recording completed run");
            inner.history.push(summary);
        }
    }

    fn status(&self) -> BenchmarkStatus {
        match &self.inner {
            Some(inner) => inner.status.snapshot(),
            None => BenchmarkStatus::idle(),
        }
    }

    async fn start(&self) -> Result<(), DashboardError> {
        let Some(inner) = &self.inner else {
            tracing::debug!("Streaming disabled, nothing to start");
            return Ok(());
        };

        let mut server = inner.server.lock().await;
        if server.is_some() {
            return Ok(());
        }
        if inner.broadcaster.is_stopped() {
            return Err(DashboardError::Stopped);
        }

        inner.broadcaster.start();
        inner.status.mark_started();
        let state = Arc::new(AppState::new(
            Arc::clone(&inner.config),
            Arc::clone(&inner.broadcaster),
            Arc::clone(&inner.status),
            Arc::clone(&inner.history),
        ));

        match TransportServer::bind(state).await {
            Ok(bound) => {
                let addr = bound.local_addr();
                tracing::info!(addr = %addr, "Streaming dashboard available at http://{}", addr);
                *inner
                    .local_addr
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(addr);
                *server = Some(bound);
                Ok(())
            }
            Err(e) => {
                inner.broadcaster.stop().await;
                Err(e)
            }
        }
    }

    async fn stop(&self) {
        let Some(inner) = &self.inner else {
            return;
        };

        let server = inner.server.lock().await.take();
        if let Some(mut server) = server {
            server.shutdown().await;
            tracing::info!("Streaming dashboard stopped");
        }
        inner.broadcaster.stop().await;
        *inner
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}
