//! # Transport Server
//!
//! Serves the telemetry stream and query surface on one port:
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | Embedded viewer page |
//! | `GET /ws` | Push channel, one serialized event per message |
//! | `GET /api/status` | Current [`BenchmarkStatus`](crate::dashboard::BenchmarkStatus) |
//! | `GET /api/historical-data` | Completed run summaries, oldest first |
//! | `GET /api/metrics` | Latest metrics snapshot or a placeholder |
//! | `GET /api/history` | Seed buffer plus run summaries |
//! | `GET /api/connection-info` | Viewer count and pipeline counters |
//! | `GET /metrics` | Prometheus text format |
//!
//! The server owns no telemetry state; everything it returns is read from the
//! broadcaster, status tracker and historical record it was given.

pub mod handler;
pub mod websocket;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::BenchStreamConfig;
use crate::dashboard::broadcaster::EventBroadcaster;
use crate::dashboard::error::DashboardError;
use crate::dashboard::history::HistoricalRecord;
use crate::dashboard::status::StatusTracker;

/// Time allowed for in-flight requests to finish after shutdown is requested
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state accessible to all handlers.
pub struct AppState {
    pub config: Arc<BenchStreamConfig>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub status: Arc<StatusTracker>,
    pub history: Arc<HistoricalRecord>,
    /// Server startup time for uptime tracking
    pub start_time: Instant,
    /// Cancelled when the server stops; open push channels close on it
    pub shutdown: CancellationToken,
    /// Upgraded push connections, which outlive the HTTP serve loop
    pub connections: TaskTracker,
    pub prometheus: PrometheusHandle,
    bound_addr: OnceLock<SocketAddr>,
}

impl AppState {
    pub fn new(
        config: Arc<BenchStreamConfig>,
        broadcaster: Arc<EventBroadcaster>,
        status: Arc<StatusTracker>,
        history: Arc<HistoricalRecord>,
    ) -> Self {
        Self {
            config,
            broadcaster,
            status,
            history,
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
            prometheus: crate::metrics::prometheus_handle(),
            bound_addr: OnceLock::new(),
        }
    }

    /// Address actually bound, once the server is listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.bound_addr.get().copied()
    }

    /// Tasks still serving push connections, including ones being torn down
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }
}

/// Create the router with all endpoints configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handler::index_handler))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/status", get(handler::status_handler))
        .route("/api/historical-data", get(handler::historical_data_handler))
        .route("/api/metrics", get(handler::latest_metrics_handler))
        .route("/api/history", get(handler::history_handler))
        .route("/api/connection-info", get(handler::connection_info_handler))
        .route("/metrics", get(handler::prometheus_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A bound and running transport server.
///
/// The port is bound before [`bind`](Self::bind) returns, so a bind failure is
/// always reported synchronously to the caller.
pub struct TransportServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    connections: TaskTracker,
    task: Option<JoinHandle<()>>,
}

impl TransportServer {
    /// Bind the configured address and start serving in a background task
    pub async fn bind(state: Arc<AppState>) -> Result<Self, DashboardError> {
        let addr = state.config.server.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| DashboardError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| DashboardError::Bind { addr, source })?;
        let _ = state.bound_addr.set(local_addr);

        let shutdown = state.shutdown.clone();
        let connections = state.connections.clone();
        let signal = shutdown.clone();
        let app = create_router(state);

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Streaming server terminated with an error");
            }
        });

        tracing::debug!(addr = %local_addr, "Streaming server listening");
        Ok(Self {
            local_addr,
            shutdown,
            connections,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close push channels, stop accepting connections and release the port.
    /// Returns once every push connection task has finished. Idempotent.
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();

        let Some(mut task) = self.task.take() else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Streaming server task ended abnormally"),
            Err(_) => {
                tracing::warn!("Streaming server did not stop in time, aborting");
                task.abort();
            }
        }

        self.connections.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.connections.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                open = self.connections.len(),
                "Push connections still closing after shutdown grace period"
            );
        }
    }
}

impl Drop for TransportServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::broadcaster::BroadcastConfig;

    fn state(port: u16) -> Arc<AppState> {
        let mut config = BenchStreamConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = port;
        Arc::new(AppState::new(
            Arc::new(config),
            Arc::new(EventBroadcaster::new(BroadcastConfig::default())),
            Arc::new(StatusTracker::new()),
            Arc::new(HistoricalRecord::new(10)),
        ))
    }

    #[tokio::test]
    async fn test_bind_reports_actual_port() {
        let state = state(0);
        let mut server = TransportServer::bind(Arc::clone(&state)).await.unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert_eq!(state.local_addr(), Some(server.local_addr()));
        server.shutdown().await;
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let err = TransportServer::bind(state(port)).await.err().unwrap();
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_releases_port() {
        let mut server = TransportServer::bind(state(0)).await.unwrap();
        let port = server.local_addr().port();
        server.shutdown().await;

        let mut again = TransportServer::bind(state(port)).await.unwrap();
        again.shutdown().await;
    }
}
