//! Dashboard lifecycle errors

use thiserror::Error;

/// Errors surfaced to the caller of [`Dashboard::start`](super::Dashboard::start).
///
/// Everything else in the telemetry path degrades silently (logged and counted)
/// so the benchmark run is never affected.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Failed to bind streaming server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Streaming dashboard was stopped and cannot be restarted")]
    Stopped,
}
