//! # Pipeline Metrics
//!
//! The telemetry layer counts its own health through the `metrics` facade and
//! exposes it in Prometheus text format at `GET /metrics`.
//!
//! **Counters:**
//! - `benchstream_events_published_total` - Events accepted at ingest
//! - `benchstream_events_dropped_total{reason}` - `queue_full` or `subscriber_overflow`
//! - `benchstream_viewer_connections_total` - Push-channel connections accepted
//!
//! **Gauges:**
//! - `benchstream_subscribers` - Currently registered subscribers

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub const EVENTS_PUBLISHED: &str = "benchstream_events_published_total";
pub const EVENTS_DROPPED: &str = "benchstream_events_dropped_total";
pub const VIEWER_CONNECTIONS: &str = "benchstream_viewer_connections_total";
pub const SUBSCRIBERS: &str = "benchstream_subscribers";

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder globally and describe the pipeline metrics.
///
/// Fails if another recorder is already installed.
pub fn setup_metrics() -> Result<PrometheusHandle, Box<dyn std::error::Error>> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!(EVENTS_PUBLISHED, "Telemetry events accepted at ingest");
    metrics::describe_counter!(
        EVENTS_DROPPED,
        "Telemetry events dropped because a queue was full"
    );
    metrics::describe_counter!(VIEWER_CONNECTIONS, "Push-channel connections accepted");
    metrics::describe_gauge!(SUBSCRIBERS, "Currently registered event subscribers");

    Ok(handle)
}

/// Process-wide Prometheus handle, installing the recorder on first use.
///
/// If a foreign recorder is already installed, a detached handle is returned
/// and renders no pipeline metrics.
pub fn prometheus_handle() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| {
            setup_metrics().unwrap_or_else(|e| {
                tracing::debug!("Metrics recorder already installed, using detached handle: {}", e);
                PrometheusBuilder::new().build_recorder().handle()
            })
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_handle_renders_pipeline_counters() {
        let handle = prometheus_handle();
        metrics::counter!(EVENTS_PUBLISHED).increment(1);

        assert!(prometheus_handle().render().contains(EVENTS_PUBLISHED));
        assert!(handle.render().contains(EVENTS_PUBLISHED));
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [EVENTS_PUBLISHED, EVENTS_DROPPED, VIEWER_CONNECTIONS, SUBSCRIBERS] {
            assert!(name.starts_with("benchstream_"));
        }
    }
}
