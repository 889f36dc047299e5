//! Type definitions for telemetry events and metric snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::dashboard::clock;
use crate::dashboard::histogram::HistogramData;

/// Well-known metric names produced by the benchmark metrics collector
pub mod metric_names {
    pub const TTFT: &str = "ttft";
    pub const OUTPUT_LATENCY: &str = "output_latency";
    pub const INPUT_THROUGHPUT: &str = "input_throughput";
    pub const OUTPUT_THROUGHPUT: &str = "output_throughput";
    pub const E2E_LATENCY: &str = "e2e_latency";
}

/// Percentiles reported in every [`StatsSummary`]
pub const REPORTED_PERCENTILES: [(&str, f64); 4] =
    [("p50", 50.0), ("p90", 90.0), ("p95", 95.0), ("p99", 99.0)];

/// Kind of a telemetry event, serialized as the wire `event_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Metrics,
    Histogram,
    Scatter,
    Status,
    Log,
    Progress,
    Heartbeat,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Metrics,
        EventKind::Histogram,
        EventKind::Scatter,
        EventKind::Status,
        EventKind::Log,
        EventKind::Progress,
        EventKind::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Metrics => "metrics",
            EventKind::Histogram => "histogram",
            EventKind::Scatter => "scatter",
            EventKind::Status => "status",
            EventKind::Log => "log",
            EventKind::Progress => "progress",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable unit of telemetry.
///
/// Serializes to the push-channel wire shape
/// `{"event_type": "...", "timestamp": 1700000000.123, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    /// Unix seconds from [`clock::now`]
    pub timestamp: f64,
    pub data: serde_json::Value,
}

impl Event {
    /// Build an event stamped with the current event clock.
    pub fn new<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self, IngestError> {
        let data = serde_json::to_value(payload)?;
        Ok(Self {
            kind,
            timestamp: clock::now(),
            data,
        })
    }

    /// Keep-alive event with an empty payload
    pub fn heartbeat() -> Self {
        Self {
            kind: EventKind::Heartbeat,
            timestamp: clock::now(),
            data: serde_json::json!({}),
        }
    }
}

/// Errors raised while turning benchmark callbacks into events.
///
/// These never reach the benchmark engine; the offending event is logged and dropped.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("metric '{metric}' contains a non-finite value")]
    NonFinite { metric: String },

    #[error("scatter sample needs 4 values (ttft, output_latency, input_throughput, output_throughput), got {len}")]
    MalformedScatter { len: usize },

    #[error("failed to serialize event payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Summary statistics for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub count: u64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Keyed by label, e.g. `p50`, `p99`
    #[serde(default)]
    pub percentiles: BTreeMap<String, f64>,
}

impl StatsSummary {
    /// Compute a summary over raw values. Returns None for empty input.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let percentiles = REPORTED_PERCENTILES
            .iter()
            .map(|(label, q)| (label.to_string(), percentile(&sorted, *q)))
            .collect();

        Some(Self {
            count: count as u64,
            mean,
            min: sorted[0],
            max: sorted[count - 1],
            percentiles,
        })
    }

    fn is_finite(&self) -> bool {
        self.mean.is_finite()
            && self.min.is_finite()
            && self.max.is_finite()
            && self.percentiles.values().all(|v| v.is_finite())
    }
}

/// Linear-interpolated percentile over sorted, non-empty input
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = (q / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Point-in-time view of live statistics produced by the metrics collector.
///
/// `samples` carries the raw per-request values the histograms are built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveMetricsSnapshot {
    #[serde(default)]
    pub stats: BTreeMap<String, StatsSummary>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub samples: BTreeMap<String, Vec<f64>>,
}

impl LiveMetricsSnapshot {
    /// Build a snapshot whose stats are computed from the given raw samples
    pub fn from_samples(samples: BTreeMap<String, Vec<f64>>) -> Self {
        let stats = samples
            .iter()
            .filter_map(|(name, values)| {
                StatsSummary::from_values(values).map(|summary| (name.clone(), summary))
            })
            .collect();
        Self { stats, samples }
    }

    /// Raw values for a metric, empty if absent
    pub fn samples(&self, metric: &str) -> &[f64] {
        self.samples.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reject snapshots carrying NaN or infinite values
    pub fn validate(&self) -> Result<(), IngestError> {
        for (name, summary) in &self.stats {
            if !summary.is_finite() {
                return Err(IngestError::NonFinite {
                    metric: name.clone(),
                });
            }
        }
        for (name, values) in &self.samples {
            if values.iter().any(|v| !v.is_finite()) {
                return Err(IngestError::NonFinite {
                    metric: name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// One point for the latency/throughput scatter plots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterSample {
    pub ttft: f64,
    pub output_latency: f64,
    pub input_throughput: f64,
    pub output_throughput: f64,
}

impl ScatterSample {
    /// Parse the collector's `[ttft, output_latency, input_throughput, output_throughput]` list
    pub fn from_slice(values: &[f64]) -> Result<Self, IngestError> {
        match values {
            [ttft, output_latency, input_throughput, output_throughput] => {
                let sample = Self {
                    ttft: *ttft,
                    output_latency: *output_latency,
                    input_throughput: *input_throughput,
                    output_throughput: *output_throughput,
                };
                sample.validate()?;
                Ok(sample)
            }
            _ => Err(IngestError::MalformedScatter { len: values.len() }),
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        let fields = [
            (metric_names::TTFT, self.ttft),
            (metric_names::OUTPUT_LATENCY, self.output_latency),
            (metric_names::INPUT_THROUGHPUT, self.input_throughput),
            (metric_names::OUTPUT_THROUGHPUT, self.output_throughput),
        ];
        match fields.iter().find(|(_, v)| !v.is_finite()) {
            Some((name, _)) => Err(IngestError::NonFinite {
                metric: name.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Throughput and latency of one completed iteration, plotted per concurrency level.
///
/// Travels as a `scatter` event; viewers tell it apart from a per-request
/// [`ScatterSample`] by the `rps` field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationThroughput {
    pub concurrency: u32,
    pub rps: f64,
    /// Mean latency in seconds: TTFT, else output latency, else end-to-end
    pub e2e_latency: f64,
}

impl IterationThroughput {
    /// Derive the point for an iteration that served `total_requests` in `run_time` seconds.
    ///
    /// Returns None when the run time or request count is not positive, or
    /// when none of the latency metrics has a positive finite mean.
    pub fn from_iteration(
        concurrency: u32,
        snapshot: &LiveMetricsSnapshot,
        run_time: f64,
        total_requests: u64,
    ) -> Option<Self> {
        if run_time <= 0.0 || !run_time.is_finite() || total_requests == 0 {
            return None;
        }

        let e2e_latency = [
            metric_names::TTFT,
            metric_names::OUTPUT_LATENCY,
            metric_names::E2E_LATENCY,
        ]
        .iter()
        .filter_map(|metric| snapshot.stats.get(*metric))
        .map(|summary| summary.mean)
        .find(|mean| mean.is_finite() && *mean > 0.0)?;

        Some(Self {
            concurrency,
            rps: total_requests as f64 / run_time,
            e2e_latency,
        })
    }
}

/// Severity attached to user-facing log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Request counters carried alongside each metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounters {
    pub total: u64,
    pub errors: u64,
}

/// `metrics` event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    pub live_metrics: LiveMetricsSnapshot,
    pub requests: RequestCounters,
}

/// `histogram` event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramPayload {
    pub ttft_histogram: HistogramData,
    pub output_latency_histogram: HistogramData,
}

/// `log` event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub message: String,
    pub level: LogLevel,
}

/// `progress` event payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = Event::new(EventKind::Progress, &ProgressPayload { progress: 42.0 }).unwrap();
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "progress");
        assert!(json["timestamp"].as_f64().unwrap() > 0.0);
        assert_eq!(json["data"]["progress"], 42.0);
    }

    #[test]
    fn test_event_kind_round_trips_through_wire_names() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_heartbeat_has_empty_payload() {
        let event = Event::heartbeat();
        assert_eq!(event.kind, EventKind::Heartbeat);
        assert_eq!(event.data, serde_json::json!({}));
    }

    #[test]
    fn test_event_timestamps_non_decreasing() {
        let events: Vec<Event> = (0..100).map(|_| Event::heartbeat()).collect();
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_stats_summary_from_values() {
        let summary = StatsSummary::from_values(&[4.0, 1.0, 3.0, 2.0, 5.0]).unwrap();
        assert_eq!(summary.count, 5);
        assert_eq!(summary.mean, 3.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert_eq!(summary.percentiles["p50"], 3.0);
        assert!((summary.percentiles["p90"] - 4.6).abs() < 1e-9);
    }

    #[test]
    fn test_stats_summary_empty_is_none() {
        assert!(StatsSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_snapshot_from_samples_computes_stats() {
        let mut samples = BTreeMap::new();
        samples.insert(metric_names::TTFT.to_string(), vec![0.1, 0.15, 0.12]);
        samples.insert(metric_names::OUTPUT_LATENCY.to_string(), vec![]);

        let snapshot = LiveMetricsSnapshot::from_samples(samples);
        assert_eq!(snapshot.stats.len(), 1);
        assert_eq!(snapshot.stats["ttft"].count, 3);
        assert_eq!(snapshot.samples(metric_names::TTFT).len(), 3);
        assert!(snapshot.samples("missing").is_empty());
    }

    #[test]
    fn test_snapshot_validate_rejects_nan() {
        let mut samples = BTreeMap::new();
        samples.insert("ttft".to_string(), vec![0.1, f64::NAN]);
        let snapshot = LiveMetricsSnapshot {
            stats: BTreeMap::new(),
            samples,
        };

        assert!(matches!(
            snapshot.validate(),
            Err(IngestError::NonFinite { ref metric }) if metric == "ttft"
        ));
    }

    #[test]
    fn test_scatter_from_slice() {
        let sample = ScatterSample::from_slice(&[0.1, 0.5, 100.0, 50.0]).unwrap();
        assert_eq!(sample.ttft, 0.1);
        assert_eq!(sample.output_throughput, 50.0);

        assert!(matches!(
            ScatterSample::from_slice(&[0.1, 0.5]),
            Err(IngestError::MalformedScatter { len: 2 })
        ));
        assert!(ScatterSample::from_slice(&[0.1, f64::INFINITY, 1.0, 1.0]).is_err());
    }

    fn stats_only(means: &[(&str, f64)]) -> LiveMetricsSnapshot {
        let mut samples = BTreeMap::new();
        for (metric, mean) in means {
            samples.insert(metric.to_string(), vec![*mean]);
        }
        LiveMetricsSnapshot::from_samples(samples)
    }

    #[test]
    fn test_iteration_throughput_prefers_ttft() {
        let snapshot = stats_only(&[
            (metric_names::TTFT, 0.2),
            (metric_names::OUTPUT_LATENCY, 1.5),
            (metric_names::E2E_LATENCY, 2.0),
        ]);
        let point = IterationThroughput::from_iteration(8, &snapshot, 10.0, 50).unwrap();

        assert_eq!(point.concurrency, 8);
        assert_eq!(point.rps, 5.0);
        assert_eq!(point.e2e_latency, 0.2);
    }

    #[test]
    fn test_iteration_latency_falls_back_in_order() {
        let no_ttft = stats_only(&[
            (metric_names::OUTPUT_LATENCY, 1.5),
            (metric_names::E2E_LATENCY, 2.0),
        ]);
        let point = IterationThroughput::from_iteration(1, &no_ttft, 4.0, 8).unwrap();
        assert_eq!(point.e2e_latency, 1.5);

        let zero_ttft = stats_only(&[(metric_names::TTFT, 0.0), (metric_names::E2E_LATENCY, 2.0)]);
        let point = IterationThroughput::from_iteration(1, &zero_ttft, 4.0, 8).unwrap();
        assert_eq!(point.e2e_latency, 2.0);
    }

    #[test]
    fn test_iteration_without_latency_is_skipped() {
        let throughput_only = stats_only(&[(metric_names::OUTPUT_THROUGHPUT, 50.0)]);
        assert!(IterationThroughput::from_iteration(4, &throughput_only, 10.0, 10).is_none());
        assert!(IterationThroughput::from_iteration(4, &LiveMetricsSnapshot::default(), 10.0, 10).is_none());
    }

    #[test]
    fn test_iteration_needs_positive_run_time_and_requests() {
        let snapshot = stats_only(&[(metric_names::TTFT, 0.2)]);
        assert!(IterationThroughput::from_iteration(4, &snapshot, 0.0, 10).is_none());
        assert!(IterationThroughput::from_iteration(4, &snapshot, -1.0, 10).is_none());
        assert!(IterationThroughput::from_iteration(4, &snapshot, f64::NAN, 10).is_none());
        assert!(IterationThroughput::from_iteration(4, &snapshot, 10.0, 0).is_none());
    }

    #[test]
    fn test_log_level_parsing_and_serde() {
        assert_eq!(LogLevel::from_str("warn").unwrap(), LogLevel::Warning);
        assert_eq!(LogLevel::from_str("Error").unwrap(), LogLevel::Error);
        assert!(LogLevel::from_str("loud").is_err());
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), "\"INFO\"");
    }
}
