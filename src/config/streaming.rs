//! Streaming telemetry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the event pipeline and the push channel.
///
/// # Example
///
/// ```toml
/// [streaming]
/// enabled = true
/// event_queue_capacity = 1024
/// subscriber_queue_capacity = 256
/// heartbeat_interval_ms = 30000
/// history_capacity = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Whether the network dashboard is used at all.
    ///
    /// Default: true
    /// When false, the passive terminal dashboard is selected and nothing is bound.
    pub enabled: bool,

    /// Capacity of the ingest queue between producers and the distribution task.
    ///
    /// Default: 1024
    pub event_queue_capacity: usize,

    /// Capacity of each viewer's outbound queue.
    ///
    /// Default: 256
    pub subscriber_queue_capacity: usize,

    /// Longest an async publisher waits for ingest queue space before dropping.
    ///
    /// Default: 50ms
    pub publish_timeout_ms: u64,

    /// Idle time after which a heartbeat is sent on a push connection.
    ///
    /// Default: 30000ms
    pub heartbeat_interval_ms: u64,

    /// Events kept per multi-entry kind (histogram, scatter, log) for seeding new viewers.
    ///
    /// Default: 5
    pub seed_events_per_kind: usize,

    /// Maximum number of completed-run summaries retained.
    ///
    /// Default: 100
    pub history_capacity: usize,

    /// Longest a single push-channel write may block before the viewer is
    /// treated as dead and disconnected.
    ///
    /// Default: 10000ms
    pub send_timeout_ms: u64,

    /// Serialized push messages larger than this are skipped.
    ///
    /// Default: 256 KiB
    pub max_message_bytes: usize,

    /// Consecutive overflow drops after which a viewer is disconnected.
    ///
    /// Default: 512. Zero keeps slow viewers connected indefinitely.
    pub max_consecutive_drops: usize,
}

impl StreamingConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_queue_capacity: 1024,
            subscriber_queue_capacity: 256,
            publish_timeout_ms: 50,
            heartbeat_interval_ms: 30_000,
            send_timeout_ms: 10_000,
            seed_events_per_kind: 5,
            history_capacity: 100,
            max_message_bytes: 256 * 1024,
            max_consecutive_drops: 512,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_config_defaults() {
        let config = StreamingConfig::default();
        assert!(config.enabled);
        assert_eq!(config.event_queue_capacity, 1024);
        assert_eq!(config.subscriber_queue_capacity, 256);
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.publish_timeout(), Duration::from_millis(50));
        assert_eq!(config.send_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_streaming_config_partial_toml() {
        let config: StreamingConfig = toml::from_str("history_capacity = 10").unwrap();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.seed_events_per_kind, 5);
    }
}
