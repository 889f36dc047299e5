//! Configuration module for benchstream
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`BENCHSTREAM_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use benchstream::config::BenchStreamConfig;
//!
//! let config = BenchStreamConfig::default();
//! assert_eq!(config.server.port, 8080);
//! assert!(config.streaming.enabled);
//!
//! let toml = r#"
//! [server]
//! port = 9000
//!
//! [streaming]
//! enabled = false
//! "#;
//! let config: BenchStreamConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.server.port, 9000);
//! assert!(!config.streaming.enabled);
//! ```

pub mod error;
pub mod logging;
pub mod server;
pub mod streaming;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use streaming::StreamingConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the streaming telemetry layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BenchStreamConfig {
    /// Listening address of the transport server
    pub server: ServerConfig,
    /// Event pipeline and push channel tuning
    pub streaming: StreamingConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl BenchStreamConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides
    ///
    /// Supports BENCHSTREAM_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("BENCHSTREAM_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("BENCHSTREAM_HOST") {
            self.server.host = host;
        }

        if let Ok(level) = std::env::var("BENCHSTREAM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BENCHSTREAM_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(streaming) = std::env::var("BENCHSTREAM_STREAMING") {
            self.streaming.enabled = streaming.to_lowercase() == "true";
        }

        self
    }

    /// Reject settings the pipeline cannot run with: a zero port, zero-sized
    /// queues or history, zero intervals, and unknown log levels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "port must be non-zero"));
        }

        let streaming = &self.streaming;
        let capacities = [
            ("streaming.event_queue_capacity", streaming.event_queue_capacity),
            (
                "streaming.subscriber_queue_capacity",
                streaming.subscriber_queue_capacity,
            ),
            ("streaming.history_capacity", streaming.history_capacity),
            ("streaming.max_message_bytes", streaming.max_message_bytes),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigError::invalid(field, "capacity must be non-zero"));
            }
        }

        let intervals = [
            ("streaming.heartbeat_interval_ms", streaming.heartbeat_interval_ms),
            ("streaming.send_timeout_ms", streaming.send_timeout_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::invalid(field, "interval must be non-zero"));
            }
        }

        self.logging.validate()
    }
}
