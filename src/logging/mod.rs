//! Tracing filter construction
//!
//! The telemetry layer logs through `tracing` with structured fields. This
//! module turns the `[logging]` configuration into an `EnvFilter` directive
//! string; `RUST_LOG` takes precedence when set.

/// Build filter directives string from LoggingConfig
///
/// Constructs a tracing filter string that includes the base log level
/// and any component-specific log levels configured in the LoggingConfig.
/// Components are module paths below the crate root, e.g. `dashboard::broadcaster`.
///
/// # Examples
///
/// ```
/// use benchstream::config::logging::{LogFormat, LoggingConfig};
/// use benchstream::logging::build_filter_directives;
/// use std::collections::BTreeMap;
///
/// let mut component_levels = BTreeMap::new();
/// component_levels.insert("server".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels,
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,benchstream::server=debug");
/// ```
pub fn build_filter_directives(config: &crate::config::LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    for (component, level) in &config.component_levels {
        filter_str.push_str(&format!(",benchstream::{}={}", component, level));
    }

    filter_str
}
