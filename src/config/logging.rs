//! `[logging]` section: base level, output format and per-module overrides

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

use super::ConfigError;

/// Top-level modules that accept a level override
pub const COMPONENTS: &[&str] = &["cli", "config", "dashboard", "logging", "metrics", "server"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line human output for interactive benchmark runs
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::invalid(
                "logging.format",
                format!("expected \"pretty\" or \"json\", got {:?}", other),
            )),
        }
    }
}

/// ```toml
/// [logging]
/// level = "info"
/// format = "json"
///
/// [logging.component_levels]
/// "dashboard::broadcaster" = "debug"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    /// Module path below `benchstream::` mapped to its level; kept sorted
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub component_levels: BTreeMap<String, String>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_level("logging.level", &self.level)?;

        for (component, level) in &self.component_levels {
            let field = format!("logging.component_levels.{}", component);
            let root = component.split("::").next().unwrap_or_default();
            if !COMPONENTS.contains(&root) {
                return Err(ConfigError::invalid(
                    field,
                    format!("unknown module, expected one of {}", COMPONENTS.join(", ")),
                ));
            }
            parse_level(&field, level)?;
        }
        Ok(())
    }
}

fn parse_level(field: &str, level: &str) -> Result<LevelFilter, ConfigError> {
    LevelFilter::from_str(level).map_err(|_| {
        ConfigError::invalid(
            field,
            format!("{:?} is not one of off, error, warn, info, debug, trace", level),
        )
    })
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            component_levels: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_component(component: &str, level: &str) -> LoggingConfig {
        let mut config = LoggingConfig::default();
        config
            .component_levels
            .insert(component.to_string(), level.to_string());
        config
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.component_levels.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_format_accepts_any_case_and_rejects_others() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert_eq!(err.field(), Some("logging.format"));
    }

    #[test]
    fn test_unknown_base_level_rejected() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().field(), Some("logging.level"));
    }

    #[test]
    fn test_component_override_for_nested_module() {
        assert!(with_component("dashboard::broadcaster", "trace")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_component_outside_crate_rejected() {
        let err = with_component("hyper", "debug").validate().unwrap_err();
        assert_eq!(err.field(), Some("logging.component_levels.hyper"));
    }

    #[test]
    fn test_component_with_bad_level_rejected() {
        let err = with_component("server", "loud").validate().unwrap_err();
        assert_eq!(err.field(), Some("logging.component_levels.server"));
    }

    #[test]
    fn test_component_table_from_toml() {
        let config: LoggingConfig = toml::from_str(
            "format = \"json\"\n[component_levels]\n\"server::websocket\" = \"debug\"\n",
        )
        .unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.component_levels["server::websocket"], "debug");
    }
}
