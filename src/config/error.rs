//! Errors raised while loading or validating `benchstream.toml`

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read config file {}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{} is not valid benchstream TOML", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A setting parsed but cannot drive the telemetry pipeline
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Dotted config key the error refers to, when there is one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_validation_message_names_the_key() {
        let err = ConfigError::invalid("streaming.history_capacity", "must keep at least one run");
        assert_eq!(
            err.to_string(),
            "streaming.history_capacity: must keep at least one run"
        );
        assert_eq!(err.field(), Some("streaming.history_capacity"));
    }

    #[test]
    fn test_parse_error_keeps_toml_cause() {
        let source = toml::from_str::<toml::Value>("[server\nport = ").unwrap_err();
        let err = ConfigError::Parse {
            path: PathBuf::from("benchstream.toml"),
            source,
        };

        assert!(err.to_string().contains("benchstream.toml"));
        assert!(err.source().is_some());
        assert_eq!(err.field(), None);
    }
}
