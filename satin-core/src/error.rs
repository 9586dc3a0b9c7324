use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

use crate::validation::ValidationResult;

/// Failure reported by a storage collaborator.
///
/// The core never retries or swallows these; they travel up to the caller of the
/// preset or plugin operation that triggered them.
#[derive(Error, Debug)]
#[error("storage {operation} failed for '{key}': {source}")]
pub struct StorageError {
    pub operation: &'static str,
    pub key: String,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

impl StorageError {
    pub fn new(
        operation: &'static str,
        key: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            operation,
            key: key.into(),
            source: source.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SatinError {
    SchemaNotFound {
        name: String,
    },
    DuplicateSchema {
        name: String,
    },
    InvalidSchema {
        name: String,
        reason: String,
    },
    PresetNotFound {
        name: String,
        version: Option<u32>,
    },
    InvalidPresetName {
        name: String,
        reason: String,
    },
    DuplicatePlugin {
        id: String,
    },
    PluginNotFound {
        id: String,
    },
    InvalidState {
        id: String,
        state: String,
        operation: &'static str,
    },
    PluginInit {
        id: String,
        reason: String,
    },
    ValidationFailed {
        subject: String,
        result: ValidationResult,
    },
    VersionOverflow {
        name: String,
        version: u32,
    },
    Storage(#[from] StorageError),
    Serialization(String),
    Io(#[from] std::io::Error),
    Other(#[from] anyhow::Error),
}

impl Display for SatinError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SatinError::SchemaNotFound { name } => write!(f, "Schema not found: '{}'", name),
            SatinError::DuplicateSchema { name } => {
                write!(f, "Schema '{}' is already registered", name)
            }
            SatinError::InvalidSchema { name, reason } => {
                write!(f, "Invalid schema '{}': {}", name, reason)
            }
            SatinError::PresetNotFound {
                name,
                version: Some(version),
            } => write!(f, "Preset '{}' has no version v{}", name, version),
            SatinError::PresetNotFound {
                name,
                version: None,
            } => write!(f, "Preset not found: '{}'", name),
            SatinError::InvalidPresetName { name, reason } => {
                write!(f, "Invalid preset name '{}': {}", name, reason)
            }
            SatinError::DuplicatePlugin { id } => {
                write!(f, "Plugin '{}' is already registered", id)
            }
            SatinError::PluginNotFound { id } => write!(f, "Plugin not found: '{}'", id),
            SatinError::InvalidState {
                id,
                state,
                operation,
            } => write!(
                f,
                "Cannot {} plugin '{}' while it is {}",
                operation, id, state
            ),
            SatinError::PluginInit { id, reason } => {
                write!(f, "Plugin '{}' failed to initialize: {}", id, reason)
            }
            SatinError::ValidationFailed { subject, result } => {
                write!(
                    f,
                    "Validation failed for {}: {} error(s)",
                    subject,
                    result.errors().len()
                )?;
                for issue in result.errors() {
                    write!(f, "\n  • {}", issue)?;
                }
                Ok(())
            }
            SatinError::VersionOverflow { name, version } => {
                write!(f, "Preset '{}' cannot grow past v{}", name, version)
            }
            SatinError::Storage(e) => write!(f, "Storage error: {}", e),
            SatinError::Serialization(s) => write!(f, "Serialization error: {}", s),
            SatinError::Io(e) => write!(f, "I/O error: {}", e),
            SatinError::Other(e) => write!(f, "{:#}", e),
        }
    }
}

impl From<serde_yaml_ng::Error> for SatinError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        SatinError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SatinError {
    fn from(err: serde_json::Error) -> Self {
        SatinError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SatinError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{ValidationErrorKind, ValidationIssue};

    #[test]
    fn test_preset_not_found_mentions_version() {
        let err = SatinError::PresetNotFound {
            name: "avatar".to_string(),
            version: Some(4),
        };
        assert_eq!(err.to_string(), "Preset 'avatar' has no version v4");

        let err = SatinError::PresetNotFound {
            name: "avatar".to_string(),
            version: None,
        };
        assert_eq!(err.to_string(), "Preset not found: 'avatar'");
    }

    #[test]
    fn test_invalid_state_message_names_plugin_and_operation() {
        let err = SatinError::InvalidState {
            id: "p1".to_string(),
            state: "active".to_string(),
            operation: "activate",
        };
        assert_eq!(err.to_string(), "Cannot activate plugin 'p1' while it is active");
    }

    #[test]
    fn test_validation_failed_lists_every_issue() {
        let result = ValidationResult::from_issues(vec![
            ValidationIssue::new("port", ValidationErrorKind::MissingField, "required field is missing"),
            ValidationIssue::new("name", ValidationErrorKind::TypeMismatch, "expected string, found number"),
        ]);
        let err = SatinError::ValidationFailed {
            subject: "plugin 'p1'".to_string(),
            result,
        };
        let message = err.to_string();
        assert!(message.starts_with("Validation failed for plugin 'p1': 2 error(s)"));
        assert!(message.contains("port"));
        assert!(message.contains("name"));
    }

    #[test]
    fn test_storage_error_converts_and_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: SatinError = StorageError::new("write", "avatar@v2", io).into();
        assert!(matches!(err, SatinError::Storage(_)));
        assert_eq!(
            err.to_string(),
            "Storage error: storage write failed for 'avatar@v2': read-only"
        );
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn test_anyhow_errors_keep_their_context_chain() {
        let inner = anyhow::anyhow!("permission denied");
        let err: SatinError = inner.context("Failed to read plugins directory").into();
        assert!(matches!(err, SatinError::Other(_)));
        assert_eq!(
            err.to_string(),
            "Failed to read plugins directory: permission denied"
        );
    }

    #[test]
    fn test_serde_errors_become_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SatinError = json_err.into();
        assert!(matches!(err, SatinError::Serialization(_)));
    }
}
