//! Error types for strata-config.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for strata-config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading, watching or reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file exists and no defaults were provided.
    #[error("No configuration file found at {} and no defaults provided", .0.display())]
    SourceNotFound(PathBuf),

    /// IO error occurred while reading a source.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse configuration content.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Failed to deserialize configuration into the requested type.
    #[error("Failed to deserialize configuration: {0}")]
    DeserializationError(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(ValidationError),

    /// A remote fetch exceeded its internal deadline.
    #[error("Operation timed out")]
    Timeout,

    /// The manager was closed before the operation was attempted.
    #[error("Config manager is closed")]
    Closed,

    /// A watch subscription could not be registered.
    #[error("Failed to set up watch: {0}")]
    WatchSetupFailed(String),

    /// No fetcher is available for the remote provider type.
    #[error("Unsupported remote provider type: {0}")]
    UnsupportedRemote(String),

    /// The remote source could not be reached or answered with an error.
    #[error("Remote source error: {0}")]
    RemoteError(String),

    /// A strict accessor was called for a key that is not set.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Attempted to use a feature that is not enabled.
    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),
}

impl ConfigError {
    /// Returns `true` if this error is a remote timeout.
    ///
    /// Timeouts usually deserve a different retry policy than other failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns the validation failure, if this error is one.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::ValidationFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// A violated schema constraint.
///
/// Identifies the fully-qualified field path (e.g. `server.port` or
/// `upstreams[1].url`) and the name of the rule that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The dotted field path
    pub field: String,
    /// The rule code, e.g. `range`, `url`, `required`
    pub rule: String,
    /// Optional human-readable detail
    pub message: Option<String>,
}

impl ValidationError {
    /// Create a validation error for a field and rule.
    pub fn new(field: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rule: rule.into(),
            message: None,
        }
    }

    /// Attach a message describing the violation.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed for field '{}': {}", self.field, self.rule)?;
        if let Some(message) = &self.message {
            write!(f, " ({})", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::ValidationFailed(err)
    }
}
