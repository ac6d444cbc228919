//! Unified error handling for the flowkeep library
//!
//! Every public operation returns either a typed success value or a
//! [`FlowkeepError`]. Callers branch on [`FlowkeepError::kind`]; the
//! display text is meant for logs.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the flowkeep library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FlowkeepError {
    /// An identity, location or revision does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate display name, or a restore target that already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Malformed document structure
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// A `$FILE{}` target is missing or outside the allowed root
    #[error("Unresolved reference '{reference}': {reason}")]
    ReferenceUnresolved {
        /// The reference as written in the document
        reference: String,
        /// Why it could not be resolved
        reason: String,
    },

    /// The revision backend is unavailable or refused an operation
    #[error("Revision backend failure: {0}")]
    BackendFailure(String),

    /// A caller-supplied location is not a plain document file name
    #[error("Invalid location '{0}'")]
    InvalidLocation(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// YAML serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Control-flow classification of a [`FlowkeepError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Identity, location or revision absent
    NotFound,
    /// Duplicate name or occupied restore target
    Conflict,
    /// Malformed document
    ParseFailure,
    /// Unresolvable file reference
    ReferenceUnresolved,
    /// Revision backend unavailable or commit failed
    BackendFailure,
    /// Caller input rejected before touching storage
    InvalidInput,
    /// Local I/O, serialization or configuration problem
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::ReferenceUnresolved => "reference_unresolved",
            ErrorKind::BackendFailure => "backend_failure",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl FlowkeepError {
    /// Classify this error for control flow
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowkeepError::NotFound(_) => ErrorKind::NotFound,
            FlowkeepError::Conflict(_) => ErrorKind::Conflict,
            FlowkeepError::ParseFailure(_) => ErrorKind::ParseFailure,
            FlowkeepError::ReferenceUnresolved { .. } => ErrorKind::ReferenceUnresolved,
            FlowkeepError::BackendFailure(_) => ErrorKind::BackendFailure,
            FlowkeepError::InvalidLocation(_) => ErrorKind::InvalidInput,
            FlowkeepError::Config(_)
            | FlowkeepError::Io(_)
            | FlowkeepError::Serialization(_)
            | FlowkeepError::Json(_) => ErrorKind::Internal,
        }
    }

    /// True when the error means "absent"
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// A git invocation exited unsuccessfully
    pub fn git_command_failed(command: &str, exit_code: i32, stderr: &str) -> Self {
        FlowkeepError::BackendFailure(format!(
            "git {command} exited with code {exit_code}: {}",
            stderr.trim()
        ))
    }

    /// A git operation could not be performed at all
    pub fn git_operation_failed(operation: &str, details: &str) -> Self {
        FlowkeepError::BackendFailure(format!("git {operation} failed: {details}"))
    }

    /// A `$FILE{}` reference could not be resolved
    pub fn reference_unresolved(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        FlowkeepError::ReferenceUnresolved {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// A workflow identity has no record or no content
    pub fn workflow_not_found(identity: impl fmt::Display) -> Self {
        FlowkeepError::NotFound(format!("workflow '{identity}'"))
    }

    /// Another identity already owns a display name
    pub fn name_conflict(name: &str) -> Self {
        FlowkeepError::Conflict(format!("a workflow named '{name}' already exists"))
    }
}

/// Result type alias for flowkeep operations
pub type Result<T> = std::result::Result<T, FlowkeepError>;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        /// Path to the configuration file that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        /// Path to the configuration file with invalid YAML content
        path: PathBuf,
        /// Underlying YAML parsing error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the offending field
        field: String,
        /// The invalid value
        value: String,
        /// How to fix it
        hint: String,
    },
}

impl From<ConfigError> for FlowkeepError {
    fn from(error: ConfigError) -> Self {
        FlowkeepError::Config(error.to_string())
    }
}

/// Error chain formatter for detailed error reporting
pub struct ErrorChain<'a>(&'a dyn std::error::Error);

impl<'a> ErrorChain<'a> {
    /// Format `error` followed by each of its sources
    pub fn new(error: &'a dyn std::error::Error) -> Self {
        Self(error)
    }
}

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.0)?;

        let mut current = self.0.source();
        let mut level = 1;

        while let Some(err) = current {
            writeln!(f, "{:indent$}Caused by: {}", "", err, indent = level * 2)?;
            current = err.source();
            level += 1;
        }

        Ok(())
    }
}
