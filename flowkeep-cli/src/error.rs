//! Error handling for the flowkeep CLI
//!
//! Library errors are wrapped with an exit code chosen from their kind, so
//! scripts can tell a missing or conflicting workflow from a broken setup.

use crate::exit_codes::{EXIT_ERROR, EXIT_WARNING};
use flowkeep::{ErrorChain, ErrorKind, FlowkeepError};
use std::error::Error;
use std::fmt;

/// CLI-specific result type that preserves error information
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type that includes both error information and suggested exit code
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl CliError {
    /// Create a new CLI error with a message and exit code
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
            source: None,
        }
    }

    /// Create a CLI error from another error with a specific exit code
    pub fn from_error<E: Error + Send + Sync + 'static>(error: E, exit_code: i32) -> Self {
        Self {
            message: error.to_string(),
            exit_code,
            source: Some(Box::new(error)),
        }
    }

    /// The error followed by its causes, one per line
    pub fn report(&self) -> String {
        match self.source() {
            // A wrapped error whose text is already the message
            Some(source) if source.to_string() == self.message => {
                ErrorChain::new(source).to_string()
            }
            _ => ErrorChain::new(self).to_string(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Exit code for a library error
pub fn exit_code_for(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound | ErrorKind::Conflict => EXIT_WARNING,
        _ => EXIT_ERROR,
    }
}

impl From<FlowkeepError> for CliError {
    fn from(error: FlowkeepError) -> Self {
        let exit_code = exit_code_for(error.kind());
        Self::from_error(error, exit_code)
    }
}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::from_error(error, EXIT_ERROR)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::from_error(error, EXIT_ERROR)
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::from_error(error, EXIT_ERROR)
    }
}

/// Convert a CliResult to an exit code, printing the full error chain if needed
pub fn handle_cli_result<T>(result: CliResult<T>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            eprint!("{}", e.report());
            e.exit_code
        }
    }
}
