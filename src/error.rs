//! Error types for rplay

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rplay operations
pub type Result<T> = std::result::Result<T, RplayError>;

/// Main error type for rplay
#[derive(Error, Debug)]
pub enum RplayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plan construction errors
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Plan file discovery and structural errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find plan file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Entry '{0}' must define exactly one action or a block")]
    AmbiguousEntry(String),

    #[error("Entry '{entry}': '{field}' is only allowed {allowed}")]
    MisplacedField {
        entry: String,
        field: String,
        allowed: &'static str,
    },

    #[error("Invalid timeout '{0}' (expected e.g. 500ms, 30s, 5m, 1h)")]
    InvalidTimeout(String),

    #[error("Failed to read env file '{path}': {error}")]
    EnvFile { path: PathBuf, error: String },
}

/// Errors raised while building a runtime plan, before anything executes
#[derive(Error, Debug, PartialEq)]
pub enum PlanError {
    #[error("Plan has no tasks")]
    EmptyPlan,

    #[error("Task name '{0}' is used more than once")]
    DuplicateTaskName(String),

    #[error("Task '{task}' references '{name}', which no earlier task registers")]
    UnknownReference { task: String, name: String },

    #[error("Task '{task}' has an invalid condition: {error}")]
    InvalidPredicate { task: String, error: PredicateError },

    #[error("Task '{task}' registers '{name}', which is not usable in conditions (letters, digits and _ only)")]
    InvalidRegisterName { task: String, name: String },
}

/// Predicate syntax errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredicateError {
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token '{token}' at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unknown field '{0}' (expected succeeded, failed, changed, output or rc)")]
    UnknownField(String),

    #[error("invalid integer '{0}'")]
    InvalidInteger(String),
}

/// Failure raised by a target executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("interrupted by cancellation")]
    Cancelled,

    #[error("failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("I/O failure: {0}")]
    Io(String),

    #[error("package backend error: {0}")]
    Backend(String),
}

/// Failure classification carried inside results and run outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The underlying operation failed (package missing, nonzero exit, ...)
    ActionFailure,
    /// A condition or registration named something never declared
    UnknownReference,
    /// A condition referenced a result that was never registered at run time
    UnresolvedReference,
    /// The task exceeded its allotted time
    Timeout,
    /// A non-ignored, non-rescued failure terminated the plan
    AbortedRun,
    /// The run was cancelled before the task could start or finish
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ActionFailure => "action_failure",
            ErrorKind::UnknownReference => "unknown_reference",
            ErrorKind::UnresolvedReference => "unresolved_reference",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AbortedRun => "aborted_run",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TransportError> for ErrorKind {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::ActionFailure,
        }
    }
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for plan construction
pub type PlanResult<T> = std::result::Result<T, PlanError>;

/// Specialized result type for executor operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
