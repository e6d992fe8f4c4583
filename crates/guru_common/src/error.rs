//! Error types for the question-to-SQL pipeline.
//!
//! One enum per failure family. The Engine converts every one of them into a
//! terminal turn result; nothing here is meant to cross the Engine boundary.

use std::time::Duration;
use thiserror::Error;

/// SQL rejected before execution
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Only SELECT queries are allowed.")]
    NotSelect,

    #[error("Forbidden keyword detected: {0}")]
    ForbiddenKeyword(String),

    #[error("Unknown columns detected: {}", .0.join(", "))]
    UnknownColumns(Vec<String>),

    #[error("Semantic check failed: {0}")]
    Semantic(String),

    #[error("Schema introspection failed: {0}")]
    Schema(#[source] rusqlite::Error),
}

/// Structural transformer refused the SQL shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Structural policy violation: {0}")]
    Policy(String),
}

/// Query execution failures
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Query interrupted: exceeded the {}s timeout", .limit.as_secs_f64())]
    Timeout { limit: Duration },

    #[error("Database error: {0}")]
    Driver(#[from] rusqlite::Error),
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout { .. })
    }
}

/// External SQL generator failures
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("SQL generator is disabled in configuration")]
    Disabled,

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid generator response: {0}")]
    InvalidResponse(String),

    #[error("Generator request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Generator returned an empty response")]
    EmptyResponse,
}

/// Umbrella error for one pipeline turn
#[derive(Error, Debug)]
pub enum GuruError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl GuruError {
    /// Stable short code used in turn logs
    pub fn code(&self) -> &'static str {
        match self {
            GuruError::Validation(_) => "validation",
            GuruError::Structural(_) => "structural_policy",
            GuruError::Execution(e) if e.is_timeout() => "timeout",
            GuruError::Execution(_) => "execution",
            GuruError::Generation(_) => "generation",
        }
    }
}
