//! Settings error types

use thiserror::Error;

/// Errors that can occur parsing or building setting values
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Series text did not parse as a JSON object of numbers
    #[error("malformed series JSON: {0}")]
    MalformedJson(String),

    /// Corner text did not parse as an indexed CSV table
    #[error("malformed corner CSV: {0}")]
    MalformedCsv(String),

    /// A table row did not match the table's column count
    #[error("table row arity mismatch: expected {expected}, got {got}")]
    RowArity { expected: usize, got: usize },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
