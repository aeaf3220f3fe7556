//! # Error Types
//!
//! Custom error types for FPV Aid using `thiserror`.

use thiserror::Error;

/// Main error type for FPV Aid
#[derive(Debug, Error)]
pub enum FpvAidError {
    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration parsed but holds out-of-range values
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Updates or deletes that matched no row
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite errors (open, schema, constraint violations)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for FPV Aid
pub type Result<T> = std::result::Result<T, FpvAidError>;
