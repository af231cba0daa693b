//! Custom error types for pubcat.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, CatalogError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for pubcat operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A raw record is missing a required field
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Canonical store (SQLite) error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing/writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// A pipeline run was triggered while another run is active
    #[error("A pipeline run is already active")]
    ConcurrentRun,
}

/// Result type alias using `CatalogError`
pub type Result<T> = std::result::Result<T, CatalogError>;
