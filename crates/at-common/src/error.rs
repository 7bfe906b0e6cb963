//! Error types for the audit trail engine.
//!
//! Every public operation of the engine comes in two flavors: a silent one
//! that logs and degrades, and a strict one that returns one of these errors.
//! Errors carry:
//! - Stable numeric codes for machine parsing
//! - A category for grouping
//! - A recoverability hint for callers deciding whether to retry

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::InnerType;

/// Result type alias for audit trail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Object and information type registration or resolution.
    Types,
    /// Ingestion queue and pipeline lifecycle.
    Pipeline,
    /// Storage gateway and schema management.
    Storage,
    /// Configuration loading and validation.
    Config,
    /// File I/O and serialization.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Types => write!(f, "types"),
            ErrorCategory::Pipeline => write!(f, "pipeline"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the audit trail engine.
#[derive(Error, Debug)]
pub enum Error {
    // Type errors (10-19)
    #[error("type already registered: {kind} {key}")]
    DuplicateType { kind: &'static str, key: String },

    #[error("unknown {kind} type: {key}")]
    UnknownType { kind: &'static str, key: String },

    #[error("information {code} expects a {expected} value, got {actual}")]
    InvalidValue {
        code: String,
        expected: InnerType,
        actual: String,
    },

    // Pipeline errors (20-29)
    #[error("audit queue full: {staged} staged records, {free} free slots")]
    QueueFull { staged: usize, free: usize },

    #[error("audit pipeline is shutting down")]
    ShuttingDown,

    // Storage errors (30-39)
    #[error("schema sync failed for column {column}: {message}")]
    SchemaSync { column: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("stored row violates the audit schema: {0}")]
    Corrupted(String),

    // Configuration errors (40-49)
    #[error("configuration error: {0}")]
    Config(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for an unknown object type.
    pub fn unknown_object(key: impl Into<String>) -> Self {
        Error::UnknownType {
            kind: "object",
            key: key.into(),
        }
    }

    /// Shorthand for an unknown information type.
    pub fn unknown_information(key: impl Into<String>) -> Self {
        Error::UnknownType {
            kind: "information",
            key: key.into(),
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Type errors
    /// - 20-29: Pipeline errors
    /// - 30-39: Storage errors
    /// - 40-49: Configuration errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::DuplicateType { .. } => 10,
            Error::UnknownType { .. } => 11,
            Error::InvalidValue { .. } => 12,
            Error::QueueFull { .. } => 20,
            Error::ShuttingDown => 21,
            Error::SchemaSync { .. } => 30,
            Error::Storage(_) => 31,
            Error::Corrupted(_) => 32,
            Error::Config(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DuplicateType { .. }
            | Error::UnknownType { .. }
            | Error::InvalidValue { .. } => ErrorCategory::Types,
            Error::QueueFull { .. } | Error::ShuttingDown => ErrorCategory::Pipeline,
            Error::SchemaSync { .. } | Error::Storage(_) | Error::Corrupted(_) => {
                ErrorCategory::Storage
            }
            Error::Config(_) => ErrorCategory::Config,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether retrying the same call later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Registration mistakes are programming errors
            Error::DuplicateType { .. } => false,
            Error::UnknownType { .. } => false,
            Error::InvalidValue { .. } => false,

            // The queue drains on its own
            Error::QueueFull { .. } => true,
            Error::ShuttingDown => false,

            Error::SchemaSync { .. } => true,
            Error::Storage(_) => true,
            Error::Corrupted(_) => false,

            Error::Config(_) => false,

            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }
}
