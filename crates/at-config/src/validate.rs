//! Configuration validation errors and semantic validation.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::{AuditConfig, ReserveKind};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 40,
            ValidationError::ParseError(_) => 41,
            ValidationError::SemanticError(_) => 42,
            ValidationError::InvalidValue { .. } => 43,
            ValidationError::VersionMismatch { .. } => 44,
        }
    }
}

/// Validate a configuration semantically.
pub fn validate_config(config: &AuditConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    positive("queue.capacity", config.queue.capacity)?;
    positive("queue.workers", config.queue.workers)?;
    positive(
        "queue.worker_buffer_capacity",
        config.queue.worker_buffer_capacity,
    )?;

    if config.queue.worker_buffer_capacity > config.queue.capacity {
        return Err(ValidationError::SemanticError(format!(
            "queue.worker_buffer_capacity ({}) exceeds queue.capacity ({})",
            config.queue.worker_buffer_capacity, config.queue.capacity
        )));
    }

    if config.reserve.max_generation == 0 {
        return Err(ValidationError::InvalidValue {
            field: "reserve.max_generation".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    if config.reserve.writers.contains(&ReserveKind::S3) {
        return Err(ValidationError::InvalidValue {
            field: "reserve.writers".to_string(),
            message: "s3 reserve writer is not supported by this build".to_string(),
        });
    }

    if config.reserve.writers.contains(&ReserveKind::File)
        && config.reserve.path.as_os_str().is_empty()
    {
        return Err(ValidationError::InvalidValue {
            field: "reserve.path".to_string(),
            message: "Required when the file reserve writer is enabled".to_string(),
        });
    }

    if config.storage.table.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "storage.table".to_string(),
            message: "Must not be empty".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for name in config.storage.columns.all() {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "storage.columns".to_string(),
                message: "Column names must not be empty".to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(ValidationError::SemanticError(format!(
                "Column name {:?} is used for more than one service column",
                name
            )));
        }
    }

    Ok(())
}

fn positive(field: &str, value: usize) -> ValidationResult<()> {
    if value == 0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: "Must be greater than 0".to_string(),
        });
    }
    Ok(())
}
