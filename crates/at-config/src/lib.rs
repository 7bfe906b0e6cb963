//! Audit trail configuration loading and validation.
//!
//! This crate provides:
//! - Typed `AuditConfig` covering queue, worker, reserve and schema settings
//! - Config resolution (`--config`, `AT_CONFIG`, user and system dirs, defaults)
//! - Environment overrides (`AT_*` variables)
//! - Semantic validation
//! - Config snapshots for startup logging

pub mod config;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use config::{AuditConfig, ColumnNames, QueueConfig, ReserveConfig, ReserveKind, StorageConfig};
pub use resolve::{load_config, resolve_config_path, ConfigSource, LoadedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_config, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
