//! Typed audit configuration.
//!
//! Every field has a built-in default, so a config file only needs to name
//! the values it changes. Environment variables (`AT_*`) override file values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::validate::{ValidationError, ValidationResult};

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Schema version of the config file.
    pub schema_version: String,

    /// Ingestion queue and worker pool.
    pub queue: QueueConfig,

    /// Failure pathway.
    pub reserve: ReserveConfig,

    /// Table layout and schema management.
    pub storage: StorageConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            queue: QueueConfig::default(),
            reserve: ReserveConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Ingestion queue and worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of records waiting in the shared queue.
    pub capacity: usize,

    /// Number of worker threads draining the queue.
    pub workers: usize,

    /// Maximum records a worker collects before inserting a batch.
    pub worker_buffer_capacity: usize,

    /// How long a worker waits for more records before flushing, in milliseconds.
    pub wait_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            capacity: 20_000,
            workers: 5,
            worker_buffer_capacity: 5_000,
            wait_ms: 10,
        }
    }
}

impl QueueConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }
}

/// Fallback writer kinds, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReserveKind {
    /// JSON Lines file at `reserve.path`.
    File,
    /// Structured error events on the `audit_reserve` tracing target.
    Log,
    /// Object storage upload. Recognized but not supported by this build.
    S3,
}

impl std::str::FromStr for ReserveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(ReserveKind::File),
            "log" => Ok(ReserveKind::Log),
            "s3" => Ok(ReserveKind::S3),
            other => Err(format!("unknown reserve writer: {}", other)),
        }
    }
}

impl std::fmt::Display for ReserveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReserveKind::File => write!(f, "file"),
            ReserveKind::Log => write!(f, "log"),
            ReserveKind::S3 => write!(f, "s3"),
        }
    }
}

/// Failure pathway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReserveConfig {
    /// Records whose generation exceeds this are dropped instead of retried.
    pub max_generation: u32,

    /// Ordered reserve writers.
    pub writers: Vec<ReserveKind>,

    /// Path of the reserve file.
    pub path: PathBuf,

    /// Put failed records back into the queue while it has room.
    pub requeue_on_failure: bool,
}

impl Default for ReserveConfig {
    fn default() -> Self {
        ReserveConfig {
            max_generation: 15,
            writers: vec![ReserveKind::File, ReserveKind::Log],
            path: PathBuf::from("reserve.jsonl"),
            requeue_on_failure: false,
        }
    }
}

/// Column names of the audit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub description: String,
    pub id: String,
    pub version: String,
    pub timestamp: String,
    pub date: String,
    pub is_deleted: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            description: "Description".to_string(),
            id: "IdColumn".to_string(),
            version: "VersionColumn".to_string(),
            timestamp: "TimeStampColumn".to_string(),
            date: "DateColumn".to_string(),
            is_deleted: "IsDeletedColumn".to_string(),
        }
    }
}

impl ColumnNames {
    /// All configured names, in declaration order.
    pub fn all(&self) -> [&str; 6] {
        [
            &self.description,
            &self.id,
            &self.version,
            &self.timestamp,
            &self.date,
            &self.is_deleted,
        ]
    }
}

/// Table layout and schema management settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Audit table name.
    pub table: String,

    /// Let the engine create the table and add columns on type registration.
    pub use_default_ddl: bool,

    /// Hide rows whose latest version is marked deleted.
    pub soft_delete: bool,

    /// Column name overrides.
    pub columns: ColumnNames,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            table: "AuditTable".to_string(),
            use_default_ddl: true,
            soft_delete: true,
            columns: ColumnNames::default(),
        }
    }
}

impl AuditConfig {
    /// Load configuration from a JSON or TOML file, chosen by extension.
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::parse_toml(&content),
            _ => Self::parse_json(&content),
        }
    }

    /// Parse configuration from a JSON string.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> ValidationResult<Self> {
        toml::from_str(content)
            .map_err(|e| ValidationError::ParseError(format!("Invalid TOML: {}", e)))
    }

    /// Apply `AT_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> ValidationResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Keys are the `AT_*` environment variable names.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ValidationResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("AT_QUEUE_CAPACITY") {
            self.queue.capacity = parse_override("AT_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("AT_WORKERS") {
            self.queue.workers = parse_override("AT_WORKERS", &v)?;
        }
        if let Some(v) = lookup("AT_WORKER_BUFFER") {
            self.queue.worker_buffer_capacity = parse_override("AT_WORKER_BUFFER", &v)?;
        }
        if let Some(v) = lookup("AT_QUEUE_WAIT_MS") {
            self.queue.wait_ms = parse_override("AT_QUEUE_WAIT_MS", &v)?;
        }
        if let Some(v) = lookup("AT_MAX_GENERATION") {
            self.reserve.max_generation = parse_override("AT_MAX_GENERATION", &v)?;
        }
        if let Some(v) = lookup("AT_RESERVE_PATH") {
            self.reserve.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("AT_RESERVE_WRITERS") {
            self.reserve.writers = v
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.parse::<ReserveKind>()
                        .map_err(|message| ValidationError::InvalidValue {
                            field: "AT_RESERVE_WRITERS".to_string(),
                            message,
                        })
                })
                .collect::<ValidationResult<Vec<_>>>()?;
        }
        if let Some(v) = lookup("AT_USE_DEFAULT_DDL") {
            self.storage.use_default_ddl = parse_override("AT_USE_DEFAULT_DDL", &v)?;
        }
        if let Some(v) = lookup("AT_SOFT_DELETE") {
            self.storage.soft_delete = parse_override("AT_SOFT_DELETE", &v)?;
        }
        if let Some(v) = lookup("AT_TABLE") {
            self.storage.table = v;
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(field: &str, raw: &str) -> ValidationResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("{} ({:?})", e, raw),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AuditConfig::default();
        assert_eq!(config.queue.capacity, 20_000);
        assert_eq!(config.queue.workers, 5);
        assert_eq!(config.queue.worker_buffer_capacity, 5_000);
        assert_eq!(config.queue.wait(), Duration::from_millis(10));
        assert_eq!(config.reserve.max_generation, 15);
        assert_eq!(config.storage.table, "AuditTable");
        assert!(config.storage.use_default_ddl);
        assert!(config.storage.soft_delete);
        assert_eq!(config.storage.columns.id, "IdColumn");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AuditConfig::parse_json(r#"{"queue": {"capacity": 10}}"#).unwrap();
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.queue.workers, 5);
        assert_eq!(config.storage.columns, ColumnNames::default());
    }

    #[test]
    fn test_parse_toml() {
        let config = AuditConfig::parse_toml(
            r#"
            [reserve]
            max_generation = 3
            writers = ["log"]

            [storage.columns]
            id = "RecordId"
            "#,
        )
        .unwrap();
        assert_eq!(config.reserve.max_generation, 3);
        assert_eq!(config.reserve.writers, vec![ReserveKind::Log]);
        assert_eq!(config.storage.columns.id, "RecordId");
        assert_eq!(config.storage.columns.version, "VersionColumn");
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = AuditConfig::parse_json("{not json").unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("AT_QUEUE_CAPACITY", "42"),
            ("AT_RESERVE_WRITERS", "log,file"),
            ("AT_SOFT_DELETE", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AuditConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.queue.capacity, 42);
        assert_eq!(
            config.reserve.writers,
            vec![ReserveKind::Log, ReserveKind::File]
        );
        assert!(!config.storage.soft_delete);
    }

    #[test]
    fn test_bad_override_names_the_variable() {
        let mut config = AuditConfig::default();
        let err = config
            .apply_overrides(|k| (k == "AT_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        match err {
            ValidationError::InvalidValue { field, .. } => assert_eq!(field, "AT_WORKERS"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_reserve_kind_parse() {
        assert_eq!("FILE".parse::<ReserveKind>().unwrap(), ReserveKind::File);
        assert_eq!("s3".parse::<ReserveKind>().unwrap(), ReserveKind::S3);
        assert!("disk".parse::<ReserveKind>().is_err());
    }
}
