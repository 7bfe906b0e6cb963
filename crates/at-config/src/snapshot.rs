//! Configuration snapshots for startup logging.
//!
//! A snapshot captures the effective configuration when the engine starts, so
//! a log line or a reserve file can be matched to the settings that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{AuditConfig, ReserveKind};
use crate::resolve::LoadedConfig;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the config was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the effective configuration (after overrides).
    pub effective_hash: String,

    /// Key values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub queue_capacity: usize,
    pub workers: usize,
    pub worker_buffer_capacity: usize,
    pub max_generation: u32,
    pub reserve_writers: Vec<ReserveKind>,
    pub table: String,
    pub use_default_ddl: bool,
    pub soft_delete: bool,
}

impl ConfigSnapshot {
    /// Create a snapshot from a loaded configuration.
    pub fn new(loaded: &LoadedConfig) -> Self {
        let mut snapshot = Self::from_config(&loaded.config);
        snapshot.path = loaded.path.as_ref().map(|p| p.display().to_string());
        snapshot.source = loaded.source.to_string();
        snapshot
    }

    /// Create a snapshot of a configuration built in code.
    pub fn from_config(config: &AuditConfig) -> Self {
        let effective = serde_json::to_string(config).unwrap_or_default();

        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: None,
            source: "in-code".to_string(),
            effective_hash: hash_content(&effective),
            summary: ConfigSummary {
                queue_capacity: config.queue.capacity,
                workers: config.queue.workers,
                worker_buffer_capacity: config.queue.worker_buffer_capacity,
                max_generation: config.reserve.max_generation,
                reserve_writers: config.reserve.writers.clone(),
                table: config.storage.table.clone(),
                use_default_ddl: config.storage.use_default_ddl,
                soft_delete: config.storage.soft_delete,
            },
        }
    }

    /// Check whether two snapshots describe the same effective configuration.
    pub fn same_config(&self, other: &ConfigSnapshot) -> bool {
        self.effective_hash == other.effective_hash
    }
}

/// Compute the SHA-256 hash of content.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content() {
        let hash = hash_content("test");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_content("test"));
        assert_ne!(hash, hash_content("test2"));
    }

    #[test]
    fn test_snapshot_tracks_changes() {
        let base = ConfigSnapshot::from_config(&AuditConfig::default());
        let same = ConfigSnapshot::from_config(&AuditConfig::default());
        assert!(base.same_config(&same));

        let mut changed = AuditConfig::default();
        changed.queue.capacity = 10;
        let other = ConfigSnapshot::from_config(&changed);
        assert!(!base.same_config(&other));
        assert_eq!(other.summary.queue_capacity, 10);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = ConfigSnapshot::from_config(&AuditConfig::default());
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: ConfigSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.effective_hash, snapshot.effective_hash);
        assert_eq!(parsed.summary.table, "AuditTable");
    }
}
