//! Query-time version resolution.
//!
//! Storage is append-only, so every replace or delete adds a row. The
//! current state of a logical record is its row with the highest version;
//! with soft delete enabled that row hides the record when it is marked
//! deleted.

use std::collections::{HashMap, HashSet};

use at_common::Value;
use at_config::StorageConfig;
use at_store::Row;

/// Keeps the current row of each logical record.
#[derive(Debug, Clone)]
pub struct Resolver {
    id: String,
    version: String,
    is_deleted: String,
    soft_delete: bool,
}

impl Resolver {
    pub fn new(config: &StorageConfig) -> Self {
        Resolver {
            id: config.columns.id.clone(),
            version: config.columns.version.clone(),
            is_deleted: config.columns.is_deleted.clone(),
            soft_delete: config.soft_delete,
        }
    }

    /// Columns a row needs for resolution.
    pub fn key_columns(&self) -> [&str; 3] {
        [&self.id, &self.version, &self.is_deleted]
    }

    /// Drop superseded and deleted rows.
    ///
    /// Survivors keep their position in the input. On equal versions the
    /// later row wins. Rows without an id are never merged.
    pub fn resolve(&self, rows: Vec<Row>) -> Vec<Row> {
        let mut best: HashMap<&Value, (usize, u64)> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            let Some(id) = row.scalar(&self.id) else {
                continue;
            };
            let version = self.version_of(row);
            best.entry(id)
                .and_modify(|current| {
                    if version >= current.1 {
                        *current = (index, version);
                    }
                })
                .or_insert((index, version));
        }

        let survivors: HashSet<usize> = best.values().map(|(index, _)| *index).collect();
        let keep: Vec<bool> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let current = row.scalar(&self.id).is_none() || survivors.contains(&index);
                current && !(self.soft_delete && self.deleted(row))
            })
            .collect();

        rows.into_iter()
            .zip(keep)
            .filter_map(|(row, keep)| keep.then_some(row))
            .collect()
    }

    fn version_of(&self, row: &Row) -> u64 {
        row.scalar(&self.version)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    fn deleted(&self, row: &Row) -> bool {
        row.scalar(&self.is_deleted)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn resolver(soft_delete: bool) -> Resolver {
        Resolver::new(&StorageConfig {
            soft_delete,
            ..StorageConfig::default()
        })
    }

    fn row(id: i64, version: u64, deleted: bool) -> Row {
        Row::new()
            .with("IdColumn", Value::Long(id))
            .with("VersionColumn", Value::ULong(version))
            .with("IsDeletedColumn", Value::Boolean(deleted))
    }

    #[test]
    fn test_latest_version_wins() {
        let rows = vec![row(1, 1, false), row(1, 2, false)];
        assert_eq!(resolver(true).resolve(rows), vec![row(1, 2, false)]);
    }

    #[test]
    fn test_deleted_latest_hides_record() {
        let rows = vec![row(1, 1, false), row(1, 2, true)];
        assert!(resolver(true).resolve(rows).is_empty());
    }

    #[test]
    fn test_soft_delete_disabled_keeps_latest() {
        let rows = vec![row(1, 1, false), row(1, 2, true)];
        assert_eq!(resolver(false).resolve(rows), vec![row(1, 2, true)]);
    }

    #[test]
    fn test_survivor_keeps_its_position() {
        let rows = vec![
            row(1, 1, false),
            row(2, 1, false),
            row(3, 1, false),
            row(1, 2, false),
        ];
        let ids: Vec<_> = resolver(true)
            .resolve(rows)
            .iter()
            .map(|r| r.scalar("IdColumn").and_then(Value::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_equal_versions_keep_later_row() {
        let first = row(1, 1, false).with("Tag", Value::from("first"));
        let second = row(1, 1, false).with("Tag", Value::from("second"));
        let out = resolver(true).resolve(vec![first, second.clone()]);
        assert_eq!(out, vec![second]);
    }

    proptest! {
        #[test]
        fn prop_one_current_row_per_id(
            input in prop::collection::vec((0i64..5, 0u64..5, any::<bool>()), 0..40),
            soft_delete in any::<bool>(),
        ) {
            let rows: Vec<Row> = input.iter().map(|&(i, v, d)| row(i, v, d)).collect();
            let out = resolver(soft_delete).resolve(rows);

            let mut seen = HashSet::new();
            for r in &out {
                let id = r.scalar("IdColumn").and_then(Value::as_i64).unwrap();
                let version = r.scalar("VersionColumn").and_then(Value::as_u64).unwrap();
                let deleted = r.scalar("IsDeletedColumn").and_then(Value::as_bool).unwrap();
                prop_assert!(seen.insert(id));
                let max = input.iter().filter(|(i, _, _)| *i == id).map(|(_, v, _)| *v).max();
                prop_assert_eq!(Some(version), max);
                prop_assert!(!(soft_delete && deleted));
            }

            if !soft_delete {
                let distinct: HashSet<i64> = input.iter().map(|(i, _, _)| *i).collect();
                prop_assert_eq!(out.len(), distinct.len());
            }
        }
    }
}
