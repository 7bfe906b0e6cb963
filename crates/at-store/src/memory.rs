//! In-memory append-only column store.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use crate::column::{ColumnHeader, TableHeader};
use crate::error::StoreError;
use crate::gateway::{merge_columns, prepare_batch, StorageGateway};
use crate::query::{execute, validate_query, Filter, Query};
use crate::row::Row;

#[derive(Debug, Default)]
struct MemTable {
    header: TableHeader,
    rows: Vec<Row>,
}

/// Column store held entirely in memory.
///
/// Used by tests and by short-lived tools that do not need durability.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the tables currently held.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Number of stored rows in a table.
    pub fn row_count(&self, table: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        tables
            .get(table)
            .map(|t| t.rows.len())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

impl StorageGateway for MemoryGateway {
    fn create_or_sync_table(&self, header: &TableHeader) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        match tables.get_mut(&header.name) {
            Some(existing) => {
                let added = merge_columns(&mut existing.header, &header.columns)?;
                if !added.is_empty() {
                    debug!(table = %header.name, added = added.len(), "synchronized table columns");
                }
            }
            None => {
                debug!(table = %header.name, columns = header.columns.len(), "created table");
                tables.insert(
                    header.name.clone(),
                    MemTable {
                        header: header.clone(),
                        rows: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    fn add_column(&self, table: &str, column: &ColumnHeader) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        let existing = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        merge_columns(&mut existing.header, std::slice::from_ref(column))?;
        Ok(())
    }

    fn insert_batch(
        &self,
        table: &str,
        columns: &[ColumnHeader],
        rows: &[Row],
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        let existing = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let prepared = prepare_batch(&existing.header, columns, rows)?;
        existing.rows.extend(prepared);
        Ok(())
    }

    fn select(
        &self,
        table: &str,
        columns: &[ColumnHeader],
        query: &Query,
    ) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        let existing = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        execute(&existing.header, &existing.rows, columns, query)
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<u64, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        let existing = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let query = Query::new(filter.clone());
        validate_query(&existing.header, &query)?;
        let matched = execute(&existing.header, &existing.rows, &[], &query)?;
        Ok(matched.len() as u64)
    }

    fn table_header(&self, table: &str) -> Result<TableHeader, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        tables
            .get(table)
            .map(|t| t.header.clone())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        if tables.remove(table).is_some() {
            debug!(table = %table, "dropped table");
        }
        Ok(())
    }
}
