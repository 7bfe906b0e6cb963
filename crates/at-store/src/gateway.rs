//! Storage gateway contract.

use crate::column::{ColumnHeader, TableHeader};
use crate::error::StoreError;
use crate::query::{Filter, Query};
use crate::row::Row;

/// Column-store operations the audit engine depends on.
///
/// Implementations must be safe to call from every ingestion worker at once.
/// Tables are append-only: rows are never updated in place.
pub trait StorageGateway: Send + Sync {
    /// Create the table if absent, otherwise add any columns it lacks.
    ///
    /// Existing columns are never dropped or retyped.
    fn create_or_sync_table(&self, header: &TableHeader) -> Result<(), StoreError>;

    /// Add one column to an existing table.
    ///
    /// Adding a column that already exists with the same type succeeds and
    /// changes nothing. Adding it with a different type fails.
    fn add_column(&self, table: &str, column: &ColumnHeader) -> Result<(), StoreError>;

    /// Append one row.
    fn insert(&self, table: &str, row: &Row) -> Result<(), StoreError> {
        let header = self.table_header(table)?;
        self.insert_batch(table, &header.columns, std::slice::from_ref(row))
    }

    /// Append rows, each carrying the listed columns.
    ///
    /// Table columns not listed are stored as their type default.
    fn insert_batch(
        &self,
        table: &str,
        columns: &[ColumnHeader],
        rows: &[Row],
    ) -> Result<(), StoreError>;

    /// Rows matching the query, projected onto `columns`.
    fn select(
        &self,
        table: &str,
        columns: &[ColumnHeader],
        query: &Query,
    ) -> Result<Vec<Row>, StoreError>;

    /// Number of stored rows matching the filter, without version resolution.
    fn count(&self, table: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Current header of a table.
    fn table_header(&self, table: &str) -> Result<TableHeader, StoreError>;

    /// Remove a table and everything in it. Missing tables are not an error.
    fn drop_table(&self, table: &str) -> Result<(), StoreError>;
}

/// Check a batch against a table header before anything is written.
///
/// Every listed column must exist with the same type. Every cell must be
/// coercible to its column type; coerced cells are returned in place.
pub fn prepare_batch(
    header: &TableHeader,
    columns: &[ColumnHeader],
    rows: &[Row],
) -> Result<Vec<Row>, StoreError> {
    for column in columns {
        match header.column(&column.name) {
            None => {
                return Err(StoreError::UnknownColumn {
                    table: header.name.clone(),
                    column: column.name.clone(),
                })
            }
            Some(existing) if existing.column_type != column.column_type => {
                return Err(StoreError::TypeMismatch {
                    column: column.name.clone(),
                    expected: existing.column_type,
                    actual: column.column_type.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    rows.iter()
        .map(|row| {
            let mut out = Row::new();
            for column in columns {
                let cell = match row.get(&column.name) {
                    Some(cell) => column.column_type.coerce(cell.clone()).ok_or_else(|| {
                        StoreError::TypeMismatch {
                            column: column.name.clone(),
                            expected: column.column_type,
                            actual: format!("{:?}", cell),
                        }
                    })?,
                    None => column.column_type.default_cell(),
                };
                out.set(column.name.clone(), cell);
            }
            Ok(out)
        })
        .collect()
}

/// Merge new columns into a header, rejecting conflicting types.
///
/// Returns the columns that were actually added.
pub fn merge_columns(
    header: &mut TableHeader,
    columns: &[ColumnHeader],
) -> Result<Vec<ColumnHeader>, StoreError> {
    for column in columns {
        if let Some(existing) = header.column(&column.name) {
            if existing.column_type != column.column_type {
                return Err(StoreError::TypeMismatch {
                    column: column.name.clone(),
                    expected: existing.column_type,
                    actual: column.column_type.to_string(),
                });
            }
        }
    }

    let mut added = Vec::new();
    for column in columns {
        if !header.has_column(&column.name) {
            header.columns.push(column.clone());
            added.push(column.clone());
        }
    }
    Ok(added)
}
