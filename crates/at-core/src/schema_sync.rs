//! Keeps the storage schema in step with the type registry.
//!
//! Every registered type contributes columns to an in-memory catalog that
//! inserts and selects address. When the engine manages the schema itself
//! (`use_default_ddl`), the columns are also created in storage.
//!
//! Registration and column creation are not transactional: a failed
//! `add_column` is reported as `SchemaSync` but the type stays registered
//! and its columns stay in the catalog.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use at_common::{Error, InnerType, Result};
use at_config::StorageConfig;
use at_store::{ColumnHeader, ColumnType, StorageGateway, TableHeader};
use tracing::{debug, error, info};

use crate::types::{InformationType, ObjectType, RegistryListener};

/// Column catalog plus the schema operations that keep storage aligned.
pub struct SchemaSynchronizer {
    gateway: Arc<dyn StorageGateway>,
    table: String,
    use_default_ddl: bool,
    catalog: RwLock<Vec<ColumnHeader>>,
    table_ready: AtomicBool,
}

impl SchemaSynchronizer {
    pub fn new(gateway: Arc<dyn StorageGateway>, config: &StorageConfig) -> Self {
        let description = ColumnHeader::new(
            config.columns.description.clone(),
            ColumnType::array(InnerType::String),
        );
        SchemaSynchronizer {
            gateway,
            table: config.table.clone(),
            use_default_ddl: config.use_default_ddl,
            catalog: RwLock::new(vec![description]),
            table_ready: AtomicBool::new(false),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Catalog columns in registration order, description first.
    pub fn columns(&self) -> Vec<ColumnHeader> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Catalog columns with the given names, in catalog order.
    pub fn columns_named(&self, names: &[&str]) -> Vec<ColumnHeader> {
        self.columns()
            .into_iter()
            .filter(|c| names.contains(&c.name.as_str()))
            .collect()
    }

    pub fn table_header(&self) -> TableHeader {
        TableHeader::new(self.table.clone(), self.columns())
    }

    /// Create or sync the audit table from the catalog.
    ///
    /// Columns registered afterwards are added one by one.
    pub fn init_table(&self) -> Result<()> {
        if self.use_default_ddl {
            let header = self.table_header();
            self.gateway
                .create_or_sync_table(&header)
                .map_err(|e| Error::SchemaSync {
                    column: self.table.clone(),
                    message: e.to_string(),
                })?;
            info!(
                table = %self.table,
                columns = header.columns.len(),
                "audit table ready"
            );
        }
        self.table_ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the audit table and create it again from the catalog.
    pub fn reset_table(&self) -> Result<()> {
        self.table_ready.store(false, Ordering::SeqCst);
        self.gateway.drop_table(&self.table)?;
        info!(table = %self.table, "audit table dropped");
        self.init_table()
    }

    /// Add new columns to storage, then to the catalog.
    ///
    /// The catalog write lock is held across the DDL so that no insert
    /// addresses a column before the table has it.
    fn add_columns(&self, columns: Vec<ColumnHeader>) -> Result<()> {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let ddl = self.use_default_ddl && self.table_ready.load(Ordering::SeqCst);
        let mut failure = None;

        for column in columns {
            if catalog.iter().any(|existing| existing.name == column.name) {
                continue;
            }
            if ddl && failure.is_none() {
                match self.gateway.add_column(&self.table, &column) {
                    Ok(()) => {
                        debug!(table = %self.table, column = %column.name, "column added");
                    }
                    Err(e) => {
                        error!(
                            table = %self.table,
                            column = %column.name,
                            error = %e,
                            "failed to add column"
                        );
                        failure = Some(Error::SchemaSync {
                            column: column.name.clone(),
                            message: e.to_string(),
                        });
                    }
                }
            }
            catalog.push(column);
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl RegistryListener for SchemaSynchronizer {
    fn object_type_added(&self, object_type: &ObjectType) -> Result<()> {
        self.add_columns(object_type.columns())
    }

    fn information_type_added(&self, information_type: &InformationType) -> Result<()> {
        self.add_columns(vec![information_type.column()])
    }
}

impl std::fmt::Debug for SchemaSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaSynchronizer")
            .field("table", &self.table)
            .field("use_default_ddl", &self.use_default_ddl)
            .field("columns", &self.columns().len())
            .finish()
    }
}
