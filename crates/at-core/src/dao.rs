//! Data access for the audit table.
//!
//! Reads fetch candidate rows with the caller's filter and order, resolve
//! versions, then apply the caller's window. The window cannot be pushed
//! down to storage because superseded rows would consume it.

use std::sync::Arc;

use at_common::Result;
use at_config::StorageConfig;
use at_store::{Filter, Query, Row, StorageGateway};
use tracing::debug;

use crate::deserialize::deserialize_records;
use crate::record::{AuditRecord, AuditRecordInternal};
use crate::resolve::Resolver;
use crate::schema_sync::SchemaSynchronizer;
use crate::serializer::RecordSerializer;
use crate::types::{InformationType, ServiceInformation, TypeRegistry};

/// Reads and writes audit records through a storage gateway.
pub struct AuditDao {
    gateway: Arc<dyn StorageGateway>,
    registry: Arc<TypeRegistry>,
    schema: Arc<SchemaSynchronizer>,
    serializer: RecordSerializer,
    resolver: Resolver,
}

impl std::fmt::Debug for AuditDao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDao")
            .field("schema", &self.schema)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl AuditDao {
    pub fn new(
        gateway: Arc<dyn StorageGateway>,
        schema: Arc<SchemaSynchronizer>,
        registry: Arc<TypeRegistry>,
        config: &StorageConfig,
    ) -> Self {
        AuditDao {
            gateway,
            serializer: RecordSerializer::new(
                config.columns.description.clone(),
                Arc::clone(&registry),
            ),
            registry,
            schema,
            resolver: Resolver::new(config),
        }
    }

    /// A DAO with its own registry holding the service information types.
    ///
    /// The registry reports new types to the schema synchronizer. The table
    /// is not touched until [`init_table`](Self::init_table).
    pub fn open(gateway: Arc<dyn StorageGateway>, config: &StorageConfig) -> Result<Self> {
        let registry = Arc::new(TypeRegistry::new());
        let schema = Arc::new(SchemaSynchronizer::new(Arc::clone(&gateway), config));
        registry.set_listener(schema.clone());
        for service in ServiceInformation::all(&config.columns) {
            registry.register_information_type(InformationType::new(service))?;
        }
        Ok(AuditDao::new(gateway, schema, registry, config))
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn schema(&self) -> &Arc<SchemaSynchronizer> {
        &self.schema
    }

    pub fn serializer(&self) -> &RecordSerializer {
        &self.serializer
    }

    pub fn init_table(&self) -> Result<()> {
        self.schema.init_table()
    }

    pub fn reset_table(&self) -> Result<()> {
        self.schema.reset_table()
    }

    /// Insert records as one batch.
    pub fn save_records<'a, I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a AuditRecordInternal>,
    {
        let rows: Vec<_> = records
            .into_iter()
            .map(|r| self.serializer.to_row(r))
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        self.gateway
            .insert_batch(self.schema.table(), &self.schema.columns(), &rows)?;
        debug!(table = self.schema.table(), rows = rows.len(), "inserted batch");
        Ok(())
    }

    /// Insert rows that are already in storage form.
    pub fn save_rows(&self, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.gateway
            .insert_batch(self.schema.table(), &self.schema.columns(), rows)?;
        Ok(())
    }

    /// Current records matching the query.
    pub fn load_records(&self, query: &Query, use_batching: bool) -> Result<Vec<AuditRecord>> {
        let candidates = Query {
            filter: query.filter.clone(),
            order_by: query.order_by.clone(),
            limit: None,
        };
        let rows = self
            .gateway
            .select(self.schema.table(), &self.schema.columns(), &candidates)?;
        let fetched = rows.len();
        let mut current = self.resolver.resolve(rows);
        if let Some(limit) = query.limit {
            current = limit.apply(current);
        }
        debug!(fetched, current = current.len(), "resolved rows");

        let records = current
            .iter()
            .map(|row| self.serializer.from_row(row))
            .collect::<Result<Vec<_>>>()?;
        Ok(deserialize_records(records, use_batching))
    }

    /// Number of current records matching the filter.
    pub fn count_records(&self, filter: &Filter) -> Result<u64> {
        let columns = self.schema.columns_named(&self.resolver.key_columns());
        let rows = self.gateway.select(
            self.schema.table(),
            &columns,
            &Query::new(filter.clone()),
        )?;
        Ok(self.resolver.resolve(rows).len() as u64)
    }
}
