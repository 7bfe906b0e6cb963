//! Public entry point of the audit engine.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use at_common::{Error, Result};
use at_config::{validate_config, AuditConfig, ConfigSnapshot};
use at_store::{Filter, Query, StorageGateway};
use tracing::{error, info};

use crate::dao::AuditDao;
use crate::pipeline::{AuditBatch, Pipeline, PipelineStats};
use crate::record::AuditRecord;
use crate::reserve::ReserveChain;
use crate::types::{
    InformationPresenter, InformationType, IntPresenter, LongPresenter, ObjectPresenter,
    ObjectType, StringPresenter, TypeRegistry,
};

/// An audit engine bound to one storage gateway.
///
/// Construction registers the service information types, creates or syncs
/// the audit table, registers the primitive object types and starts the
/// workers. Records are written through [`batch`](Self::batch).
pub struct AuditApi {
    config: AuditConfig,
    dao: Arc<AuditDao>,
    pipeline: Pipeline,
}

impl AuditApi {
    /// Start an engine with the reserve writers named in the config.
    pub fn new(config: AuditConfig, gateway: Arc<dyn StorageGateway>) -> Result<Self> {
        let reserve = ReserveChain::from_config(&config.reserve)?;
        Self::with_reserve(config, gateway, reserve)
    }

    /// Start an engine with an explicit reserve chain.
    pub fn with_reserve(
        config: AuditConfig,
        gateway: Arc<dyn StorageGateway>,
        reserve: ReserveChain,
    ) -> Result<Self> {
        validate_config(&config).map_err(|e| Error::Config(e.to_string()))?;
        let snapshot = ConfigSnapshot::from_config(&config);
        info!(
            table = %config.storage.table,
            workers = snapshot.summary.workers,
            hash = %snapshot.effective_hash,
            "starting audit engine"
        );

        let dao = Arc::new(AuditDao::open(gateway, &config.storage)?);
        dao.init_table()?;

        let registry = dao.registry();
        registry.register_object_type(ObjectType::new::<String, _>(StringPresenter))?;
        registry.register_object_type(ObjectType::new::<i32, _>(IntPresenter))?;
        registry.register_object_type(ObjectType::new::<i64, _>(LongPresenter))?;

        let pipeline =
            Pipeline::start(Arc::clone(&dao), reserve, &config.queue, &config.reserve)?;
        Ok(AuditApi {
            config,
            dao,
            pipeline,
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.dao.registry()
    }

    pub fn dao(&self) -> &AuditDao {
        &self.dao
    }

    /// Register an application type.
    ///
    /// Fails with `DuplicateType` if its type or code is known, or with
    /// `SchemaSync` if its columns could not be created; in the latter case
    /// the type is registered anyway.
    pub fn add_object_type<T, P>(&self, presenter: P) -> Result<()>
    where
        T: Any + Send + Sync,
        P: ObjectPresenter<T>,
    {
        self.registry()
            .register_object_type(ObjectType::new::<T, P>(presenter))?;
        Ok(())
    }

    /// Register a metadata column.
    pub fn add_information_type<P: InformationPresenter>(&self, presenter: P) -> Result<()> {
        self.registry()
            .register_information_type(InformationType::new(presenter))?;
        Ok(())
    }

    /// A fresh staging batch for one caller.
    pub fn batch(&self) -> AuditBatch<'_> {
        AuditBatch::new(self.registry(), &self.pipeline)
    }

    /// Current records matching the query, or none on failure.
    pub fn load(&self, query: &Query, use_batching: bool) -> Vec<AuditRecord> {
        self.load_with_exceptions(query, use_batching)
            .unwrap_or_else(|e| {
                error!(error = %e, "audit load failed");
                Vec::new()
            })
    }

    pub fn load_with_exceptions(
        &self,
        query: &Query,
        use_batching: bool,
    ) -> Result<Vec<AuditRecord>> {
        self.dao.load_records(query, use_batching)
    }

    /// Number of current records matching the filter, or 0 on failure.
    pub fn count(&self, filter: &Filter) -> u64 {
        self.count_with_exceptions(filter).unwrap_or_else(|e| {
            error!(error = %e, "audit count failed");
            0
        })
    }

    pub fn count_with_exceptions(&self, filter: &Filter) -> Result<u64> {
        self.dao.count_records(filter)
    }

    /// Stop accepting records, drain the queue and close the reserve chain.
    ///
    /// Returns whether every worker exited in time. An api dropped without
    /// this call gives its workers two seconds to drain before the rest of
    /// the queue is reserved.
    pub fn stop_audit(&self, wait_workers: Duration, wait_executor: Duration) -> bool {
        self.pipeline.stop(wait_workers, wait_executor)
    }

    /// Drop every stored record and recreate the table.
    pub fn reset_table(&self) -> Result<()> {
        self.dao.reset_table()
    }

    pub fn queue_len(&self) -> usize {
        self.pipeline.queue_len()
    }

    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }
}

impl std::fmt::Debug for AuditApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditApi")
            .field("table", &self.config.storage.table)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}
