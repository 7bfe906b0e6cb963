//! Caller-scoped staging of records.
//!
//! An [`AuditBatch`] collects records privately and moves them into the
//! shared queue in one step on commit. Nothing staged is visible to the
//! workers or to other batches before that.

use std::any::Any;

use at_common::{Error, Result, Value};
use tracing::{debug, error, warn};

use super::executor::Pipeline;
use crate::record::{
    mark_deleted, new_version, AuditRecord, AuditRecordInternal, InformationObject,
    InformationSet, PendingRecord,
};
use crate::types::TypeRegistry;

/// Staging buffer owned by one caller.
///
/// Dropping a batch with staged records discards them.
pub struct AuditBatch<'a> {
    registry: &'a TypeRegistry,
    pipeline: &'a Pipeline,
    staged: Vec<PendingRecord>,
}

impl<'a> AuditBatch<'a> {
    pub(crate) fn new(registry: &'a TypeRegistry, pipeline: &'a Pipeline) -> Self {
        AuditBatch {
            registry,
            pipeline,
            staged: Vec::new(),
        }
    }

    /// Stage a record. Unknown object types and information codes are
    /// dropped from it with an error log.
    ///
    /// Does nothing once the pipeline is shutting down.
    pub fn save(&mut self, objects: &[&dyn Any], information: &[(&str, Value)]) {
        if self.pipeline.is_shutting_down() {
            debug!("audit pipeline shutting down, save ignored");
            return;
        }
        match self.build(objects, information, false) {
            Ok(record) => self.staged.push(PendingRecord::new(record)),
            Err(e) => error!(error = %e, "failed to build audit record"),
        }
    }

    /// Stage a record, failing on unknown object types, unknown information
    /// codes and values of the wrong kind.
    pub fn save_with_exception(
        &mut self,
        objects: &[&dyn Any],
        information: &[(&str, Value)],
    ) -> Result<()> {
        if self.pipeline.is_shutting_down() {
            debug!("audit pipeline shutting down, save ignored");
            return Ok(());
        }
        let record = self.build(objects, information, true)?;
        self.staged.push(PendingRecord::new(record));
        Ok(())
    }

    /// Stage a new version of each loaded record.
    pub fn replace(&mut self, records: &[AuditRecord]) {
        self.stage_derived(records, new_version);
    }

    /// Stage a soft-deleted version of each loaded record.
    pub fn delete(&mut self, records: &[AuditRecord]) {
        self.stage_derived(records, mark_deleted);
    }

    fn stage_derived(
        &mut self,
        records: &[AuditRecord],
        derive: fn(&AuditRecord) -> AuditRecordInternal,
    ) {
        if self.pipeline.is_shutting_down() {
            debug!("audit pipeline shutting down, save ignored");
            return;
        }
        self.staged
            .extend(records.iter().map(|r| PendingRecord::new(derive(r))));
    }

    /// Move every staged record into the queue.
    ///
    /// When they do not all fit nothing is enqueued, the batch keeps its
    /// records and the failure is logged. Returns whether they were enqueued.
    pub fn commit(&mut self) -> bool {
        match self.commit_with_exceptions() {
            Ok(()) => true,
            Err(e) => {
                error!(staged = self.staged.len(), error = %e, "audit commit refused");
                false
            }
        }
    }

    /// Move every staged record into the queue, failing with `QueueFull`
    /// when they do not all fit. The batch keeps its records on failure.
    pub fn commit_with_exceptions(&mut self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let staged = std::mem::take(&mut self.staged);
        self.pipeline.enqueue(staged).map_err(|(records, err)| {
            self.staged = records;
            err
        })
    }

    /// Discard every staged record. Returns how many were discarded.
    pub fn rollback(&mut self) -> usize {
        let discarded = self.staged.len();
        self.staged.clear();
        discarded
    }

    pub fn staged(&self) -> impl Iterator<Item = &AuditRecordInternal> {
        self.staged.iter().map(|p| &p.record)
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn build(
        &self,
        objects: &[&dyn Any],
        information: &[(&str, Value)],
        strict: bool,
    ) -> Result<AuditRecordInternal> {
        let mut states = Vec::with_capacity(objects.len());
        for &object in objects {
            let resolved = self.registry.resolve_object_for(object).and_then(|ty| {
                let state = ty
                    .serialize(object)
                    .ok_or_else(|| Error::unknown_object(ty.key().name()))?;
                Ok((ty, state))
            });
            match resolved {
                Ok(pair) => states.push(pair),
                Err(e) if strict => return Err(e),
                Err(e) => error!(error = %e, "dropping unregistered object from audit record"),
            }
        }

        let mut set = InformationSet::new();
        for (code, value) in information {
            let item = self
                .registry
                .resolve_information(code)
                .and_then(|ty| InformationObject::new(ty, value.clone()));
            match item {
                Ok(item) => set.insert(item),
                Err(e) if strict => return Err(e),
                Err(e) => warn!(code, error = %e, "dropping information from audit record"),
            }
        }
        for ty in self.registry.information_types() {
            if !set.contains(ty.code()) {
                set.insert(InformationObject::default_for(ty));
            }
        }

        Ok(AuditRecordInternal::new(states, set))
    }
}

impl Drop for AuditBatch<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() {
            warn!(records = self.staged.len(), "discarding uncommitted audit records");
        }
    }
}

impl std::fmt::Debug for AuditBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditBatch")
            .field("staged", &self.staged.len())
            .finish()
    }
}
