//! Rebuilding application objects for loaded records.
//!
//! The batched path gathers the distinct states of each object type across
//! all records and hands them to the presenter in one call, so presenters
//! that fetch objects from elsewhere issue one lookup per type instead of
//! one per record.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::trace;

use crate::record::{AuditObject, AuditRecord, AuditRecordInternal};
use crate::types::object::AnyObject;
use crate::types::{ObjectState, ObjectType};

/// Rebuild every object of every record.
pub fn deserialize_records(
    records: Vec<AuditRecordInternal>,
    use_batching: bool,
) -> Vec<AuditRecord> {
    if use_batching {
        deserialize_batched(records)
    } else {
        records.into_iter().map(deserialize_one).collect()
    }
}

fn deserialize_one(record: AuditRecordInternal) -> AuditRecord {
    let objects = record
        .objects()
        .iter()
        .map(|(object_type, state)| {
            let object = object_type.deserialize(state);
            AuditObject::new(Arc::clone(object_type), object, state.clone())
        })
        .collect();
    AuditRecord::new(objects, record.information().clone())
}

fn deserialize_batched(records: Vec<AuditRecordInternal>) -> Vec<AuditRecord> {
    // Types in first-seen order with their distinct states
    let mut order: Vec<Arc<ObjectType>> = Vec::new();
    let mut states: HashMap<String, BTreeSet<ObjectState>> = HashMap::new();
    for record in &records {
        for (object_type, state) in record.objects() {
            let entry = states.entry(object_type.code().to_string()).or_insert_with(|| {
                order.push(Arc::clone(object_type));
                BTreeSet::new()
            });
            entry.insert(state.clone());
        }
    }

    let mut rebuilt: HashMap<String, HashMap<ObjectState, AnyObject>> = HashMap::new();
    for object_type in order {
        let distinct: Vec<ObjectState> = states
            .remove(object_type.code())
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        trace!(
            code = object_type.code(),
            states = distinct.len(),
            "batch deserialize"
        );
        rebuilt.insert(
            object_type.code().to_string(),
            object_type.deserialize_batch(&distinct),
        );
    }

    records
        .into_iter()
        .map(|record| {
            let objects = record
                .objects()
                .iter()
                .map(|(object_type, state)| {
                    let object = rebuilt
                        .get(object_type.code())
                        .and_then(|by_state| by_state.get(state))
                        .cloned();
                    AuditObject::new(Arc::clone(object_type), object, state.clone())
                })
                .collect();
            AuditRecord::new(objects, record.information().clone())
        })
        .collect()
}
