//! Audit records.
//!
//! The write side is [`AuditRecordInternal`], a pure value of serialized
//! object states plus information. While it travels through the pipeline it
//! is wrapped in a [`PendingRecord`] that tracks retry state separately.
//! The read side is [`AuditRecord`], whose objects carry the rebuilt
//! application value when the presenter could produce one.

use std::any::Any;
use std::sync::Arc;

use at_common::{Error, Result, Value};

use crate::types::object::AnyObject;
use crate::types::{InformationRole, InformationType, ObjectState, ObjectType};

/// One information value with its type.
#[derive(Debug, Clone)]
pub struct InformationObject {
    information_type: Arc<InformationType>,
    value: Value,
}

impl InformationObject {
    /// Pair a value with its information type.
    ///
    /// The value is coerced to the type's inner kind; a value that cannot be
    /// converted losslessly is rejected with `InvalidValue`.
    pub fn new(information_type: Arc<InformationType>, value: impl Into<Value>) -> Result<Self> {
        let value = value.into();
        let actual = value.to_string();
        let inner = information_type.inner_type();
        let value = value.coerce(inner).ok_or_else(|| Error::InvalidValue {
            code: information_type.code().to_string(),
            expected: inner,
            actual,
        })?;
        Ok(InformationObject {
            information_type,
            value,
        })
    }

    /// The type's default value.
    pub fn default_for(information_type: Arc<InformationType>) -> Self {
        let value = information_type.default_value();
        InformationObject {
            information_type,
            value,
        }
    }

    pub fn information_type(&self) -> &Arc<InformationType> {
        &self.information_type
    }

    pub fn code(&self) -> &str {
        self.information_type.code()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl PartialEq for InformationObject {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code() && self.value == other.value
    }
}

impl Eq for InformationObject {}

/// Information values of a record, in insertion order, at most one per code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InformationSet {
    items: Vec<InformationObject>,
}

impl InformationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any value with the same code in place.
    pub fn insert(&mut self, item: InformationObject) {
        match self.items.iter_mut().find(|i| i.code() == item.code()) {
            Some(existing) => *existing = item,
            None => self.items.push(item),
        }
    }

    pub fn get(&self, code: &str) -> Option<&InformationObject> {
        self.items.iter().find(|i| i.code() == code)
    }

    pub fn value(&self, code: &str) -> Option<&Value> {
        self.get(code).map(InformationObject::value)
    }

    /// The value playing a service role.
    pub fn by_role(&self, role: InformationRole) -> Option<&InformationObject> {
        self.items
            .iter()
            .find(|i| i.information_type().role() == role)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InformationObject> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn replace_role(&mut self, role: InformationRole, f: impl FnOnce(&Value) -> Value) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|i| i.information_type().role() == role)
        {
            item.value = f(&item.value);
        }
    }
}

impl FromIterator<InformationObject> for InformationSet {
    fn from_iter<I: IntoIterator<Item = InformationObject>>(iter: I) -> Self {
        let mut set = InformationSet::new();
        for item in iter {
            set.insert(item);
        }
        set
    }
}

/// A record as written: serialized objects plus information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecordInternal {
    objects: Vec<(Arc<ObjectType>, ObjectState)>,
    information: InformationSet,
}

impl AuditRecordInternal {
    pub fn new(objects: Vec<(Arc<ObjectType>, ObjectState)>, information: InformationSet) -> Self {
        AuditRecordInternal {
            objects,
            information,
        }
    }

    pub fn objects(&self) -> &[(Arc<ObjectType>, ObjectState)] {
        &self.objects
    }

    pub fn information(&self) -> &InformationSet {
        &self.information
    }

    /// Record id, when the record carries one.
    pub fn id(&self) -> Option<i64> {
        self.information
            .by_role(InformationRole::Id)
            .and_then(|i| i.value().as_i64())
    }

    pub fn version(&self) -> Option<u64> {
        self.information
            .by_role(InformationRole::Version)
            .and_then(|i| i.value().as_u64())
    }

    pub fn is_deleted(&self) -> Option<bool> {
        self.information
            .by_role(InformationRole::IsDeleted)
            .and_then(|i| i.value().as_bool())
    }

    /// Copy with the version bumped by one and everything else unchanged.
    ///
    /// Records without version information are copied as is.
    pub fn with_new_version(&self) -> AuditRecordInternal {
        let mut next = self.clone();
        next.information.replace_role(InformationRole::Version, |v| {
            Value::ULong(v.as_u64().unwrap_or(0).saturating_add(1))
        });
        next
    }

    /// Copy marked deleted with the version bumped by one.
    pub fn marked_deleted(&self) -> AuditRecordInternal {
        let mut next = self.with_new_version();
        next.information
            .replace_role(InformationRole::IsDeleted, |_| Value::Boolean(true));
        next
    }
}

/// Retry bookkeeping of a record in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Number of delivery attempts, starting at 1.
    pub generation: u32,
    pub last_error: Option<String>,
}

impl Default for RetryState {
    fn default() -> Self {
        RetryState {
            generation: 1,
            last_error: None,
        }
    }
}

/// A record queued for storage, with its retry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub record: AuditRecordInternal,
    pub retry: RetryState,
}

impl PendingRecord {
    pub fn new(record: AuditRecordInternal) -> Self {
        PendingRecord {
            record,
            retry: RetryState::default(),
        }
    }

    pub fn generation(&self) -> u32 {
        self.retry.generation
    }

    /// Register a failed delivery attempt. Returns the new generation.
    pub fn fail(&mut self, error: impl Into<String>) -> u32 {
        self.retry.generation = self.retry.generation.saturating_add(1);
        self.retry.last_error = Some(error.into());
        self.retry.generation
    }
}

/// A loaded object: its type, its state and the rebuilt value if any.
#[derive(Clone)]
pub struct AuditObject {
    object_type: Arc<ObjectType>,
    object: Option<AnyObject>,
    state: ObjectState,
}

impl AuditObject {
    pub fn new(object_type: Arc<ObjectType>, object: Option<AnyObject>, state: ObjectState) -> Self {
        AuditObject {
            object_type,
            object,
            state,
        }
    }

    pub fn object_type(&self) -> &Arc<ObjectType> {
        &self.object_type
    }

    pub fn object(&self) -> Option<&AnyObject> {
        self.object.as_ref()
    }

    /// The rebuilt value as `T`, if it was rebuilt and has that type.
    pub fn downcast<T: Any>(&self) -> Option<&T> {
        self.object.as_deref().and_then(|o| o.downcast_ref::<T>())
    }

    pub fn state(&self) -> &ObjectState {
        &self.state
    }

    /// True when the presenter could not rebuild the value from its state.
    pub fn is_object_not_found(&self) -> bool {
        self.object.is_none()
    }
}

impl std::fmt::Debug for AuditObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditObject")
            .field("type", &self.object_type.code())
            .field("found", &self.object.is_some())
            .field("state", &self.state)
            .finish()
    }
}

/// A loaded record.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    objects: Vec<AuditObject>,
    information: InformationSet,
}

impl AuditRecord {
    pub fn new(objects: Vec<AuditObject>, information: InformationSet) -> Self {
        AuditRecord {
            objects,
            information,
        }
    }

    pub fn objects(&self) -> &[AuditObject] {
        &self.objects
    }

    pub fn information(&self) -> &InformationSet {
        &self.information
    }

    /// First object rebuilt as `T`.
    pub fn object<T: Any>(&self) -> Option<&T> {
        self.objects.iter().find_map(|o| o.downcast::<T>())
    }

    /// The record in its write form.
    pub fn to_internal(&self) -> AuditRecordInternal {
        AuditRecordInternal::new(
            self.objects
                .iter()
                .map(|o| (Arc::clone(&o.object_type), o.state.clone()))
                .collect(),
            self.information.clone(),
        )
    }
}

/// New version of a loaded record: version + 1, everything else copied.
pub fn new_version(record: &AuditRecord) -> AuditRecordInternal {
    record.to_internal().with_new_version()
}

/// Soft-deleted version of a loaded record: deleted flag set, version + 1.
pub fn mark_deleted(record: &AuditRecord) -> AuditRecordInternal {
    record.to_internal().marked_deleted()
}
