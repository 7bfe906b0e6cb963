//! Type system: object types, information types and their registry.
//!
//! An object type maps an application type onto one array column per state
//! field. An information type is a scalar metadata column every record
//! carries (id, version, timestamp and so on).

pub mod information;
pub mod object;
pub mod presenters;
pub mod registry;

pub use information::{
    InformationPresenter, InformationRole, InformationType, ServiceInformation,
};
pub use object::{ObjectPresenter, ObjectType};
pub use presenters::{IntPresenter, LongPresenter, StringPresenter};
pub use registry::{RegistryListener, TypeRegistry};

use at_common::{InnerType, Value};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Lightweight identifier of an application type, captured at registration.
#[derive(Debug, Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any>() -> Self {
        TypeKey {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One state field of an object type.
///
/// Identity is the (name, object, inner type) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateType {
    pub name: String,
    pub object: String,
    pub inner: InnerType,
}

impl StateType {
    pub fn new(name: impl Into<String>, object: impl Into<String>, inner: InnerType) -> Self {
        StateType {
            name: name.into(),
            object: object.into(),
            inner,
        }
    }

    /// Storage column holding this field: `<object>_<state>`.
    pub fn column_name(&self) -> String {
        format!("{}_{}", self.object, self.name)
    }
}

/// Serialized form of one object: a value per state field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectState(BTreeMap<StateType, Value>);

impl ObjectState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, state: StateType, value: impl Into<Value>) {
        self.0.insert(state, value.into());
    }

    pub fn with(mut self, state: &StateType, value: impl Into<Value>) -> Self {
        self.insert(state.clone(), value);
        self
    }

    pub fn get(&self, state: &StateType) -> Option<&Value> {
        self.0.get(state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateType, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(StateType, Value)> for ObjectState {
    fn from_iter<I: IntoIterator<Item = (StateType, Value)>>(iter: I) -> Self {
        ObjectState(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_key_equality_ignores_name() {
        assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
        assert_ne!(TypeKey::of::<String>(), TypeKey::of::<i64>());
        assert!(TypeKey::of::<i64>().name().contains("i64"));
    }

    #[test]
    fn test_state_type_column_name() {
        let state = StateType::new("Value", "String", InnerType::String);
        assert_eq!(state.column_name(), "String_Value");
    }

    #[test]
    fn test_state_identity_includes_inner_type() {
        let a = StateType::new("Value", "Int", InnerType::Long);
        let b = StateType::new("Value", "Int", InnerType::String);
        assert_ne!(a, b);

        let state = ObjectState::new().with(&a, 1i64);
        assert!(state.get(&b).is_none());
        assert_eq!(state.get(&a), Some(&Value::Long(1)));
    }
}
