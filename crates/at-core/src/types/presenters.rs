//! Presenters for the primitive object types registered at startup.
//!
//! Each stores its value in a single `Value` state field.

use at_common::{InnerType, Value};

use super::{ObjectPresenter, ObjectState, StateType};

const VALUE_STATE: &str = "Value";

#[derive(Debug, Default, Clone, Copy)]
pub struct StringPresenter;

impl StringPresenter {
    pub const ENTITY: &'static str = "String";

    pub fn value() -> StateType {
        StateType::new(VALUE_STATE, Self::ENTITY, InnerType::String)
    }
}

impl ObjectPresenter<String> for StringPresenter {
    fn entity_name(&self) -> &str {
        Self::ENTITY
    }

    fn state_types(&self) -> Vec<StateType> {
        vec![Self::value()]
    }

    fn serialize(&self, object: &String) -> ObjectState {
        ObjectState::new().with(&Self::value(), object.as_str())
    }

    fn deserialize(&self, state: &ObjectState) -> Option<String> {
        state
            .get(&Self::value())
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IntPresenter;

impl IntPresenter {
    pub const ENTITY: &'static str = "Int";

    pub fn value() -> StateType {
        StateType::new(VALUE_STATE, Self::ENTITY, InnerType::Long)
    }
}

impl ObjectPresenter<i32> for IntPresenter {
    fn entity_name(&self) -> &str {
        Self::ENTITY
    }

    fn state_types(&self) -> Vec<StateType> {
        vec![Self::value()]
    }

    fn serialize(&self, object: &i32) -> ObjectState {
        ObjectState::new().with(&Self::value(), *object)
    }

    fn deserialize(&self, state: &ObjectState) -> Option<i32> {
        state
            .get(&Self::value())
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LongPresenter;

impl LongPresenter {
    pub const ENTITY: &'static str = "Long";

    pub fn value() -> StateType {
        StateType::new(VALUE_STATE, Self::ENTITY, InnerType::Long)
    }
}

impl ObjectPresenter<i64> for LongPresenter {
    fn entity_name(&self) -> &str {
        Self::ENTITY
    }

    fn state_types(&self) -> Vec<StateType> {
        vec![Self::value()]
    }

    fn serialize(&self, object: &i64) -> ObjectState {
        ObjectState::new().with(&Self::value(), *object)
    }

    fn deserialize(&self, state: &ObjectState) -> Option<i64> {
        state.get(&Self::value()).and_then(Value::as_i64)
    }
}
