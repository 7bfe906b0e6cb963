//! Object types and their presenters.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use at_store::{ColumnHeader, ColumnType};

use super::{ObjectState, StateType, TypeKey};

/// A deserialized application object, shared between records that carried
/// the same state.
pub type AnyObject = Arc<dyn Any + Send + Sync>;

/// Serialization contract for one application type.
///
/// The entity name is the object type's code and the prefix of its columns.
/// Every state field returned by [`state_types`](Self::state_types) must name
/// the entity as its object.
pub trait ObjectPresenter<T>: Send + Sync + 'static {
    fn entity_name(&self) -> &str;

    fn state_types(&self) -> Vec<StateType>;

    fn serialize(&self, object: &T) -> ObjectState;

    /// Whether loaded states are turned back into objects at all.
    fn use_deserialization(&self) -> bool {
        true
    }

    /// Rebuild an object, or `None` when required fields are absent.
    fn deserialize(&self, state: &ObjectState) -> Option<T> {
        let _ = state;
        None
    }

    /// Rebuild many distinct states at once.
    ///
    /// Presenters that look objects up elsewhere override this to issue one
    /// lookup for the whole batch. States that cannot be rebuilt are left out.
    fn deserialize_batch(&self, states: &[ObjectState]) -> HashMap<ObjectState, T> {
        states
            .iter()
            .filter_map(|state| self.deserialize(state).map(|obj| (state.clone(), obj)))
            .collect()
    }
}

trait ErasedPresenter: Send + Sync {
    fn serialize(&self, object: &dyn Any) -> Option<ObjectState>;
    fn use_deserialization(&self) -> bool;
    fn deserialize(&self, state: &ObjectState) -> Option<AnyObject>;
    fn deserialize_batch(&self, states: &[ObjectState]) -> HashMap<ObjectState, AnyObject>;
}

struct PresenterAdapter<T, P> {
    presenter: P,
    _marker: PhantomData<fn() -> T>,
}

impl<T, P> ErasedPresenter for PresenterAdapter<T, P>
where
    T: Any + Send + Sync,
    P: ObjectPresenter<T>,
{
    fn serialize(&self, object: &dyn Any) -> Option<ObjectState> {
        object
            .downcast_ref::<T>()
            .map(|obj| self.presenter.serialize(obj))
    }

    fn use_deserialization(&self) -> bool {
        self.presenter.use_deserialization()
    }

    fn deserialize(&self, state: &ObjectState) -> Option<AnyObject> {
        self.presenter
            .deserialize(state)
            .map(|obj| Arc::new(obj) as AnyObject)
    }

    fn deserialize_batch(&self, states: &[ObjectState]) -> HashMap<ObjectState, AnyObject> {
        self.presenter
            .deserialize_batch(states)
            .into_iter()
            .map(|(state, obj)| (state, Arc::new(obj) as AnyObject))
            .collect()
    }
}

/// A registered application type.
pub struct ObjectType {
    key: TypeKey,
    code: String,
    states: Vec<StateType>,
    presenter: Box<dyn ErasedPresenter>,
}

impl ObjectType {
    pub fn new<T, P>(presenter: P) -> Self
    where
        T: Any + Send + Sync,
        P: ObjectPresenter<T>,
    {
        ObjectType {
            key: TypeKey::of::<T>(),
            code: presenter.entity_name().to_string(),
            states: presenter.state_types(),
            presenter: Box::new(PresenterAdapter {
                presenter,
                _marker: PhantomData,
            }),
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn state_types(&self) -> &[StateType] {
        &self.states
    }

    pub fn use_deserialization(&self) -> bool {
        self.presenter.use_deserialization()
    }

    /// Serialize an object, or `None` if it is not of this type.
    pub fn serialize(&self, object: &dyn Any) -> Option<ObjectState> {
        self.presenter.serialize(object)
    }

    pub fn deserialize(&self, state: &ObjectState) -> Option<AnyObject> {
        if !self.use_deserialization() {
            return None;
        }
        self.presenter.deserialize(state)
    }

    pub fn deserialize_batch(&self, states: &[ObjectState]) -> HashMap<ObjectState, AnyObject> {
        if !self.use_deserialization() {
            return HashMap::new();
        }
        self.presenter.deserialize_batch(states)
    }

    /// One array column per state field.
    pub fn columns(&self) -> Vec<ColumnHeader> {
        self.states
            .iter()
            .map(|s| ColumnHeader::new(s.column_name(), ColumnType::array(s.inner)))
            .collect()
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.key == other.key
    }
}

impl Eq for ObjectType {}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("key", &self.key.name())
            .field("code", &self.code)
            .field("states", &self.states)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use at_common::{InnerType, Value};

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    struct PointPresenter;

    impl PointPresenter {
        fn x() -> StateType {
            StateType::new("X", "Point", InnerType::Long)
        }
        fn y() -> StateType {
            StateType::new("Y", "Point", InnerType::Long)
        }
    }

    impl ObjectPresenter<Point> for PointPresenter {
        fn entity_name(&self) -> &str {
            "Point"
        }

        fn state_types(&self) -> Vec<StateType> {
            vec![Self::x(), Self::y()]
        }

        fn serialize(&self, p: &Point) -> ObjectState {
            ObjectState::new().with(&Self::x(), p.x).with(&Self::y(), p.y)
        }

        fn deserialize(&self, state: &ObjectState) -> Option<Point> {
            Some(Point {
                x: state.get(&Self::x())?.as_i64()?,
                y: state.get(&Self::y())?.as_i64()?,
            })
        }
    }

    struct OpaquePresenter;

    impl ObjectPresenter<Point> for OpaquePresenter {
        fn entity_name(&self) -> &str {
            "Opaque"
        }
        fn state_types(&self) -> Vec<StateType> {
            vec![]
        }
        fn serialize(&self, _: &Point) -> ObjectState {
            ObjectState::new()
        }
        fn use_deserialization(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_erased_round_trip() {
        let ty = ObjectType::new::<Point, _>(PointPresenter);
        assert_eq!(ty.code(), "Point");
        assert_eq!(ty.key(), TypeKey::of::<Point>());

        let state = ty.serialize(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(state.get(&PointPresenter::x()), Some(&Value::Long(1)));

        let obj = ty.deserialize(&state).unwrap();
        assert_eq!(obj.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));
    }

    #[test]
    fn test_serialize_rejects_other_types() {
        let ty = ObjectType::new::<Point, _>(PointPresenter);
        assert!(ty.serialize(&"not a point".to_string()).is_none());
    }

    #[test]
    fn test_missing_field_yields_none() {
        let ty = ObjectType::new::<Point, _>(PointPresenter);
        let partial = ObjectState::new().with(&PointPresenter::x(), 1i64);
        assert!(ty.deserialize(&partial).is_none());
        assert!(ty.deserialize_batch(&[partial]).is_empty());
    }

    #[test]
    fn test_declined_deserialization_short_circuits() {
        let ty = ObjectType::new::<Point, _>(OpaquePresenter);
        assert!(!ty.use_deserialization());
        assert!(ty.deserialize_batch(&[ObjectState::new()]).is_empty());
    }

    #[test]
    fn test_columns_are_arrays() {
        let ty = ObjectType::new::<Point, _>(PointPresenter);
        let columns = ty.columns();
        assert_eq!(columns[0].name, "Point_X");
        assert!(columns.iter().all(|c| c.column_type.array));
    }
}
