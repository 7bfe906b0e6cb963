//! Record to row mapping.
//!
//! Row layout:
//! - the description column lists the codes of the record's objects, in order
//! - each state field has an array column `<object>_<state>` holding one value
//!   per object of that type, in the same order
//! - each information type has a scalar column named by its code
//!
//! Unset state fields are stored as their kind's default, so a row this
//! module wrote always restores a complete state. A presenter only sees
//! missing fields when a row was written elsewhere with short arrays.

use std::collections::HashMap;
use std::sync::Arc;

use at_common::{Error, Result, Value};
use at_store::{Cell, Row};

use crate::record::{AuditRecordInternal, InformationObject, InformationSet};
use crate::types::{ObjectState, ObjectType, TypeRegistry};

/// Converts records to rows and back using the registered types.
#[derive(Debug, Clone)]
pub struct RecordSerializer {
    description: String,
    registry: Arc<TypeRegistry>,
}

impl RecordSerializer {
    pub fn new(description: impl Into<String>, registry: Arc<TypeRegistry>) -> Self {
        RecordSerializer {
            description: description.into(),
            registry,
        }
    }

    pub fn description_column(&self) -> &str {
        &self.description
    }

    /// Project a record onto storage columns.
    ///
    /// A state field the object did not set is written as its kind's default
    /// so array positions stay aligned with the description.
    pub fn to_row(&self, record: &AuditRecordInternal) -> Row {
        let mut description = Vec::with_capacity(record.objects().len());
        let mut arrays: HashMap<String, Vec<Value>> = HashMap::new();

        for (object_type, state) in record.objects() {
            description.push(Value::from(object_type.code()));
            for state_type in object_type.state_types() {
                let value = state
                    .get(state_type)
                    .cloned()
                    .unwrap_or_else(|| state_type.inner.default_value());
                arrays
                    .entry(state_type.column_name())
                    .or_default()
                    .push(value);
            }
        }

        let mut row = Row::new().with(self.description.clone(), Cell::Array(description));
        for (column, values) in arrays {
            row.set(column, Cell::Array(values));
        }
        for info in record.information().iter() {
            row.set(info.code().to_string(), Cell::Scalar(info.value().clone()));
        }
        row
    }

    /// Rebuild a record from a stored row.
    ///
    /// Registered information missing from the row reads as its type default.
    /// A state field whose array is shorter than the description is left
    /// unset. Unknown object codes fail with `UnknownType`.
    pub fn from_row(&self, row: &Row) -> Result<AuditRecordInternal> {
        let codes = match row.get(&self.description) {
            Some(cell) => cell.values(),
            None => &[],
        };

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut objects: Vec<(Arc<ObjectType>, ObjectState)> = Vec::with_capacity(codes.len());
        for code in codes {
            let code = code.as_str().ok_or_else(|| {
                Error::Corrupted(format!(
                    "{} holds a non-string value {}",
                    self.description, code
                ))
            })?;
            let object_type = self.registry.resolve_object_by_code(code)?;
            let position = seen.entry(code).or_insert(0);
            let mut state = ObjectState::new();
            for state_type in object_type.state_types() {
                let value = row
                    .get(&state_type.column_name())
                    .and_then(|cell| cell.values().get(*position));
                if let Some(value) = value {
                    state.insert(state_type.clone(), value.clone());
                }
            }
            *position += 1;
            objects.push((object_type, state));
        }

        let mut information = InformationSet::new();
        for information_type in self.registry.information_types() {
            let item = match row.scalar(information_type.code()) {
                Some(value) => InformationObject::new(Arc::clone(&information_type), value.clone())
                    .map_err(|e| Error::Corrupted(e.to_string()))?,
                None => InformationObject::new(
                    Arc::clone(&information_type),
                    information_type.inner_type().default_value(),
                )?,
            };
            information.insert(item);
        }

        Ok(AuditRecordInternal::new(objects, information))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        InformationType, IntPresenter, ObjectPresenter, ServiceInformation, StateType,
        StringPresenter,
    };
    use at_common::InnerType;
    use at_config::ColumnNames;

    struct Pair;

    struct PairPresenter;

    impl PairPresenter {
        fn left() -> StateType {
            StateType::new("Left", "Pair", InnerType::String)
        }
        fn right() -> StateType {
            StateType::new("Right", "Pair", InnerType::Long)
        }
    }

    impl ObjectPresenter<Pair> for PairPresenter {
        fn entity_name(&self) -> &str {
            "Pair"
        }
        fn state_types(&self) -> Vec<StateType> {
            vec![Self::left(), Self::right()]
        }
        fn serialize(&self, _: &Pair) -> ObjectState {
            ObjectState::new()
        }
    }

    fn registry() -> Arc<TypeRegistry> {
        let registry = TypeRegistry::new();
        for info in ServiceInformation::all(&ColumnNames::default()) {
            registry
                .register_information_type(InformationType::new(info))
                .unwrap();
        }
        registry
            .register_object_type(ObjectType::new::<String, _>(StringPresenter))
            .unwrap();
        registry
            .register_object_type(ObjectType::new::<i32, _>(IntPresenter))
            .unwrap();
        registry
            .register_object_type(ObjectType::new::<Pair, _>(PairPresenter))
            .unwrap();
        Arc::new(registry)
    }

    fn record(registry: &TypeRegistry) -> AuditRecordInternal {
        let string = registry.resolve_object_by_code("String").unwrap();
        let int = registry.resolve_object_by_code("Int").unwrap();
        let objects = vec![
            (string.clone(), StringPresenter.serialize(&"a".to_string())),
            (int, IntPresenter.serialize(&7)),
            (string, StringPresenter.serialize(&"b".to_string())),
        ];
        let information = registry
            .information_types()
            .into_iter()
            .map(InformationObject::default_for)
            .collect();
        AuditRecordInternal::new(objects, information)
    }

    #[test]
    fn test_row_layout() {
        let registry = registry();
        let serializer = RecordSerializer::new("Description", registry.clone());
        let row = serializer.to_row(&record(&registry));

        assert_eq!(
            row.get("Description"),
            Some(&Cell::Array(vec!["String".into(), "Int".into(), "String".into()]))
        );
        assert_eq!(
            row.get("String_Value"),
            Some(&Cell::Array(vec!["a".into(), "b".into()]))
        );
        assert_eq!(row.get("Int_Value"), Some(&Cell::Array(vec![Value::Long(7)])));
        assert!(row.scalar("VersionColumn").is_some());
    }

    #[test]
    fn test_row_round_trip() {
        let registry = registry();
        let serializer = RecordSerializer::new("Description", registry.clone());
        let original = record(&registry);
        let back = serializer.from_row(&serializer.to_row(&original)).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn test_unset_state_written_as_default() {
        let registry = registry();
        let serializer = RecordSerializer::new("Description", registry.clone());
        let pair = registry.resolve_object_by_code("Pair").unwrap();
        let state = ObjectState::new().with(&PairPresenter::left(), "x");
        let row = serializer.to_row(&AuditRecordInternal::new(
            vec![(pair, state)],
            InformationSet::new(),
        ));
        assert_eq!(row.get("Pair_Right"), Some(&Cell::Array(vec![Value::Long(0)])));
    }

    #[test]
    fn test_short_array_leaves_state_unset() {
        let registry = registry();
        let serializer = RecordSerializer::new("Description", registry.clone());
        let row = Row::new()
            .with("Description", vec![Value::from("String"), Value::from("String")])
            .with("String_Value", vec![Value::from("only")]);

        let record = serializer.from_row(&row).unwrap();
        let states: Vec<_> = record.objects().iter().map(|(_, s)| s.len()).collect();
        assert_eq!(states, vec![1, 0]);
        assert_eq!(record.information().len(), 5);
        assert_eq!(record.version(), Some(0));
    }

    #[test]
    fn test_unknown_code_fails() {
        let registry = registry();
        let serializer = RecordSerializer::new("Description", registry);
        let row = Row::new().with("Description", vec![Value::from("Ghost")]);
        assert!(matches!(
            serializer.from_row(&row),
            Err(Error::UnknownType { kind: "object", .. })
        ));
    }
}
