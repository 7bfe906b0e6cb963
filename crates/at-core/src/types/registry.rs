//! Registry of object and information types.
//!
//! One registry is owned by each `AuditApi` and shared with the workers and
//! the DAO through an `Arc`. Registration is rare and happens at setup;
//! lookups happen on every save and load, so the indices sit behind
//! read-mostly `RwLock`s.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use at_common::{Error, Result};
use tracing::debug;

use super::{InformationRole, InformationType, ObjectType};

/// Observer notified after a type enters the registry.
///
/// An error from the listener is returned to the registering caller, but the
/// type stays registered.
pub trait RegistryListener: Send + Sync {
    fn object_type_added(&self, object_type: &ObjectType) -> Result<()>;
    fn information_type_added(&self, information_type: &InformationType) -> Result<()>;
}

#[derive(Default)]
struct ObjectIndex {
    by_class: HashMap<TypeId, Arc<ObjectType>>,
    by_code: HashMap<String, Arc<ObjectType>>,
    ordered: Vec<Arc<ObjectType>>,
}

#[derive(Default)]
struct InformationIndex {
    by_code: HashMap<String, Arc<InformationType>>,
    by_role: HashMap<InformationRole, Arc<InformationType>>,
    ordered: Vec<Arc<InformationType>>,
}

// Index updates never panic halfway, so a poisoned lock still guards
// consistent maps.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Object and information types known to one audit engine.
#[derive(Default)]
pub struct TypeRegistry {
    objects: RwLock<ObjectIndex>,
    information: RwLock<InformationIndex>,
    listener: RwLock<Option<Arc<dyn RegistryListener>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the observer notified on every successful registration.
    pub fn set_listener(&self, listener: Arc<dyn RegistryListener>) {
        *write(&self.listener) = Some(listener);
    }

    fn listener(&self) -> Option<Arc<dyn RegistryListener>> {
        read(&self.listener).clone()
    }

    /// Register an object type.
    ///
    /// Fails with `DuplicateType` if its class or code is already known, in
    /// which case the registry is unchanged.
    pub fn register_object_type(&self, object_type: ObjectType) -> Result<Arc<ObjectType>> {
        let object_type = Arc::new(object_type);
        {
            let mut index = write(&self.objects);
            if index.by_class.contains_key(&object_type.key().id()) {
                return Err(Error::DuplicateType {
                    kind: "object",
                    key: object_type.key().name().to_string(),
                });
            }
            if index.by_code.contains_key(object_type.code()) {
                return Err(Error::DuplicateType {
                    kind: "object",
                    key: object_type.code().to_string(),
                });
            }
            index
                .by_class
                .insert(object_type.key().id(), Arc::clone(&object_type));
            index
                .by_code
                .insert(object_type.code().to_string(), Arc::clone(&object_type));
            index.ordered.push(Arc::clone(&object_type));
        }
        debug!(code = object_type.code(), class = object_type.key().name(), "registered object type");

        if let Some(listener) = self.listener() {
            listener.object_type_added(&object_type)?;
        }
        Ok(object_type)
    }

    /// Register an information type.
    ///
    /// Fails with `DuplicateType` if its code is known, or if it claims a
    /// service role another type already holds.
    pub fn register_information_type(
        &self,
        information_type: InformationType,
    ) -> Result<Arc<InformationType>> {
        let information_type = Arc::new(information_type);
        {
            let mut index = write(&self.information);
            if index.by_code.contains_key(information_type.code()) {
                return Err(Error::DuplicateType {
                    kind: "information",
                    key: information_type.code().to_string(),
                });
            }
            let role = information_type.role();
            if role.is_service() && index.by_role.contains_key(&role) {
                return Err(Error::DuplicateType {
                    kind: "information",
                    key: format!("{:?} role", role),
                });
            }
            index
                .by_code
                .insert(information_type.code().to_string(), Arc::clone(&information_type));
            if role.is_service() {
                index.by_role.insert(role, Arc::clone(&information_type));
            }
            index.ordered.push(Arc::clone(&information_type));
        }
        debug!(code = information_type.code(), "registered information type");

        if let Some(listener) = self.listener() {
            listener.information_type_added(&information_type)?;
        }
        Ok(information_type)
    }

    pub fn resolve_object_by_class(&self, class: TypeId) -> Result<Arc<ObjectType>> {
        read(&self.objects)
            .by_class
            .get(&class)
            .cloned()
            .ok_or_else(|| Error::unknown_object(format!("{:?}", class)))
    }

    /// Object type of a runtime value.
    pub fn resolve_object_for(&self, object: &dyn Any) -> Result<Arc<ObjectType>> {
        self.resolve_object_by_class(object.type_id())
    }

    pub fn resolve_object_by_code(&self, code: &str) -> Result<Arc<ObjectType>> {
        read(&self.objects)
            .by_code
            .get(code)
            .cloned()
            .ok_or_else(|| Error::unknown_object(code))
    }

    pub fn resolve_information(&self, code: &str) -> Result<Arc<InformationType>> {
        read(&self.information)
            .by_code
            .get(code)
            .cloned()
            .ok_or_else(|| Error::unknown_information(code))
    }

    /// The information type holding a service role, if registered.
    pub fn information_by_role(&self, role: InformationRole) -> Option<Arc<InformationType>> {
        read(&self.information).by_role.get(&role).cloned()
    }

    /// Object types in registration order.
    pub fn object_types(&self) -> Vec<Arc<ObjectType>> {
        read(&self.objects).ordered.clone()
    }

    /// Information types in registration order.
    pub fn information_types(&self) -> Vec<Arc<InformationType>> {
        read(&self.information).ordered.clone()
    }

    /// Forget every registered type.
    pub fn clear(&self) {
        *write(&self.objects) = ObjectIndex::default();
        *write(&self.information) = InformationIndex::default();
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("objects", &read(&self.objects).ordered.len())
            .field("information", &read(&self.information).ordered.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        InformationPresenter, IntPresenter, LongPresenter, ObjectPresenter, ObjectState,
        ServiceInformation, StateType, StringPresenter,
    };
    use at_common::InnerType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Other;

    struct ClashingPresenter;

    impl ObjectPresenter<Other> for ClashingPresenter {
        fn entity_name(&self) -> &str {
            "String"
        }
        fn state_types(&self) -> Vec<StateType> {
            vec![]
        }
        fn serialize(&self, _: &Other) -> ObjectState {
            ObjectState::new()
        }
    }

    struct Tag;

    impl InformationPresenter for Tag {
        fn code(&self) -> &str {
            "Tag"
        }
        fn inner_type(&self) -> InnerType {
            InnerType::String
        }
    }

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry
            .register_object_type(ObjectType::new::<String, _>(StringPresenter))
            .unwrap();
        registry
            .register_object_type(ObjectType::new::<i32, _>(IntPresenter))
            .unwrap();
        registry
    }

    #[test]
    fn test_resolution_round_trips() {
        let registry = registry();
        for ty in registry.object_types() {
            let by_class = registry.resolve_object_by_class(ty.key().id()).unwrap();
            let by_code = registry.resolve_object_by_code(ty.code()).unwrap();
            assert_eq!(*by_class, *ty);
            assert_eq!(*by_code, *ty);
        }
        let value = 5i32;
        assert_eq!(registry.resolve_object_for(&value).unwrap().code(), "Int");
    }

    #[test]
    fn test_duplicate_class_leaves_registry_unchanged() {
        let registry = registry();
        struct Renamed;
        impl ObjectPresenter<String> for Renamed {
            fn entity_name(&self) -> &str {
                "Text"
            }
            fn state_types(&self) -> Vec<StateType> {
                vec![]
            }
            fn serialize(&self, _: &String) -> ObjectState {
                ObjectState::new()
            }
        }

        let err = registry
            .register_object_type(ObjectType::new::<String, _>(Renamed))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateType { kind: "object", .. }));
        assert_eq!(registry.object_types().len(), 2);
        assert!(registry.resolve_object_by_code("Text").is_err());
    }

    #[test]
    fn test_duplicate_code_leaves_registry_unchanged() {
        let registry = registry();
        let err = registry
            .register_object_type(ObjectType::new::<Other, _>(ClashingPresenter))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateType { .. }));
        assert!(registry
            .resolve_object_by_class(TypeId::of::<Other>())
            .is_err());
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = registry();
        assert!(matches!(
            registry.resolve_object_by_code("Long"),
            Err(Error::UnknownType { kind: "object", .. })
        ));
        assert!(matches!(
            registry.resolve_information("Missing"),
            Err(Error::UnknownType { kind: "information", .. })
        ));
        registry
            .register_object_type(ObjectType::new::<i64, _>(LongPresenter))
            .unwrap();
        assert!(registry.resolve_object_by_code("Long").is_ok());
    }

    #[test]
    fn test_service_roles_are_unique() {
        let registry = TypeRegistry::new();
        registry
            .register_information_type(InformationType::new(ServiceInformation::new(
                InformationRole::Version,
                "VersionColumn",
            )))
            .unwrap();
        let err = registry
            .register_information_type(InformationType::new(ServiceInformation::new(
                InformationRole::Version,
                "OtherVersion",
            )))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateType { .. }));
        assert!(registry
            .information_by_role(InformationRole::Version)
            .is_some());
        registry
            .register_information_type(InformationType::new(Tag))
            .unwrap();
        assert_eq!(registry.information_types().len(), 2);
    }

    struct CountingListener {
        calls: AtomicUsize,
        fail: bool,
    }

    impl RegistryListener for CountingListener {
        fn object_type_added(&self, ty: &ObjectType) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::SchemaSync {
                    column: ty.code().to_string(),
                    message: "refused".into(),
                });
            }
            Ok(())
        }
        fn information_type_added(&self, _: &InformationType) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_listener_failure_keeps_registration() {
        let registry = TypeRegistry::new();
        let listener = Arc::new(CountingListener {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        registry.set_listener(listener.clone());

        let err = registry
            .register_object_type(ObjectType::new::<String, _>(StringPresenter))
            .unwrap_err();
        assert!(matches!(err, Error::SchemaSync { .. }));
        assert!(registry.resolve_object_by_code("String").is_ok());
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear() {
        let registry = registry();
        registry.clear();
        assert!(registry.object_types().is_empty());
        assert!(registry.resolve_object_by_code("String").is_err());
    }
}
