//! Live class instances.
//!
//! An instance holds an optional identifier (absent until persisted), a key
//! map of field values in storage representation, and the id of its class.
//! All assignments go through the registered key managers, so a failed
//! assignment never leaves partial state behind.

use std::sync::Arc;

use trellis_proto::{SerializedRecord, Value};

use crate::catalog::{ClassId, ClassRegistry, IDENTIFIER_KEY};
use crate::error::Error;
use crate::keymap::KeyMap;

/// A single record of a declared class.
#[derive(Debug, Clone)]
pub struct ClassInstance {
    class: ClassId,
    registry: Arc<ClassRegistry>,
    id: Option<i64>,
    attributes: KeyMap,
}

impl ClassInstance {
    /// Create an empty, unsaved instance.
    pub fn new(registry: Arc<ClassRegistry>, class: ClassId) -> Result<Self, Error> {
        registry.definition(class)?;
        Ok(Self {
            class,
            registry,
            id: None,
            attributes: KeyMap::new(),
        })
    }

    /// Create an instance from a literal key/value payload, validating each
    /// assignment in order.
    pub fn with_values(
        registry: Arc<ClassRegistry>,
        class: ClassId,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self, Error> {
        let mut instance = Self::new(registry, class)?;
        for (key, value) in values {
            instance.set(&key, value)?;
        }
        Ok(instance)
    }

    /// Create a stub instance referencing an already-persisted row.
    pub fn from_id(
        registry: Arc<ClassRegistry>,
        class: ClassId,
        id: i64,
    ) -> Result<Self, Error> {
        let mut instance = Self::new(registry, class)?;
        instance.id = Some(id);
        Ok(instance)
    }

    /// The class this instance belongs to.
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// The registry this instance validates against.
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// The persisted identifier, if any.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Whether this instance has not been persisted yet.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// The raw field bag, in storage representation.
    pub fn attributes(&self) -> &KeyMap {
        &self.attributes
    }

    /// Assign a field through its registered setter.
    ///
    /// Guarded fields, timestamp fields, the identifier, and secondary
    /// relations reject direct assignment with `ForbiddenOperation`; unknown
    /// fields and failed validations raise before the map is touched.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), Error> {
        let definition = self.registry.definition(self.class)?;

        if key == IDENTIFIER_KEY {
            return Err(Error::ForbiddenOperation(
                "the identifier cannot be assigned directly".to_string(),
            ));
        }
        if definition.timestamps().iter().any(|t| t == key) {
            return Err(Error::ForbiddenOperation(format!(
                "timestamp field {key:?} is managed by the class manager"
            )));
        }
        if definition.is_guarded(key) {
            return Err(Error::ForbiddenOperation(format!(
                "field {key:?} is guarded on class {}",
                definition.name()
            )));
        }

        if let Some(relation) = definition.relation(key) {
            if !relation.is_primary() {
                return Err(Error::ForbiddenOperation(format!(
                    "secondary relation {key:?} must be written through its parent relation"
                )));
            }
            let manager =
                crate::keys::KeyManager::relation(key, relation.target_class.clone());
            let stored = manager.set(value)?;
            return self.attributes.set(key, stored);
        }

        match definition.key_manager(key) {
            Some(manager) => {
                let stored = manager.set(value)?;
                self.attributes.set(key, stored)
            }
            None => Err(Error::InvalidObjectKey(format!(
                "unknown field {key:?} on class {}",
                definition.name()
            ))),
        }
    }

    /// Read a field through its registered getter.
    pub fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        let definition = self.registry.definition(self.class)?;

        if key == IDENTIFIER_KEY {
            return Ok(self.id.map(Value::Int));
        }
        if definition.timestamps().iter().any(|t| t == key) {
            return Ok(self.attributes.get(key).cloned());
        }
        if let Some(relation) = definition.relation(key) {
            return match self.attributes.get(key) {
                // Materialized includes already carry the full pointer.
                Some(Value::Pointer(_)) => Ok(self.attributes.get(key).cloned()),
                Some(stored) => {
                    let manager =
                        crate::keys::KeyManager::relation(key, relation.target_class.clone());
                    manager.get(stored.clone()).map(Some)
                }
                None => Ok(None),
            };
        }

        match definition.key_manager(key) {
            Some(manager) => match self.attributes.get(key) {
                Some(stored) => manager.get(stored.clone()).map(Some),
                None => Ok(None),
            },
            None => Err(Error::InvalidObjectKey(format!(
                "unknown field {key:?} on class {}",
                definition.name()
            ))),
        }
    }

    /// Render the persisted/wire shape of this instance.
    pub fn to_record(&self) -> Result<SerializedRecord, Error> {
        let definition = self.registry.definition(self.class)?;
        let id = self.id.ok_or_else(|| {
            Error::ForbiddenOperation("cannot serialize an unsaved instance".to_string())
        })?;

        let mut record = SerializedRecord::new(id);
        for key in definition.keys() {
            let value = self.get(key.name())?.unwrap_or(Value::Null);
            record = record.with_field(key.name(), &value);
        }
        for relation in definition.relations() {
            let value = self.get(&relation.field)?.unwrap_or(Value::Null);
            record = record.with_field(&relation.field, &value);
        }
        if let (Some(Value::Date(created)), Some(Value::Date(updated))) = (
            self.attributes.get("created_at"),
            self.attributes.get("updated_at"),
        ) {
            record = record.with_timestamps(*created, *updated);
        }
        Ok(record)
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Store a field in storage representation, bypassing guards.
    ///
    /// Used when materializing rows fetched from storage.
    pub(crate) fn set_loaded(&mut self, key: &str, value: Value) -> Result<(), Error> {
        self.attributes.set(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RelationDefinition;
    use crate::keys::{KeyManager, NumericMode};
    use trellis_proto::Pointer;

    fn registry() -> (Arc<ClassRegistry>, ClassId) {
        let registry = Arc::new(ClassRegistry::new());
        registry
            .declare("User", "user", |c| {
                c.key(KeyManager::string("name"))?;
                Ok(())
            })
            .unwrap();
        let post = registry
            .declare("Post", "post", |c| {
                c.key(KeyManager::string_bounded("title", Some(1), Some(80)))?
                    .key(KeyManager::number("views", NumericMode::Integer))?
                    .relation("author", "User")?
                    .relation_with(
                        RelationDefinition::new("company", "User")
                            .with_from("author.company_id")?,
                    )?;
                c.guarded("views");
                Ok(())
            })
            .unwrap();
        (registry, post)
    }

    #[test]
    fn test_set_validates_through_key_manager() {
        let (registry, post) = registry();
        let mut instance = ClassInstance::new(registry, post).unwrap();

        instance.set("title", Value::from("hello")).unwrap();
        assert_eq!(instance.get("title").unwrap(), Some(Value::from("hello")));

        // An invalid assignment leaves the previous value untouched.
        let err = instance.set("title", Value::from(""));
        assert!(matches!(err, Err(Error::InvalidObjectKey(_))));
        assert_eq!(instance.get("title").unwrap(), Some(Value::from("hello")));
    }

    #[test]
    fn test_relation_assignment_stores_fk_scalar() {
        let (registry, post) = registry();
        let mut instance = ClassInstance::new(registry, post).unwrap();

        instance
            .set("author", Value::Pointer(Pointer::new("User", 7)))
            .unwrap();
        assert_eq!(instance.attributes().get("author"), Some(&Value::Int(7)));
        assert_eq!(
            instance.get("author").unwrap(),
            Some(Value::Pointer(Pointer::new("User", 7)))
        );
    }

    #[test]
    fn test_secondary_relation_rejects_assignment() {
        let (registry, post) = registry();
        let mut instance = ClassInstance::new(registry, post).unwrap();

        let err = instance.set("company", Value::Pointer(Pointer::new("User", 1)));
        assert!(matches!(err, Err(Error::ForbiddenOperation(_))));
    }

    #[test]
    fn test_guarded_and_reserved_fields() {
        let (registry, post) = registry();
        let mut instance = ClassInstance::new(registry, post).unwrap();

        assert!(matches!(
            instance.set("views", Value::Int(1)),
            Err(Error::ForbiddenOperation(_))
        ));
        assert!(matches!(
            instance.set("id", Value::Int(1)),
            Err(Error::ForbiddenOperation(_))
        ));
        assert!(matches!(
            instance.set("created_at", Value::from("2024-01-01T00:00:00Z")),
            Err(Error::ForbiddenOperation(_))
        ));
        assert!(matches!(
            instance.set("unknown", Value::Int(1)),
            Err(Error::InvalidObjectKey(_))
        ));
    }

    #[test]
    fn test_new_instance_has_no_identifier() {
        let (registry, post) = registry();
        let instance = ClassInstance::new(registry.clone(), post).unwrap();
        assert!(instance.is_new());
        assert_eq!(instance.get("id").unwrap(), None);

        let loaded = ClassInstance::from_id(registry, post, 9).unwrap();
        assert!(!loaded.is_new());
        assert_eq!(loaded.get("id").unwrap(), Some(Value::Int(9)));
    }

    #[test]
    fn test_to_record_shape() {
        let (registry, post) = registry();
        let mut instance = ClassInstance::from_id(registry, post, 3).unwrap();
        instance.set("title", Value::from("hi")).unwrap();
        instance
            .set("author", Value::Pointer(Pointer::new("User", 7)))
            .unwrap();

        let record = instance.to_record().unwrap();
        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["id", "title", "views", "author", "company"]);
        assert_eq!(record.get("author").unwrap()["id"], 7);
    }

    #[test]
    fn test_to_record_requires_identifier() {
        let (registry, post) = registry();
        let instance = ClassInstance::new(registry, post).unwrap();
        assert!(matches!(
            instance.to_record(),
            Err(Error::ForbiddenOperation(_))
        ));
    }
}
