//! The class-definition registry.
//!
//! An explicit registry object owned by the bootstrap context. Classes are
//! declared once at startup through a builder block; the registry freezes on
//! first use by the class manager, after which declaration is a
//! configuration error. Definitions are looked up by the stable `ClassId`
//! handed out at declaration, not by name.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::definition::{ClassDefinition, ClassId};
use crate::catalog::relation::RelationDefinition;
use crate::catalog::trigger::{Trigger, TriggerAction, TriggerPhase};
use crate::error::Error;
use crate::keys::KeyManager;

/// Process-wide class metadata store: write-once per field, read-many.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    classes: Vec<Arc<ClassDefinition>>,
    frozen: bool,
}

/// Builder handed to a `declare` block.
#[derive(Debug)]
pub struct ClassBuilder {
    definition: ClassDefinition,
}

impl ClassBuilder {
    /// Register a typed key.
    pub fn key(&mut self, key: KeyManager) -> Result<&mut Self, Error> {
        self.definition.register_key(key)?;
        Ok(self)
    }

    /// Register a relation with inferred source/parent defaults.
    pub fn relation(
        &mut self,
        field: impl Into<String>,
        target_class: impl Into<String>,
    ) -> Result<&mut Self, Error> {
        self.relation_with(RelationDefinition::new(field, target_class))
    }

    /// Register a relation with explicit overrides.
    pub fn relation_with(&mut self, relation: RelationDefinition) -> Result<&mut Self, Error> {
        self.definition.register_relation(relation)?;
        Ok(self)
    }

    /// Register a lifecycle trigger.
    pub fn trigger(&mut self, phase: TriggerPhase, action: TriggerAction) -> &mut Self {
        self.definition.register_trigger(Trigger::new(phase, action));
        self
    }

    /// Hide a field from non-elevated callers.
    pub fn hidden(&mut self, field: impl Into<String>) -> &mut Self {
        self.definition.mark_hidden(field);
        self
    }

    /// Guard a field against direct assignment.
    pub fn guarded(&mut self, field: impl Into<String>) -> &mut Self {
        self.definition.mark_guarded(field);
        self
    }
}

impl ClassRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a class and populate its definition in one block.
    ///
    /// Returns the stable id for later lookups. Fails once the registry is
    /// frozen, and when the class name is already taken.
    pub fn declare(
        &self,
        name: impl Into<String>,
        source: impl Into<String>,
        build: impl FnOnce(&mut ClassBuilder) -> Result<(), Error>,
    ) -> Result<ClassId, Error> {
        let name = name.into();
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(Error::MissingConfiguration(format!(
                "cannot declare class {name}: registry is closed"
            )));
        }
        if inner.classes.iter().any(|c| c.name() == name) {
            return Err(Error::MissingConfiguration(format!(
                "class {name} is already declared"
            )));
        }
        let id = ClassId(inner.classes.len() as u32);
        let mut builder = ClassBuilder {
            definition: ClassDefinition::new(id, name, source),
        };
        build(&mut builder)?;
        inner.classes.push(Arc::new(builder.definition));
        Ok(id)
    }

    /// Register a trigger on an already-declared class.
    ///
    /// Only allowed while the registry is open.
    pub fn register_trigger(
        &self,
        class: ClassId,
        phase: TriggerPhase,
        action: TriggerAction,
    ) -> Result<(), Error> {
        let mut inner = self.inner.write();
        if inner.frozen {
            return Err(Error::MissingConfiguration(
                "cannot register a trigger: registry is closed".to_string(),
            ));
        }
        let definition = inner
            .classes
            .get_mut(class.0 as usize)
            .ok_or_else(|| Error::ClassNotFound(format!("class #{}", class.0)))?;
        Arc::make_mut(definition).register_trigger(Trigger::new(phase, action));
        Ok(())
    }

    /// Look up a definition by stable id.
    pub fn definition(&self, class: ClassId) -> Result<Arc<ClassDefinition>, Error> {
        self.inner
            .read()
            .classes
            .get(class.0 as usize)
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(format!("class #{}", class.0)))
    }

    /// Look up a definition by class name.
    pub fn definition_by_name(&self, name: &str) -> Result<Arc<ClassDefinition>, Error> {
        self.inner
            .read()
            .classes
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(name.to_string()))
    }

    /// Look up a class id by name.
    pub fn class_id(&self, name: &str) -> Result<ClassId, Error> {
        self.definition_by_name(name).map(|d| d.id())
    }

    /// Close the registry; later declarations fail.
    ///
    /// Called by the class manager before its first operation, so the
    /// happens-before relationship between registration and concurrent use
    /// is enforced by construction rather than by callers remembering to.
    pub fn freeze(&self) {
        self.inner.write().frozen = true;
    }

    /// Whether the registry has been closed.
    pub fn is_frozen(&self) -> bool {
        self.inner.read().frozen
    }

    /// Number of declared classes.
    pub fn len(&self) -> usize {
        self.inner.read().classes.len()
    }

    /// Whether no classes are declared.
    pub fn is_empty(&self) -> bool {
        self.inner.read().classes.is_empty()
    }
}
