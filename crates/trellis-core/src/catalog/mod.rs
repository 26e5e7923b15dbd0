//! Semantic catalog: class definitions, relations, and triggers.
//!
//! The catalog owns everything declared at startup: per-class field
//! metadata, foreign-key relations, lifecycle triggers, and the hidden and
//! guarded field lists.

mod definition;
mod registry;
mod relation;
mod trigger;

pub use definition::{
    ClassDefinition, ClassId, IDENTIFIER_KEY, SOFT_DELETE_KEY, TIMESTAMP_KEYS,
};
pub use registry::{ClassBuilder, ClassRegistry};
pub use relation::{Relation, RelationDefinition, OWNER_MARKER};
pub use trigger::{Trigger, TriggerAction, TriggerContext, TriggerPhase};
