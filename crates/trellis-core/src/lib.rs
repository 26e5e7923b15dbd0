//! Trellis Core - class registry, typed keys, query builder, SQL compiler,
//! and the class manager that ties them together.
//!
//! Application code declares classes with typed fields and foreign-key
//! relations in a [`ClassRegistry`], builds queries with the fluent
//! [`Query`] builder, and runs them through a [`ClassManager`] backed by any
//! [`StorageDriver`] implementation.

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod keymap;
pub mod keys;
pub mod manager;
pub mod object;
pub mod query;
pub mod sql;

pub use catalog::{
    ClassBuilder, ClassDefinition, ClassId, ClassRegistry, Relation, RelationDefinition,
    Trigger, TriggerAction, TriggerContext, TriggerPhase, IDENTIFIER_KEY, OWNER_MARKER,
    SOFT_DELETE_KEY, TIMESTAMP_KEYS,
};
pub use config::DatabaseConfig;
pub use driver::{ExecuteResult, Intent, MemoryDriver, StorageDriver};
pub use error::Error;
pub use keymap::KeyMap;
pub use keys::{KeyManager, KeySpec, NumericMode};
pub use manager::{Batcher, ClassManager, Collection, OperationOptions};
pub use object::ClassInstance;
pub use query::{
    ConstraintMap, ConstraintValue, KeyConstraints, Operator, Query, QueryOptions, Source,
};
pub use sql::{SqlCompiler, SqlEscaper};

/// Re-export protocol types.
pub use trellis_proto as proto;
