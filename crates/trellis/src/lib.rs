//! Trellis - a schema-aware data-access layer.
//!
//! Declare record classes with typed fields and foreign-key relations, query
//! them through a fluent constraint builder, and persist them with per-class
//! lifecycle triggers. The heavy lifting lives in [`trellis_core`]; this
//! crate re-exports the public surface.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use trellis::{ClassManager, ClassRegistry, KeyManager, NumericMode, Query};
//!
//! let registry = Arc::new(ClassRegistry::new());
//! registry.declare("User", "user", |c| {
//!     c.key(KeyManager::string("name"))?;
//!     Ok(())
//! })?;
//! let post = registry.declare("Post", "post", |c| {
//!     c.key(KeyManager::string_bounded("title", Some(1), Some(200)))?
//!         .key(KeyManager::number("views", NumericMode::Integer))?
//!         .relation("author", "User")?;
//!     Ok(())
//! })?;
//!
//! let manager = ClassManager::new(registry.clone(), driver);
//! let recent = manager
//!     .find(
//!         Query::new(registry.clone(), post)
//!             .equal_to("author.id", 7)?
//!             .sort_by_descending("created_at")?
//!             .limit(10),
//!         &Default::default(),
//!     )
//!     .await?;
//! ```

pub use trellis_core::{
    catalog, config, driver, error, keymap, keys, manager, object, query, sql,
};

pub use trellis_core::{
    Batcher, ClassBuilder, ClassDefinition, ClassId, ClassInstance, ClassManager, ClassRegistry,
    Collection, ConstraintMap, ConstraintValue, DatabaseConfig, Error, ExecuteResult, Intent,
    KeyConstraints, KeyManager, KeyMap, KeySpec, MemoryDriver, NumericMode, OperationOptions,
    Operator, Query, QueryOptions, Relation, RelationDefinition, Source, SqlCompiler, SqlEscaper,
    StorageDriver, Trigger, TriggerAction, TriggerContext, TriggerPhase, IDENTIFIER_KEY,
    OWNER_MARKER, SOFT_DELETE_KEY, TIMESTAMP_KEYS,
};

/// Protocol types: values, pointers, write markers, record shapes.
pub use trellis_proto as proto;
pub use trellis_proto::{Increment, JsonPatch, Pointer, PointerKind, SerializedRecord, Value};
