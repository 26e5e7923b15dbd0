//! Trellis protocol types - values, pointers, and record shapes.
//!
//! This crate defines the runtime value types shared between the core
//! data-access layer and any outer transport: the `Value` enum carried in key
//! maps, the `Pointer` record shape used for relation fields, the write-path
//! marker types (`Increment`, `JsonPatch`), and the serialized record shape.

mod error;
mod record;
mod value;
mod write;

pub use error::Error;
pub use record::SerializedRecord;
pub use value::{Pointer, PointerKind, Value};
pub use write::{Increment, JsonPatch};
