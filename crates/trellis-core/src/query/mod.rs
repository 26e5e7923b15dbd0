//! Query building.
//!
//! This module holds the constraint map, the fluent query builder, and the
//! class-agnostic options it compiles into for the SQL layer.

mod builder;
mod constraint;
mod options;

pub use builder::Query;
pub use constraint::{ConstraintMap, ConstraintValue, KeyConstraints, Operator};
pub use options::{QueryOptions, Source};
