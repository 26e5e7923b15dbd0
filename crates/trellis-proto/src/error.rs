//! Protocol error types.

use thiserror::Error;

/// Errors raised while converting values to or from their wire shape.
#[derive(Debug, Error)]
pub enum Error {
    /// A wire value could not be interpreted.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A pointer object is missing a required part.
    #[error("invalid pointer: {0}")]
    InvalidPointer(String),
}
