//! Core error types.

use thiserror::Error;

/// Errors raised by the class registry, key system, query pipeline, and
/// class manager.
#[derive(Debug, Error)]
pub enum Error {
    /// A class, field, or relation was referenced before being registered,
    /// or a registry invariant was violated.
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// An operation was attempted outside its allowed shape.
    #[error("forbidden operation: {0}")]
    ForbiddenOperation(String),

    /// A value failed its field's type validation.
    #[error("invalid object key: {0}")]
    InvalidObjectKey(String),

    /// A class lookup missed.
    #[error("class not found: {0}")]
    ClassNotFound(String),

    /// A function lookup missed.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// A failure surfaced by the storage driver during execution.
    ///
    /// The statement text is carried for diagnostics and must never be
    /// surfaced verbatim to untrusted callers; use [`Error::public_message`].
    #[error("database error: {message}")]
    Database {
        /// The original driver failure message.
        message: String,
        /// The statement that was executing when the failure occurred.
        statement: String,
    },

    /// Protocol-level value conversion error.
    #[error("protocol error: {0}")]
    Proto(#[from] trellis_proto::Error),
}

impl Error {
    /// Wrap a driver failure together with the statement that caused it.
    pub fn database(source: impl std::fmt::Display, statement: impl Into<String>) -> Self {
        Error::Database {
            message: source.to_string(),
            statement: statement.into(),
        }
    }

    /// The message that may be shown to untrusted callers.
    ///
    /// Validation errors are safe to surface as-is; driver failures collapse
    /// to a generic message while the full detail stays available in logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::Database { .. } => "internal database error".to_string(),
            other => other.to_string(),
        }
    }
}
