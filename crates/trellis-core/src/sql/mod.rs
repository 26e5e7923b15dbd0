//! SQL rendering.

mod compiler;

pub use compiler::{SqlCompiler, SqlEscaper};
