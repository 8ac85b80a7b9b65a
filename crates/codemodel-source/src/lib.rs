//! Concrete declaration sources for the code model.
//!
//! The core crate defines the [`DeclarationSource`] contract; this crate
//! provides the backends a caller plugs into a `CodeModel`.
//!
//! # Modules
//!
//! - [`error`]: SourceError enum with all loading failure modes
//! - [`memory`]: InMemorySource, two tables keyed by qualified name
//! - [`json`]: JsonSource, an InMemorySource loaded from a JSON document
//!
//! [`DeclarationSource`]: codemodel_core::DeclarationSource

pub mod error;
pub mod json;
pub mod memory;

// Re-export key types for ergonomic use.
pub use error::SourceError;
pub use json::{DeclarationFile, JsonSource};
pub use memory::InMemorySource;
