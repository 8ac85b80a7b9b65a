//! Error types for codemodel-source.
//!
//! [`SourceError`] covers loading failures: unreadable files, malformed
//! JSON, and two declarations claiming the same qualified name.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while building a declaration source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The declarations file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Two declarations share a qualified name within one table.
    #[error("duplicate declaration: {name}")]
    DuplicateDeclaration { name: String },
}
