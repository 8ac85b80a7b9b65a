//! Core error types for codemodel-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Every variant
//! is raised synchronously at the violation point; plain lookups return
//! `Option` and only the `*_required` variants produce
//! [`ModelError::ObjectNotFound`].

use crate::container::Role;
use crate::id::{ContainerId, NodeId};
use crate::node::NodeKind;
use thiserror::Error;

/// Core errors produced by the codemodel-core crate.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A mutator was called on a frozen or system-immutable node or container.
    #[error("{kind} {node} is read-only: {snippet}")]
    ReadOnly {
        node: NodeId,
        kind: NodeKind,
        snippet: String,
    },

    /// A key is already bound to a different item in the container.
    #[error("duplicate key '{key}' in {role} container {container}")]
    DuplicateKey {
        key: String,
        role: Role,
        container: ContainerId,
    },

    /// A required lookup found nothing.
    #[error("object not found: {what}")]
    ObjectNotFound { what: String },

    /// Re-entrant or out-of-order lifecycle transition, or use after close.
    #[error("illegal state: {reason}")]
    IllegalState { reason: String },

    /// Copy or merge counterpart is structurally incompatible.
    #[error("object mismatch: {reason}")]
    ObjectMismatch { reason: String },

    /// A node id does not refer to a live node in this context.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// A container id does not refer to a container in this context.
    #[error("container not found: ContainerId({id})", id = id.0)]
    ContainerNotFound { id: ContainerId },

    /// A name failed identifier validation.
    #[error("invalid name: '{name}'")]
    InvalidName { name: String },

    /// The text sink refused a write.
    #[error("emit failed: {0}")]
    Emit(#[from] std::fmt::Error),
}

impl ModelError {
    pub(crate) fn illegal_state(reason: impl Into<String>) -> Self {
        ModelError::IllegalState {
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(reason: impl Into<String>) -> Self {
        ModelError::ObjectMismatch {
            reason: reason.into(),
        }
    }
}
