//! Reconciling two representations of one construct.
//!
//! A merge runs in two passes. The check pass walks receiver and incoming
//! side by side and rejects kind or key mismatches, positional parameter
//! lists of different length, and any write it would make into an
//! immutable node or container. Only then does the apply pass write.
//! Incoming content is always adopted as copies; the incoming tree is
//! never attached to the receiver.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::container::Role;
use crate::copy::CopyMapper;
use crate::error::ModelError;
use crate::id::{ContainerId, NodeId};
use crate::model::CodeModel;
use crate::node::NodeData;
use crate::types::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Leave the receiver as it is.
    Keep,
    /// Replace the receiver's content with copies of incoming content.
    Override,
    /// Keep local content, fill gaps from incoming.
    #[default]
    Merge,
    /// As `Merge`, but bodies and initializers always come from incoming.
    MergeOverrideBody,
}

impl MergeStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::Keep => "keep",
            MergeStrategy::Override => "override",
            MergeStrategy::Merge => "merge",
            MergeStrategy::MergeOverrideBody => "merge-override-body",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(MergeStrategy::Keep),
            "override" => Ok(MergeStrategy::Override),
            "merge" => Ok(MergeStrategy::Merge),
            "merge-override-body" => Ok(MergeStrategy::MergeOverrideBody),
            other => Err(format!(
                "unknown merge strategy '{other}' (expected keep, override, merge or merge-override-body)"
            )),
        }
    }
}

impl CodeModel {
    /// Merges `incoming` into `receiver` under `strategy`.
    pub fn merge(
        &mut self,
        receiver: NodeId,
        incoming: NodeId,
        strategy: MergeStrategy,
    ) -> Result<(), ModelError> {
        self.check_open()?;
        if receiver == incoming {
            return Ok(());
        }
        if self.is_ancestor_or_self(receiver, incoming)? || self.is_ancestor_or_self(incoming, receiver)? {
            return Err(ModelError::mismatch("cannot merge a node with its own ancestor or descendant"));
        }
        self.check_top_level(receiver, incoming)?;
        if strategy == MergeStrategy::Keep {
            return Ok(());
        }

        self.check_merge(receiver, incoming, strategy)?;

        let mut mapper = CopyMapper::new();
        let mut touched = Vec::new();
        self.apply_merge(receiver, incoming, strategy, &mut mapper, &mut touched)?;

        // Late copies may be targets of earlier ones, and touched receiver
        // nodes may have picked up references into the incoming tree.
        let copies: Vec<NodeId> = mapper.copies().collect();
        self.remap_references(&mapper, copies.into_iter().chain(touched.iter().copied()))?;
        debug!(
            %receiver,
            %incoming,
            %strategy,
            touched = touched.len(),
            copied = mapper.len(),
            "merged"
        );
        Ok(())
    }

    /// Merges the declaration source's counterpart of `receiver`, if any.
    /// Returns whether a counterpart was found.
    pub fn merge_counterpart(&mut self, receiver: NodeId, strategy: MergeStrategy) -> Result<bool, ModelError> {
        let Some(decl) = self.counterpart_of(receiver)? else {
            return Ok(false);
        };
        let incoming = self.external(decl)?;
        self.merge(receiver, incoming, strategy)?;
        Ok(true)
    }

    fn check_top_level(&mut self, receiver: NodeId, incoming: NodeId) -> Result<(), ModelError> {
        let (rk, ik) = (self.kind(receiver)?, self.kind(incoming)?);
        if rk != ik {
            return Err(ModelError::mismatch(format!("cannot merge a {ik} into a {rk}")));
        }
        let (rkey, ikey) = (self.key_of(receiver)?, self.key_of(incoming)?);
        if rkey != ikey {
            return Err(ModelError::mismatch(format!(
                "cannot merge '{}' into '{}'",
                ikey.unwrap_or_default(),
                rkey.unwrap_or_default()
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Check pass
    // -----------------------------------------------------------------------

    fn check_merge(&mut self, receiver: NodeId, incoming: NodeId, strategy: MergeStrategy) -> Result<(), ModelError> {
        self.initialize(receiver)?;
        self.initialize(incoming)?;
        if self.kind(receiver)? != self.kind(incoming)? {
            return Err(ModelError::mismatch(format!(
                "cannot merge a {} into a {}",
                self.kind(incoming)?,
                self.kind(receiver)?
            )));
        }
        self.verify_mutable(receiver)?;
        if strategy == MergeStrategy::Override && self.node(receiver)?.parent.is_some() {
            if let (NodeData::Parameter(l), NodeData::Parameter(o)) =
                (&self.node(receiver)?.data, &self.node(incoming)?.data)
            {
                if l.ty.simple_name() != o.ty.simple_name() {
                    return Err(ModelError::mismatch(format!(
                        "overriding parameter '{}' would change its method's signature",
                        l.name
                    )));
                }
            }
        }

        for (rc, ic) in self.container_pairs(receiver, incoming)? {
            let role = self.container(rc)?.role();
            if strategy == MergeStrategy::Override {
                self.verify_container_mutable(rc)?;
                continue;
            }
            if role.is_indexed() {
                for item in self.declared(ic)?.to_vec() {
                    let key = self.index_key(ic, item)?;
                    match key.and_then(|k| self.container(rc).ok()?.index_get(&k)) {
                        Some(local) => self.check_merge(local, item, strategy)?,
                        None => self.verify_container_mutable(rc)?,
                    }
                }
            } else {
                let local = self.declared(rc)?.to_vec();
                let other = self.declared(ic)?.to_vec();
                if role == Role::Parameters && local.len() != other.len() {
                    return Err(ModelError::mismatch(format!(
                        "parameter lists differ in length ({} vs {})",
                        local.len(),
                        other.len()
                    )));
                }
                for (l, o) in local.iter().zip(&other) {
                    self.check_merge(*l, *o, strategy)?;
                }
                if other.len() > local.len() {
                    self.verify_container_mutable(rc)?;
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Apply pass
    // -----------------------------------------------------------------------

    fn apply_merge(
        &mut self,
        receiver: NodeId,
        incoming: NodeId,
        strategy: MergeStrategy,
        mapper: &mut CopyMapper,
        touched: &mut Vec<NodeId>,
    ) -> Result<(), ModelError> {
        touched.push(receiver);
        let other = self.node(incoming)?.data.clone();
        match strategy {
            MergeStrategy::Keep => return Ok(()),
            MergeStrategy::Override => {
                self.replace_data(receiver, other)?;
                for (rc, ic) in self.container_pairs(receiver, incoming)? {
                    self.clear_container(rc)?;
                    self.adopt_copies(rc, ic, 0, mapper)?;
                }
                self.replace_slot(receiver, incoming, mapper)?;
                return Ok(());
            }
            MergeStrategy::Merge | MergeStrategy::MergeOverrideBody => {}
        }

        let mut data = self.node(receiver)?.data.clone();
        fill_gaps(&mut data, &other)?;
        self.replace_data(receiver, data)?;

        for (rc, ic) in self.container_pairs(receiver, incoming)? {
            if self.container(rc)?.role().is_indexed() {
                for item in self.declared(ic)?.to_vec() {
                    let key = self.index_key(ic, item)?;
                    match key.as_deref().and_then(|k| self.container(rc).ok()?.index_get(k)) {
                        Some(local) => self.apply_merge(local, item, strategy, mapper, touched)?,
                        None => {
                            let copy = self.copy_with(item, mapper)?;
                            self.attach_item(rc, copy, key)?;
                        }
                    }
                }
            } else {
                let local = self.declared(rc)?.to_vec();
                let other = self.declared(ic)?.to_vec();
                for (l, o) in local.iter().zip(&other) {
                    self.apply_merge(*l, *o, strategy, mapper, touched)?;
                }
                self.adopt_copies(rc, ic, local.len(), mapper)?;
            }
        }

        let has_local_slot = self.node(receiver)?.slot.is_some();
        if strategy == MergeStrategy::MergeOverrideBody || !has_local_slot {
            self.replace_slot(receiver, incoming, mapper)?;
        }
        Ok(())
    }

    /// Pairs containers of two nodes of the same kind by role.
    fn container_pairs(&self, receiver: NodeId, incoming: NodeId) -> Result<Vec<(ContainerId, ContainerId)>, ModelError> {
        let local = &self.node(receiver)?.containers;
        let other = &self.node(incoming)?.containers;
        if local.len() != other.len() {
            return Err(ModelError::illegal_state("nodes of one kind own different container sets"));
        }
        Ok(local.iter().copied().zip(other.iter().copied()).collect())
    }

    /// Appends copies of the items of `ic` from position `from` onward.
    fn adopt_copies(
        &mut self,
        rc: ContainerId,
        ic: ContainerId,
        from: usize,
        mapper: &mut CopyMapper,
    ) -> Result<(), ModelError> {
        let items = self.declared(ic)?.to_vec();
        for item in items.into_iter().skip(from) {
            let copy = self.copy_with(item, mapper)?;
            let key = self.index_key(rc, copy)?;
            self.attach_item(rc, copy, key)?;
        }
        Ok(())
    }

    /// Replaces the slot of `receiver` with a copy of the slot of `incoming`,
    /// clearing it when `incoming` has none.
    fn replace_slot(&mut self, receiver: NodeId, incoming: NodeId, mapper: &mut CopyMapper) -> Result<(), ModelError> {
        let other = self.node(incoming)?.slot;
        self.detach_slot(receiver)?;
        if let Some(other) = other {
            let copy = self.copy_with(other, mapper)?;
            self.attach_slot(receiver, copy)?;
        }
        Ok(())
    }
}

/// Keeps every local value that is present and fills the rest from `other`.
fn fill_gaps(local: &mut NodeData, other: &NodeData) -> Result<(), ModelError> {
    match (local, other) {
        (NodeData::Package(_), NodeData::Package(_)) => {}
        (NodeData::Unit(l), NodeData::Unit(o)) => {
            for import in &o.imports {
                if !l.imports.contains(import) {
                    l.imports.push(import.clone());
                }
            }
        }
        (NodeData::Type(l), NodeData::Type(o)) => {
            if l.modifiers.is_empty() {
                l.modifiers = o.modifiers.clone();
            }
            if l.supertypes.is_empty() {
                l.supertypes = o.supertypes.clone();
            } else {
                for (lr, or) in l.supertypes.iter_mut().zip(&o.supertypes) {
                    fill_target(lr, or);
                }
            }
        }
        (NodeData::Method(l), NodeData::Method(o)) => {
            if l.modifiers.is_empty() {
                l.modifiers = o.modifiers.clone();
            }
            if l.return_type.is_none() {
                l.return_type = o.return_type.clone();
            } else if let (Some(lr), Some(or)) = (l.return_type.as_mut(), o.return_type.as_ref()) {
                fill_target(lr, or);
            }
        }
        (NodeData::Field(l), NodeData::Field(o)) => {
            if l.modifiers.is_empty() {
                l.modifiers = o.modifiers.clone();
            }
            fill_target(&mut l.ty, &o.ty);
        }
        (NodeData::Parameter(l), NodeData::Parameter(o)) => fill_target(&mut l.ty, &o.ty),
        (NodeData::Annotation(l), NodeData::Annotation(o)) => {
            fill_target(&mut l.ty, &o.ty);
            for (k, v) in &o.values {
                if !l.values.contains_key(k) {
                    l.values.insert(k.clone(), v.clone());
                }
            }
        }
        (NodeData::Doc(l), NodeData::Doc(o)) => {
            if l.text.is_empty() {
                l.text = o.text.clone();
            }
        }
        (NodeData::Expression(l), NodeData::Expression(o)) => {
            if l.text.is_empty() {
                l.text = o.text.clone();
            }
            if l.target.is_none() {
                l.target = o.target;
            }
        }
        (l, o) => {
            return Err(ModelError::mismatch(format!(
                "cannot merge a {} into a {}",
                o.kind(),
                l.kind()
            )))
        }
    }
    Ok(())
}

fn fill_target(local: &mut TypeRef, other: &TypeRef) {
    if local.target.is_none() && local.name == other.name {
        local.target = other.target;
    }
}
