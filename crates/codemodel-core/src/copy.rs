//! Identity-preserving deep copy.
//!
//! One [`CopyMapper`] spans a copy operation. Every composite is registered
//! before its CHILD edges are followed, so a subtree is copied exactly once
//! however it is reached. Once the CHILD structure exists, REFERENCE edges
//! of the new nodes are rewritten through the mapper: targets copied in the
//! same operation point at their copies, everything else is left as is.
//! PARENT edges are correct by construction, since every copy is attached to
//! its copied container or slot.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use crate::error::ModelError;
use crate::id::{ContainerId, NodeId};
use crate::lifecycle::Lifecycle;
use crate::model::CodeModel;
use crate::node::Origin;

/// Original -> copy registry for one copy operation.
#[derive(Debug, Default)]
pub struct CopyMapper {
    nodes: HashMap<NodeId, NodeId>,
    containers: HashMap<ContainerId, ContainerId>,
    /// Originals in the order they were copied.
    order: Vec<NodeId>,
    /// Prefix of `order` whose copies already had their references rewritten.
    rewired: usize,
}

impl CopyMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, original: NodeId, copy: NodeId) -> Result<(), ModelError> {
        match self.nodes.entry(original) {
            Entry::Occupied(_) => {
                return Err(ModelError::mismatch(format!(
                    "node {original} registered twice in one copy operation"
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(copy);
            }
        }
        self.order.push(original);
        Ok(())
    }

    pub(crate) fn register_container(
        &mut self,
        original: ContainerId,
        copy: ContainerId,
    ) -> Result<(), ModelError> {
        match self.containers.entry(original) {
            Entry::Occupied(_) => Err(ModelError::mismatch(format!(
                "container {original} registered twice in one copy operation"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(copy);
                Ok(())
            }
        }
    }

    /// The copy of `original`, if it was copied in this operation.
    pub fn get(&self, original: NodeId) -> Option<NodeId> {
        self.nodes.get(&original).copied()
    }

    pub fn get_container(&self, original: ContainerId) -> Option<ContainerId> {
        self.containers.get(&original).copied()
    }

    /// Mapped target if copied here, the original otherwise.
    pub fn resolve(&self, id: NodeId) -> NodeId {
        self.get(id).unwrap_or(id)
    }

    /// Every copied original, in copy order.
    pub fn originals(&self) -> &[NodeId] {
        &self.order
    }

    /// Every copy made so far, in copy order.
    pub fn copies(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().filter_map(|o| self.get(*o))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl CodeModel {
    /// Deep-copies `id` into a detached, mutable, initialized node.
    pub fn copy(&mut self, id: NodeId) -> Result<NodeId, ModelError> {
        let mut mapper = CopyMapper::new();
        self.copy_with(id, &mut mapper)
    }

    /// Copies `id` as part of a larger operation sharing `mapper`. A node
    /// already copied through `mapper` yields its existing copy.
    pub fn copy_with(&mut self, id: NodeId, mapper: &mut CopyMapper) -> Result<NodeId, ModelError> {
        self.check_open()?;
        if let Some(existing) = mapper.get(id) {
            return Ok(existing);
        }
        let before = mapper.len();
        let copy = self.copy_node(id, mapper)?;
        self.rewire_pending(mapper)?;
        debug!(original = %id, copy = %copy, nodes = mapper.len() - before, "copied subtree");
        Ok(copy)
    }

    fn copy_node(&mut self, original: NodeId, mapper: &mut CopyMapper) -> Result<NodeId, ModelError> {
        // Templates are populated before copying, so lazy views are copied
        // with their full content.
        self.initialize(original)?;
        let (data, containers, slot) = {
            let node = self.node(original)?;
            (node.data.clone(), node.containers.clone(), node.slot)
        };

        let copy = self.alloc_bare(data, Origin::Copy { of: original }, Lifecycle::ready());
        mapper.register(original, copy)?;

        for cid in containers {
            let (role, items) = {
                let c = self.container(cid)?;
                (c.role(), c.items().to_vec())
            };
            let new_cid = self.new_container(copy, role);
            mapper.register_container(cid, new_cid)?;
            self.push_container(copy, new_cid)?;
            for item in items {
                let item_copy = self.copy_node(item, mapper)?;
                self.attach_item(new_cid, item_copy, None)?;
            }
            self.rebuild_index(new_cid)?;
        }

        if let Some(slot) = slot {
            let slot_copy = self.copy_node(slot, mapper)?;
            self.attach_slot(copy, slot_copy)?;
        }
        Ok(copy)
    }

    /// Rewrites REFERENCE edges of copies not yet rewired.
    fn rewire_pending(&mut self, mapper: &mut CopyMapper) -> Result<(), ModelError> {
        let pending: Vec<NodeId> = mapper.order[mapper.rewired..]
            .iter()
            .filter_map(|o| mapper.get(*o))
            .collect();
        self.remap_references(mapper, pending)?;
        mapper.rewired = mapper.order.len();
        Ok(())
    }

    /// Rewrites the REFERENCE edges of `nodes` through `mapper`.
    pub(crate) fn remap_references(
        &mut self,
        mapper: &CopyMapper,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), ModelError> {
        for id in nodes {
            self.node_mut(id)?
                .data
                .remap_references(|target| mapper.resolve(target));
        }
        Ok(())
    }
}
