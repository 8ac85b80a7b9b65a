//! Named containers: ordered child lists with an optional key index.
//!
//! Every node owns one [`ContainerData`] per [`Role`] of its kind. A container
//! keeps its item list and its key index mutually consistent; indexed roles
//! key items by name, methods by signature (`name(T1,T2)`), so overloads
//! coexist. Positional roles (parameters, doc lines, operands) have no index.
//!
//! Mutators are gated by the owner's lifecycle and the container's own frozen
//! flag. Adopting an item that already belongs elsewhere copies it through
//! the copy engine instead of moving it.

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::declaration::DeclKind;
use crate::error::ModelError;
use crate::id::{ContainerId, NodeId};
use crate::model::{validate_name, CodeModel, Ownership};
use crate::node::{NodeData, NodeKind, Origin, Parent};

/// What a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Packages,
    Units,
    Types,
    Fields,
    Methods,
    Parameters,
    Annotations,
    Docs,
    Operands,
}

impl Role {
    /// Whether items are reachable through a key index.
    pub fn is_indexed(self) -> bool {
        match self {
            Role::Packages
            | Role::Units
            | Role::Types
            | Role::Fields
            | Role::Methods
            | Role::Annotations => true,
            Role::Parameters | Role::Docs | Role::Operands => false,
        }
    }

    /// Whether lookups continue into the same role of the owner's supers.
    pub fn aggregates(self) -> bool {
        matches!(self, Role::Types | Role::Fields | Role::Methods | Role::Annotations)
    }

    /// The node kind this role holds.
    pub fn item_kind(self) -> NodeKind {
        match self {
            Role::Packages => NodeKind::Package,
            Role::Units => NodeKind::Unit,
            Role::Types => NodeKind::Type,
            Role::Fields => NodeKind::Field,
            Role::Methods => NodeKind::Method,
            Role::Parameters => NodeKind::Parameter,
            Role::Annotations => NodeKind::Annotation,
            Role::Docs => NodeKind::Doc,
            Role::Operands => NodeKind::Expression,
        }
    }

    pub fn accepts(self, kind: NodeKind) -> bool {
        self.item_kind() == kind
    }

    /// The role that holds items of `kind`.
    pub fn for_item(kind: NodeKind) -> Role {
        match kind {
            NodeKind::Package => Role::Packages,
            NodeKind::Unit => Role::Units,
            NodeKind::Type => Role::Types,
            NodeKind::Field => Role::Fields,
            NodeKind::Method => Role::Methods,
            NodeKind::Parameter => Role::Parameters,
            NodeKind::Annotation => Role::Annotations,
            NodeKind::Doc => Role::Docs,
            NodeKind::Expression => Role::Operands,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Packages => "packages",
            Role::Units => "units",
            Role::Types => "types",
            Role::Fields => "fields",
            Role::Methods => "methods",
            Role::Parameters => "parameters",
            Role::Annotations => "annotations",
            Role::Docs => "docs",
            Role::Operands => "operands",
        };
        f.write_str(s)
    }
}

/// Storage of one container.
#[derive(Debug, Clone)]
pub struct ContainerData {
    owner: NodeId,
    role: Role,
    items: Vec<NodeId>,
    index: Option<HashMap<String, NodeId>>,
    frozen: bool,
}

impl ContainerData {
    pub(crate) fn new(owner: NodeId, role: Role) -> Self {
        ContainerData {
            owner,
            role,
            items: Vec::new(),
            index: role.is_indexed().then(HashMap::new),
            frozen: false,
        }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Items as currently materialized. Prefer [`CodeModel::declared`], which
    /// initializes the owner first.
    pub fn items(&self) -> &[NodeId] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn contains(&self, item: NodeId) -> bool {
        self.items.contains(&item)
    }

    pub(crate) fn index_get(&self, key: &str) -> Option<NodeId> {
        self.index.as_ref().and_then(|index| index.get(key).copied())
    }

    /// The key `item` is indexed under.
    pub(crate) fn key_for(&self, item: NodeId) -> Option<&str> {
        self.index
            .as_ref()?
            .iter()
            .find(|(_, &v)| v == item)
            .map(|(k, _)| k.as_str())
    }

    pub(crate) fn assert_consistency(&self) {
        if let Some(index) = &self.index {
            assert_eq!(index.len(), self.items.len(), "index size differs from item list");
            for item in index.values() {
                assert!(self.items.contains(item), "indexed item {item:?} missing from list");
            }
        }
    }
}

/// A pending signature change of a method held in an indexed container.
#[derive(Debug)]
pub(crate) struct Rekey {
    container: ContainerId,
    method: NodeId,
    old: String,
    new: String,
}

/// Signature key of a method: `name(T1,T2)` over simple type names.
pub fn signature_key(name: &str, param_types: &[String]) -> String {
    format!("{}({})", name, param_types.join(","))
}

impl CodeModel {
    // -----------------------------------------------------------------------
    // Read API
    // -----------------------------------------------------------------------

    pub fn container(&self, cid: ContainerId) -> Result<&ContainerData, ModelError> {
        self.check_open()?;
        self.containers
            .get(cid.index())
            .ok_or(ModelError::ContainerNotFound { id: cid })
    }

    fn container_mut(&mut self, cid: ContainerId) -> Result<&mut ContainerData, ModelError> {
        self.check_open()?;
        self.containers
            .get_mut(cid.index())
            .ok_or(ModelError::ContainerNotFound { id: cid })
    }

    /// The container with `role` owned by `node`, if its kind has one.
    pub fn find_container(&self, node: NodeId, role: Role) -> Result<Option<ContainerId>, ModelError> {
        let owned = &self.node(node)?.containers;
        for &cid in owned {
            if self.container(cid)?.role == role {
                return Ok(Some(cid));
            }
        }
        Ok(None)
    }

    /// Like [`find_container`](Self::find_container), but a kind without that
    /// role is [`ModelError::ObjectMismatch`].
    pub fn container_of(&self, node: NodeId, role: Role) -> Result<ContainerId, ModelError> {
        self.find_container(node, role)?.ok_or_else(|| {
            let kind = self.kind(node).map(|k| k.to_string()).unwrap_or_default();
            ModelError::mismatch(format!("a {kind} has no {role} container"))
        })
    }

    /// Local items only. Initializes the owner first, so a lazily populated
    /// container is never observed half-filled.
    pub fn declared(&mut self, cid: ContainerId) -> Result<&[NodeId], ModelError> {
        let owner = self.container(cid)?.owner;
        self.initialize(owner)?;
        Ok(&self.container(cid)?.items)
    }

    /// Local lookup by key. Positional containers match by item name.
    pub fn get_declared(&mut self, cid: ContainerId, key: &str) -> Result<Option<NodeId>, ModelError> {
        let owner = self.container(cid)?.owner;
        self.initialize(owner)?;
        let container = self.container(cid)?;
        if container.index.is_some() {
            return Ok(container.index_get(key));
        }
        for &item in &container.items {
            if self.node(item)?.name() == Some(key) {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Whether the container (or its owner) rejects mutation.
    pub fn is_container_immutable(&self, cid: ContainerId) -> Result<bool, ModelError> {
        let container = self.container(cid)?;
        Ok(container.frozen || self.is_immutable(container.owner)?)
    }

    pub(crate) fn verify_container_mutable(&self, cid: ContainerId) -> Result<(), ModelError> {
        let owner = self.container(cid)?.owner;
        self.verify_mutable(owner)?;
        if self.container(cid)?.frozen {
            return Err(ModelError::ReadOnly {
                node: owner,
                kind: self.kind(owner)?,
                snippet: self.snippet(owner),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Keys
    // -----------------------------------------------------------------------

    /// Identity key of a node inside an indexed container.
    pub fn key_of(&self, id: NodeId) -> Result<Option<String>, ModelError> {
        let node = self.node(id)?;
        Ok(match &node.data {
            NodeData::Method(m) => Some(signature_key(&m.name, &self.param_types(id)?)),
            NodeData::Package(_)
            | NodeData::Unit(_)
            | NodeData::Type(_)
            | NodeData::Field(_)
            | NodeData::Parameter(_)
            | NodeData::Annotation(_) => node.name().map(String::from),
            NodeData::Doc(_) | NodeData::Expression(_) => None,
        })
    }

    /// Key `id` would have after being renamed to `name`.
    fn key_with_name(&self, id: NodeId, name: &str) -> Result<Option<String>, ModelError> {
        Ok(match self.node(id)?.data {
            NodeData::Method(_) => Some(signature_key(name, &self.param_types(id)?)),
            NodeData::Doc(_) | NodeData::Expression(_) => None,
            _ => Some(name.to_string()),
        })
    }

    /// The key `item` gets in `cid`, or `None` for positional containers.
    pub(crate) fn index_key(&self, cid: ContainerId, item: NodeId) -> Result<Option<String>, ModelError> {
        if self.container(cid)?.role.is_indexed() {
            self.key_of(item)
        } else {
            Ok(None)
        }
    }

    /// Simple type names of a method's parameters. Reads the declaration of a
    /// not-yet-populated external view instead of populating it.
    fn param_types(&self, method: NodeId) -> Result<Vec<String>, ModelError> {
        let node = self.node(method)?;
        if !node.lifecycle.is_initialized() {
            if let Origin::ExternalView(handle) = &node.origin {
                return Ok(handle
                    .declaration()
                    .children
                    .iter()
                    .filter(|c| c.kind == DeclKind::Parameter)
                    .map(|c| {
                        let ty = c.type_name.as_deref().unwrap_or_default();
                        ty.rsplit('.').next().unwrap_or(ty).to_string()
                    })
                    .collect());
            }
        }
        match self.find_container(method, Role::Parameters)? {
            Some(params) => self.param_types_of_container(params),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn param_types_of_container(&self, params: ContainerId) -> Result<Vec<String>, ModelError> {
        let mut out = Vec::new();
        for &p in &self.container(params)?.items {
            match &self.node(p)?.data {
                NodeData::Parameter(param) => out.push(param.ty.simple_name().to_string()),
                other => {
                    return Err(ModelError::illegal_state(format!(
                        "{} stored in a parameter list",
                        other.kind()
                    )))
                }
            }
        }
        Ok(out)
    }

    /// Validates that changing the parameter types held by `params` keeps the
    /// owning method's signature unique, and returns the re-key to apply after
    /// the change. Nothing is written.
    pub(crate) fn plan_rekey(
        &self,
        params: ContainerId,
        new_types: Vec<String>,
    ) -> Result<Option<Rekey>, ModelError> {
        let method = self.container(params)?.owner;
        let Some(Parent::Container(methods)) = self.node(method)?.parent else {
            return Ok(None);
        };
        let name = match &self.node(method)?.data {
            NodeData::Method(m) => m.name.clone(),
            _ => return Ok(None),
        };
        let container = self.container(methods)?;
        let Some(old) = container.key_for(method).map(String::from) else {
            return Ok(None);
        };
        let new = signature_key(&name, &new_types);
        if new == old {
            return Ok(None);
        }
        self.verify_container_mutable(methods)?;
        if container.index_get(&new).is_some_and(|other| other != method) {
            return Err(ModelError::DuplicateKey {
                key: new,
                role: container.role,
                container: methods,
            });
        }
        Ok(Some(Rekey {
            container: methods,
            method,
            old,
            new,
        }))
    }

    pub(crate) fn apply_rekey(&mut self, rekey: Rekey) {
        if let Some(container) = self.containers.get_mut(rekey.container.index()) {
            if let Some(index) = container.index.as_mut() {
                index.remove(&rekey.old);
                index.insert(rekey.new, rekey.method);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Adds `item` and returns the id actually stored.
    ///
    /// Adding an item that is already here is a no-op; a different item under
    /// the same key is [`ModelError::DuplicateKey`]. An item owned by another
    /// container (or an immutable one) is not moved: a copy is adopted and
    /// the original stays untouched.
    pub fn add(&mut self, cid: ContainerId, item: NodeId) -> Result<NodeId, ModelError> {
        let (owner, role) = {
            let c = self.container(cid)?;
            (c.owner, c.role)
        };
        self.initialize(owner)?;
        self.verify_container_mutable(cid)?;

        let kind = self.kind(item)?;
        if !role.accepts(kind) {
            return Err(ModelError::mismatch(format!(
                "a {role} container cannot hold a {kind}"
            )));
        }
        if self.node(item)?.parent == Some(Parent::Container(cid)) {
            return Ok(item);
        }

        let key = self.index_key(cid, item)?;
        if let Some(key) = &key {
            if let Some(existing) = self.container(cid)?.index_get(key) {
                if existing == item {
                    return Ok(item);
                }
                return Err(ModelError::DuplicateKey {
                    key: key.clone(),
                    role,
                    container: cid,
                });
            }
        }

        let rekey = if role == Role::Parameters {
            let mut types = self.param_types_of_container(cid)?;
            if let NodeData::Parameter(p) = &self.node(item)?.data {
                types.push(p.ty.simple_name().to_string());
            }
            self.plan_rekey(cid, types)?
        } else {
            None
        };

        let stored = if self.needs_copy(item)? {
            trace!(item = %item, "adopting a copy of an owned or immutable item");
            self.copy(item)?
        } else {
            if self.is_ancestor_or_self(item, owner)? {
                return Err(ModelError::mismatch("a node cannot contain one of its ancestors"));
            }
            item
        };

        self.attach_item(cid, stored, key)?;
        if let Some(rekey) = rekey {
            self.apply_rekey(rekey);
        }
        trace!(container = %cid, item = %stored, %role, "added");
        Ok(stored)
    }

    /// Removes `item`, detaching it. Returns `false` if it was not here.
    pub fn remove(&mut self, cid: ContainerId, item: NodeId) -> Result<bool, ModelError> {
        let (owner, role) = {
            let c = self.container(cid)?;
            (c.owner, c.role)
        };
        self.initialize(owner)?;
        self.verify_container_mutable(cid)?;
        let Some(position) = self.container(cid)?.items.iter().position(|&i| i == item) else {
            return Ok(false);
        };

        let rekey = if role == Role::Parameters {
            let mut types = self.param_types_of_container(cid)?;
            types.remove(position);
            self.plan_rekey(cid, types)?
        } else {
            None
        };

        self.detach_item(cid, item)?;
        if let Some(rekey) = rekey {
            self.apply_rekey(rekey);
        }
        trace!(container = %cid, item = %item, %role, "removed");
        Ok(true)
    }

    /// Detaches every item. Used by override merges after validation.
    pub(crate) fn clear_container(&mut self, cid: ContainerId) -> Result<(), ModelError> {
        let items = self.container(cid)?.items.clone();
        for item in items {
            self.detach_item(cid, item)?;
        }
        Ok(())
    }

    /// Renames `item`. Inside an indexed container the old key is removed,
    /// the name applied and the new key inserted, after validation and the
    /// collision check; the list position does not change.
    pub fn rename(&mut self, item: NodeId, new_name: &str) -> Result<(), ModelError> {
        self.initialize(item)?;
        let kind = self.kind(item)?;
        if self.node(item)?.name().is_none() {
            return Err(ModelError::mismatch(format!("a {kind} has no name")));
        }
        validate_name(kind, new_name)?;
        self.verify_mutable(item)?;

        let rekey = match self.node(item)?.parent {
            Some(Parent::Container(cid)) if self.container(cid)?.role.is_indexed() => {
                self.verify_container_mutable(cid)?;
                let container = self.container(cid)?;
                let old = container.key_for(item).map(String::from);
                let new = self.key_with_name(item, new_name)?;
                if let Some(new) = &new {
                    if container.index_get(new).is_some_and(|other| other != item) {
                        return Err(ModelError::DuplicateKey {
                            key: new.clone(),
                            role: container.role,
                            container: cid,
                        });
                    }
                }
                Some((cid, old, new))
            }
            _ => None,
        };

        if let Some((cid, Some(old), _)) = &rekey {
            if let Some(index) = self.container_mut(*cid)?.index.as_mut() {
                index.remove(old);
            }
        }
        self.node_mut(item)?.data.set_name(new_name.to_string());
        if let Some((cid, _, Some(new))) = rekey {
            if let Some(index) = self.container_mut(cid)?.index.as_mut() {
                index.insert(new, item);
            }
        }
        self.evict(item);
        trace!(item = %item, name = new_name, "renamed");
        Ok(())
    }

    /// Freezes the container and exactly the items it declares.
    pub fn freeze_container(&mut self, cid: ContainerId) -> Result<(), ModelError> {
        let owner = self.container(cid)?.owner;
        self.initialize(owner)?;
        if self.container(cid)?.frozen {
            return Ok(());
        }
        let items = self.container(cid)?.items.clone();
        for item in items {
            self.set_immutable(item)?;
        }
        self.container_mut(cid)?.frozen = true;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal linking, no lifecycle checks
    // -----------------------------------------------------------------------

    /// Appends `item` to the list and the index, and links it to the owner.
    pub(crate) fn attach_item(
        &mut self,
        cid: ContainerId,
        item: NodeId,
        key: Option<String>,
    ) -> Result<(), ModelError> {
        let (owner, role) = {
            let c = self.container(cid)?;
            (c.owner, c.role)
        };
        if let Some(key) = &key {
            if self.container(cid)?.index_get(key).is_some() {
                return Err(ModelError::DuplicateKey {
                    key: key.clone(),
                    role,
                    container: cid,
                });
            }
        }
        self.node_mut(item)?.parent = Some(Parent::Container(cid));
        let container = self.container_mut(cid)?;
        container.items.push(item);
        if let (Some(index), Some(key)) = (container.index.as_mut(), key) {
            index.insert(key, item);
        }
        self.add_ownership_edge(owner, item, Ownership::Item(role));
        Ok(())
    }

    pub(crate) fn detach_item(&mut self, cid: ContainerId, item: NodeId) -> Result<(), ModelError> {
        let owner = self.container(cid)?.owner;
        let container = self.container_mut(cid)?;
        container.items.retain(|&i| i != item);
        if let Some(index) = container.index.as_mut() {
            index.retain(|_, &mut v| v != item);
        }
        self.node_mut(item)?.parent = None;
        self.remove_ownership_edge(owner, item);
        Ok(())
    }

    /// Recomputes the index of `cid` from its item list.
    pub(crate) fn rebuild_index(&mut self, cid: ContainerId) -> Result<(), ModelError> {
        let (role, items) = {
            let c = self.container(cid)?;
            if c.index.is_none() {
                return Ok(());
            }
            (c.role, c.items.clone())
        };
        let mut index = HashMap::with_capacity(items.len());
        for item in items {
            if let Some(key) = self.key_of(item)? {
                if index.insert(key.clone(), item).is_some() {
                    return Err(ModelError::DuplicateKey {
                        key,
                        role,
                        container: cid,
                    });
                }
            }
        }
        self.container_mut(cid)?.index = Some(index);
        Ok(())
    }
}
