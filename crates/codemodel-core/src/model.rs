//! CodeModel: the context owning every node, container and lookup cache.
//!
//! [`CodeModel`] is the single entry point for building, editing and querying
//! a model. Nodes live in a private `StableGraph` whose edges record exclusive
//! ownership (owner -> child); containers live in a side arena. All mutation
//! goes through `CodeModel` methods so the lifecycle rules, the container
//! indexes and the ownership edges stay consistent.
//!
//! The context also owns the qualified-name lookup cache and the optional
//! [`DeclarationSource`]. Several contexts can coexist; [`CodeModel::close`]
//! tears one down deterministically.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{Dfs, EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use tracing::debug;

use crate::container::{ContainerData, Role};
use crate::declaration::{DeclHandle, DeclKind, Declaration, DeclarationSource};
use crate::error::ModelError;
use crate::id::{ContainerId, NodeId};
use crate::lifecycle::Lifecycle;
use crate::node::{
    AnnotationNode, DocNode, ExpressionNode, FieldNode, MethodNode, Node, NodeData, NodeKind,
    Origin, PackageNode, Parent, ParameterNode, TypeNode, UnitNode,
};
use crate::types::{Modifier, TypeKind, TypeRef};

/// Ownership edge in the node arena. Points from owner to owned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Child is an item of the owner's container with this role.
    Item(Role),
    /// Child is the owner's body or initializer.
    Slot,
}

/// The code model context.
pub struct CodeModel {
    graph: StableGraph<Node, Ownership, Directed, u32>,
    pub(crate) containers: Vec<ContainerData>,
    source: Option<Box<dyn DeclarationSource>>,
    /// Qualified name -> node, for external views and explicit bindings.
    cache: HashMap<String, NodeId>,
    root: NodeId,
    closed: bool,
}

impl fmt::Debug for CodeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeModel")
            .field("nodes", &self.graph.node_count())
            .field("containers", &self.containers.len())
            .field("cached", &self.cache.len())
            .field("has_source", &self.source.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Default for CodeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeModel {
    /// Creates an empty context with an authored, unnamed root package.
    pub fn new() -> Self {
        let mut model = CodeModel {
            graph: StableGraph::new(),
            containers: Vec::new(),
            source: None,
            cache: HashMap::new(),
            root: NodeId(0),
            closed: false,
        };
        model.root = model.alloc(
            NodeData::Package(PackageNode {
                name: String::new(),
            }),
            Origin::Authored,
            Lifecycle::ready(),
        );
        model
    }

    /// Creates a context that resolves unknown qualified names through `source`.
    pub fn with_source(source: impl DeclarationSource + 'static) -> Self {
        let mut model = Self::new();
        model.source = Some(Box::new(source));
        model
    }

    /// Replaces the declaration source. Cached external views are kept.
    pub fn set_source(&mut self, source: impl DeclarationSource + 'static) {
        self.source = Some(Box::new(source));
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Tears the context down: drops the source, the cache and every node.
    /// Any later operation fails with [`ModelError::IllegalState`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!(
            nodes = self.graph.node_count(),
            cached = self.cache.len(),
            "closing code model"
        );
        self.source = None;
        self.cache.clear();
        self.graph.clear();
        self.containers.clear();
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn check_open(&self) -> Result<(), ModelError> {
        if self.closed {
            return Err(ModelError::illegal_state("code model is closed"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Arena access
    // -----------------------------------------------------------------------

    /// Looks up a node by ID.
    pub fn node(&self, id: NodeId) -> Result<&Node, ModelError> {
        self.check_open()?;
        self.graph
            .node_weight(id.into())
            .ok_or(ModelError::NodeNotFound { id })
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ModelError> {
        self.check_open()?;
        self.graph
            .node_weight_mut(id.into())
            .ok_or(ModelError::NodeNotFound { id })
    }

    pub fn kind(&self, id: NodeId) -> Result<NodeKind, ModelError> {
        Ok(self.node(id)?.kind())
    }

    pub fn name(&self, id: NodeId) -> Result<Option<&str>, ModelError> {
        Ok(self.node(id)?.name())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<Parent>, ModelError> {
        Ok(self.node(id)?.parent)
    }

    /// The node that exclusively owns `id`, if any.
    pub fn owner(&self, id: NodeId) -> Result<Option<NodeId>, ModelError> {
        Ok(match self.node(id)?.parent {
            Some(Parent::Container(cid)) => Some(self.container(cid)?.owner()),
            Some(Parent::Slot(owner)) => Some(owner),
            None => None,
        })
    }

    /// Children exclusively owned by `id` (container items and slot), in no
    /// particular order.
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, ModelError> {
        self.node(id)?;
        Ok(self
            .graph
            .neighbors_directed(id.into(), Direction::Outgoing)
            .map(NodeId::from)
            .collect())
    }

    /// `id` and every node it transitively owns that has been materialized.
    pub fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>, ModelError> {
        self.node(id)?;
        let mut dfs = Dfs::new(&self.graph, NodeIndex::<u32>::from(id));
        let mut out = Vec::new();
        while let Some(idx) = dfs.next(&self.graph) {
            out.push(NodeId::from(idx));
        }
        Ok(out)
    }

    /// Whether `ancestor` is `id` itself or transitively owns it.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> Result<bool, ModelError> {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return Ok(true);
            }
            current = self.owner(node)?;
        }
        Ok(false)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    // -----------------------------------------------------------------------
    // Allocation
    // -----------------------------------------------------------------------

    /// Adds a node and one empty container per role of its kind.
    pub(crate) fn alloc(&mut self, data: NodeData, origin: Origin, lifecycle: Lifecycle) -> NodeId {
        let kind = data.kind();
        let id = self.alloc_bare(data, origin, lifecycle);
        for &role in kind.roles() {
            let cid = self.new_container(id, role);
            if let Some(node) = self.graph.node_weight_mut(id.into()) {
                node.containers.push(cid);
            }
        }
        id
    }

    /// Adds a node without containers. The copy engine adds them itself.
    pub(crate) fn alloc_bare(&mut self, data: NodeData, origin: Origin, lifecycle: Lifecycle) -> NodeId {
        NodeId::from(self.graph.add_node(Node::new(data, origin, lifecycle)))
    }

    pub(crate) fn new_container(&mut self, owner: NodeId, role: Role) -> ContainerId {
        let cid = ContainerId(self.containers.len() as u32);
        self.containers.push(ContainerData::new(owner, role));
        cid
    }

    pub(crate) fn push_container(&mut self, owner: NodeId, cid: ContainerId) -> Result<(), ModelError> {
        self.node_mut(owner)?.containers.push(cid);
        Ok(())
    }

    pub(crate) fn add_ownership_edge(&mut self, owner: NodeId, child: NodeId, edge: Ownership) {
        self.graph.add_edge(owner.into(), child.into(), edge);
    }

    pub(crate) fn remove_ownership_edge(&mut self, owner: NodeId, child: NodeId) {
        if let Some(edge) = self.graph.find_edge(owner.into(), child.into()) {
            self.graph.remove_edge(edge);
        }
    }

    // -----------------------------------------------------------------------
    // Builder API: detached authored nodes
    // -----------------------------------------------------------------------

    fn authored(&mut self, data: NodeData) -> Result<NodeId, ModelError> {
        self.check_open()?;
        if let Some(name) = data.name() {
            validate_name(data.kind(), name)?;
        }
        Ok(self.alloc(data, Origin::Authored, Lifecycle::ready()))
    }

    pub fn new_package(&mut self, name: &str) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Package(PackageNode { name: name.into() }))
    }

    pub fn new_unit(&mut self, name: &str) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Unit(UnitNode {
            name: name.into(),
            imports: Vec::new(),
        }))
    }

    pub fn new_type(&mut self, name: &str, type_kind: TypeKind) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Type(TypeNode {
            name: name.into(),
            type_kind,
            modifiers: BTreeSet::new(),
            supertypes: Vec::new(),
        }))
    }

    /// A method; `None` return type makes it a constructor.
    pub fn new_method(&mut self, name: &str, return_type: Option<TypeRef>) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Method(MethodNode {
            name: name.into(),
            modifiers: BTreeSet::new(),
            return_type,
        }))
    }

    pub fn new_field(&mut self, name: &str, ty: TypeRef) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Field(FieldNode {
            name: name.into(),
            modifiers: BTreeSet::new(),
            ty,
        }))
    }

    pub fn new_parameter(&mut self, name: &str, ty: TypeRef) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Parameter(ParameterNode {
            name: name.into(),
            ty,
        }))
    }

    pub fn new_annotation(&mut self, ty: TypeRef) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Annotation(AnnotationNode {
            ty,
            values: Default::default(),
        }))
    }

    pub fn new_doc(&mut self, text: &str) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Doc(DocNode { text: text.into() }))
    }

    pub fn new_expression(&mut self, text: &str) -> Result<NodeId, ModelError> {
        self.authored(NodeData::Expression(ExpressionNode {
            text: text.into(),
            target: None,
        }))
    }

    // -----------------------------------------------------------------------
    // External views and lazy population
    // -----------------------------------------------------------------------

    /// Creates a lazy, system-immutable view over `decl`.
    pub fn external(&mut self, decl: Declaration) -> Result<NodeId, ModelError> {
        self.check_open()?;
        let data = data_from_decl(&decl)?;
        Ok(self.alloc(
            data,
            Origin::ExternalView(DeclHandle::new(decl)),
            Lifecycle::pending(),
        ))
    }

    /// Runs the population hook once. Idempotent; re-entry and retry after a
    /// failed population are [`ModelError::IllegalState`].
    pub fn initialize(&mut self, id: NodeId) -> Result<(), ModelError> {
        let node = self.node_mut(id)?;
        if !node.lifecycle.begin()? {
            return Ok(());
        }
        let handle = match &node.origin {
            Origin::ExternalView(handle) => Some(handle.clone()),
            Origin::Authored | Origin::Copy { .. } => None,
        };

        let result = match &handle {
            Some(handle) => self.populate(id, handle),
            None => Ok(()),
        };

        let node = self.node_mut(id)?;
        match result {
            Ok(()) => {
                node.lifecycle.finish()?;
                if node.origin.is_system_immutable() {
                    node.lifecycle.freeze()?;
                }
                debug!(node = %id, kind = %node.kind(), "initialized");
                Ok(())
            }
            Err(err) => {
                node.lifecycle.fail();
                debug!(node = %id, error = %err, "initialization failed");
                Err(err)
            }
        }
    }

    /// Materializes the children of an external view from its declaration.
    fn populate(&mut self, id: NodeId, handle: &DeclHandle) -> Result<(), ModelError> {
        let owner_kind = self.kind(id)?;
        for child_decl in &handle.declaration().children {
            let child = self.external(child_decl.clone())?;
            let child_kind = self.kind(child)?;
            if child_kind == NodeKind::Expression && owner_kind.has_slot() {
                if self.node(id)?.slot.is_some() {
                    return Err(ModelError::mismatch(format!(
                        "{owner_kind} declaration has more than one body"
                    )));
                }
                self.attach_slot(id, child)?;
                continue;
            }
            let role = Role::for_item(child_kind);
            let cid = self.find_container(id, role)?.ok_or_else(|| {
                ModelError::mismatch(format!("{owner_kind} declaration cannot hold a {child_kind}"))
            })?;
            let key = self.index_key(cid, child)?;
            self.attach_item(cid, child, key)?;
        }
        Ok(())
    }

    /// Initializes `id` and everything it owns, recursively.
    pub fn materialize(&mut self, id: NodeId) -> Result<(), ModelError> {
        self.initialize(id)?;
        for child in self.children(id)? {
            self.materialize(child)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutability
    // -----------------------------------------------------------------------

    /// Frozen OR system-immutable.
    pub fn is_immutable(&self, id: NodeId) -> Result<bool, ModelError> {
        Ok(self.node(id)?.is_immutable())
    }

    /// Precondition of every setter.
    pub fn verify_mutable(&self, id: NodeId) -> Result<(), ModelError> {
        let node = self.node(id)?;
        if node.is_immutable() {
            return Err(ModelError::ReadOnly {
                node: id,
                kind: node.kind(),
                snippet: self.snippet(id),
            });
        }
        Ok(())
    }

    /// Freezes `id` and everything it exclusively owns. Initializes first;
    /// repeated calls are no-ops.
    pub fn set_immutable(&mut self, id: NodeId) -> Result<(), ModelError> {
        self.initialize(id)?;
        if self.node(id)?.lifecycle.is_frozen() {
            return Ok(());
        }
        let containers = self.node(id)?.containers.clone();
        for cid in containers {
            self.freeze_container(cid)?;
        }
        if let Some(slot) = self.node(id)?.slot {
            self.set_immutable(slot)?;
        }
        self.node_mut(id)?.lifecycle.freeze()?;
        debug!(node = %id, "frozen");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Setters
    // -----------------------------------------------------------------------

    /// Applies `edit` to the payload of a mutable node. `edit` returns `None`
    /// when the payload has the wrong kind.
    fn edit<R>(
        &mut self,
        id: NodeId,
        what: &str,
        edit: impl FnOnce(&mut NodeData) -> Option<R>,
    ) -> Result<R, ModelError> {
        self.initialize(id)?;
        self.verify_mutable(id)?;
        let node = self.node_mut(id)?;
        let kind = node.kind();
        edit(&mut node.data)
            .ok_or_else(|| ModelError::mismatch(format!("a {kind} has no {what}")))
    }

    /// Renames a node. Nodes held by an indexed container are re-keyed
    /// atomically; see [`CodeModel::rename`].
    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), ModelError> {
        self.rename(id, name)
    }

    pub fn set_modifiers(
        &mut self,
        id: NodeId,
        modifiers: impl IntoIterator<Item = Modifier>,
    ) -> Result<(), ModelError> {
        let modifiers: BTreeSet<Modifier> = modifiers.into_iter().collect();
        self.edit(id, "modifiers", |data| {
            data.modifiers_mut().map(|m| *m = modifiers)
        })
    }

    pub fn add_modifier(&mut self, id: NodeId, modifier: Modifier) -> Result<(), ModelError> {
        self.edit(id, "modifiers", |data| {
            data.modifiers_mut().map(|m| {
                m.insert(modifier);
            })
        })
    }

    /// Sets a field type, parameter type or method return type.
    ///
    /// Changing a parameter type changes the owning method's signature key,
    /// which is checked for collisions before anything is written.
    pub fn set_type_ref(&mut self, id: NodeId, ty: TypeRef) -> Result<(), ModelError> {
        self.initialize(id)?;
        self.verify_mutable(id)?;
        let rekey = match (&self.node(id)?.data, self.node(id)?.parent) {
            (NodeData::Parameter(_), Some(Parent::Container(params))) => {
                let mut types = self.param_types_of_container(params)?;
                let position = self
                    .container(params)?
                    .items()
                    .iter()
                    .position(|&p| p == id)
                    .ok_or_else(|| ModelError::illegal_state("parameter missing from its container"))?;
                types[position] = ty.simple_name().to_string();
                self.plan_rekey(params, types)?
            }
            _ => None,
        };
        self.edit(id, "type", |data| match data {
            NodeData::Field(f) => {
                f.ty = ty;
                Some(())
            }
            NodeData::Parameter(p) => {
                p.ty = ty;
                Some(())
            }
            NodeData::Method(m) => {
                m.return_type = Some(ty);
                Some(())
            }
            NodeData::Package(_)
            | NodeData::Unit(_)
            | NodeData::Type(_)
            | NodeData::Annotation(_)
            | NodeData::Doc(_)
            | NodeData::Expression(_) => None,
        })?;
        if let Some(rekey) = rekey {
            self.apply_rekey(rekey);
        }
        Ok(())
    }

    pub fn set_supertypes(&mut self, id: NodeId, supertypes: Vec<TypeRef>) -> Result<(), ModelError> {
        self.edit(id, "supertypes", |data| match data {
            NodeData::Type(t) => {
                t.supertypes = supertypes;
                Some(())
            }
            _ => None,
        })
    }

    pub fn set_type_kind(&mut self, id: NodeId, type_kind: TypeKind) -> Result<(), ModelError> {
        self.edit(id, "type kind", |data| match data {
            NodeData::Type(t) => {
                t.type_kind = type_kind;
                Some(())
            }
            _ => None,
        })
    }

    pub fn set_imports(&mut self, id: NodeId, imports: Vec<String>) -> Result<(), ModelError> {
        self.edit(id, "imports", |data| match data {
            NodeData::Unit(u) => {
                u.imports = imports;
                Some(())
            }
            _ => None,
        })
    }

    /// Sets the text of a doc line or expression.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<(), ModelError> {
        self.edit(id, "text", |data| match data {
            NodeData::Doc(d) => {
                d.text = text.to_string();
                Some(())
            }
            NodeData::Expression(e) => {
                e.text = text.to_string();
                Some(())
            }
            _ => None,
        })
    }

    /// Points an expression at a resolved symbol (REFERENCE edge).
    pub fn set_target(&mut self, id: NodeId, target: Option<NodeId>) -> Result<(), ModelError> {
        if let Some(target) = target {
            self.node(target)?;
        }
        self.edit(id, "symbol target", |data| match data {
            NodeData::Expression(e) => {
                e.target = target;
                Some(())
            }
            _ => None,
        })
    }

    pub fn set_annotation_value(&mut self, id: NodeId, key: &str, value: &str) -> Result<(), ModelError> {
        self.edit(id, "element values", |data| match data {
            NodeData::Annotation(a) => {
                a.values.insert(key.to_string(), value.to_string());
                Some(())
            }
            _ => None,
        })
    }

    /// Sets a method body. See [`CodeModel::set_slot`].
    pub fn set_body(&mut self, method: NodeId, body: Option<NodeId>) -> Result<Option<NodeId>, ModelError> {
        if self.kind(method)? != NodeKind::Method {
            return Err(ModelError::mismatch("only methods have a body"));
        }
        self.set_slot(method, body)
    }

    /// Sets a field initializer. See [`CodeModel::set_slot`].
    pub fn set_initializer(&mut self, field: NodeId, init: Option<NodeId>) -> Result<Option<NodeId>, ModelError> {
        if self.kind(field)? != NodeKind::Field {
            return Err(ModelError::mismatch("only fields have an initializer"));
        }
        self.set_slot(field, init)
    }

    /// Replaces the single-child slot of `owner` and returns the id actually
    /// stored. An expression owned elsewhere (or immutable) is copied rather
    /// than moved; the previous slot child is detached, not destroyed.
    pub fn set_slot(&mut self, owner: NodeId, child: Option<NodeId>) -> Result<Option<NodeId>, ModelError> {
        self.initialize(owner)?;
        self.verify_mutable(owner)?;
        if let Some(child) = child {
            if self.kind(child)? != NodeKind::Expression {
                return Err(ModelError::mismatch("a body or initializer must be an expression"));
            }
            if self.node(owner)?.slot == Some(child) {
                return Ok(Some(child));
            }
        }
        let stored = match child {
            Some(child) if self.needs_copy(child)? => Some(self.copy(child)?),
            Some(child) => {
                if self.is_ancestor_or_self(child, owner)? {
                    return Err(ModelError::mismatch("a node cannot own one of its ancestors"));
                }
                Some(child)
            }
            None => None,
        };
        self.detach_slot(owner)?;
        if let Some(stored) = stored {
            self.attach_slot(owner, stored)?;
        }
        Ok(stored)
    }

    /// A node that already has an owner, or cannot be re-parented, is copied
    /// on adoption instead of moved.
    pub(crate) fn needs_copy(&self, id: NodeId) -> Result<bool, ModelError> {
        let node = self.node(id)?;
        Ok(node.parent.is_some() || node.is_immutable())
    }

    pub(crate) fn attach_slot(&mut self, owner: NodeId, child: NodeId) -> Result<(), ModelError> {
        self.node_mut(child)?.parent = Some(Parent::Slot(owner));
        self.node_mut(owner)?.slot = Some(child);
        self.add_ownership_edge(owner, child, Ownership::Slot);
        Ok(())
    }

    pub(crate) fn detach_slot(&mut self, owner: NodeId) -> Result<Option<NodeId>, ModelError> {
        let old = self.node_mut(owner)?.slot.take();
        if let Some(old) = old {
            self.node_mut(old)?.parent = None;
            self.remove_ownership_edge(owner, old);
        }
        Ok(old)
    }

    /// Replaces the payload of a node wholesale. Used by the merge engine
    /// after its validation pass.
    pub(crate) fn replace_data(&mut self, id: NodeId, data: NodeData) -> Result<(), ModelError> {
        self.node_mut(id)?.data = data;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Qualified names and lookup
    // -----------------------------------------------------------------------

    /// Dotted name of `id`: enclosing packages and types, then its own name.
    pub fn qualified_name(&self, id: NodeId) -> Result<String, ModelError> {
        let mut parts: Vec<String> = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id)?;
            match node.kind() {
                NodeKind::Unit | NodeKind::Doc | NodeKind::Expression => {}
                NodeKind::Package
                | NodeKind::Type
                | NodeKind::Method
                | NodeKind::Field
                | NodeKind::Parameter
                | NodeKind::Annotation => {
                    if let Some(name) = node.name().filter(|n| !n.is_empty()) {
                        parts.push(name.to_string());
                    }
                }
            }
            current = self.owner(node_id)?;
            if current.is_none() {
                if let Some(prefix) = self.detached_prefix(node_id)? {
                    parts.extend(prefix.rsplit('.').filter(|p| !p.is_empty()).map(String::from));
                }
            }
        }
        parts.reverse();
        Ok(parts.join("."))
    }

    /// Qualifier of a node with no owner: the declared package of an
    /// external view, or the qualifier of the node a copy was made from.
    fn detached_prefix(&self, id: NodeId) -> Result<Option<String>, ModelError> {
        match &self.node(id)?.origin {
            Origin::Authored => Ok(None),
            Origin::ExternalView(handle) => Ok(handle.declaration().package.clone()),
            Origin::Copy { of } => {
                let qualified = self.qualified_name(*of)?;
                Ok(qualified.rsplit_once('.').map(|(prefix, _)| prefix.to_string()))
            }
        }
    }

    /// Binds `qualified_name` to `id` in this context's lookup cache.
    pub fn bind(&mut self, qualified_name: &str, id: NodeId) -> Result<(), ModelError> {
        self.node(id)?;
        self.cache.insert(qualified_name.to_string(), id);
        Ok(())
    }

    /// Resolves a qualified name: cache, then the authored tree under the
    /// root package, then the declaration source. Source hits become
    /// external views and are cached.
    pub fn lookup(&mut self, qualified_name: &str) -> Result<Option<NodeId>, ModelError> {
        self.check_open()?;
        if let Some(&id) = self.cache.get(qualified_name) {
            return Ok(Some(id));
        }
        if let Some(id) = self.find_authored(qualified_name)? {
            return Ok(Some(id));
        }
        let decl = match &self.source {
            Some(source) => source.lookup(qualified_name),
            None => None,
        };
        match decl {
            Some(decl) => {
                let id = self.external(decl)?;
                debug!(name = qualified_name, node = %id, "loaded external declaration");
                self.cache.insert(qualified_name.to_string(), id);
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Like [`lookup`](Self::lookup), but a miss is [`ModelError::ObjectNotFound`].
    pub fn lookup_required(&mut self, qualified_name: &str) -> Result<NodeId, ModelError> {
        self.lookup(qualified_name)?
            .ok_or_else(|| ModelError::ObjectNotFound {
                what: format!("declaration '{qualified_name}'"),
            })
    }

    /// Asks the source for the counterpart representation of `id`.
    pub(crate) fn counterpart_of(&self, id: NodeId) -> Result<Option<Declaration>, ModelError> {
        let name = self.qualified_name(id)?;
        Ok(self.source.as_ref().and_then(|s| s.counterpart(&name)))
    }

    fn find_authored(&self, qualified_name: &str) -> Result<Option<NodeId>, ModelError> {
        let mut current = self.root;
        for segment in qualified_name.split('.') {
            let next = match self.kind(current)? {
                NodeKind::Package => {
                    let packages = self.container_of(current, Role::Packages)?;
                    match self.container(packages)?.index_get(segment) {
                        Some(pkg) => Some(pkg),
                        None => self.find_type_in_units(current, segment)?,
                    }
                }
                NodeKind::Type => {
                    let types = self.container_of(current, Role::Types)?;
                    self.container(types)?.index_get(segment)
                }
                _ => None,
            };
            match next {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn find_type_in_units(&self, package: NodeId, name: &str) -> Result<Option<NodeId>, ModelError> {
        let units = self.container_of(package, Role::Units)?;
        for &unit in self.container(units)?.items() {
            let types = self.container_of(unit, Role::Types)?;
            if let Some(found) = self.container(types)?.index_get(name) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    pub(crate) fn evict(&mut self, id: NodeId) {
        self.cache.retain(|_, cached| *cached != id);
    }

    // -----------------------------------------------------------------------
    // Debug consistency assertion
    // -----------------------------------------------------------------------

    /// Verifies that every ownership edge matches the child's parent link and
    /// that every container index agrees with its item list.
    pub fn assert_consistency(&self) {
        for edge in self.graph.edge_references() {
            let owner = NodeId::from(edge.source());
            let child = NodeId::from(edge.target());
            let parent = self.graph[edge.target()].parent;
            match (edge.weight(), parent) {
                (Ownership::Slot, Some(Parent::Slot(p))) => assert_eq!(p, owner),
                (Ownership::Item(role), Some(Parent::Container(cid))) => {
                    let container = &self.containers[cid.index()];
                    assert_eq!(container.owner(), owner, "edge owner mismatch for {child:?}");
                    assert_eq!(container.role(), *role);
                }
                (edge, parent) => panic!("edge {edge:?} disagrees with parent {parent:?} of {child:?}"),
            }
        }
        for container in &self.containers {
            container.assert_consistency();
        }
    }
}

/// Header payload of an external view, built from its declaration.
fn data_from_decl(decl: &Declaration) -> Result<NodeData, ModelError> {
    let modifiers = || decl.modifiers.iter().copied().collect::<BTreeSet<_>>();
    let type_ref = |what: &str| {
        decl.type_name
            .as_deref()
            .map(TypeRef::named)
            .ok_or_else(|| ModelError::mismatch(format!("{what} declaration '{}' has no type", decl.name)))
    };
    Ok(match decl.kind {
        DeclKind::Package => NodeData::Package(PackageNode {
            name: decl.name.clone(),
        }),
        DeclKind::Unit => NodeData::Unit(UnitNode {
            name: decl.name.clone(),
            imports: decl.imports.clone(),
        }),
        DeclKind::Type => NodeData::Type(TypeNode {
            name: decl.name.clone(),
            type_kind: decl.type_kind.unwrap_or_default(),
            modifiers: modifiers(),
            supertypes: decl.supertypes.iter().map(TypeRef::named).collect(),
        }),
        DeclKind::Method => NodeData::Method(MethodNode {
            name: decl.name.clone(),
            modifiers: modifiers(),
            return_type: decl.type_name.as_deref().map(TypeRef::named),
        }),
        DeclKind::Field => NodeData::Field(FieldNode {
            name: decl.name.clone(),
            modifiers: modifiers(),
            ty: type_ref("field")?,
        }),
        DeclKind::Parameter => NodeData::Parameter(ParameterNode {
            name: decl.name.clone(),
            ty: type_ref("parameter")?,
        }),
        DeclKind::Annotation => NodeData::Annotation(AnnotationNode {
            ty: TypeRef::named(decl.name.clone()),
            values: decl.values.clone(),
        }),
        DeclKind::Doc => NodeData::Doc(DocNode {
            text: decl.value.clone().unwrap_or_default(),
        }),
        DeclKind::Expression => NodeData::Expression(ExpressionNode {
            text: decl.value.clone().unwrap_or_default(),
            target: None,
        }),
    })
}

/// Identifier rules per kind. Units and annotation types may be dotted.
pub(crate) fn validate_name(kind: NodeKind, name: &str) -> Result<(), ModelError> {
    let is_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    };
    let valid = match kind {
        NodeKind::Unit | NodeKind::Annotation => !name.is_empty() && name.split('.').all(is_ident),
        NodeKind::Package
        | NodeKind::Type
        | NodeKind::Method
        | NodeKind::Field
        | NodeKind::Parameter => is_ident(name),
        NodeKind::Doc | NodeKind::Expression => true,
    };
    if valid {
        Ok(())
    } else {
        Err(ModelError::InvalidName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_decl() -> Declaration {
        Declaration::class("lib", "Base")
            .with_modifier(Modifier::Public)
            .with_child(Declaration::field("count", "int"))
            .with_child(
                Declaration::method("run", "void")
                    .with_child(Declaration::parameter("times", "int"))
                    .with_child(Declaration::expression("count += times;")),
            )
    }

    #[test]
    fn new_model_has_authored_root_package() {
        let model = CodeModel::new();
        let root = model.node(model.root()).unwrap();
        assert_eq!(root.kind(), NodeKind::Package);
        assert!(!root.is_immutable());
        assert_eq!(root.containers().len(), 2);
    }

    #[test]
    fn external_view_is_immutable_before_initialization() {
        let mut model = CodeModel::new();
        let ext = model.external(class_decl()).unwrap();
        assert!(model.is_immutable(ext).unwrap());
        assert!(!model.node(ext).unwrap().lifecycle().is_initialized());
        assert!(model.children(ext).unwrap().is_empty());
    }

    #[test]
    fn initialize_populates_children_once() {
        let mut model = CodeModel::new();
        let ext = model.external(class_decl()).unwrap();
        model.initialize(ext).unwrap();
        let count = model.node_count();
        model.initialize(ext).unwrap();
        assert_eq!(model.node_count(), count);

        assert!(model.node(ext).unwrap().lifecycle().is_frozen());
        assert_eq!(model.children(ext).unwrap().len(), 2);
    }

    #[test]
    fn method_body_lands_in_slot() {
        let mut model = CodeModel::new();
        let ext = model.external(class_decl()).unwrap();
        model.materialize(ext).unwrap();
        let methods = model.container_of(ext, Role::Methods).unwrap();
        let run = model.get_declared(methods, "run(int)").unwrap().unwrap();
        let body = model.node(run).unwrap().slot().unwrap();
        assert_eq!(model.kind(body).unwrap(), NodeKind::Expression);
        assert_eq!(model.parent(body).unwrap(), Some(Parent::Slot(run)));
    }

    #[test]
    fn failed_population_is_never_retried() {
        let mut model = CodeModel::new();
        // Two bodies for one method is structurally invalid.
        let bad = Declaration::method("m", "void")
            .with_child(Declaration::expression("a();"))
            .with_child(Declaration::expression("b();"));
        let ext = model.external(bad).unwrap();
        assert!(matches!(model.initialize(ext), Err(ModelError::ObjectMismatch { .. })));
        assert!(matches!(model.initialize(ext), Err(ModelError::IllegalState { .. })));
    }

    #[test]
    fn setters_reject_wrong_kind() {
        let mut model = CodeModel::new();
        let doc = model.new_doc("hello").unwrap();
        let err = model.set_supertypes(doc, vec![]).unwrap_err();
        assert!(matches!(err, ModelError::ObjectMismatch { .. }));
    }

    #[test]
    fn setters_fail_on_frozen_node_with_snippet() {
        let mut model = CodeModel::new();
        let field = model.new_field("count", TypeRef::named("int")).unwrap();
        model.set_immutable(field).unwrap();
        match model.add_modifier(field, Modifier::Final) {
            Err(ModelError::ReadOnly { node, kind, snippet }) => {
                assert_eq!(node, field);
                assert_eq!(kind, NodeKind::Field);
                assert_eq!(snippet, "int count");
            }
            other => panic!("expected ReadOnly, got {other:?}"),
        }
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut model = CodeModel::new();
        assert!(matches!(
            model.new_type("1abc", TypeKind::Class),
            Err(ModelError::InvalidName { .. })
        ));
        assert!(model.new_unit("Foo.java").is_ok());
        assert!(model.new_annotation(TypeRef::named("java.lang.Override")).is_ok());
    }

    #[test]
    fn lookup_prefers_authored_tree_then_source() {
        struct One;
        impl DeclarationSource for One {
            fn lookup(&self, name: &str) -> Option<Declaration> {
                (name == "lib.Base").then(class_decl)
            }
        }

        let mut model = CodeModel::with_source(One);
        let root = model.root();
        let pkg = model.new_package("app").unwrap();
        let packages = model.container_of(root, Role::Packages).unwrap();
        model.add(packages, pkg).unwrap();
        let unit = model.new_unit("Main.java").unwrap();
        let units = model.container_of(pkg, Role::Units).unwrap();
        model.add(units, unit).unwrap();
        let main = model.new_type("Main", TypeKind::Class).unwrap();
        let types = model.container_of(unit, Role::Types).unwrap();
        model.add(types, main).unwrap();

        assert_eq!(model.lookup("app.Main").unwrap(), Some(main));
        assert_eq!(model.qualified_name(main).unwrap(), "app.Main");

        let base = model.lookup("lib.Base").unwrap().unwrap();
        assert!(model.is_immutable(base).unwrap());
        assert_eq!(model.lookup("lib.Base").unwrap(), Some(base));
        assert_eq!(model.qualified_name(base).unwrap(), "lib.Base");

        assert_eq!(model.lookup("lib.Missing").unwrap(), None);
        assert!(matches!(
            model.lookup_required("lib.Missing"),
            Err(ModelError::ObjectNotFound { .. })
        ));
    }

    #[test]
    fn closed_model_rejects_everything() {
        let mut model = CodeModel::new();
        let t = model.new_type("A", TypeKind::Class).unwrap();
        model.close();
        assert!(model.is_closed());
        assert!(matches!(model.node(t), Err(ModelError::IllegalState { .. })));
        assert!(matches!(model.lookup("A"), Err(ModelError::IllegalState { .. })));
        model.close();
    }

    #[test]
    fn set_body_copies_owned_expression() {
        let mut model = CodeModel::new();
        let a = model.new_method("a", None).unwrap();
        let b = model.new_method("b", None).unwrap();
        let expr = model.new_expression("return;").unwrap();

        assert_eq!(model.set_body(a, Some(expr)).unwrap(), Some(expr));
        let stored = model.set_body(b, Some(expr)).unwrap().unwrap();
        assert_ne!(stored, expr);
        assert_eq!(model.node(a).unwrap().slot(), Some(expr));
        assert_eq!(model.parent(stored).unwrap(), Some(Parent::Slot(b)));

        let stored = model.set_body(a, None).unwrap();
        assert!(stored.is_none());
        assert_eq!(model.parent(expr).unwrap(), None);
        model.assert_consistency();
    }
}
