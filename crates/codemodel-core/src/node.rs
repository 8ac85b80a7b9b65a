//! Node payloads for every construct in the code model.
//!
//! [`NodeData`] is a closed enum: traversals match on it exhaustively rather
//! than dispatching on runtime type checks, so adding a construct forces every
//! traversal (population, copy, merge, emission) to handle it.
//!
//! Edges out of a node carry a copy discipline:
//! - CHILD: the node's containers and its single-child slot (method body or
//!   field initializer). Exclusively owned.
//! - PARENT: [`Node::parent`], the reverse of a CHILD edge.
//! - REFERENCE: [`TypeRef::target`] and [`ExpressionNode::target`]. Shared,
//!   never copied.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::container::Role;
use crate::declaration::DeclHandle;
use crate::id::{ContainerId, NodeId};
use crate::lifecycle::Lifecycle;
use crate::types::{Modifier, TypeKind, TypeRef};

/// Fieldless discriminant of [`NodeData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Package,
    Unit,
    Type,
    Method,
    Field,
    Parameter,
    Annotation,
    Doc,
    Expression,
}

impl NodeKind {
    /// Containers a node of this kind owns, in emission order.
    pub fn roles(self) -> &'static [Role] {
        match self {
            NodeKind::Package => &[Role::Packages, Role::Units],
            NodeKind::Unit => &[Role::Types],
            NodeKind::Type => &[
                Role::Docs,
                Role::Annotations,
                Role::Fields,
                Role::Methods,
                Role::Types,
            ],
            NodeKind::Method => &[Role::Docs, Role::Annotations, Role::Parameters],
            NodeKind::Field => &[Role::Docs, Role::Annotations],
            NodeKind::Parameter => &[Role::Annotations],
            NodeKind::Annotation | NodeKind::Doc => &[],
            NodeKind::Expression => &[Role::Operands],
        }
    }

    /// Whether this kind has a single-child slot (body or initializer).
    pub fn has_slot(self) -> bool {
        matches!(self, NodeKind::Method | NodeKind::Field)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Package => "package",
            NodeKind::Unit => "compilation unit",
            NodeKind::Type => "type",
            NodeKind::Method => "method",
            NodeKind::Field => "field",
            NodeKind::Parameter => "parameter",
            NodeKind::Annotation => "annotation",
            NodeKind::Doc => "doc line",
            NodeKind::Expression => "expression",
        };
        f.write_str(s)
    }
}

/// Where a node came from. System-immutability is a pure function of this tag.
#[derive(Debug, Clone)]
pub enum Origin {
    /// Created through the builder API.
    Authored,
    /// Lazy view over an external declaration; permanently frozen.
    ExternalView(DeclHandle),
    /// Deep copy of another node.
    Copy { of: NodeId },
}

impl Origin {
    pub fn is_system_immutable(&self) -> bool {
        match self {
            Origin::ExternalView(_) => true,
            Origin::Authored | Origin::Copy { .. } => false,
        }
    }
}

/// Navigational back-edge to whatever exclusively owns a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// Item of a container.
    Container(ContainerId),
    /// Body of a method or initializer of a field.
    Slot(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageNode {
    pub name: String,
}

/// A compilation unit (one source file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitNode {
    pub name: String,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNode {
    pub name: String,
    pub type_kind: TypeKind,
    pub modifiers: BTreeSet<Modifier>,
    pub supertypes: Vec<TypeRef>,
}

/// A method; `return_type` is `None` for constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodNode {
    pub name: String,
    pub modifiers: BTreeSet<Modifier>,
    pub return_type: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub name: String,
    pub modifiers: BTreeSet<Modifier>,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNode {
    pub name: String,
    pub ty: TypeRef,
}

/// An annotation use. Keyed by its annotation type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationNode {
    pub ty: TypeRef,
    pub values: IndexMap<String, String>,
}

/// One documentation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocNode {
    pub text: String,
}

/// An expression or statement; operands live in its `Operands` container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionNode {
    pub text: String,
    /// Resolved symbol this expression refers to (REFERENCE edge).
    pub target: Option<NodeId>,
}

/// Kind-specific payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Package(PackageNode),
    Unit(UnitNode),
    Type(TypeNode),
    Method(MethodNode),
    Field(FieldNode),
    Parameter(ParameterNode),
    Annotation(AnnotationNode),
    Doc(DocNode),
    Expression(ExpressionNode),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Package(_) => NodeKind::Package,
            NodeData::Unit(_) => NodeKind::Unit,
            NodeData::Type(_) => NodeKind::Type,
            NodeData::Method(_) => NodeKind::Method,
            NodeData::Field(_) => NodeKind::Field,
            NodeData::Parameter(_) => NodeKind::Parameter,
            NodeData::Annotation(_) => NodeKind::Annotation,
            NodeData::Doc(_) => NodeKind::Doc,
            NodeData::Expression(_) => NodeKind::Expression,
        }
    }

    /// The declared name, for kinds that have one.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeData::Package(p) => Some(&p.name),
            NodeData::Unit(u) => Some(&u.name),
            NodeData::Type(t) => Some(&t.name),
            NodeData::Method(m) => Some(&m.name),
            NodeData::Field(f) => Some(&f.name),
            NodeData::Parameter(p) => Some(&p.name),
            NodeData::Annotation(a) => Some(&a.ty.name),
            NodeData::Doc(_) | NodeData::Expression(_) => None,
        }
    }

    /// Replaces the name. Returns `false` for unnamed kinds.
    pub(crate) fn set_name(&mut self, name: String) -> bool {
        match self {
            NodeData::Package(p) => p.name = name,
            NodeData::Unit(u) => u.name = name,
            NodeData::Type(t) => t.name = name,
            NodeData::Method(m) => m.name = name,
            NodeData::Field(f) => f.name = name,
            NodeData::Parameter(p) => p.name = name,
            NodeData::Annotation(a) => a.ty.name = name,
            NodeData::Doc(_) | NodeData::Expression(_) => return false,
        }
        true
    }

    pub fn modifiers(&self) -> Option<&BTreeSet<Modifier>> {
        match self {
            NodeData::Type(t) => Some(&t.modifiers),
            NodeData::Method(m) => Some(&m.modifiers),
            NodeData::Field(f) => Some(&f.modifiers),
            NodeData::Package(_)
            | NodeData::Unit(_)
            | NodeData::Parameter(_)
            | NodeData::Annotation(_)
            | NodeData::Doc(_)
            | NodeData::Expression(_) => None,
        }
    }

    pub(crate) fn modifiers_mut(&mut self) -> Option<&mut BTreeSet<Modifier>> {
        match self {
            NodeData::Type(t) => Some(&mut t.modifiers),
            NodeData::Method(m) => Some(&mut m.modifiers),
            NodeData::Field(f) => Some(&mut f.modifiers),
            NodeData::Package(_)
            | NodeData::Unit(_)
            | NodeData::Parameter(_)
            | NodeData::Annotation(_)
            | NodeData::Doc(_)
            | NodeData::Expression(_) => None,
        }
    }

    /// All REFERENCE targets held by this payload.
    pub fn references(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.for_each_reference(|target| out.push(*target));
        out
    }

    /// Rewrites every REFERENCE target through `map`.
    pub(crate) fn remap_references(&mut self, mut map: impl FnMut(NodeId) -> NodeId) {
        self.for_each_reference_mut(|target| *target = map(*target));
    }

    fn for_each_reference(&self, mut f: impl FnMut(&NodeId)) {
        match self {
            NodeData::Type(t) => t.supertypes.iter().filter_map(|r| r.target.as_ref()).for_each(f),
            NodeData::Method(m) => {
                if let Some(target) = m.return_type.as_ref().and_then(|r| r.target.as_ref()) {
                    f(target);
                }
            }
            NodeData::Field(fd) => fd.ty.target.iter().for_each(f),
            NodeData::Parameter(p) => p.ty.target.iter().for_each(f),
            NodeData::Annotation(a) => a.ty.target.iter().for_each(f),
            NodeData::Expression(e) => e.target.iter().for_each(f),
            NodeData::Package(_) | NodeData::Unit(_) | NodeData::Doc(_) => {}
        }
    }

    fn for_each_reference_mut(&mut self, mut f: impl FnMut(&mut NodeId)) {
        match self {
            NodeData::Type(t) => t
                .supertypes
                .iter_mut()
                .filter_map(|r| r.target.as_mut())
                .for_each(f),
            NodeData::Method(m) => {
                if let Some(target) = m.return_type.as_mut().and_then(|r| r.target.as_mut()) {
                    f(target);
                }
            }
            NodeData::Field(fd) => fd.ty.target.iter_mut().for_each(f),
            NodeData::Parameter(p) => p.ty.target.iter_mut().for_each(f),
            NodeData::Annotation(a) => a.ty.target.iter_mut().for_each(f),
            NodeData::Expression(e) => e.target.iter_mut().for_each(f),
            NodeData::Package(_) | NodeData::Unit(_) | NodeData::Doc(_) => {}
        }
    }
}

/// A node in the model arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) data: NodeData,
    pub(crate) origin: Origin,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) parent: Option<Parent>,
    /// Owned containers, one per role in `kind().roles()` order.
    pub(crate) containers: SmallVec<[ContainerId; 5]>,
    /// Method body or field initializer.
    pub(crate) slot: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(data: NodeData, origin: Origin, lifecycle: Lifecycle) -> Self {
        Node {
            data,
            origin,
            lifecycle,
            parent: None,
            containers: SmallVec::new(),
            slot: None,
        }
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn name(&self) -> Option<&str> {
        self.data.name()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn parent(&self) -> Option<Parent> {
        self.parent
    }

    pub fn slot(&self) -> Option<NodeId> {
        self.slot
    }

    pub fn containers(&self) -> &[ContainerId] {
        &self.containers
    }

    /// Frozen flag OR system-immutable origin.
    pub fn is_immutable(&self) -> bool {
        self.lifecycle.is_frozen() || self.origin.is_system_immutable()
    }
}
