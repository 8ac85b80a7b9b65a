//! Raw declarations and the [`DeclarationSource`] collaborator contract.
//!
//! A [`Declaration`] is the plain data an external collaborator (reflection
//! bridge, parser, JSON dump) hands to the model. The model wraps it in a
//! [`DeclHandle`] and materializes nodes from it lazily, on first access.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{Modifier, TypeKind};

/// Kind of a raw declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclKind {
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

/// A raw declaration tree.
///
/// Children are interpreted by kind: a method's `Expression` child is its
/// body, a field's is its initializer, an expression's are its operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclKind,
    #[serde(default)]
    pub name: String,
    /// Package of a top-level type; used to derive its qualified name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_kind: Option<TypeKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<Modifier>,
    /// Field type, method return type or parameter type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supertypes: Vec<String>,
    /// Imports of a compilation unit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    /// Doc line text or expression source text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Annotation element values, in declaration order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub values: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Declaration>,
}

impl Declaration {
    pub fn new(kind: DeclKind, name: impl Into<String>) -> Self {
        Declaration {
            kind,
            name: name.into(),
            package: None,
            type_kind: None,
            modifiers: Vec::new(),
            type_name: None,
            supertypes: Vec::new(),
            imports: Vec::new(),
            value: None,
            values: IndexMap::new(),
            children: Vec::new(),
        }
    }

    /// A top-level class declaration in `package`.
    pub fn class(package: &str, name: impl Into<String>) -> Self {
        let mut decl = Declaration::new(DeclKind::Type, name);
        if !package.is_empty() {
            decl.package = Some(package.to_string());
        }
        decl.type_kind = Some(TypeKind::Class);
        decl
    }

    pub fn method(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Declaration::new(DeclKind::Method, name).with_type(return_type)
    }

    pub fn field(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Declaration::new(DeclKind::Field, name).with_type(ty)
    }

    pub fn parameter(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Declaration::new(DeclKind::Parameter, name).with_type(ty)
    }

    pub fn annotation(name: impl Into<String>) -> Self {
        Declaration::new(DeclKind::Annotation, name)
    }

    pub fn doc(text: impl Into<String>) -> Self {
        Declaration::new(DeclKind::Doc, "").with_value(text)
    }

    pub fn expression(text: impl Into<String>) -> Self {
        Declaration::new(DeclKind::Expression, "").with_value(text)
    }

    pub fn with_type(mut self, ty: impl Into<String>) -> Self {
        self.type_name = Some(ty.into());
        self
    }

    pub fn with_type_kind(mut self, kind: TypeKind) -> Self {
        self.type_kind = Some(kind);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    pub fn with_supertype(mut self, name: impl Into<String>) -> Self {
        self.supertypes.push(name.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_element(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: Declaration) -> Self {
        self.children.push(child);
        self
    }

    /// Qualified name of a top-level declaration (`package.Name`).
    pub fn qualified_name(&self) -> String {
        match self.package.as_deref() {
            Some(pkg) if !pkg.is_empty() => format!("{}.{}", pkg, self.name),
            _ => self.name.clone(),
        }
    }
}

/// Shared handle to the declaration an external view mirrors.
#[derive(Debug, Clone)]
pub struct DeclHandle {
    decl: Rc<Declaration>,
}

impl DeclHandle {
    pub fn new(decl: Declaration) -> Self {
        DeclHandle {
            decl: Rc::new(decl),
        }
    }

    pub fn declaration(&self) -> &Declaration {
        &self.decl
    }

    /// Whether two handles view the same declaration value.
    pub fn same_as(&self, other: &DeclHandle) -> bool {
        Rc::ptr_eq(&self.decl, &other.decl)
    }
}

/// External collaborator supplying raw declarations.
///
/// Lookups are synchronous pulls by qualified name. Implementations live
/// outside the core (see the `codemodel-source` crate).
pub trait DeclarationSource {
    /// Returns the declaration for `qualified_name`, if the source knows it.
    fn lookup(&self, qualified_name: &str) -> Option<Declaration>;

    /// Returns the parallel representation of `qualified_name` used for
    /// merging (e.g. the parsed-text view of a compiled type).
    fn counterpart(&self, _qualified_name: &str) -> Option<Declaration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_includes_package() {
        assert_eq!(Declaration::class("a.b", "C").qualified_name(), "a.b.C");
        assert_eq!(Declaration::class("", "C").qualified_name(), "C");
    }

    #[test]
    fn builder_collects_children_in_order() {
        let decl = Declaration::method("run", "void")
            .with_child(Declaration::parameter("a", "int"))
            .with_child(Declaration::parameter("b", "long"));
        let names: Vec<&str> = decl.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn deserializes_sparse_json() {
        let decl: Declaration = serde_json::from_str(
            r#"{"kind":"type","name":"Foo","package":"p","children":[{"kind":"field","name":"x","type_name":"int"}]}"#,
        )
        .unwrap();
        assert_eq!(decl.qualified_name(), "p.Foo");
        assert_eq!(decl.children[0].type_name.as_deref(), Some("int"));
        assert!(decl.modifiers.is_empty());
    }
}
