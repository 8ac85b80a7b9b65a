//! Small value types shared by node payloads and raw declarations.
//!
//! [`Modifier`] sets are kept in a `BTreeSet`, so the derive order of the
//! enum is also the order modifiers are emitted in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Declaration modifiers, in canonical emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Abstract,
    Static,
    Final,
    Default,
    Synchronized,
    Native,
    Transient,
    Volatile,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Public => "public",
            Modifier::Protected => "protected",
            Modifier::Private => "private",
            Modifier::Abstract => "abstract",
            Modifier::Static => "static",
            Modifier::Final => "final",
            Modifier::Default => "default",
            Modifier::Synchronized => "synchronized",
            Modifier::Native => "native",
            Modifier::Transient => "transient",
            Modifier::Volatile => "volatile",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The flavour of a type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Class,
    Interface,
    Enum,
    Annotation,
}

impl TypeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Annotation => "@interface",
        }
    }
}

/// A written type name plus an optional resolved symbol.
///
/// `target` is a REFERENCE edge: it points at a node that this node does not
/// own (often a system-immutable external view). Copies keep pointing at the
/// original target unless that target was copied in the same operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<NodeId>,
}

impl TypeRef {
    /// An unresolved reference by name.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            name: name.into(),
            target: None,
        }
    }

    /// A reference already resolved to `target`.
    pub fn resolved(name: impl Into<String>, target: NodeId) -> Self {
        TypeRef {
            name: name.into(),
            target: Some(target),
        }
    }

    /// The simple (unqualified) part of the name, as used in signature keys.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn modifier_set_orders_canonically() {
        let set: BTreeSet<Modifier> = [Modifier::Final, Modifier::Static, Modifier::Public]
            .into_iter()
            .collect();
        let words: Vec<&str> = set.iter().map(|m| m.as_str()).collect();
        assert_eq!(words, vec!["public", "static", "final"]);
    }

    #[test]
    fn simple_name_strips_package() {
        assert_eq!(TypeRef::named("java.util.List").simple_name(), "List");
        assert_eq!(TypeRef::named("int").simple_name(), "int");
    }

    #[test]
    fn serde_roundtrip_type_ref() {
        let r = TypeRef::resolved("a.B", NodeId(3));
        let json = serde_json::to_string(&r).unwrap();
        let back: TypeRef = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);

        let unresolved: TypeRef = serde_json::from_str(r#"{"name":"C"}"#).unwrap();
        assert!(unresolved.target.is_none());
    }
}
