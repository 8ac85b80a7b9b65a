//! JSON-file declaration source.
//!
//! The document shape is
//!
//! ```json
//! { "declarations": [ { "kind": "type", "package": "lib", "name": "Base", ... } ],
//!   "counterparts": [ ... ] }
//! ```
//!
//! Each top-level declaration is registered under `package.name`.

use std::fs;
use std::path::Path;

use codemodel_core::{Declaration, DeclarationSource};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SourceError;
use crate::memory::InMemorySource;

/// On-disk form of a declarations file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclarationFile {
    #[serde(default)]
    pub declarations: Vec<Declaration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counterparts: Vec<Declaration>,
}

#[derive(Debug, Clone, Default)]
pub struct JsonSource {
    inner: InMemorySource,
}

impl JsonSource {
    pub fn from_str(json: &str) -> Result<Self, SourceError> {
        let file: DeclarationFile = serde_json::from_str(json)?;
        Self::from_file(file)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_str(&json)?;
        debug!(
            path = %path.display(),
            declarations = source.inner.len(),
            counterparts = source.inner.counterpart_count(),
            "loaded declarations"
        );
        Ok(source)
    }

    pub fn from_file(file: DeclarationFile) -> Result<Self, SourceError> {
        let mut inner = InMemorySource::new();
        for decl in file.declarations {
            inner.insert(decl)?;
        }
        for decl in file.counterparts {
            inner.insert_counterpart(decl)?;
        }
        Ok(JsonSource { inner })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.names()
    }

    pub fn into_inner(self) -> InMemorySource {
        self.inner
    }
}

impl DeclarationSource for JsonSource {
    fn lookup(&self, qualified_name: &str) -> Option<Declaration> {
        self.inner.lookup(qualified_name)
    }

    fn counterpart(&self, qualified_name: &str) -> Option<Declaration> {
        self.inner.counterpart(qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemodel_core::{DeclKind, Modifier};

    const DOC: &str = r#"{
        "declarations": [
            {
                "kind": "type",
                "package": "lib",
                "name": "Greeter",
                "modifiers": ["public"],
                "children": [
                    { "kind": "field", "name": "greeting", "type_name": "String" },
                    {
                        "kind": "method", "name": "greet", "type_name": "String",
                        "children": [
                            { "kind": "parameter", "name": "who", "type_name": "String" },
                            { "kind": "expression", "value": "return greeting + who;" }
                        ]
                    }
                ]
            }
        ],
        "counterparts": [
            { "kind": "type", "package": "lib", "name": "Greeter" }
        ]
    }"#;

    #[test]
    fn parses_declarations_and_counterparts() {
        let source = JsonSource::from_str(DOC).unwrap();
        let greeter = source.lookup("lib.Greeter").unwrap();
        assert_eq!(greeter.kind, DeclKind::Type);
        assert_eq!(greeter.modifiers, vec![Modifier::Public]);
        assert_eq!(greeter.children.len(), 2);
        assert!(source.counterpart("lib.Greeter").is_some());
        assert_eq!(source.names().collect::<Vec<_>>(), vec!["lib.Greeter"]);
    }

    #[test]
    fn missing_counterparts_default_to_empty() {
        let source = JsonSource::from_str(r#"{ "declarations": [] }"#).unwrap();
        assert!(source.into_inner().is_empty());
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            JsonSource::from_str("{ \"declarations\": [ { \"kind\": \"nope\" } ] }"),
            Err(SourceError::Serialization(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonSource::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
