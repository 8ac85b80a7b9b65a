//! In-memory implementation of [`DeclarationSource`].
//!
//! [`InMemorySource`] keeps two tables keyed by qualified name: the primary
//! declarations served by `lookup`, and the counterparts served to merges.

use std::collections::BTreeMap;

use codemodel_core::{Declaration, DeclarationSource};

use crate::error::SourceError;

#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    declarations: BTreeMap<String, Declaration>,
    counterparts: BTreeMap<String, Declaration>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `decl` under its qualified name.
    pub fn insert(&mut self, decl: Declaration) -> Result<(), SourceError> {
        insert_unique(&mut self.declarations, decl)
    }

    /// Registers the counterpart representation of a declaration.
    pub fn insert_counterpart(&mut self, decl: Declaration) -> Result<(), SourceError> {
        insert_unique(&mut self.counterparts, decl)
    }

    pub fn remove(&mut self, qualified_name: &str) -> Option<Declaration> {
        self.declarations.remove(qualified_name)
    }

    pub fn remove_counterpart(&mut self, qualified_name: &str) -> Option<Declaration> {
        self.counterparts.remove(qualified_name)
    }

    /// Qualified names of the primary declarations, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.declarations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn counterpart_count(&self) -> usize {
        self.counterparts.len()
    }
}

fn insert_unique(table: &mut BTreeMap<String, Declaration>, decl: Declaration) -> Result<(), SourceError> {
    let name = decl.qualified_name();
    if table.contains_key(&name) {
        return Err(SourceError::DuplicateDeclaration { name });
    }
    table.insert(name, decl);
    Ok(())
}

impl DeclarationSource for InMemorySource {
    fn lookup(&self, qualified_name: &str) -> Option<Declaration> {
        self.declarations.get(qualified_name).cloned()
    }

    fn counterpart(&self, qualified_name: &str) -> Option<Declaration> {
        self.counterparts.get(qualified_name).cloned()
    }
}
