//! Inheritance-aware container views.
//!
//! A type's supers are its resolved supertypes; a method's supers are the
//! same-signature methods of its owning type's supers. `get` and `all` walk
//! outward through those supers for roles that aggregate.

use std::collections::{HashSet, VecDeque};

use crate::container::Role;
use crate::error::ModelError;
use crate::id::{ContainerId, NodeId};
use crate::model::CodeModel;
use crate::node::{NodeData, NodeKind};

impl CodeModel {
    /// Direct supers of `id`. Unresolvable supertypes are skipped.
    pub fn supers(&mut self, id: NodeId) -> Result<Vec<NodeId>, ModelError> {
        self.initialize(id)?;
        match self.kind(id)? {
            NodeKind::Type => self.super_types(id),
            NodeKind::Method => self.overridden_methods(id),
            NodeKind::Package
            | NodeKind::Unit
            | NodeKind::Field
            | NodeKind::Parameter
            | NodeKind::Annotation
            | NodeKind::Doc
            | NodeKind::Expression => Ok(Vec::new()),
        }
    }

    fn super_types(&mut self, ty: NodeId) -> Result<Vec<NodeId>, ModelError> {
        let refs = match &self.node(ty)?.data {
            NodeData::Type(t) => t.supertypes.clone(),
            _ => return Ok(Vec::new()),
        };
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            let found = match r.target {
                Some(target) => Some(target),
                None => self.resolve_type_name(ty, &r.name)?,
            };
            if let Some(found) = found {
                if found != ty && self.kind(found)? == NodeKind::Type && !out.contains(&found) {
                    out.push(found);
                }
            }
        }
        Ok(out)
    }

    /// Resolves a written type name as seen from `context`: as given, through
    /// the imports of the enclosing unit, then within the enclosing package.
    fn resolve_type_name(&mut self, context: NodeId, name: &str) -> Result<Option<NodeId>, ModelError> {
        if let Some(found) = self.lookup(name)? {
            return Ok(Some(found));
        }
        if name.contains('.') {
            return Ok(None);
        }

        let mut current = self.owner(context)?;
        while let Some(node) = current {
            if let NodeData::Unit(unit) = &self.node(node)?.data {
                let suffix = format!(".{name}");
                let import = unit.imports.iter().find(|i| i.ends_with(&suffix)).cloned();
                if let Some(import) = import {
                    if let Some(found) = self.lookup(&import)? {
                        return Ok(Some(found));
                    }
                }
                break;
            }
            current = self.owner(node)?;
        }

        let qualified = self.qualified_name(context)?;
        if let Some((package, _)) = qualified.rsplit_once('.') {
            return self.lookup(&format!("{package}.{name}"));
        }
        Ok(None)
    }

    fn overridden_methods(&mut self, method: NodeId) -> Result<Vec<NodeId>, ModelError> {
        let Some(owner) = self.owner(method)? else {
            return Ok(Vec::new());
        };
        if self.kind(owner)? != NodeKind::Type {
            return Ok(Vec::new());
        }
        let Some(key) = self.key_of(method)? else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for ty in self.super_types(owner)? {
            let methods = self.container_of(ty, Role::Methods)?;
            if let Some(found) = self.get(methods, &key)? {
                out.push(found);
            }
        }
        Ok(out)
    }

    /// Local lookup, then the same role on each super of the owner,
    /// depth-first; first hit wins. Cyclic super chains terminate.
    pub fn get(&mut self, cid: ContainerId, key: &str) -> Result<Option<NodeId>, ModelError> {
        let mut visited = HashSet::new();
        self.get_in(cid, key, &mut visited)
    }

    fn get_in(
        &mut self,
        cid: ContainerId,
        key: &str,
        visited: &mut HashSet<ContainerId>,
    ) -> Result<Option<NodeId>, ModelError> {
        if !visited.insert(cid) {
            return Ok(None);
        }
        if let Some(hit) = self.get_declared(cid, key)? {
            return Ok(Some(hit));
        }
        let (owner, role) = {
            let c = self.container(cid)?;
            (c.owner(), c.role())
        };
        if !role.aggregates() {
            return Ok(None);
        }
        for sup in self.supers(owner)? {
            if let Some(inherited) = self.find_container(sup, role)? {
                if let Some(hit) = self.get_in(inherited, key, visited)? {
                    return Ok(Some(hit));
                }
            }
        }
        Ok(None)
    }

    /// Like [`get`](Self::get), but a miss is [`ModelError::ObjectNotFound`].
    pub fn get_required(&mut self, cid: ContainerId, key: &str) -> Result<NodeId, ModelError> {
        match self.get(cid, key)? {
            Some(found) => Ok(found),
            None => {
                let role = self.container(cid)?.role();
                Err(ModelError::ObjectNotFound {
                    what: format!("'{key}' in {role} container {cid}"),
                })
            }
        }
    }

    /// Every visible item: local items first, then each super's, breadth
    /// first. A key already seen closer to `cid` is hidden.
    pub fn all(&mut self, cid: ContainerId) -> AllItems<'_> {
        AllItems {
            model: self,
            queue: VecDeque::from([cid]),
            visited: HashSet::new(),
            seen: HashSet::new(),
            current: None,
            done: false,
        }
    }
}

/// Lazy iterator returned by [`CodeModel::all`].
pub struct AllItems<'m> {
    model: &'m mut CodeModel,
    queue: VecDeque<ContainerId>,
    visited: HashSet<ContainerId>,
    seen: HashSet<String>,
    current: Option<(ContainerId, usize)>,
    done: bool,
}

impl AllItems<'_> {
    fn step(&mut self) -> Result<Option<NodeId>, ModelError> {
        loop {
            let Some((cid, pos)) = self.current else {
                match self.queue.pop_front() {
                    Some(next) if self.visited.insert(next) => {
                        self.current = Some((next, 0));
                        continue;
                    }
                    Some(_) => continue,
                    None => return Ok(None),
                }
            };

            let item = self.model.declared(cid)?.get(pos).copied();
            let Some(item) = item else {
                self.current = None;
                self.enqueue_supers(cid)?;
                continue;
            };
            self.current = Some((cid, pos + 1));

            if let Some(key) = self.model.index_key(cid, item)? {
                if !self.seen.insert(key) {
                    continue;
                }
            }
            return Ok(Some(item));
        }
    }

    fn enqueue_supers(&mut self, cid: ContainerId) -> Result<(), ModelError> {
        let (owner, role) = {
            let c = self.model.container(cid)?;
            (c.owner(), c.role())
        };
        if !role.aggregates() {
            return Ok(());
        }
        for sup in self.model.supers(owner)? {
            if let Some(inherited) = self.model.find_container(sup, role)? {
                self.queue.push_back(inherited);
            }
        }
        Ok(())
    }
}

impl Iterator for AllItems<'_> {
    type Item = Result<NodeId, ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
