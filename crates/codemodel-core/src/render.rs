//! Java-like text emission.

use std::fmt::{self, Write};

use crate::container::Role;
use crate::declaration::DeclKind;
use crate::error::ModelError;
use crate::id::NodeId;
use crate::model::CodeModel;
use crate::node::{NodeData, Origin};
use crate::types::{Modifier, TypeKind};

const INDENT: &str = "    ";
const SNIPPET_WIDTH: usize = 60;

impl CodeModel {
    /// Materializes `id` and writes its source text to `out`.
    pub fn render(&mut self, id: NodeId, out: &mut impl fmt::Write) -> Result<(), ModelError> {
        self.materialize(id)?;
        self.emit(id, out, 0)
    }

    pub fn render_to_string(&mut self, id: NodeId) -> Result<String, ModelError> {
        let mut out = String::new();
        self.render(id, &mut out)?;
        Ok(out)
    }

    /// First rendered line of `id`, shortened for error messages. Never
    /// populates anything; empty if `id` is not a live node.
    pub fn snippet(&self, id: NodeId) -> String {
        let header = self.header(id).unwrap_or_default();
        if header.chars().count() <= SNIPPET_WIDTH {
            return header;
        }
        let mut short: String = header.chars().take(SNIPPET_WIDTH - 3).collect();
        short.push_str("...");
        short
    }

    /// Declaration line without its terminator (`;` or `{`).
    fn header(&self, id: NodeId) -> Result<String, ModelError> {
        let node = self.node(id)?;
        Ok(match &node.data {
            NodeData::Package(p) => format!("package {}", p.name),
            NodeData::Unit(u) => u.name.clone(),
            NodeData::Type(t) => {
                let mut s = modifiers(&t.modifiers);
                s.push_str(t.type_kind.keyword());
                s.push(' ');
                s.push_str(&t.name);
                let names: Vec<&str> = t.supertypes.iter().map(|r| r.name.as_str()).collect();
                if let Some((first, rest)) = names.split_first() {
                    match t.type_kind {
                        TypeKind::Class => {
                            let _ = write!(s, " extends {first}");
                            if !rest.is_empty() {
                                let _ = write!(s, " implements {}", rest.join(", "));
                            }
                        }
                        TypeKind::Interface => {
                            let _ = write!(s, " extends {}", names.join(", "));
                        }
                        TypeKind::Enum | TypeKind::Annotation => {
                            let _ = write!(s, " implements {}", names.join(", "));
                        }
                    }
                }
                s
            }
            NodeData::Method(m) => {
                let mut s = modifiers(&m.modifiers);
                if let Some(ret) = &m.return_type {
                    s.push_str(&ret.name);
                    s.push(' ');
                }
                let _ = write!(s, "{}({})", m.name, self.parameter_list(id)?);
                s
            }
            NodeData::Field(f) => format!("{}{} {}", modifiers(&f.modifiers), f.ty, f.name),
            NodeData::Parameter(p) => format!("{}{} {}", self.inline_annotations(id)?, p.ty, p.name),
            NodeData::Annotation(a) => {
                let mut s = format!("@{}", a.ty);
                match a.values.len() {
                    0 => {}
                    1 if a.values.contains_key("value") => {
                        let _ = write!(s, "({})", a.values["value"]);
                    }
                    _ => {
                        let parts: Vec<String> = a.values.iter().map(|(k, v)| format!("{k} = {v}")).collect();
                        let _ = write!(s, "({})", parts.join(", "));
                    }
                }
                s
            }
            NodeData::Doc(d) => d.text.clone(),
            NodeData::Expression(e) => e.text.lines().next().unwrap_or_default().to_string(),
        })
    }

    /// `T a, U b`. An external view that has not been populated yet is read
    /// from its declaration.
    fn parameter_list(&self, method: NodeId) -> Result<String, ModelError> {
        let node = self.node(method)?;
        if let (false, Origin::ExternalView(handle)) = (node.lifecycle.is_initialized(), &node.origin) {
            let params: Vec<String> = handle
                .declaration()
                .children
                .iter()
                .filter(|c| c.kind == DeclKind::Parameter)
                .map(|c| format!("{} {}", c.type_name.as_deref().unwrap_or_default(), c.name))
                .collect();
            return Ok(params.join(", "));
        }
        let params = self.container_of(method, Role::Parameters)?;
        let mut parts = Vec::new();
        for &p in self.container(params)?.items() {
            parts.push(self.header(p)?);
        }
        Ok(parts.join(", "))
    }

    fn inline_annotations(&self, id: NodeId) -> Result<String, ModelError> {
        let mut s = String::new();
        if let Some(annotations) = self.find_container(id, Role::Annotations)? {
            for &a in self.container(annotations)?.items() {
                s.push_str(&self.header(a)?);
                s.push(' ');
            }
        }
        Ok(s)
    }

    fn emit(&self, id: NodeId, out: &mut dyn fmt::Write, depth: usize) -> Result<(), ModelError> {
        let pad = INDENT.repeat(depth);
        match &self.node(id)?.data {
            NodeData::Package(_) => {
                let mut first = true;
                for role in [Role::Units, Role::Packages] {
                    let cid = self.container_of(id, role)?;
                    for &child in self.container(cid)?.items() {
                        if !first {
                            writeln!(out)?;
                        }
                        first = false;
                        self.emit(child, out, depth)?;
                    }
                }
            }
            NodeData::Unit(unit) => {
                let package = match self.owner(id)? {
                    Some(owner) => self.qualified_name(owner)?,
                    None => String::new(),
                };
                if !package.is_empty() {
                    writeln!(out, "package {package};")?;
                    writeln!(out)?;
                }
                if !unit.imports.is_empty() {
                    for import in &unit.imports {
                        writeln!(out, "import {import};")?;
                    }
                    writeln!(out)?;
                }
                let types = self.container_of(id, Role::Types)?;
                for (i, &ty) in self.container(types)?.items().iter().enumerate() {
                    if i > 0 {
                        writeln!(out)?;
                    }
                    self.emit(ty, out, depth)?;
                }
            }
            NodeData::Type(_) => {
                self.emit_preamble(id, out, depth)?;
                writeln!(out, "{pad}{} {{", self.header(id)?)?;
                let mut wrote_member = false;
                let fields = self.container_of(id, Role::Fields)?;
                for &f in self.container(fields)?.items() {
                    self.emit(f, out, depth + 1)?;
                    wrote_member = true;
                }
                for role in [Role::Methods, Role::Types] {
                    let cid = self.container_of(id, role)?;
                    for &member in self.container(cid)?.items() {
                        if wrote_member {
                            writeln!(out)?;
                        }
                        self.emit(member, out, depth + 1)?;
                        wrote_member = true;
                    }
                }
                writeln!(out, "{pad}}}")?;
            }
            NodeData::Method(m) => {
                self.emit_preamble(id, out, depth)?;
                let header = self.header(id)?;
                let is_abstract = m.modifiers.contains(&Modifier::Abstract);
                match self.node(id)?.slot {
                    Some(body) if !is_abstract => {
                        writeln!(out, "{pad}{header} {{")?;
                        self.emit(body, out, depth + 1)?;
                        writeln!(out, "{pad}}}")?;
                    }
                    _ => writeln!(out, "{pad}{header};")?,
                }
            }
            NodeData::Field(_) => {
                self.emit_preamble(id, out, depth)?;
                write!(out, "{pad}{}", self.header(id)?)?;
                if let Some(init) = self.node(id)?.slot {
                    if let NodeData::Expression(e) = &self.node(init)?.data {
                        write!(out, " = {}", e.text)?;
                    }
                }
                writeln!(out, ";")?;
            }
            NodeData::Parameter(_) | NodeData::Annotation(_) => {
                writeln!(out, "{pad}{}", self.header(id)?)?;
            }
            NodeData::Doc(d) => writeln!(out, "{pad}/** {} */", d.text)?,
            NodeData::Expression(e) => {
                for line in e.text.lines() {
                    writeln!(out, "{pad}{line}")?;
                }
            }
        }
        Ok(())
    }

    /// Doc block and annotations above a declaration.
    fn emit_preamble(&self, id: NodeId, out: &mut dyn fmt::Write, depth: usize) -> Result<(), ModelError> {
        let pad = INDENT.repeat(depth);
        if let Some(docs) = self.find_container(id, Role::Docs)? {
            let lines = self.container(docs)?.items();
            if !lines.is_empty() {
                writeln!(out, "{pad}/**")?;
                for &line in lines {
                    if let NodeData::Doc(d) = &self.node(line)?.data {
                        writeln!(out, "{pad} * {}", d.text)?;
                    }
                }
                writeln!(out, "{pad} */")?;
            }
        }
        if let Some(annotations) = self.find_container(id, Role::Annotations)? {
            for &a in self.container(annotations)?.items() {
                writeln!(out, "{pad}{}", self.header(a)?)?;
            }
        }
        Ok(())
    }
}

fn modifiers(set: &std::collections::BTreeSet<Modifier>) -> String {
    let mut s = String::new();
    for m in set {
        s.push_str(m.as_str());
        s.push(' ');
    }
    s
}
