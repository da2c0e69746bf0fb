//! Multi-namespace mapping table.
//!
//! Rows are classes (with nested field and method rows), columns are
//! namespaces. Column 0 is the source namespace: member descriptors are stored
//! in it. A name may be absent in any column except the source one.

use super::descriptor::remap_descriptor;
use crate::error::{ForgeError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{trace, warn};

/// Field or method row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMapping {
    names: Vec<Option<String>>,
    /// Descriptor in the source namespace
    src_desc: Option<String>,
}

impl MemberMapping {
    pub fn name(&self, ns: usize) -> Option<&str> {
        self.names.get(ns).and_then(|n| n.as_deref())
    }

    pub fn src_name(&self) -> Option<&str> {
        self.name(0)
    }

    pub fn src_desc(&self) -> Option<&str> {
        self.src_desc.as_deref()
    }

    pub(crate) fn set_name(&mut self, ns: usize, name: Option<String>) {
        if self.names.len() <= ns {
            self.names.resize(ns + 1, None);
        }
        self.names[ns] = name;
    }
}

/// Class row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMapping {
    names: Vec<Option<String>>,
    fields: Vec<MemberMapping>,
    methods: Vec<MemberMapping>,
}

impl ClassMapping {
    pub fn name(&self, ns: usize) -> Option<&str> {
        self.names.get(ns).and_then(|n| n.as_deref())
    }

    pub fn src_name(&self) -> Option<&str> {
        self.name(0)
    }

    pub fn fields(&self) -> &[MemberMapping] {
        &self.fields
    }

    pub fn methods(&self) -> &[MemberMapping] {
        &self.methods
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<MemberMapping> {
        &mut self.fields
    }

    pub(crate) fn methods_mut(&mut self) -> &mut Vec<MemberMapping> {
        &mut self.methods
    }
}

/// Member kinds share lookup code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
}

/// Table of class, field and method names per namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingTree {
    namespaces: Vec<String>,
    classes: Vec<ClassMapping>,
    #[serde(skip)]
    class_index: Vec<FxHashMap<String, usize>>,
}

impl MappingTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names; the first one is the source namespace
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn src_namespace(&self) -> Option<&str> {
        self.namespaces.first().map(String::as_str)
    }

    pub fn namespace_id(&self, name: &str) -> Option<usize> {
        self.namespaces.iter().position(|n| n == name)
    }

    /// Column id of `name`, failing with `UnknownNamespace` if absent
    pub fn require_namespace(&self, name: &str, context: &str) -> Result<usize> {
        self.namespace_id(name).ok_or_else(|| ForgeError::unknown_namespace(name, context))
    }

    /// Add a column if missing and return its id
    pub fn add_namespace(&mut self, name: &str) -> usize {
        if let Some(id) = self.namespace_id(name) {
            return id;
        }
        self.namespaces.push(name.to_string());
        while self.class_index.len() < self.namespaces.len() {
            self.class_index.push(FxHashMap::default());
        }
        trace!("[mappings] added namespace column {}", name);
        self.namespaces.len() - 1
    }

    pub fn classes(&self) -> &[ClassMapping] {
        &self.classes
    }

    pub fn class(&self, idx: usize) -> Option<&ClassMapping> {
        self.classes.get(idx)
    }

    pub(crate) fn class_mut(&mut self, idx: usize) -> Option<&mut ClassMapping> {
        self.classes.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Find a class row by its name in namespace `ns`
    pub fn find_class(&self, name: &str, ns: usize) -> Option<usize> {
        self.class_index.get(ns).and_then(|index| index.get(name).copied())
    }

    /// Name of class row `idx` in namespace `ns`
    pub fn class_name(&self, idx: usize, ns: usize) -> Option<&str> {
        self.classes.get(idx).and_then(|c| c.name(ns))
    }

    /// Add a class row named `src_name` in the source namespace, or return the existing row
    pub fn add_class(&mut self, src_name: &str) -> usize {
        if let Some(idx) = self.find_class(src_name, 0) {
            return idx;
        }
        if self.namespaces.is_empty() {
            warn!("[mappings] adding class {} to a tree without namespaces", src_name);
        }
        let idx = self.classes.len();
        self.classes.push(ClassMapping {
            names: vec![None; self.namespaces.len().max(1)],
            fields: Vec::new(),
            methods: Vec::new(),
        });
        self.set_class_name(idx, 0, Some(src_name.to_string()));
        idx
    }

    /// Set the name of class row `idx` in namespace `ns`.
    ///
    /// A name already used by another row is rejected and the earlier row
    /// keeps it. Returns whether the name was applied.
    pub fn set_class_name(&mut self, idx: usize, ns: usize, name: Option<String>) -> bool {
        self.rename_class(idx, ns, name, false)
    }

    /// [`set_class_name`](Self::set_class_name) for inputs that allow
    /// duplicate outputs: the name may be shared with other rows, lookups
    /// keep resolving to the earliest row holding it
    pub fn set_class_name_shared(&mut self, idx: usize, ns: usize, name: Option<String>) -> bool {
        self.rename_class(idx, ns, name, true)
    }

    fn rename_class(&mut self, idx: usize, ns: usize, name: Option<String>, allow_duplicates: bool) -> bool {
        if idx >= self.classes.len() {
            return false;
        }
        while self.class_index.len() <= ns {
            self.class_index.push(FxHashMap::default());
        }

        if let Some(new_name) = name.as_deref() {
            if let Some(&owner) = self.class_index[ns].get(new_name) {
                if owner != idx && !allow_duplicates {
                    warn!(
                        "[mappings] duplicate class name {} in {}, keeping {:?}",
                        new_name,
                        self.namespaces.get(ns).map_or("?", String::as_str),
                        self.classes[owner].src_name()
                    );
                    return false;
                }
            }
        }

        let class = &mut self.classes[idx];
        if class.names.len() <= ns {
            class.names.resize(ns + 1, None);
        }
        let old = class.names[ns].take();
        class.names[ns] = name.clone();

        if let Some(old) = old {
            if self.class_index[ns].get(&old) == Some(&idx) {
                // hand the name over to the next row still using it
                match self.classes.iter().position(|c| c.name(ns) == Some(old.as_str())) {
                    Some(next) => {
                        self.class_index[ns].insert(old, next);
                    }
                    None => {
                        self.class_index[ns].remove(&old);
                    }
                }
            }
        }
        if let Some(new_name) = name {
            let owner = self.class_index[ns].entry(new_name).or_insert(idx);
            if idx < *owner {
                *owner = idx;
            }
        }
        true
    }

    /// Find a member row of class `class_idx` by name in `ns` and source descriptor
    pub fn find_member(
        &self,
        class_idx: usize,
        kind: MemberKind,
        name: &str,
        ns: usize,
        src_desc: Option<&str>,
    ) -> Option<usize> {
        let class = self.classes.get(class_idx)?;
        let members = match kind {
            MemberKind::Field => &class.fields,
            MemberKind::Method => &class.methods,
        };
        members.iter().position(|m| {
            m.name(ns) == Some(name)
                && match (src_desc, m.src_desc()) {
                    (Some(want), Some(have)) => want == have,
                    _ => true,
                }
        })
    }

    /// Add a member row named `src_name` in the source namespace, or return the existing row
    pub fn add_member(&mut self, class_idx: usize, kind: MemberKind, src_name: &str, src_desc: Option<&str>) -> usize {
        if let Some(idx) = self.find_member(class_idx, kind, src_name, 0, src_desc) {
            return idx;
        }
        let width = self.namespaces.len().max(1);
        let class = &mut self.classes[class_idx];
        let members = match kind {
            MemberKind::Field => &mut class.fields,
            MemberKind::Method => &mut class.methods,
        };
        let mut names = vec![None; width];
        names[0] = Some(src_name.to_string());
        members.push(MemberMapping { names, src_desc: src_desc.map(str::to_string) });
        members.len() - 1
    }

    pub(crate) fn member_mut(&mut self, class_idx: usize, kind: MemberKind, member_idx: usize) -> Option<&mut MemberMapping> {
        let class = self.classes.get_mut(class_idx)?;
        match kind {
            MemberKind::Field => class.fields.get_mut(member_idx),
            MemberKind::Method => class.methods.get_mut(member_idx),
        }
    }

    /// Rewrite a descriptor from namespace `from` into namespace `to`.
    ///
    /// Classes without a name in `to` keep their `from` name.
    pub fn map_descriptor(&self, desc: &str, from: usize, to: usize) -> String {
        if from == to {
            return desc.to_string();
        }
        remap_descriptor(desc, |name| {
            self.find_class(name, from).and_then(|idx| self.class_name(idx, to)).map(str::to_string)
        })
    }

    /// Rebuild lookup indexes, needed after deserializing
    pub fn rebuild_index(&mut self) {
        self.class_index = vec![FxHashMap::default(); self.namespaces.len()];
        for (idx, class) in self.classes.iter().enumerate() {
            for (ns, name) in class.names.iter().enumerate() {
                if let Some(name) = name {
                    if ns < self.class_index.len() {
                        self.class_index[ns].entry(name.clone()).or_insert(idx);
                    }
                }
            }
        }
    }

    /// Write the tree as JSON for diagnostics
    pub fn export_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            crate::cache::ensure_dir(parent)?;
        }
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a tree previously written by [`MappingTree::export_json`]
    pub fn import_json(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut tree: Self = serde_json::from_reader(std::io::BufReader::new(file))?;
        tree.rebuild_index();
        Ok(tree)
    }
}
