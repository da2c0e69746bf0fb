//! Inheritance information read from a jar.

use super::bytecode::{is_class_file, read_outline};
use super::codec::{decode_class, ClassCodec};
use super::{class_name_of_entry, ClassNode};
use crate::archive::JarReader;
use crate::error::{ForgeError, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct HierarchyEntry {
    super_name: Option<String>,
    interfaces: Vec<String>,
    methods: FxHashSet<(String, String)>,
}

/// Super types and declared methods per class
#[derive(Debug, Clone, Default)]
pub struct ClassHierarchy {
    classes: FxHashMap<String, HierarchyEntry>,
}

impl ClassHierarchy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every class of a jar. Compiled classes are read directly, other
    /// entries go through `codec`.
    pub fn from_jar(path: &Path, codec: &dyn ClassCodec) -> Result<Self> {
        let mut hierarchy = Self::new();
        let mut reader = JarReader::open(path)?;
        reader.for_each(|entry, bytes| {
            if class_name_of_entry(entry).is_none() {
                return Ok(());
            }
            let node = if is_class_file(&bytes) {
                read_outline(&bytes)
                    .map_err(|e| ForgeError::class_format(entry, format!("{e:#}")))?
                    .into_node()
            } else {
                decode_class(codec, entry, &bytes)?
            };
            hierarchy.insert(&node);
            Ok(())
        })?;
        debug!("[hierarchy] read {} classes from {}", hierarchy.len(), path.display());
        Ok(hierarchy)
    }

    pub fn insert(&mut self, node: &ClassNode) {
        self.classes.insert(
            node.name.clone(),
            HierarchyEntry {
                super_name: node.super_name.clone(),
                interfaces: node.interfaces.clone(),
                methods: node.methods.iter().map(|m| (m.name.clone(), m.desc.clone())).collect(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Whether `class` itself declares the method, `None` if the class is unknown
    pub fn declares_method(&self, class: &str, name: &str, desc: &str) -> Option<bool> {
        self.classes.get(class).map(|e| e.methods.contains(&(name.to_string(), desc.to_string())))
    }

    /// Known super classes and interfaces of `class`, nearest first
    pub fn ancestors(&self, class: &str) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut queue = VecDeque::new();
        let mut out = Vec::new();
        queue.push_back(class.to_string());
        while let Some(current) = queue.pop_front() {
            let Some(entry) = self.classes.get(&current) else {
                continue;
            };
            for parent in entry.super_name.iter().chain(entry.interfaces.iter()) {
                if seen.insert(parent.clone()) {
                    out.push(parent.clone());
                    queue.push_back(parent.clone());
                }
            }
        }
        out
    }

    /// Whether any known ancestor of `class` declares the method
    pub fn inherits_method(&self, class: &str, name: &str, desc: &str) -> bool {
        self.ancestors(class).iter().any(|a| self.declares_method(a, name, desc) == Some(true))
    }
}
