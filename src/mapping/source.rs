//! Mapping sources and the in-memory form of one mapping file.

use crate::archive::JarReader;
use crate::error::{ForgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// One mapping file: a name per namespace for every symbol.
///
/// The first namespace is the file's source namespace; member descriptors are
/// written in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingFile {
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub names: Vec<Option<String>>,
    #[serde(default)]
    pub fields: Vec<MemberEntry>,
    #[serde(default)]
    pub methods: Vec<MemberEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub names: Vec<Option<String>>,
    #[serde(default)]
    pub desc: Option<String>,
}

impl MappingFile {
    pub fn new<S: AsRef<str>>(namespaces: &[S]) -> Self {
        Self { namespaces: namespaces.iter().map(|s| s.as_ref().to_string()).collect(), classes: Vec::new() }
    }

    /// Append a class with one name per namespace (`None` = unmapped)
    pub fn class(&mut self, names: &[Option<&str>]) -> &mut ClassEntry {
        self.classes.push(ClassEntry { names: owned(names), fields: Vec::new(), methods: Vec::new() });
        let last = self.classes.len() - 1;
        &mut self.classes[last]
    }

    /// Rename a namespace column, returns false if the column doesn't exist
    pub fn rename_namespace(&mut self, from: &str, to: &str) -> bool {
        match self.namespaces.iter_mut().find(|n| n.as_str() == from) {
            Some(ns) => {
                *ns = to.to_string();
                true
            }
            None => false,
        }
    }
}

impl ClassEntry {
    pub fn field(&mut self, names: &[Option<&str>], desc: Option<&str>) -> &mut Self {
        self.fields.push(MemberEntry { names: owned(names), desc: desc.map(str::to_string) });
        self
    }

    pub fn method(&mut self, names: &[Option<&str>], desc: Option<&str>) -> &mut Self {
        self.methods.push(MemberEntry { names: owned(names), desc: desc.map(str::to_string) });
        self
    }
}

fn owned(names: &[Option<&str>]) -> Vec<Option<String>> {
    names.iter().map(|n| n.map(str::to_string)).collect()
}

/// A file contained in a mapping source
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path of the file within its source
    pub name: String,
    /// Format identifier, e.g. the file extension
    pub kind: String,
    pub content: MappingFile,
}

/// Something that provides one or more mapping files, e.g. a mappings archive
pub trait MappingSource: Send + Sync {
    /// Human readable identity for log messages
    fn describe(&self) -> String;

    fn files(&self) -> Result<Vec<SourceFile>>;
}

/// Mapping files held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    files: Vec<SourceFile>,
}

impl MemorySource {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), files: Vec::new() }
    }

    #[must_use]
    pub fn with_file<S: Into<String>>(mut self, name: S, content: MappingFile) -> Self {
        let name = name.into();
        let kind = Path::new(&name).extension().and_then(|e| e.to_str()).unwrap_or("").to_string();
        self.files.push(SourceFile { name, kind, content });
        self
    }
}

impl MappingSource for MemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn files(&self) -> Result<Vec<SourceFile>> {
        Ok(self.files.clone())
    }
}

/// A zip archive whose `*.json` entries are mapping files
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl MappingSource for ArchiveSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn files(&self) -> Result<Vec<SourceFile>> {
        let mut reader = JarReader::open(&self.path)?;
        let mut files = Vec::new();
        for name in reader.entry_names() {
            if !name.ends_with(".json") {
                continue;
            }
            let bytes = reader.read(&name)?;
            let content: MappingFile = serde_json::from_slice(&bytes).map_err(|e| {
                ForgeError::archive(&self.path, format!("invalid mapping file {name}: {e}"))
            })?;
            debug!("[mappings] read {} ({} classes) from {}", name, content.classes.len(), self.path.display());
            files.push(SourceFile { name, kind: "json".to_string(), content });
        }
        Ok(files)
    }
}
