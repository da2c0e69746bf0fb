//! Remapping jars between namespaces.
//!
//! The class-level engine is a seam ([`RemapEngine`]); this crate ships a
//! structural reference engine. Non-class resources naming classes or members
//! are rewritten in lockstep by [`ResourceRemapper`]s.

use crate::error::Result;
use crate::mapping::MappingView;
use std::path::PathBuf;

pub mod orchestrator;
pub mod structural;

pub use orchestrator::RemapOrchestrator;
pub use structural::StructuralRemapper;

/// One class entry handed to a remap engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    /// Internal name from the entry path
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ClassFile {
    pub fn new<S: Into<String>>(name: S, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }

    pub fn entry_name(&self) -> String {
        format!("{}.class", self.name)
    }
}

/// Rewrites every class of a jar through a mapping view.
///
/// Deterministic for identical views and inputs. The call is blocking and
/// covers all classes at once; engines may parallelise internally.
pub trait RemapEngine: Send + Sync {
    fn remap(&self, view: &MappingView<'_>, classes: Vec<ClassFile>) -> anyhow::Result<Vec<ClassFile>>;

    /// Remap classes that link against the jars of `classpath`.
    ///
    /// Engines resolving inherited members read the classpath; the default
    /// ignores it.
    fn remap_with_classpath(
        &self,
        view: &MappingView<'_>,
        classes: Vec<ClassFile>,
        _classpath: &[PathBuf],
    ) -> anyhow::Result<Vec<ClassFile>> {
        self.remap(view, classes)
    }
}

/// Rewrites a non-class jar entry that references classes or members
pub trait ResourceRemapper: Send + Sync {
    fn name(&self) -> &str;

    fn can_transform(&self, entry: &str) -> bool;

    fn transform(&self, entry: &str, bytes: Vec<u8>, view: &MappingView<'_>) -> Result<Vec<u8>>;
}
