//! Drives a remap engine along a resolved namespace path.

use super::{ClassFile, RemapEngine, ResourceRemapper};
use crate::archive::{write_archive, JarReader};
use crate::artifact::Artifact;
use crate::classfile::class_name_of_entry;
use crate::error::{ForgeError, Result};
use crate::mapping::{MappingTree, MappingView};
use crate::namespace::Namespace;
use crate::stage::StageContext;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Runs one remap hop per consecutive namespace pair of a path.
///
/// Each hop is a pipeline stage tagged with its target namespace, so finished
/// hops are cached and a failing hop leaves no output behind.
pub struct RemapOrchestrator {
    engine: Arc<dyn RemapEngine>,
    resources: Vec<Arc<dyn ResourceRemapper>>,
}

impl fmt::Debug for RemapOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemapOrchestrator")
            .field("resources", &self.resources.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RemapOrchestrator {
    pub fn new(engine: Arc<dyn RemapEngine>) -> Self {
        Self { engine, resources: Vec::new() }
    }

    /// Rewrite matching non-class entries in lockstep with the classes
    #[must_use]
    pub fn with_resource_remapper(mut self, remapper: Arc<dyn ResourceRemapper>) -> Self {
        self.resources.push(remapper);
        self
    }

    /// Remap `input` through every namespace of `path`.
    ///
    /// Intermediate hops fall back to the namespace they came from; the last
    /// hop ends in `target_fallback`. An empty path returns `input` unchanged.
    pub fn remap_along(
        &self,
        ctx: &StageContext,
        tree: &MappingTree,
        path: &[Namespace],
        input: &Artifact,
        target_fallback: &Namespace,
    ) -> Result<Artifact> {
        let mut current = input.clone();
        for (hop, next) in path.iter().enumerate() {
            let fallback = if hop + 1 == path.len() { target_fallback.clone() } else { current.namespace().clone() };
            let target = current.derive_into(next.name(), next.clone(), fallback);
            let view = tree.view(current.namespace().name(), current.fallback().name(), next.name())?;
            debug!("[remap] hop {}/{}: {} -> {}", hop + 1, path.len(), current.namespace(), next);
            let produced = ctx.produce("remap", target, |output| self.remap_file(&view, current.path(), output, &[]))?;
            current = produced;
        }
        Ok(current)
    }

    /// Remap the jar at `input` into `output` through one view.
    ///
    /// `classpath` lists the jars the input links against. The output is
    /// deleted if any class or resource fails.
    pub fn remap_file(
        &self,
        view: &MappingView<'_>,
        input: &Path,
        output: &Path,
        classpath: &[PathBuf],
    ) -> Result<()> {
        let start = Instant::now();
        let failed = |reason: String| ForgeError::remap_failed(view.from_namespace(), view.to_namespace(), reason);

        let mut classes = Vec::new();
        let mut resources = Vec::new();
        JarReader::open(input)?.for_each(|name, bytes| {
            match class_name_of_entry(name) {
                Some(class) => classes.push(ClassFile::new(class, bytes)),
                None => resources.push((name.to_string(), bytes)),
            }
            Ok(())
        })?;

        let class_count = classes.len();
        let remapped =
            self.engine.remap_with_classpath(view, classes, classpath).map_err(|e| failed(format!("{e:#}")))?;
        if remapped.len() != class_count {
            return Err(failed(format!("engine returned {} of {} classes", remapped.len(), class_count)));
        }

        write_archive(output, |writer| {
            for class in &remapped {
                writer.write_entry(&class.entry_name(), &class.bytes)?;
            }
            for (name, bytes) in resources {
                let bytes = match self.resources.iter().find(|r| r.can_transform(&name)) {
                    Some(remapper) => {
                        debug!("[remap] {} rewrites {}", remapper.name(), name);
                        remapper.transform(&name, bytes, view)?
                    }
                    None => bytes,
                };
                writer.write_entry(&name, &bytes)?;
            }
            Ok(())
        })?;

        info!(
            "[remap] {} classes {} -> {} in {:?}",
            class_count,
            view.from_namespace(),
            view.to_namespace(),
            start.elapsed()
        );
        Ok(())
    }
}
