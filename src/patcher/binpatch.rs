//! Loaders shipping binary diffs against the game classes.

use super::{BasePatcher, Library, Patcher};
use crate::archive::{rewrite_archive, JarReader};
use crate::artifact::Artifact;
use crate::error::{ForgeError, Result};
use crate::stage::StageContext;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Suffix of patch entries inside a patch archive
pub const PATCH_SUFFIX: &str = ".binpatch";

/// Bundled patch archive some loaders leave inside the patched jar
pub const BUNDLED_PATCHES: &str = "binpatches.pack.lzma";

/// Applies one opaque binary patch
pub trait PatchApplier: Send + Sync {
    /// Patch `base`; `base` is empty for classes the patch adds
    fn apply(&self, entry: &str, base: &[u8], patch: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Applies the patches of a patch archive, tagged with the loader name.
///
/// The archive holds one `<entry>.binpatch` per patched jar entry. Loaders
/// whose patched jar is in another namespace declare it with
/// [`with_output_namespace`](Self::with_output_namespace).
#[derive(Clone)]
pub struct BinaryPatchPatcher {
    base: BasePatcher,
    name: String,
    patches: PathBuf,
    applier: Arc<dyn PatchApplier>,
    output_namespace: Option<String>,
    excluded_libraries: Vec<String>,
}

impl fmt::Debug for BinaryPatchPatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryPatchPatcher")
            .field("name", &self.name)
            .field("patches", &self.patches)
            .field("output_namespace", &self.output_namespace)
            .finish_non_exhaustive()
    }
}

impl BinaryPatchPatcher {
    pub fn new<P: Into<PathBuf>>(name: &str, base: BasePatcher, patches: P, applier: Arc<dyn PatchApplier>) -> Self {
        Self {
            base,
            name: name.to_string(),
            patches: patches.into(),
            applier,
            output_namespace: None,
            excluded_libraries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_output_namespace(mut self, namespace: &str) -> Self {
        self.output_namespace = Some(namespace.to_string());
        self
    }

    /// Drop a library (`group:name`) the loader ships its own copy of
    #[must_use]
    pub fn excluding_library(mut self, module: &str) -> Self {
        self.excluded_libraries.push(module.to_string());
        self
    }

    fn read_patches(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut patches = BTreeMap::new();
        JarReader::open(&self.patches)?.for_each(|name, bytes| {
            if let Some(entry) = name.strip_suffix(PATCH_SUFFIX) {
                patches.insert(entry.to_string(), bytes);
            }
            Ok(())
        })?;
        Ok(patches)
    }

    fn fixed_tag(&self) -> String {
        format!("{}-fixed", self.name)
    }

    fn is_patch_leftover(entry: &str) -> bool {
        entry == BUNDLED_PATCHES || entry.ends_with(PATCH_SUFFIX)
    }

    fn apply_one(&self, entry: &str, base: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
        self.applier
            .apply(entry, base, patch)
            .map_err(|e| ForgeError::patch_failed(&self.name, format!("{entry}: {e:#}")))
    }
}

impl Patcher for BinaryPatchPatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn base(&self) -> &BasePatcher {
        &self.base
    }

    fn transform(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        let target = match &self.output_namespace {
            Some(ns) => input.derive_into(&self.name, ctx.namespace(ns)?, input.namespace().clone()),
            None => input.derive(&self.name),
        };
        ctx.produce(&self.name, target, |output| {
            let game = JarReader::open(input.path())?;
            let (mut patches, added): (BTreeMap<_, _>, BTreeMap<_, _>) =
                self.read_patches()?.into_iter().partition(|(entry, _)| game.contains(entry));
            info!("[{}] applying {} patches, {} new entries", self.name, patches.len(), added.len());
            rewrite_archive(
                input.path(),
                output,
                |entry, bytes| match patches.remove(entry) {
                    Some(patch) => self.apply_one(entry, &bytes, &patch).map(Some),
                    None => Ok(Some(bytes)),
                },
                |writer| {
                    for (entry, patch) in &added {
                        debug!("[{}] adding {}", self.name, entry);
                        writer.write_entry(entry, &self.apply_one(entry, &[], patch)?)?;
                    }
                    Ok(())
                },
            )
        })
    }

    /// Drop patch leftovers once the jar has left the production namespace
    fn after_remap(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        let tag = self.fixed_tag();
        if input.patches().tags().contains(&tag) || input.namespace().name() == self.prod_namespace() {
            return Ok(input.clone());
        }
        ctx.produce(&tag, input.derive(&tag), |output| {
            rewrite_archive(
                input.path(),
                output,
                |entry, bytes| {
                    if Self::is_patch_leftover(entry) {
                        debug!("[{}] dropping {}", self.name, entry);
                        return Ok(None);
                    }
                    Ok(Some(bytes))
                },
                |_| Ok(()),
            )
        })
    }

    fn library_filter(&self, library: &Library) -> bool {
        !self.excluded_libraries.contains(&library.module())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::artifact::Environment;
    use crate::patcher::tests::{context, raw_jar};
    use tempfile::TempDir;

    /// Appends the patch bytes to the base
    struct AppendApplier;

    impl PatchApplier for AppendApplier {
        fn apply(&self, _entry: &str, base: &[u8], patch: &[u8]) -> anyhow::Result<Vec<u8>> {
            if patch == b"corrupt" {
                anyhow::bail!("bad checksum");
            }
            Ok([base, patch].concat())
        }
    }

    fn patch_jar(dir: &std::path::Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("patches.jar");
        write_archive(&path, |w| {
            for (name, bytes) in entries {
                w.write_entry(name, bytes)?;
            }
            Ok(())
        })
        .unwrap();
        path
    }

    #[test]
    fn test_patches_applied_and_namespace_changed() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path());
        let game = raw_jar(&ctx, temp_dir.path(), Environment::Client, "official", &[
            ("a.class", b"a".to_vec()),
            ("b.class", b"b".to_vec()),
        ]);
        let patches = patch_jar(temp_dir.path(), &[("a.class.binpatch", b"+p".as_slice()), ("n.class.binpatch", b"new".as_slice())]);

        let patcher = BinaryPatchPatcher::new("forge", BasePatcher::new(), patches, Arc::new(AppendApplier))
            .with_output_namespace("searge");
        let out = patcher.transform(&ctx, &game).unwrap();
        assert_eq!(out.patches().tags(), &["forge"]);
        assert_eq!(out.namespace().name(), "searge");
        assert_eq!(out.fallback().name(), "official");

        let mut reader = JarReader::open(out.path()).unwrap();
        assert_eq!(reader.read("a.class").unwrap(), b"a+p");
        assert_eq!(reader.read("b.class").unwrap(), b"b");
        assert_eq!(reader.read("n.class").unwrap(), b"new");
    }

    #[test]
    fn test_failed_patch_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path());
        let game = raw_jar(&ctx, temp_dir.path(), Environment::Client, "official", &[("a.class", b"a".to_vec())]);
        let patches = patch_jar(temp_dir.path(), &[("a.class.binpatch", b"corrupt".as_slice())]);
        let patcher = BinaryPatchPatcher::new("forge", BasePatcher::new(), patches, Arc::new(AppendApplier));

        let err = patcher.transform(&ctx, &game).unwrap_err();
        assert!(matches!(err, ForgeError::PatchFailed { .. }));
        assert!(!game.derive("forge").exists());
    }

    /// Remapped jars lose the bundled patch archive under their own tag
    #[test]
    fn test_after_remap_drops_patch_leftovers() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path());
        let remapped = raw_jar(&ctx, temp_dir.path(), Environment::Client, "searge", &[
            ("a.class", b"a".to_vec()),
            (BUNDLED_PATCHES, b"lzma".to_vec()),
            ("b.class.binpatch", b"p".to_vec()),
        ]);
        let patcher = BinaryPatchPatcher::new("forge", BasePatcher::new(), "p.jar", Arc::new(AppendApplier));

        let fixed = patcher.after_remap(&ctx, &remapped).unwrap();
        assert_eq!(fixed.patches().tags(), &["forge-fixed"]);
        assert_eq!(fixed.namespace().name(), "searge");
        let mut reader = JarReader::open(fixed.path()).unwrap();
        assert_eq!(reader.read("a.class").unwrap(), b"a");
        assert!(!reader.contains(BUNDLED_PATCHES));
        assert!(!reader.contains("b.class.binpatch"));

        assert_eq!(patcher.after_remap(&ctx, &fixed).unwrap(), fixed);
        assert_eq!(ctx.builds(), 1);
    }

    /// Jars still in the production namespace are left alone
    #[test]
    fn test_after_remap_skips_prod_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path());
        let game = raw_jar(&ctx, temp_dir.path(), Environment::Client, "official", &[(BUNDLED_PATCHES, b"lzma".to_vec())]);
        let patcher = BinaryPatchPatcher::new("forge", BasePatcher::new(), "p.jar", Arc::new(AppendApplier));

        assert_eq!(patcher.after_remap(&ctx, &game).unwrap(), game);
        assert_eq!(ctx.builds(), 0);
    }

    #[test]
    fn test_library_filter() {
        let patcher = BinaryPatchPatcher::new("forge", BasePatcher::new(), "p.jar", Arc::new(AppendApplier))
            .excluding_library("org.ow2.asm:asm");
        assert!(!patcher.library_filter(&Library::parse("org.ow2.asm:asm:9.5").unwrap()));
        assert!(patcher.library_filter(&Library::parse("com.google.guava:guava:32.1").unwrap()));
    }
}
