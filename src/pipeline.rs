//! The artifact derivation pipeline.
//!
//! Every requested `(environment, namespace, fallback)` runs through
//! `RAW -> MERGED (combined only) -> FIXED -> loader patched -> remapped`,
//! followed by the loader's after-remap stage. Stages are cached on disk by
//! their tag chain; results are also memoised for the lifetime of the pipeline.

use crate::archive::{copy_with_merged_manifest, discard_partial};
use crate::artifact::{Artifact, Environment};
use crate::error::{ForgeError, Result};
use crate::mapping::MappingTree;
use crate::namespace::Namespace;
use crate::patcher::{Library, Patcher, RunConfig};
use crate::remap::RemapOrchestrator;
use crate::stage::StageContext;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// A vanilla jar as downloaded, with the namespace it is in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJar {
    pub path: PathBuf,
    pub namespace: String,
}

type MemoKey = (Environment, String, String);

pub struct ArtifactPipeline {
    ctx: StageContext,
    version: String,
    raw_jars: FxHashMap<Environment, RawJar>,
    patcher: Arc<dyn Patcher>,
    tree: Arc<MappingTree>,
    orchestrator: RemapOrchestrator,
    provided: Mutex<FxHashMap<MemoKey, Artifact>>,
}

impl fmt::Debug for ArtifactPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactPipeline")
            .field("version", &self.version)
            .field("patcher", &self.patcher.name())
            .field("raw_jars", &self.raw_jars)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl ArtifactPipeline {
    pub fn new(
        ctx: StageContext,
        version: &str,
        raw_jars: FxHashMap<Environment, RawJar>,
        patcher: Arc<dyn Patcher>,
        tree: Arc<MappingTree>,
        orchestrator: RemapOrchestrator,
    ) -> Self {
        Self {
            ctx,
            version: version.to_string(),
            raw_jars,
            patcher,
            tree,
            orchestrator,
            provided: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    pub fn patcher(&self) -> &dyn Patcher {
        self.patcher.as_ref()
    }

    pub fn mapping_tree(&self) -> &MappingTree {
        &self.tree
    }

    /// The jar of `env` in `namespace`/`fallback`, derived if needed
    pub fn provide(&self, env: Environment, namespace: &Namespace, fallback: &Namespace) -> Result<Artifact> {
        let key = (env, namespace.name().to_string(), fallback.name().to_string());
        if let Some(artifact) = self.memo().get(&key) {
            debug!("[pipeline] {} already provided", artifact);
            return Ok(artifact.clone());
        }

        let artifact = self.derive(env, namespace, fallback)?;
        info!("[pipeline] provided {} at {}", artifact, artifact.path().display());
        self.memo().insert(key, artifact.clone());
        Ok(artifact)
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, FxHashMap<MemoKey, Artifact>> {
        self.provided.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn derive(&self, env: Environment, namespace: &Namespace, fallback: &Namespace) -> Result<Artifact> {
        let patched = self.patched(env)?;
        let path = self.ctx.registry().resolve_path(patched.namespace(), patched.fallback(), namespace, fallback)?;
        debug!(
            "[pipeline] remap path for {}: {:?}",
            patched,
            path.iter().map(Namespace::name).collect::<Vec<_>>()
        );
        let remapped = self.orchestrator.remap_along(&self.ctx, &self.tree, &path, &patched, fallback)?;
        self.patcher.after_remap(&self.ctx, &remapped)
    }

    /// The loader patched jar in the loader's production namespace
    pub fn patched(&self, env: Environment) -> Result<Artifact> {
        let merged = match env {
            Environment::Combined => {
                let client = self.raw(Environment::Client)?;
                let server = self.raw(Environment::Server)?;
                self.patcher.merge(&self.ctx, &client, &server)?
            }
            other => self.raw(other)?,
        };
        let fixed = self.patcher.fix(&self.ctx, &merged)?;
        self.patcher.transform(&self.ctx, &fixed)
    }

    /// The raw jar of `env`; datagen reads the server jar
    pub fn raw(&self, env: Environment) -> Result<Artifact> {
        let source = env.raw_source();
        let raw = self
            .raw_jars
            .get(&source)
            .ok_or_else(|| ForgeError::configuration(format!("no {source} jar configured for {}", self.version)))?;
        let namespace = self.ctx.namespace(&raw.namespace)?;
        let artifact =
            Artifact::raw(&self.ctx.config().cache_root, &self.version, env, namespace.clone(), namespace, &raw.path);
        if !artifact.exists() {
            return Err(ForgeError::configuration(format!("{source} jar {} does not exist", raw.path.display())));
        }
        Ok(artifact)
    }

    /// Remap a standalone jar built against `dev` into `prod`.
    ///
    /// Each hop links against the `env` game jar in the namespaces the hop
    /// starts from. Intermediate jars are written next to `output` and
    /// removed afterwards; an empty path copies the input. The output carries
    /// the input manifest merged over the defaults.
    pub fn remap_jar(
        &self,
        env: Environment,
        input: &Path,
        output: &Path,
        dev: (&Namespace, &Namespace),
        prod: &Namespace,
    ) -> Result<()> {
        let (dev, dev_fallback) = dev;
        let path = self.ctx.registry().resolve_path(dev, dev_fallback, prod, prod)?;
        if path.is_empty() {
            info!("[remap-jar] {} is already in {}, copying", input.display(), prod);
            return copy_with_merged_manifest(input, output);
        }

        info!("[remap-jar] remapping {} from {}/{} to {}", input.display(), dev, dev_fallback, prod);
        let mut hops = Vec::with_capacity(path.len());
        let result = self.remap_hops(env, input, output, (dev, dev_fallback), &path, &mut hops).and_then(|last| {
            copy_with_merged_manifest(&last, output)
        });
        for hop in &hops {
            discard_partial(hop);
        }
        result
    }

    fn remap_hops(
        &self,
        env: Environment,
        input: &Path,
        output: &Path,
        dev: (&Namespace, &Namespace),
        path: &[Namespace],
        hops: &mut Vec<PathBuf>,
    ) -> Result<PathBuf> {
        let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("remapped");
        let (mut prev, mut prev_fallback) = (dev.0.clone(), dev.1.clone());
        let mut current = input.to_path_buf();
        for next in path {
            let game = self.provide(env, &prev, &prev_fallback)?;
            let target = output.with_file_name(format!("{stem}-temp-{}.jar", next.name()));
            hops.push(target.clone());
            let view = self.tree.view(prev.name(), prev_fallback.name(), next.name())?;
            debug!("[remap-jar] {} -> {} against {}", prev, next, game.path().display());
            self.orchestrator.remap_file(&view, &current, &target, &[game.path().to_path_buf()])?;
            current = target;
            prev_fallback = std::mem::replace(&mut prev, next.clone());
        }
        Ok(current)
    }

    /// Run configuration with the loader's run transform applied
    pub fn run_config(&self, name: &str, env: Environment, main_class: &str) -> RunConfig {
        let mut run = RunConfig::new(name, env, main_class);
        self.patcher.apply_run_transform(&self.ctx, &mut run);
        run
    }

    /// Libraries the loader keeps on the classpath
    pub fn filter_libraries<'a>(&self, libraries: &'a [Library]) -> Vec<&'a Library> {
        libraries.iter().filter(|lib| self.patcher.library_filter(lib)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::classfile::{ClassNode, JsonClassCodec};
    use crate::config::PipelineConfig;
    use crate::namespace::NamespaceRegistry;
    use crate::patcher::NoTransformPatcher;
    use crate::remap::StructuralRemapper;
    use std::path::Path;
    use tempfile::TempDir;

    fn pipeline(root: &Path, raw: &[(Environment, &str)]) -> ArtifactPipeline {
        let mut registry = NamespaceRegistry::new();
        registry.register_with_targets("official", false, &["intermediary"]).unwrap();
        registry.register_with_targets("intermediary", false, &[]).unwrap();
        let ctx = StageContext::new(PipelineConfig::with_cache_root(root.join("cache")), Arc::new(registry), Arc::new(JsonClassCodec));

        let mut raw_jars = FxHashMap::default();
        for (env, ns) in raw {
            let path = root.join(format!("{env}.jar"));
            let node = ClassNode::new("a").with_method(env.classifier(), "()V");
            write_archive(&path, |w| w.write_entry("a.class", &serde_json::to_vec(&node)?)).unwrap();
            raw_jars.insert(*env, RawJar { path, namespace: ns.to_string() });
        }

        let mut tree = MappingTree::new();
        tree.add_namespace("official");
        let inter = tree.add_namespace("intermediary");
        let a = tree.add_class("a");
        tree.set_class_name(a, inter, Some("net/minecraft/class_1".to_string()));

        let orchestrator = RemapOrchestrator::new(Arc::new(StructuralRemapper::new(JsonClassCodec, 1).unwrap()));
        ArtifactPipeline::new(ctx, "1.20.1", raw_jars, Arc::new(NoTransformPatcher::default()), Arc::new(tree), orchestrator)
    }

    #[test]
    fn test_provide_memoised() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(temp_dir.path(), &[(Environment::Client, "official")]);
        let inter = pipeline.context().namespace("intermediary").unwrap();
        let first = pipeline.provide(Environment::Client, &inter, &inter).unwrap();
        let builds = pipeline.context().builds();
        let second = pipeline.provide(Environment::Client, &inter, &inter).unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.context().builds(), builds);
        assert_eq!(first.patches().tags(), &["fixed", "intermediary"]);
    }

    #[test]
    fn test_combined_runs_merge_first() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(temp_dir.path(), &[(Environment::Client, "official"), (Environment::Server, "official")]);
        let official = pipeline.context().namespace("official").unwrap();
        let out = pipeline.provide(Environment::Combined, &official, &official).unwrap();
        assert_eq!(out.env(), Environment::Combined);
        assert_eq!(out.patches().tags(), &["none-merged", "fixed"]);
    }

    #[test]
    fn test_datagen_reads_server_jar() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(temp_dir.path(), &[(Environment::Server, "official")]);
        let raw = pipeline.raw(Environment::Datagen).unwrap();
        assert_eq!(raw.env(), Environment::Datagen);
        assert_eq!(raw.path(), temp_dir.path().join("server.jar"));
    }

    #[test]
    fn test_missing_raw_jar_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(temp_dir.path(), &[(Environment::Client, "official")]);
        let err = pipeline.patched(Environment::Server).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
