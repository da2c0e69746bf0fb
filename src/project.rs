//! Two-phase project configuration.
//!
//! A [`ProjectBuilder`] only records what the build script declares. One call
//! to [`ProjectBuilder::finalize`] executes the recorded operations in order,
//! builds the mapping tree and wires the pipeline; afterwards the builder
//! rejects every change.

use crate::artifact::{Artifact, Environment};
use crate::classfile::{ClassCodec, ClassHierarchy, JsonClassCodec};
use crate::config::{PipelineConfig, OFFICIAL_NAMESPACE};
use crate::error::{ForgeError, Result};
use crate::mapping::{MappingDependency, MappingTree, MappingTreeBuilder};
use crate::namespace::{Namespace, NamespaceRegistry};
use crate::patcher::{AccessWidenerRemapper, NoTransformPatcher, Patcher};
use crate::pipeline::{ArtifactPipeline, RawJar};
use crate::remap::{RemapEngine, RemapOrchestrator, ResourceRemapper, StructuralRemapper};
use crate::stage::StageContext;
use rustc_hash::FxHashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

enum PendingOp {
    Namespace { name: String, named: bool, targets: Vec<String> },
    Mapping(MappingDependency),
    Patcher(Arc<dyn Patcher>),
    DevNamespace { namespace: String, fallback: String },
    RawJar { env: Environment, jar: RawJar },
    Hierarchy(PathBuf),
    Codec(Arc<dyn ClassCodec>),
    Engine(Arc<dyn RemapEngine>),
    ResourceRemapper(Arc<dyn ResourceRemapper>),
}

impl fmt::Debug for PendingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace { name, .. } => write!(f, "Namespace({name})"),
            Self::Mapping(dep) => write!(f, "Mapping({})", dep.describe()),
            Self::Patcher(p) => write!(f, "Patcher({})", p.name()),
            Self::DevNamespace { namespace, fallback } => write!(f, "DevNamespace({namespace}/{fallback})"),
            Self::RawJar { env, jar } => write!(f, "RawJar({env}, {})", jar.path.display()),
            Self::Hierarchy(path) => write!(f, "Hierarchy({})", path.display()),
            Self::Codec(_) => f.write_str("Codec"),
            Self::Engine(_) => f.write_str("Engine"),
            Self::ResourceRemapper(r) => write!(f, "ResourceRemapper({})", r.name()),
        }
    }
}

/// Records the configuration of one game version
#[derive(Debug)]
pub struct ProjectBuilder {
    version: String,
    config: PipelineConfig,
    pending: Vec<PendingOp>,
    finalized: bool,
}

impl ProjectBuilder {
    pub fn new(version: &str, config: PipelineConfig) -> Self {
        Self { version: version.to_string(), config, pending: Vec::new(), finalized: false }
    }

    fn record(&mut self, op: PendingOp) -> Result<&mut Self> {
        if self.finalized {
            return Err(ForgeError::already_finalized(format!("project {}", self.version)));
        }
        debug!("[project] recorded {:?}", op);
        self.pending.push(op);
        Ok(self)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Declare a namespace and its direct remap targets
    pub fn namespace(&mut self, name: &str, named: bool, remaps_to: &[&str]) -> Result<&mut Self> {
        let targets = remaps_to.iter().map(|s| s.to_string()).collect();
        self.record(PendingOp::Namespace { name: name.to_string(), named, targets })
    }

    pub fn mapping(&mut self, dependency: MappingDependency) -> Result<&mut Self> {
        self.record(PendingOp::Mapping(dependency))
    }

    /// Select the loader strategy; the last selection wins
    pub fn patcher<P: Patcher + 'static>(&mut self, patcher: P) -> Result<&mut Self> {
        self.record(PendingOp::Patcher(Arc::new(patcher)))
    }

    /// Namespace the development jar is requested in
    pub fn dev_namespace(&mut self, namespace: &str, fallback: &str) -> Result<&mut Self> {
        self.record(PendingOp::DevNamespace { namespace: namespace.to_string(), fallback: fallback.to_string() })
    }

    /// A vanilla jar in the official namespace
    pub fn raw_jar<P: Into<PathBuf>>(&mut self, env: Environment, path: P) -> Result<&mut Self> {
        self.raw_jar_in(env, path, OFFICIAL_NAMESPACE)
    }

    /// A vanilla jar distributed in another namespace
    pub fn raw_jar_in<P: Into<PathBuf>>(&mut self, env: Environment, path: P, namespace: &str) -> Result<&mut Self> {
        let jar = RawJar { path: path.into(), namespace: namespace.to_string() };
        self.record(PendingOp::RawJar { env, jar })
    }

    /// Jar whose class hierarchy feeds child-method stripping
    pub fn hierarchy_from<P: Into<PathBuf>>(&mut self, jar: P) -> Result<&mut Self> {
        self.record(PendingOp::Hierarchy(jar.into()))
    }

    pub fn codec(&mut self, codec: Arc<dyn ClassCodec>) -> Result<&mut Self> {
        self.record(PendingOp::Codec(codec))
    }

    /// Replace the structural remap engine
    pub fn remap_engine(&mut self, engine: Arc<dyn RemapEngine>) -> Result<&mut Self> {
        self.record(PendingOp::Engine(engine))
    }

    pub fn resource_remapper(&mut self, remapper: Arc<dyn ResourceRemapper>) -> Result<&mut Self> {
        self.record(PendingOp::ResourceRemapper(remapper))
    }

    /// Execute the recorded operations in order and build the project.
    ///
    /// Configuration errors (namespace conflicts, unknown namespaces, missing
    /// remap paths to the dev namespace) surface here, before any jar work.
    pub fn finalize(&mut self) -> Result<Project> {
        if self.finalized {
            return Err(ForgeError::already_finalized(format!("project {}", self.version)));
        }
        self.finalized = true;
        self.config.validate()?;

        let mut registry = NamespaceRegistry::new();
        let mut mappings = MappingTreeBuilder::new();
        let mut patcher: Arc<dyn Patcher> = Arc::new(NoTransformPatcher::default());
        let mut dev = None;
        let mut raw_jars = FxHashMap::default();
        let mut hierarchy_jar = None;
        let mut codec: Arc<dyn ClassCodec> = Arc::new(JsonClassCodec);
        let mut engine: Option<Arc<dyn RemapEngine>> = None;
        let mut resources: Vec<Arc<dyn ResourceRemapper>> = vec![Arc::new(AccessWidenerRemapper)];

        for op in std::mem::take(&mut self.pending) {
            match op {
                PendingOp::Namespace { name, named, targets } => {
                    registry.register(&name, named, move || targets.clone())?;
                }
                PendingOp::Mapping(dependency) => {
                    mappings.add(dependency);
                }
                PendingOp::Patcher(selected) => patcher = selected,
                PendingOp::DevNamespace { namespace, fallback } => dev = Some((namespace, fallback)),
                PendingOp::RawJar { env, jar } => {
                    raw_jars.insert(env, jar);
                }
                PendingOp::Hierarchy(path) => hierarchy_jar = Some(path),
                PendingOp::Codec(selected) => codec = selected,
                PendingOp::Engine(selected) => engine = Some(selected),
                PendingOp::ResourceRemapper(remapper) => resources.push(remapper),
            }
        }

        let hierarchy = hierarchy_jar.map(|jar| ClassHierarchy::from_jar(&jar, codec.as_ref())).transpose()?;
        let tree = mappings.build(&mut registry, hierarchy.as_ref())?;
        info!("[project] {} mapping tree: {} classes in {:?}", self.version, tree.len(), tree.namespaces());

        let prod = registry.get(patcher.prod_namespace())?;
        for jar in raw_jars.values() {
            registry.get(&jar.namespace)?;
        }
        let dev = match dev {
            Some((namespace, fallback)) => {
                let namespace = registry.get(&namespace)?;
                let fallback = registry.get(&fallback)?;
                registry.resolve_path(&prod, &prod, &namespace, &fallback)?;
                Some((namespace, fallback))
            }
            None => None,
        };

        let engine: Arc<dyn RemapEngine> = match engine {
            Some(engine) => engine,
            None => Arc::new(StructuralRemapper::new(Arc::clone(&codec), self.config.remap_threads)?),
        };
        let orchestrator = resources
            .into_iter()
            .fold(RemapOrchestrator::new(engine), RemapOrchestrator::with_resource_remapper);

        let registry = Arc::new(registry);
        let tree = Arc::new(tree);
        let ctx = StageContext::new(self.config.clone(), Arc::clone(&registry), codec);
        let pipeline = ArtifactPipeline::new(ctx, &self.version, raw_jars, patcher, Arc::clone(&tree), orchestrator);
        Ok(Project { registry, tree, pipeline, dev })
    }
}

/// A finalized project
#[derive(Debug)]
pub struct Project {
    registry: Arc<NamespaceRegistry>,
    tree: Arc<MappingTree>,
    pipeline: ArtifactPipeline,
    dev: Option<(Namespace, Namespace)>,
}

impl Project {
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// The unified mapping tree, read-only
    pub fn mapping_tree(&self) -> &MappingTree {
        &self.tree
    }

    pub fn pipeline(&self) -> &ArtifactPipeline {
        &self.pipeline
    }

    pub fn namespace(&self, name: &str) -> Result<Namespace> {
        self.registry.get(name)
    }

    /// The jar of `env` in the configured dev namespace
    pub fn dev_artifact(&self, env: Environment) -> Result<Artifact> {
        let (namespace, fallback) =
            self.dev.as_ref().ok_or_else(|| ForgeError::configuration("no dev namespace configured"))?;
        self.pipeline.provide(env, namespace, fallback)
    }

    /// Remap a jar built in the dev namespace into the loader's production namespace
    pub fn remap_jar(&self, env: Environment, input: &Path, output: &Path) -> Result<()> {
        let (namespace, fallback) =
            self.dev.as_ref().ok_or_else(|| ForgeError::configuration("no dev namespace configured"))?;
        let prod = self.registry.get(self.pipeline.patcher().prod_namespace())?;
        self.pipeline.remap_jar(env, input, output, (namespace, fallback), &prod)
    }
}
