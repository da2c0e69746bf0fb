//! Mod loader strategies.
//!
//! A [`Patcher`] supplies the loader-specific operations of the pipeline.
//! Shared behaviour (client/server merge, the `fixed` stage, run transforms)
//! lives in [`BasePatcher`]; strategies hold one and delegate to it, only
//! overriding the operations their loader needs.

use crate::archive::rewrite_archive;
use crate::artifact::{Artifact, Environment, PatchChain};
use crate::config::OFFICIAL_NAMESPACE;
use crate::error::{ForgeError, Result};
use crate::merge::{ClassMerger, IncludeFilter, JarMerger, MergeFailurePolicy};
use crate::stage::StageContext;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub mod access_widener;
pub mod binpatch;
pub mod fixes;
pub mod jarmod;

pub use access_widener::{AccessWidener, AccessWidenerPatcher, AccessWidenerRemapper};
pub use binpatch::{BinaryPatchPatcher, PatchApplier};
pub use fixes::{ClosureFix, JarFix, StripSignatures};
pub use jarmod::JarModPatcher;

/// A launch configuration handed to run transforms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub name: String,
    pub env: Option<Environment>,
    pub main_class: String,
    pub jvm_args: Vec<String>,
    pub program_args: Vec<String>,
    pub env_vars: BTreeMap<String, String>,
}

impl RunConfig {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, env: Environment, main_class: S2) -> Self {
        Self { name: name.into(), env: Some(env), main_class: main_class.into(), ..Self::default() }
    }
}

/// A runtime library of the game, `group:name:version[:classifier]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Library {
    pub group: String,
    pub name: String,
    pub version: String,
    pub classifier: Option<String>,
}

impl Library {
    pub fn parse(coordinate: &str) -> Result<Self> {
        let parts: Vec<&str> = coordinate.split(':').collect();
        match parts.as_slice() {
            [group, name, version] => Ok(Self {
                group: group.to_string(),
                name: name.to_string(),
                version: version.to_string(),
                classifier: None,
            }),
            [group, name, version, classifier] => Ok(Self {
                group: group.to_string(),
                name: name.to_string(),
                version: version.to_string(),
                classifier: Some(classifier.to_string()),
            }),
            _ => Err(ForgeError::configuration(format!("invalid library coordinate {coordinate}"))),
        }
    }

    /// `group:name`, the part filters match on
    pub fn module(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

/// Behaviour shared by every loader strategy
#[derive(Clone)]
pub struct BasePatcher {
    prod_namespace: String,
    can_combine: bool,
    merger: ClassMerger,
    include_globs: Option<Vec<String>>,
    on_merge_fail: MergeFailurePolicy,
    fixes: Vec<Arc<dyn JarFix>>,
    unprotect_agent: Option<PathBuf>,
}

impl fmt::Debug for BasePatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasePatcher")
            .field("prod_namespace", &self.prod_namespace)
            .field("can_combine", &self.can_combine)
            .field("on_merge_fail", &self.on_merge_fail)
            .field("fixes", &self.fixes.iter().map(|fix| fix.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for BasePatcher {
    fn default() -> Self {
        Self {
            prod_namespace: OFFICIAL_NAMESPACE.to_string(),
            can_combine: true,
            merger: ClassMerger::new(),
            include_globs: None,
            on_merge_fail: MergeFailurePolicy::Fatal,
            fixes: vec![Arc::new(StripSignatures)],
            unprotect_agent: None,
        }
    }
}

impl BasePatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prod_namespace(mut self, namespace: &str) -> Self {
        self.prod_namespace = namespace.to_string();
        self
    }

    /// Versions without a server jar sharing client classes can't be combined
    #[must_use]
    pub fn with_can_combine(mut self, can_combine: bool) -> Self {
        self.can_combine = can_combine;
        self
    }

    #[must_use]
    pub fn with_merge_failure_policy(mut self, policy: MergeFailurePolicy) -> Self {
        self.on_merge_fail = policy;
        self
    }

    /// Override the pipeline's include globs for merging
    #[must_use]
    pub fn with_include_globs(mut self, globs: &[&str]) -> Self {
        self.include_globs = Some(globs.iter().map(|g| g.to_string()).collect());
        self
    }

    #[must_use]
    pub fn with_fix(mut self, fix: Arc<dyn JarFix>) -> Self {
        self.fixes.push(fix);
        self
    }

    #[must_use]
    pub fn without_fixes(mut self) -> Self {
        self.fixes.clear();
        self
    }

    #[must_use]
    pub fn with_unprotect_agent<P: Into<PathBuf>>(mut self, agent: P) -> Self {
        self.unprotect_agent = Some(agent.into());
        self
    }

    pub fn prod_namespace(&self) -> &str {
        &self.prod_namespace
    }

    pub fn can_combine(&self) -> bool {
        self.can_combine
    }

    /// Merge a client and a server artifact into the combined one.
    ///
    /// The inputs must share their namespace (and fallback unless the
    /// configuration ignores it); this is checked before any class is read.
    pub fn merge(&self, loader: &str, ctx: &StageContext, client: &Artifact, server: &Artifact) -> Result<Artifact> {
        if !self.can_combine {
            return Err(ForgeError::merge_unsupported(format!("{loader} cannot combine {}", client.version())));
        }
        let fallback_differs = !ctx.config().ignore_merge_fallback && client.fallback() != server.fallback();
        if client.namespace() != server.namespace() || fallback_differs {
            return Err(ForgeError::IncompatibleMergeInputs {
                client_namespace: client.namespace().name().to_string(),
                client_fallback: client.fallback().name().to_string(),
                server_namespace: server.namespace().name().to_string(),
                server_fallback: server.fallback().name().to_string(),
            });
        }

        let mut patches = PatchChain::new().with(&format!("{loader}-merged"));
        for tag in client.patches().tags().iter().chain(server.patches().tags()) {
            patches = patches.with(tag);
        }
        let target = Artifact::cached(
            client.cache_root(),
            client.version(),
            Environment::Combined,
            client.namespace().clone(),
            client.fallback().clone(),
            patches,
        );

        let globs = self.include_globs.as_ref().unwrap_or(&ctx.config().include_globs);
        let merger = JarMerger::new(ctx.shared_codec())
            .with_merger(self.merger.clone())
            .with_include(IncludeFilter::new(globs.as_slice())?)
            .with_failure_policy(self.on_merge_fail.clone());
        ctx.produce("merge", target, |output| {
            merger.merge(client.path(), server.path(), output).map(|stats| {
                debug!("[pipeline] merge stats {:?}", stats);
            })
        })
    }

    /// Apply the jar fixes, producing the `fixed` artifact
    pub fn fix(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        let target = input.derive("fixed");
        let fixes = &self.fixes;
        ctx.produce("fix", target, |output| {
            rewrite_archive(
                input.path(),
                output,
                |entry, bytes| {
                    let mut current = Some(bytes);
                    for fix in fixes {
                        current = match current {
                            Some(bytes) => fix.apply(entry, bytes)?,
                            None => break,
                        };
                    }
                    Ok(current)
                },
                |_| Ok(()),
            )
        })
    }

    /// Add the unprotect agent when the configuration asks for it
    pub fn apply_run_transform(&self, ctx: &StageContext, run: &mut RunConfig) {
        if !ctx.config().unprotect_runtime {
            return;
        }
        match &self.unprotect_agent {
            Some(agent) => run.jvm_args.push(format!("-javaagent:{}", agent.display())),
            None => warn!("[runs] unprotect requested for {} but no agent jar is configured", run.name),
        }
    }
}

/// Loader-specific operations of the derivation pipeline.
///
/// Only `name` and `base` are required; every other operation defaults to
/// the base strategy's behaviour or to a no-op.
pub trait Patcher: Send + Sync {
    /// Tag of the loader stage, e.g. `forge`
    fn name(&self) -> &str;

    fn base(&self) -> &BasePatcher;

    /// Namespace the production jar is in at runtime
    fn prod_namespace(&self) -> &str {
        self.base().prod_namespace()
    }

    fn can_combine(&self) -> bool {
        self.base().can_combine()
    }

    fn merge(&self, ctx: &StageContext, client: &Artifact, server: &Artifact) -> Result<Artifact> {
        self.base().merge(self.name(), ctx, client, server)
    }

    /// Loader independent cleanup, tag `fixed`
    fn fix(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        self.base().fix(ctx, input)
    }

    /// Apply the loader's patches
    fn transform(&self, _ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        Ok(input.clone())
    }

    /// Runs on the final remapped artifact
    fn after_remap(&self, _ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        Ok(input.clone())
    }

    fn apply_run_transform(&self, ctx: &StageContext, run: &mut RunConfig) {
        self.base().apply_run_transform(ctx, run);
    }

    /// Whether a game library stays on the runtime classpath
    fn library_filter(&self, _library: &Library) -> bool {
        true
    }
}

/// Vanilla: no loader patches
#[derive(Debug, Clone, Default)]
pub struct NoTransformPatcher {
    base: BasePatcher,
}

impl NoTransformPatcher {
    pub fn new(base: BasePatcher) -> Self {
        Self { base }
    }
}

impl Patcher for NoTransformPatcher {
    fn name(&self) -> &str {
        "none"
    }

    fn base(&self) -> &BasePatcher {
        &self.base
    }
}
