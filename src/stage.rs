//! Shared services for derivation stages: cache checks, forced rebuilds and
//! cleanup of partial outputs.

use crate::archive::{discard_partial, write_archive, JarWriter};
use crate::artifact::Artifact;
use crate::cache::ensure_dir;
use crate::classfile::ClassCodec;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::namespace::{Namespace, NamespaceRegistry};
use rustc_hash::FxHashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Everything a stage needs besides its input artifact
pub struct StageContext {
    config: PipelineConfig,
    registry: Arc<NamespaceRegistry>,
    codec: Arc<dyn ClassCodec>,
    /// Outputs rebuilt by this context while `force_reload` is set
    rebuilt: Mutex<FxHashSet<PathBuf>>,
    builds: AtomicUsize,
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("builds", &self.builds.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl StageContext {
    pub fn new(config: PipelineConfig, registry: Arc<NamespaceRegistry>, codec: Arc<dyn ClassCodec>) -> Self {
        Self { config, registry, codec, rebuilt: Mutex::new(FxHashSet::default()), builds: AtomicUsize::new(0) }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &dyn ClassCodec {
        self.codec.as_ref()
    }

    pub fn shared_codec(&self) -> Arc<dyn ClassCodec> {
        Arc::clone(&self.codec)
    }

    pub fn namespace(&self, name: &str) -> Result<Namespace> {
        self.registry.get(name)
    }

    /// Number of stage outputs actually built, cache hits excluded
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Whether `target` can be reused as is.
    ///
    /// With `force_reload` every output is rebuilt once per context, later
    /// requests reuse the rebuilt file.
    pub fn is_cached(&self, target: &Artifact) -> bool {
        if !target.exists() {
            return false;
        }
        if !self.config.force_reload {
            return true;
        }
        self.rebuilt.lock().unwrap_or_else(PoisonError::into_inner).contains(target.path())
    }

    /// Produce `target` with `build` unless it is cached.
    ///
    /// `build` receives the output path. On error the partial output is
    /// deleted, leaving the cache as if the stage never ran.
    pub fn produce<F>(&self, stage: &str, target: Artifact, build: F) -> Result<Artifact>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        if self.is_cached(&target) {
            debug!("[pipeline] {} cache hit for {}", stage, target.path().display());
            return Ok(target);
        }

        let path = target.path();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        info!("[pipeline] {} building {}", stage, target);
        if let Err(e) = build(path) {
            discard_partial(path);
            return Err(e);
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.config.force_reload {
            self.rebuilt.lock().unwrap_or_else(PoisonError::into_inner).insert(path.to_path_buf());
        }
        Ok(target)
    }

    /// [`produce`](Self::produce) for stages that write a fresh jar
    pub fn produce_jar<F>(&self, stage: &str, target: Artifact, body: F) -> Result<Artifact>
    where
        F: FnOnce(&mut JarWriter) -> Result<()>,
    {
        self.produce(stage, target, |path| write_archive(path, body))
    }
}
