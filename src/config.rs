use crate::error::{ForgeError, Result};
use std::path::PathBuf;

/// Namespace the vanilla jars are distributed in
pub const OFFICIAL_NAMESPACE: &str = "official";

/// Classes matching none of these globs are stripped while merging client and server jars.
///
/// Only accurate on jars in the official namespace.
pub const DEFAULT_INCLUDE_GLOBS: &[&str] = &[
    "*",
    "META-INF/**",
    "net/minecraft/**",
    "com/mojang/blaze3d/**",
    "paulscode/sound/**",
    "com/jcraft/**",
];

/// Environment variable overriding the cache root
pub const ENV_CACHE_DIR: &str = "JARFORGE_CACHE_DIR";
/// Environment variable forcing every artifact to be rebuilt once
pub const ENV_FORCE_RELOAD: &str = "JARFORGE_FORCE_RELOAD";
/// Environment variable overriding the remap thread count
pub const ENV_THREADS: &str = "JARFORGE_THREADS";

/// Configuration for the artifact pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Root directory derived jars are cached under
    pub cache_root: PathBuf,
    /// Rebuild every artifact identity once, ignoring existing files
    pub force_reload: bool,
    /// Threads handed to the remap engine
    pub remap_threads: usize,
    /// Globs selecting the classes retained when merging
    pub include_globs: Vec<String>,
    /// Only compare primary namespaces when validating merge inputs
    pub ignore_merge_fallback: bool,
    /// Add the unprotect agent to run configurations
    pub unprotect_runtime: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_root: crate::cache::cache_dir().unwrap_or_else(|_| std::env::temp_dir().join("jarforge")),
            force_reload: false,
            remap_threads: std::thread::available_parallelism().map(std::num::NonZero::get).unwrap_or(1),
            include_globs: DEFAULT_INCLUDE_GLOBS.iter().map(|s| s.to_string()).collect(),
            ignore_merge_fallback: false,
            unprotect_runtime: false,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration rooted at a specific cache directory
    #[must_use]
    pub fn with_cache_root<P: Into<PathBuf>>(cache_root: P) -> Self {
        Self { cache_root: cache_root.into(), ..Self::default() }
    }

    /// Defaults overlaid with `JARFORGE_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            config.cache_root = PathBuf::from(dir);
        }

        if let Ok(force) = std::env::var(ENV_FORCE_RELOAD) {
            config.force_reload = matches!(force.trim().to_lowercase().as_str(), "1" | "true" | "yes");
        }

        if let Ok(threads) = std::env::var(ENV_THREADS) {
            config.remap_threads = threads
                .trim()
                .parse()
                .map_err(|_| ForgeError::configuration(format!("{ENV_THREADS} is not a number: {threads}")))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors for invalid settings
    pub fn validate(&self) -> Result<()> {
        if self.cache_root.as_os_str().is_empty() {
            return Err(ForgeError::configuration("cache_root must not be empty"));
        }

        if self.remap_threads == 0 {
            return Err(ForgeError::configuration("remap_threads must be greater than 0"));
        }

        Ok(())
    }
}
