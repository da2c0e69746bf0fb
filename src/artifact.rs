//! Derived jar identities.
//!
//! An artifact is identified by its version, environment and the ordered list
//! of transformation tags applied to the raw jar. The cache path is a pure
//! function of that identity, so a stage whose output path already exists has
//! already run.

use crate::cache::{sanitize_component, version_dir};
use crate::namespace::Namespace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which physical distribution of the game an artifact derives from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Client,
    Server,
    /// Client and server merged into one jar
    Combined,
    /// Server jar used for data generation
    Datagen,
}

impl Environment {
    pub fn classifier(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Combined => "combined",
            Self::Datagen => "datagen",
        }
    }

    /// Environment whose raw jar this one is read from
    pub fn raw_source(self) -> Self {
        match self {
            Self::Datagen => Self::Server,
            other => other,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.classifier())
    }
}

/// Ordered transformation tags; extended only by appending
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchChain(Vec<String>);

impl PatchChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// New chain with `tag` appended
    #[must_use]
    pub fn with(&self, tag: &str) -> Self {
        let mut tags = self.0.clone();
        tags.push(tag.to_string());
        Self(tags)
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// File name suffix, `-tag1+tag2` or empty
    pub fn suffix(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let joined: Vec<String> = self.0.iter().map(|t| sanitize_component(t)).collect();
        format!("-{}", joined.join("+"))
    }
}

/// Cache path of an artifact identity.
///
/// `<root>/<version>/<env>/minecraft-<version>-<env>[-<tag1>+<tag2>...].jar`
pub fn artifact_path(root: &Path, version: &str, env: Environment, patches: &PatchChain) -> PathBuf {
    let version = sanitize_component(version);
    version_dir(root, &version)
        .join(env.classifier())
        .join(format!("minecraft-{}-{}{}.jar", version, env.classifier(), patches.suffix()))
}

/// One jar at one point of the derivation chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    root: PathBuf,
    version: String,
    env: Environment,
    namespace: Namespace,
    fallback: Namespace,
    patches: PatchChain,
    path: PathBuf,
}

impl Artifact {
    /// A raw jar stored outside the derivation cache
    pub fn raw<P: Into<PathBuf>>(
        root: &Path,
        version: &str,
        env: Environment,
        namespace: Namespace,
        fallback: Namespace,
        path: P,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            version: version.to_string(),
            env,
            namespace,
            fallback,
            patches: PatchChain::new(),
            path: path.into(),
        }
    }

    /// A jar at its cache location
    pub fn cached(
        root: &Path,
        version: &str,
        env: Environment,
        namespace: Namespace,
        fallback: Namespace,
        patches: PatchChain,
    ) -> Self {
        let path = artifact_path(root, version, env, &patches);
        Self { root: root.to_path_buf(), version: version.to_string(), env, namespace, fallback, patches, path }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn env(&self) -> Environment {
        self.env
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn fallback(&self) -> &Namespace {
        &self.fallback
    }

    pub fn patches(&self) -> &PatchChain {
        &self.patches
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Derived artifact with one more tag, same namespaces
    #[must_use]
    pub fn derive(&self, tag: &str) -> Self {
        self.derive_into(tag, self.namespace.clone(), self.fallback.clone())
    }

    /// Derived artifact with one more tag in another namespace
    #[must_use]
    pub fn derive_into(&self, tag: &str, namespace: Namespace, fallback: Namespace) -> Self {
        Self::cached(&self.root, &self.version, self.env, namespace, fallback, self.patches.with(tag))
    }

    /// Same identity in another environment, e.g. the combined jar built from a client jar
    #[must_use]
    pub fn for_env(&self, env: Environment, tag: &str) -> Self {
        Self::cached(&self.root, &self.version, env, self.namespace.clone(), self.fallback.clone(), self.patches.with(tag))
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}[{}/{}]{}", self.version, self.env, self.namespace, self.fallback, self.patches.suffix())
    }
}
