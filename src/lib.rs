//! JARFORGE - Namespace graph and cached jar derivation for remapping game binaries.
//!
//! This library models symbol naming schemes ("namespaces") and the legal
//! remaps between them, composes mapping data into one multi-namespace tree,
//! and derives game jars for mod loaders through a cached chain of stages
//! (merge, fix, loader patches, remap).
//!
//! # Example
//!
//! ```no_run
//! use jarforge::{Environment, PipelineConfig, ProjectBuilder};
//!
//! let mut builder = ProjectBuilder::new("1.20.1", PipelineConfig::from_env()?);
//! builder
//!     .namespace("official", false, &["intermediary"])?
//!     .namespace("intermediary", false, &["official"])?
//!     .raw_jar(Environment::Client, "downloads/client.jar")?
//!     .dev_namespace("intermediary", "official")?;
//!
//! let project = builder.finalize()?;
//! let jar = project.dev_artifact(Environment::Client)?;
//! println!("{}", jar.path().display());
//! # Ok::<(), jarforge::ForgeError>(())
//! ```

mod stage;

// Public modules
pub mod archive;
pub mod artifact;
pub mod cache;
pub mod classfile;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapping;
pub mod merge;
pub mod namespace;
pub mod patcher;
pub mod pipeline;
pub mod project;
pub mod remap;

// Re-export commonly used types at crate root
pub use artifact::{Artifact, Environment, PatchChain};
pub use classfile::{ClassCodec, ClassHierarchy, ClassNode, JsonClassCodec};
pub use config::PipelineConfig;
pub use error::{ForgeError, Result};
pub use mapping::{MappingDependency, MappingTree, MappingTreeBuilder, MappingView};
pub use merge::{ClassMerger, JarMerger, MergeFailurePolicy, MergeResult};
pub use namespace::{Namespace, NamespaceRegistry};
pub use patcher::{BasePatcher, Patcher};
pub use pipeline::ArtifactPipeline;
pub use project::{Project, ProjectBuilder};
pub use remap::{RemapEngine, RemapOrchestrator, ResourceRemapper};
pub use stage::StageContext;
