//! Multi-namespace mapping data: sources, the unified tree and its views.

pub mod builder;
pub mod descriptor;
pub mod source;
pub mod transform;
pub mod tree;
pub mod view;

pub use builder::{MappingDependency, MappingTreeBuilder};
pub use source::{ArchiveSource, MappingFile, MappingSource, MemorySource, SourceFile};
pub use transform::{ContainedMapping, MappingAction, OutputNamespace};
pub use tree::{ClassMapping, MappingTree, MemberKind, MemberMapping};
pub use view::MappingView;
