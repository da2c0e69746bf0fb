//! Declarative transforms applied while a mapping file is merged into the tree.

use crate::error::{ForgeError, Result};
use crate::namespace::NamespaceRegistry;
use tracing::info;

/// One recorded transform. Applied in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingAction {
    /// Rename a column of the input file
    MapNamespace { from: String, to: String },
    /// Column the input is joined to the tree on
    SourceNamespace(String),
    /// Drop method names a class inherits instead of declaring
    ChildMethodStrip,
    /// Fill unset output names with the source name
    CopyUnnamedFromSrc,
    /// Recompose nested class names from their enclosing class
    Renest,
    /// Only contribute symbols that already have a name in this namespace
    SkipIfNotIn(String),
    /// Only contribute symbols that already exist in the tree
    OnlyExistingSrc,
    AllowDuplicateOutputs(bool),
    /// Merge this input after the input providing the namespace
    DependsOn(String),
}

impl MappingAction {
    /// Whole-tree passes that run after every input has been merged
    pub fn is_post_pass(&self) -> bool {
        matches!(self, Self::ChildMethodStrip | Self::CopyUnnamedFromSrc | Self::Renest)
    }
}

/// Namespace declared as produced by an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNamespace {
    pub name: String,
    pub named: bool,
    pub can_remap_to: Vec<String>,
}

/// Transforms for the files of a dependency selected by one `contains` block
#[derive(Debug, Clone, Default)]
pub struct ContainedMapping {
    actions: Vec<MappingAction>,
    outputs: Vec<OutputNamespace>,
    finalized: bool,
}

impl ContainedMapping {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &[MappingAction] {
        &self.actions
    }

    pub fn outputs(&self) -> &[OutputNamespace] {
        &self.outputs
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn check_finalized(&self) -> Result<()> {
        if self.finalized {
            return Err(ForgeError::already_finalized("mapping dependency"));
        }
        Ok(())
    }

    fn push(&mut self, action: MappingAction) -> Result<&mut Self> {
        self.check_finalized()?;
        self.actions.push(action);
        Ok(self)
    }

    pub fn map_namespace(&mut self, from: &str, to: &str) -> Result<&mut Self> {
        self.push(MappingAction::MapNamespace { from: from.to_string(), to: to.to_string() })
    }

    pub fn source_namespace(&mut self, namespace: &str) -> Result<&mut Self> {
        self.push(MappingAction::SourceNamespace(namespace.to_string()))
    }

    pub fn child_method_strip(&mut self) -> Result<&mut Self> {
        self.push(MappingAction::ChildMethodStrip)
    }

    pub fn copy_unnamed_from_src(&mut self) -> Result<&mut Self> {
        self.push(MappingAction::CopyUnnamedFromSrc)
    }

    pub fn renest(&mut self) -> Result<&mut Self> {
        self.push(MappingAction::Renest)
    }

    /// Also makes this input depend on `namespace`
    pub fn skip_if_not_in(&mut self, namespace: &str) -> Result<&mut Self> {
        self.push(MappingAction::DependsOn(namespace.to_string()))?;
        self.push(MappingAction::SkipIfNotIn(namespace.to_string()))
    }

    pub fn only_existing_src(&mut self) -> Result<&mut Self> {
        self.push(MappingAction::OnlyExistingSrc)
    }

    pub fn allow_duplicate_outputs(&mut self) -> Result<&mut Self> {
        self.push(MappingAction::AllowDuplicateOutputs(true))
    }

    pub fn disallow_duplicate_outputs(&mut self) -> Result<&mut Self> {
        self.push(MappingAction::AllowDuplicateOutputs(false))
    }

    pub fn depends_on(&mut self, namespace: &str) -> Result<&mut Self> {
        self.push(MappingAction::DependsOn(namespace.to_string()))
    }

    /// Declare a namespace this input produces.
    ///
    /// The namespace is registered when the dependency is finalized; only
    /// declared outputs are written to the tree once any is declared.
    pub fn outputs_namespace(&mut self, namespace: &str, named: bool, can_remap_to: &[&str]) -> Result<&mut Self> {
        self.check_finalized()?;
        self.outputs.push(OutputNamespace {
            name: namespace.to_string(),
            named,
            can_remap_to: can_remap_to.iter().map(|s| s.to_string()).collect(),
        });
        Ok(self)
    }

    pub fn clear_outputs(&mut self) -> Result<&mut Self> {
        self.check_finalized()?;
        self.outputs.clear();
        Ok(self)
    }

    /// Freeze the block and register its output namespaces
    pub(crate) fn finalize(&mut self, registry: &mut NamespaceRegistry, owner: &str) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        for output in &self.outputs {
            let targets = output.can_remap_to.clone();
            registry.register(&output.name, output.named, move || targets.clone())?;
            info!("[mappings] {} adding namespace {}", owner, output.name);
        }
        Ok(())
    }
}
