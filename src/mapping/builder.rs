//! Composition of mapping dependencies into one [`MappingTree`].
//!
//! Building happens in two phases. First every input file is merged in
//! dependency order: each file is claimed by the first `contains` block whose
//! predicate accepts it (or the dependency's default block), its columns are
//! renamed and it is joined to the tree on its source namespace. Then the
//! whole-tree passes (renest, copy-unnamed, child-method stripping) run in the
//! order their inputs were merged, since they depend on every other class's
//! final names.

use super::descriptor::remap_descriptor;
use super::source::{MappingFile, MappingSource, SourceFile};
use super::transform::{ContainedMapping, MappingAction};
use super::tree::{MappingTree, MemberKind};
use crate::classfile::ClassHierarchy;
use crate::error::{ForgeError, Result};
use crate::namespace::NamespaceRegistry;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Selects files of a source by `(file name, file kind)`
pub type FilePredicate = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// A mapping source plus the transforms applied to its files
pub struct MappingDependency {
    source: Arc<dyn MappingSource>,
    default_block: ContainedMapping,
    contained: Vec<(FilePredicate, ContainedMapping)>,
    finalized: bool,
}

impl fmt::Debug for MappingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingDependency")
            .field("source", &self.source.describe())
            .field("contains", &self.contained.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

impl MappingDependency {
    pub fn new<S: MappingSource + 'static>(source: S) -> Self {
        Self::from_source(Arc::new(source))
    }

    pub fn from_source(source: Arc<dyn MappingSource>) -> Self {
        Self { source, default_block: ContainedMapping::new(), contained: Vec::new(), finalized: false }
    }

    pub fn describe(&self) -> String {
        self.source.describe()
    }

    fn check_finalized(&self) -> Result<()> {
        if self.finalized {
            return Err(ForgeError::already_finalized(format!("mapping dependency {}", self.describe())));
        }
        Ok(())
    }

    /// Transforms for files no `contains` block claims
    pub fn default_block(&mut self) -> Result<&mut ContainedMapping> {
        self.check_finalized()?;
        Ok(&mut self.default_block)
    }

    /// Add a block for the files accepted by `predicate`.
    ///
    /// Blocks are tried in declaration order, the first match wins.
    pub fn contains<P, F>(&mut self, predicate: P, configure: F) -> Result<&mut Self>
    where
        P: Fn(&str, &str) -> bool + Send + Sync + 'static,
        F: FnOnce(&mut ContainedMapping) -> Result<()>,
    {
        self.check_finalized()?;
        let mut block = ContainedMapping::new();
        configure(&mut block)?;
        self.contained.push((Arc::new(predicate), block));
        Ok(self)
    }

    /// Drop every `contains` block, keeping the default one
    pub fn clear_contains(&mut self) -> Result<&mut Self> {
        self.check_finalized()?;
        self.contained.clear();
        Ok(self)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Freeze the dependency and register the namespaces it outputs
    pub fn finalize(&mut self, registry: &mut NamespaceRegistry) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let owner = self.describe();
        self.default_block.finalize(registry, &owner)?;
        for (_, block) in &mut self.contained {
            block.finalize(registry, &owner)?;
        }
        self.finalized = true;
        info!("[mappings] finalized {}", owner);
        Ok(())
    }

    fn block_for(&self, file: &SourceFile) -> &ContainedMapping {
        self.contained
            .iter()
            .find(|(predicate, _)| predicate(&file.name, &file.kind))
            .map_or(&self.default_block, |(_, block)| block)
    }
}

/// One file with its transforms resolved, ready to merge
#[derive(Debug)]
struct PreparedInput {
    label: String,
    file: MappingFile,
    /// Column the file is joined to the tree on
    key_ns: String,
    /// Explicitly declared source namespace
    source_ns: Option<String>,
    /// File columns written to the tree
    written: Vec<usize>,
    outputs: Vec<String>,
    depends: Vec<String>,
    skip_if_not_in: Vec<String>,
    only_existing_src: bool,
    allow_duplicates: bool,
    post_passes: Vec<MappingAction>,
}

impl PreparedInput {
    fn prepare(label: String, mut file: MappingFile, block: &ContainedMapping) -> Result<Option<Self>> {
        let mut source_ns = None;
        let mut depends = Vec::new();
        let mut skip_if_not_in = Vec::new();
        let mut only_existing_src = false;
        let mut allow_duplicates = false;
        let mut post_passes = Vec::new();

        for action in block.actions() {
            match action {
                MappingAction::MapNamespace { from, to } => {
                    if !file.rename_namespace(from, to) {
                        trace!("[mappings] {} has no column {} to rename", label, from);
                    }
                },
                MappingAction::SourceNamespace(ns) => source_ns = Some(ns.clone()),
                MappingAction::SkipIfNotIn(ns) => skip_if_not_in.push(ns.clone()),
                MappingAction::OnlyExistingSrc => only_existing_src = true,
                MappingAction::AllowDuplicateOutputs(allow) => allow_duplicates = *allow,
                MappingAction::DependsOn(ns) => depends.push(ns.clone()),
                post => post_passes.push(post.clone()),
            }
        }

        let Some(first) = file.namespaces.first() else {
            warn!("[mappings] {} declares no namespaces, skipping", label);
            return Ok(None);
        };
        let key_ns = source_ns.clone().unwrap_or_else(|| first.clone());
        if !file.namespaces.contains(&key_ns) {
            return Err(ForgeError::unknown_namespace(key_ns, format!("source namespace of {label}")));
        }

        let outputs: Vec<String> = block.outputs().iter().map(|o| o.name.clone()).collect();
        let written = file
            .namespaces
            .iter()
            .enumerate()
            .filter(|(_, ns)| **ns == key_ns || outputs.is_empty() || outputs.contains(*ns))
            .map(|(j, _)| j)
            .collect();

        Ok(Some(Self {
            label,
            file,
            key_ns,
            source_ns,
            written,
            outputs,
            depends,
            skip_if_not_in,
            only_existing_src,
            allow_duplicates,
            post_passes,
        }))
    }

    fn provides(&self) -> impl Iterator<Item = &str> {
        self.written.iter().map(|&j| self.file.namespaces[j].as_str()).filter(move |ns| *ns != self.key_ns)
    }

    /// Tree columns of the namespaces this input outputs
    fn output_columns(&self, tree: &MappingTree, exclude: usize) -> Vec<usize> {
        let names: Vec<&str> = if self.outputs.is_empty() {
            self.provides().collect()
        } else {
            self.outputs.iter().map(String::as_str).collect()
        };
        names.into_iter().filter_map(|ns| tree.namespace_id(ns)).filter(|&col| col != exclude).collect()
    }
}

/// Builds the unified mapping tree from declared dependencies
#[derive(Debug, Default)]
pub struct MappingTreeBuilder {
    dependencies: Vec<MappingDependency>,
}

impl MappingTreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dependency: MappingDependency) -> &mut Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn dependencies(&self) -> &[MappingDependency] {
        &self.dependencies
    }

    pub fn dependencies_mut(&mut self) -> &mut [MappingDependency] {
        &mut self.dependencies
    }

    /// Finalize every dependency and merge them into one tree.
    ///
    /// `hierarchy` is the class hierarchy of the jar in the tree's source
    /// namespace, needed only by `child_method_strip`.
    pub fn build(&mut self, registry: &mut NamespaceRegistry, hierarchy: Option<&ClassHierarchy>) -> Result<MappingTree> {
        for dependency in &mut self.dependencies {
            dependency.finalize(registry)?;
        }

        let mut pending = Vec::new();
        for dependency in &self.dependencies {
            for file in dependency.source.files()? {
                let block = dependency.block_for(&file);
                let label = format!("{}:{}", dependency.describe(), file.name);
                if let Some(input) = PreparedInput::prepare(label, file.content, block)? {
                    pending.push(input);
                }
            }
        }

        let mut tree = MappingTree::new();
        let mut applied = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let next = next_ready(&pending, &tree).ok_or_else(|| {
                let names: Vec<&str> = pending.iter().map(|p| p.label.as_str()).collect();
                ForgeError::configuration(format!("circular mapping dependencies between {}", names.join(", ")))
            })?;
            let input = pending.remove(next);
            merge_input(&mut tree, &input)?;
            applied.push(input);
        }

        for input in &applied {
            for pass in &input.post_passes {
                run_post_pass(&mut tree, input, pass, hierarchy)?;
            }
        }

        info!("[mappings] built tree with {} classes over {:?}", tree.len(), tree.namespaces());
        Ok(tree)
    }
}

/// First pending input whose dependencies are satisfied
fn next_ready(pending: &[PreparedInput], tree: &MappingTree) -> Option<usize> {
    pending.iter().position(|input| {
        input.depends.iter().all(|ns| {
            tree.namespace_id(ns).is_some()
                || !pending.iter().any(|other| !std::ptr::eq(other, input) && other.provides().any(|p| p == ns))
        })
    })
}

fn file_name<'a>(names: &'a [Option<String>], col: usize) -> Option<&'a str> {
    names.get(col).and_then(|n| n.as_deref())
}

fn merge_input(tree: &mut MappingTree, input: &PreparedInput) -> Result<()> {
    if tree.namespaces().is_empty() {
        tree.add_namespace(&input.key_ns);
    }
    let key_col = tree.require_namespace(&input.key_ns, &format!("source namespace of {}", input.label))?;
    let key_file_col = input.file.namespaces.iter().position(|ns| *ns == input.key_ns).unwrap_or(0);

    let mut skip_cols = Vec::with_capacity(input.skip_if_not_in.len());
    for ns in &input.skip_if_not_in {
        skip_cols.push(tree.require_namespace(ns, &format!("skip_if_not_in of {}", input.label))?);
    }
    let filtered = input.only_existing_src || !skip_cols.is_empty();

    // file column -> tree column
    let mut columns = Vec::with_capacity(input.written.len());
    for &j in &input.written {
        let ns = &input.file.namespaces[j];
        let col = tree.add_namespace(ns);
        if col != key_col && col != 0 {
            columns.push((j, col));
        }
    }
    let src_file_col = tree.src_namespace().and_then(|src| input.file.namespaces.iter().position(|ns| ns == src));

    let mut rows = vec![None; input.file.classes.len()];
    let mut desc_map: FxHashMap<&str, String> = FxHashMap::default();
    let mut skipped = 0usize;

    for (ci, entry) in input.file.classes.iter().enumerate() {
        let Some(key_name) = file_name(&entry.names, key_file_col) else {
            continue;
        };
        let row = match tree.find_class(key_name, key_col) {
            Some(row) => row,
            None if filtered => {
                skipped += 1;
                continue;
            },
            None if key_col == 0 => tree.add_class(key_name),
            None => match src_file_col.and_then(|c| file_name(&entry.names, c)) {
                Some(src_name) => {
                    let row = tree.add_class(src_name);
                    tree.set_class_name(row, key_col, Some(key_name.to_string()));
                    row
                },
                None => {
                    trace!("[mappings] cannot anchor class {} from {}", key_name, input.label);
                    skipped += 1;
                    continue;
                },
            },
        };
        if skip_cols.iter().any(|&col| tree.class_name(row, col).is_none()) {
            skipped += 1;
            continue;
        }

        for &(j, col) in &columns {
            if let Some(name) = file_name(&entry.names, j) {
                set_output_name(tree, row, col, name.to_string(), input.allow_duplicates);
            }
        }
        rows[ci] = Some(row);
        if let (Some(desc_name), Some(src_name)) = (file_name(&entry.names, 0), tree.class_name(row, 0)) {
            desc_map.insert(desc_name, src_name.to_string());
        }
    }

    let translate_desc = input.file.namespaces.first().map(String::as_str) != tree.src_namespace();
    for (ci, entry) in input.file.classes.iter().enumerate() {
        let Some(row) = rows[ci] else {
            continue;
        };
        for (kind, members) in [(MemberKind::Field, &entry.fields), (MemberKind::Method, &entry.methods)] {
            for member in members {
                let Some(key_name) = file_name(&member.names, key_file_col) else {
                    continue;
                };
                let src_desc = member.desc.as_deref().map(|desc| {
                    if translate_desc {
                        remap_descriptor(desc, |name| desc_map.get(name).cloned())
                    } else {
                        desc.to_string()
                    }
                });

                let idx = match tree.find_member(row, kind, key_name, key_col, src_desc.as_deref()) {
                    Some(idx) => idx,
                    None if filtered => {
                        skipped += 1;
                        continue;
                    },
                    None if key_col == 0 => tree.add_member(row, kind, key_name, src_desc.as_deref()),
                    None => match src_file_col.and_then(|c| file_name(&member.names, c)) {
                        Some(src_name) => {
                            let idx = tree.add_member(row, kind, src_name, src_desc.as_deref());
                            if let Some(m) = tree.member_mut(row, kind, idx) {
                                m.set_name(key_col, Some(key_name.to_string()));
                            }
                            idx
                        },
                        None => {
                            skipped += 1;
                            continue;
                        },
                    },
                };

                let Some(mapping) = tree.member_mut(row, kind, idx) else {
                    continue;
                };
                if skip_cols.iter().any(|&col| mapping.name(col).is_none()) {
                    skipped += 1;
                    continue;
                }
                for &(j, col) in &columns {
                    if let Some(name) = file_name(&member.names, j) {
                        mapping.set_name(col, Some(name.to_string()));
                    }
                }
            }
        }
    }

    debug!(
        "[mappings] merged {} ({} classes, {} skipped) joined on {}",
        input.label,
        input.file.classes.len(),
        skipped,
        input.key_ns
    );
    Ok(())
}

fn run_post_pass(
    tree: &mut MappingTree,
    input: &PreparedInput,
    pass: &MappingAction,
    hierarchy: Option<&ClassHierarchy>,
) -> Result<()> {
    match pass {
        MappingAction::Renest | MappingAction::CopyUnnamedFromSrc => {
            let what = if *pass == MappingAction::Renest { "renest" } else { "copy_unnamed_from_src" };
            let Some(source_ns) = input.source_ns.as_deref() else {
                return Err(ForgeError::unknown_namespace(
                    "<unset>",
                    format!("{what} of {} requires a declared source namespace", input.label),
                ));
            };
            let src = tree.require_namespace(source_ns, &format!("{what} of {}", input.label))?;
            for dst in input.output_columns(tree, src) {
                if *pass == MappingAction::Renest {
                    renest(tree, src, dst, input.allow_duplicates);
                } else {
                    copy_unnamed(tree, src, dst, input.allow_duplicates);
                }
            }
            Ok(())
        },
        MappingAction::ChildMethodStrip => {
            let hierarchy = hierarchy.ok_or_else(|| {
                ForgeError::configuration(format!("child_method_strip of {} needs a class hierarchy", input.label))
            })?;
            child_method_strip(tree, hierarchy);
            Ok(())
        },
        other => {
            warn!("[mappings] {:?} is not a tree pass", other);
            Ok(())
        },
    }
}

/// Recompose nested class names in `dst` from their enclosing class
pub(crate) fn renest(tree: &mut MappingTree, src: usize, dst: usize, allow_duplicates: bool) {
    let mut nest = Renest { src, dst, allow_duplicates, memo: FxHashMap::default() };
    for idx in 0..tree.len() {
        if tree.class_name(idx, src).is_some_and(|n| n.contains('$')) {
            nest.fix(tree, idx);
        }
    }
}

/// Write a class name produced by an input, honouring its duplicate policy
fn set_output_name(tree: &mut MappingTree, row: usize, col: usize, name: String, allow_duplicates: bool) -> bool {
    if allow_duplicates {
        tree.set_class_name_shared(row, col, Some(name))
    } else {
        tree.set_class_name(row, col, Some(name))
    }
}

struct Renest {
    src: usize,
    dst: usize,
    allow_duplicates: bool,
    memo: FxHashMap<usize, Option<String>>,
}

impl Renest {
    fn fix(&mut self, tree: &mut MappingTree, idx: usize) -> Option<String> {
        if let Some(done) = self.memo.get(&idx) {
            return done.clone();
        }

        let current = tree.class_name(idx, self.dst).map(str::to_string);
        if let Some(name) = self.nested_name(tree, idx, current.as_deref()) {
            if current.as_deref() != Some(name.as_str()) {
                trace!("[mappings] renest {:?} -> {}", current, name);
                set_output_name(tree, idx, self.dst, name, self.allow_duplicates);
            }
        }
        let result = tree.class_name(idx, self.dst).map(str::to_string);
        self.memo.insert(idx, result.clone());
        result
    }

    /// `fixedParent$inner`, or `None` when the enclosing class has no target name
    fn nested_name(&mut self, tree: &mut MappingTree, idx: usize, current: Option<&str>) -> Option<String> {
        let src_name = tree.class_name(idx, self.src)?.to_string();
        let (parent_src, simple) = src_name.rsplit_once('$')?;
        let parent = tree.find_class(parent_src, self.src)?;
        let fixed_parent = self.fix(tree, parent)?;
        let inner = current.map_or(simple, simple_name);
        Some(format!("{fixed_parent}${inner}"))
    }
}

/// Part of a class name after the package and the last nest separator
fn simple_name(name: &str) -> &str {
    let name = name.rsplit_once('/').map_or(name, |(_, n)| n);
    name.rsplit_once('$').map_or(name, |(_, n)| n)
}

/// Fill names missing in `dst` with the `src` name
pub(crate) fn copy_unnamed(tree: &mut MappingTree, src: usize, dst: usize, allow_duplicates: bool) {
    for idx in 0..tree.len() {
        if tree.class_name(idx, dst).is_none() {
            if let Some(name) = tree.class_name(idx, src).map(str::to_string) {
                set_output_name(tree, idx, dst, name, allow_duplicates);
            }
        }
        let Some(class) = tree.class_mut(idx) else {
            continue;
        };
        for member in class.fields_mut().iter_mut() {
            if member.name(dst).is_none() {
                let name = member.name(src).map(str::to_string);
                member.set_name(dst, name);
            }
        }
        for member in class.methods_mut().iter_mut() {
            if member.name(dst).is_none() {
                let name = member.name(src).map(str::to_string);
                member.set_name(dst, name);
            }
        }
    }
}

/// Drop method rows a class inherits from an ancestor instead of declaring
pub(crate) fn child_method_strip(tree: &mut MappingTree, hierarchy: &ClassHierarchy) {
    let mut stripped = 0usize;
    for idx in 0..tree.len() {
        let Some(class_name) = tree.class_name(idx, 0).map(str::to_string) else {
            continue;
        };
        if !hierarchy.contains(&class_name) {
            continue;
        }
        let Some(class) = tree.class_mut(idx) else {
            continue;
        };
        let before = class.methods().len();
        class.methods_mut().retain(|m| {
            let (Some(name), Some(desc)) = (m.src_name(), m.src_desc()) else {
                return true;
            };
            hierarchy.declares_method(&class_name, name, desc) != Some(false)
                || !hierarchy.inherits_method(&class_name, name, desc)
        });
        stripped += before - class.methods().len();
    }
    debug!("[mappings] stripped {} inherited method mappings", stripped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassNode;
    use crate::mapping::source::MemorySource;

    fn intermediary_file() -> MappingFile {
        let mut file = MappingFile::new(&["official", "intermediary"]);
        file.class(&[Some("a"), Some("net/minecraft/class_1")])
            .field(&[Some("b"), Some("field_1")], Some("La;"))
            .method(&[Some("c"), Some("method_1")], Some("(La;)V"));
        file.class(&[Some("a$b"), Some("net/minecraft/class_1$class_2")]);
        file
    }

    fn yarn_file() -> MappingFile {
        let mut file = MappingFile::new(&["intermediary", "named"]);
        file.class(&[Some("net/minecraft/class_1"), Some("net/minecraft/world/World")])
            .method(&[Some("method_1"), Some("tick")], Some("(Lnet/minecraft/class_1;)V"));
        file
    }

    fn intermediary_dep() -> MappingDependency {
        let mut dep = MappingDependency::new(MemorySource::new("intermediary").with_file("mappings.json", intermediary_file()));
        dep.default_block().unwrap().outputs_namespace("intermediary", false, &["named", "official"]).unwrap();
        dep
    }

    #[test]
    fn test_single_input_defines_source_column() {
        let mut registry = NamespaceRegistry::new();
        let mut builder = MappingTreeBuilder::new();
        builder.add(intermediary_dep());
        let tree = builder.build(&mut registry, None).unwrap();

        assert_eq!(tree.namespaces(), &["official", "intermediary"]);
        let view = tree.view("official", "official", "intermediary").unwrap();
        assert_eq!(view.map_class("a").as_deref(), Some("net/minecraft/class_1"));
        assert_eq!(view.map_method("a", "c", Some("(La;)V")).as_deref(), Some("method_1"));
        assert!(registry.contains("intermediary"));
    }

    #[test]
    fn test_second_input_joins_on_source_namespace() {
        let mut registry = NamespaceRegistry::new();
        let mut builder = MappingTreeBuilder::new();
        let mut yarn = MappingDependency::new(MemorySource::new("yarn").with_file("mappings.json", yarn_file()));
        yarn.default_block().unwrap().outputs_namespace("named", true, &["intermediary"]).unwrap();
        // declared first but depends on intermediary
        yarn.default_block().unwrap().depends_on("intermediary").unwrap();
        builder.add(yarn);
        builder.add(intermediary_dep());

        let tree = builder.build(&mut registry, None).unwrap();
        assert_eq!(tree.namespaces(), &["official", "intermediary", "named"]);
        let view = tree.view("official", "official", "named").unwrap();
        assert_eq!(view.map_class("a").as_deref(), Some("net/minecraft/world/World"));
        assert_eq!(view.map_method("a", "c", Some("(La;)V")).as_deref(), Some("tick"));
    }

    #[test]
    fn test_map_namespace_renames_column() {
        let mut registry = NamespaceRegistry::new();
        let mut dep = MappingDependency::new(MemorySource::new("mcp").with_file("mappings.json", intermediary_file()));
        dep.default_block().unwrap().map_namespace("intermediary", "searge").unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut registry, None).unwrap();
        assert_eq!(tree.namespaces(), &["official", "searge"]);
    }

    #[test]
    fn test_first_matching_contains_block_wins() {
        let mut registry = NamespaceRegistry::new();
        let source = MemorySource::new("multi")
            .with_file("client.json", intermediary_file())
            .with_file("server.json", intermediary_file());
        let mut dep = MappingDependency::new(source);
        dep.contains(|name, _| name.starts_with("client"), |block| {
            block.map_namespace("intermediary", "client_ns")?;
            Ok(())
        })
        .unwrap();
        dep.contains(|_, kind| kind == "json", |block| {
            block.map_namespace("intermediary", "json_ns")?;
            Ok(())
        })
        .unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut registry, None).unwrap();
        assert_eq!(tree.namespaces(), &["official", "client_ns", "json_ns"]);
    }

    #[test]
    fn test_clear_contains_restores_default() {
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", intermediary_file()));
        dep.contains(|_, _| true, |block| {
            block.map_namespace("intermediary", "other")?;
            Ok(())
        })
        .unwrap();
        dep.clear_contains().unwrap();

        let mut registry = NamespaceRegistry::new();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut registry, None).unwrap();
        assert_eq!(tree.namespaces(), &["official", "intermediary"]);
    }

    #[test]
    fn test_dependency_frozen_after_build() {
        let mut registry = NamespaceRegistry::new();
        let mut builder = MappingTreeBuilder::new();
        builder.add(intermediary_dep());
        builder.build(&mut registry, None).unwrap();
        let dep = &mut builder.dependencies_mut()[0];
        assert!(matches!(dep.default_block(), Err(ForgeError::AlreadyFinalized { .. })));
        assert!(matches!(dep.clear_contains(), Err(ForgeError::AlreadyFinalized { .. })));
    }

    #[test]
    fn test_skip_if_not_in_filters_symbols() {
        let mut registry = NamespaceRegistry::new();
        let mut names = MappingFile::new(&["intermediary", "named"]);
        names.class(&[Some("net/minecraft/class_1"), Some("World")]);
        names.class(&[Some("net/minecraft/class_999"), Some("Ghost")]);
        let mut dep = MappingDependency::new(MemorySource::new("names").with_file("n.json", names));
        dep.default_block().unwrap().skip_if_not_in("intermediary").unwrap();

        let mut builder = MappingTreeBuilder::new();
        builder.add(intermediary_dep());
        builder.add(dep);
        let tree = builder.build(&mut registry, None).unwrap();
        let named = tree.namespace_id("named").unwrap();
        assert!(tree.find_class("World", named).is_some());
        assert!(tree.find_class("Ghost", named).is_none());
    }

    #[test]
    fn test_unknown_source_namespace() {
        let mut registry = NamespaceRegistry::new();
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", intermediary_file()));
        dep.default_block().unwrap().source_namespace("mojmap").unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        assert!(matches!(builder.build(&mut registry, None), Err(ForgeError::UnknownNamespace { .. })));
    }

    #[test]
    fn test_renest_without_source_namespace_fails() {
        let mut registry = NamespaceRegistry::new();
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", intermediary_file()));
        dep.default_block().unwrap().renest().unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        assert!(matches!(builder.build(&mut registry, None), Err(ForgeError::UnknownNamespace { .. })));
    }

    #[test]
    fn test_renest_uses_renamed_parent() {
        let mut file = MappingFile::new(&["official", "named"]);
        file.class(&[Some("Outer"), Some("A")]);
        file.class(&[Some("Outer$Inner"), None]);
        file.class(&[Some("Outer$Inner$Deep"), Some("pkg/Renamed$Deepest")]);
        file.class(&[Some("Lonely$Child"), Some("Kept")]);

        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", file));
        dep.default_block()
            .unwrap()
            .source_namespace("official")
            .unwrap()
            .outputs_namespace("named", true, &[])
            .unwrap()
            .renest()
            .unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut NamespaceRegistry::new(), None).unwrap();

        let view = tree.view("official", "official", "named").unwrap();
        assert_eq!(view.map_class("Outer$Inner").as_deref(), Some("A$Inner"));
        assert_eq!(view.map_class("Outer$Inner$Deep").as_deref(), Some("A$Inner$Deepest"));
        // parent has no target name, own mapping untouched
        assert_eq!(view.map_class("Lonely$Child").as_deref(), Some("Kept"));
    }

    #[test]
    fn test_copy_unnamed_from_src() {
        let mut file = MappingFile::new(&["official", "named"]);
        file.class(&[Some("a"), None]).method(&[Some("b"), None], Some("()V"));
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", file));
        dep.default_block().unwrap().source_namespace("official").unwrap().copy_unnamed_from_src().unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut NamespaceRegistry::new(), None).unwrap();

        let view = tree.view("official", "official", "named").unwrap();
        assert_eq!(view.map_class("a").as_deref(), Some("a"));
        assert_eq!(view.map_method("a", "b", Some("()V")).as_deref(), Some("b"));
    }

    #[test]
    fn test_child_method_strip() {
        let mut file = MappingFile::new(&["official", "named"]);
        file.class(&[Some("a"), Some("Parent")]).method(&[Some("m"), Some("tick")], Some("()V"));
        file.class(&[Some("b"), Some("Child")])
            .method(&[Some("m"), Some("tick")], Some("()V"))
            .method(&[Some("n"), Some("own")], Some("()V"));
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", file));
        dep.default_block().unwrap().child_method_strip().unwrap();

        let mut hierarchy = ClassHierarchy::new();
        hierarchy.insert(&ClassNode::new("a").with_method("m", "()V"));
        let mut child = ClassNode::new("b").with_method("n", "()V");
        child.super_name = Some("a".to_string());
        hierarchy.insert(&child);

        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut NamespaceRegistry::new(), Some(&hierarchy)).unwrap();
        let b = tree.find_class("b", 0).unwrap();
        let methods: Vec<_> = tree.class(b).unwrap().methods().iter().filter_map(|m| m.src_name()).collect();
        assert_eq!(methods, vec!["n"]);
    }

    #[test]
    fn test_child_method_strip_requires_hierarchy() {
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", intermediary_file()));
        dep.default_block().unwrap().child_method_strip().unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let err = builder.build(&mut NamespaceRegistry::new(), None).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_duplicate_outputs_first_wins() {
        let mut file = MappingFile::new(&["official", "named"]);
        file.class(&[Some("a"), Some("Same")]);
        file.class(&[Some("b"), Some("Same")]);
        let mut dep = MappingDependency::new(MemorySource::new("m").with_file("x.json", file.clone()));
        dep.default_block().unwrap().allow_duplicate_outputs().unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(dep);
        let tree = builder.build(&mut NamespaceRegistry::new(), None).unwrap();
        let named = tree.namespace_id("named").unwrap();
        assert_eq!(tree.class_name(tree.find_class("b", 0).unwrap(), named), Some("Same"));
        assert_eq!(tree.find_class("Same", named), tree.find_class("a", 0));

        let mut strict = MappingTreeBuilder::new();
        strict.add(MappingDependency::new(MemorySource::new("m").with_file("x.json", file)));
        let tree = strict.build(&mut NamespaceRegistry::new(), None).unwrap();
        assert_eq!(tree.class_name(tree.find_class("b", 0).unwrap(), named), None);
    }

    /// An input allowing duplicates doesn't loosen the inputs after it
    #[test]
    fn test_duplicate_policy_is_per_input() {
        let mut first = MappingFile::new(&["official", "named"]);
        first.class(&[Some("a"), Some("Same")]);
        let mut second = MappingFile::new(&["official", "named"]);
        second.class(&[Some("b"), Some("Same")]);
        second.class(&[Some("c"), Some("Other")]);

        let mut lenient = MappingDependency::new(MemorySource::new("first").with_file("a.json", first.clone()));
        lenient.default_block().unwrap().allow_duplicate_outputs().unwrap();
        let mut strict = MappingDependency::new(MemorySource::new("second").with_file("b.json", second.clone()));
        strict.default_block().unwrap().disallow_duplicate_outputs().unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(lenient).add(strict);
        let tree = builder.build(&mut NamespaceRegistry::new(), None).unwrap();
        let named = tree.namespace_id("named").unwrap();
        assert_eq!(tree.class_name(tree.find_class("b", 0).unwrap(), named), None);
        assert_eq!(tree.class_name(tree.find_class("c", 0).unwrap(), named), Some("Other"));
        assert_eq!(tree.find_class("Same", named), tree.find_class("a", 0));

        // the later input's own permission still applies to its names
        let mut strict = MappingDependency::new(MemorySource::new("first").with_file("a.json", first));
        strict.default_block().unwrap().disallow_duplicate_outputs().unwrap();
        let mut lenient = MappingDependency::new(MemorySource::new("second").with_file("b.json", second));
        lenient.default_block().unwrap().allow_duplicate_outputs().unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(strict).add(lenient);
        let tree = builder.build(&mut NamespaceRegistry::new(), None).unwrap();
        assert_eq!(tree.class_name(tree.find_class("b", 0).unwrap(), named), Some("Same"));
        assert_eq!(tree.find_class("Same", named), tree.find_class("a", 0));
    }

    #[test]
    fn test_circular_dependencies() {
        let mut a = MappingDependency::new(MemorySource::new("a").with_file("a.json", MappingFile::new(&["x", "y"])));
        a.default_block().unwrap().depends_on("z").unwrap();
        let mut b = MappingDependency::new(MemorySource::new("b").with_file("b.json", MappingFile::new(&["x", "z"])));
        b.default_block().unwrap().depends_on("y").unwrap();
        let mut builder = MappingTreeBuilder::new();
        builder.add(a).add(b);
        assert!(matches!(builder.build(&mut NamespaceRegistry::new(), None), Err(ForgeError::Configuration { .. })));
    }
}
