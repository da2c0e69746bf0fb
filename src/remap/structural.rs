//! Reference remap engine working on the structural class model.

use super::{ClassFile, RemapEngine};
use crate::classfile::{ClassCodec, ClassNode, InnerClassNode, MemberNode};
use crate::error::{ForgeError, Result};
use crate::mapping::MappingView;
use anyhow::Context;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fmt;
use tracing::debug;

/// Renames classes, members and descriptors of decoded class nodes.
///
/// Method bodies are not touched and generic signatures are kept as is, so
/// this engine suits codecs that only carry declarations.
pub struct StructuralRemapper<C: ClassCodec> {
    codec: C,
    pool: ThreadPool,
}

impl<C: ClassCodec> fmt::Debug for StructuralRemapper<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralRemapper").field("threads", &self.pool.current_num_threads()).finish()
    }
}

impl<C: ClassCodec> StructuralRemapper<C> {
    /// Engine running on its own pool of `threads` workers
    pub fn new(codec: C, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("jarforge-remap-{i}"))
            .build()
            .map_err(|e| ForgeError::configuration(format!("cannot start remap pool: {e}")))?;
        Ok(Self { codec, pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn remap_class(&self, view: &MappingView<'_>, class: ClassFile) -> anyhow::Result<ClassFile> {
        let node = self.codec.decode(&class.bytes).with_context(|| format!("Failed to decode {}", class.name))?;
        let remapped = remap_node(view, &node);
        let bytes = self.codec.encode(&remapped).with_context(|| format!("Failed to encode {}", remapped.name))?;
        Ok(ClassFile::new(remapped.name, bytes))
    }
}

impl<C: ClassCodec> RemapEngine for StructuralRemapper<C> {
    fn remap(&self, view: &MappingView<'_>, classes: Vec<ClassFile>) -> anyhow::Result<Vec<ClassFile>> {
        debug!("[remap] {} classes {} -> {}", classes.len(), view.from_namespace(), view.to_namespace());
        self.pool.install(|| classes.into_par_iter().map(|class| self.remap_class(view, class)).collect())
    }
}

/// Rename one class node through `view`
pub fn remap_node(view: &MappingView<'_>, node: &ClassNode) -> ClassNode {
    let owner = node.name.as_str();
    ClassNode {
        access: node.access,
        name: view.map_class_or_keep(owner),
        super_name: node.super_name.as_deref().map(|s| view.map_class_or_keep(s)),
        interfaces: node.interfaces.iter().map(|i| view.map_class_or_keep(i)).collect(),
        fields: node
            .fields
            .iter()
            .map(|f| {
                let name = view.map_field(owner, &f.name, Some(f.desc.as_str()));
                remap_member(view, f, name)
            })
            .collect(),
        methods: node
            .methods
            .iter()
            .map(|m| {
                let name = if m.name.starts_with('<') { None } else { view.map_method(owner, &m.name, Some(m.desc.as_str())) };
                remap_member(view, m, name)
            })
            .collect(),
        inner_classes: node.inner_classes.iter().map(|ic| remap_inner(view, ic)).collect(),
        outer_class: node.outer_class.as_deref().map(|o| view.map_class_or_keep(o)),
        side: node.side,
    }
}

fn remap_member(view: &MappingView<'_>, member: &MemberNode, name: Option<String>) -> MemberNode {
    MemberNode {
        name: name.unwrap_or_else(|| member.name.clone()),
        desc: view.map_descriptor(&member.desc),
        ..member.clone()
    }
}

fn remap_inner(view: &MappingView<'_>, inner: &InnerClassNode) -> InnerClassNode {
    let name = view.map_class_or_keep(&inner.name);
    let inner_name = match &inner.inner_name {
        Some(simple) => Some(name.rsplit_once('$').map_or_else(|| simple.clone(), |(_, s)| s.to_string())),
        None => None,
    };
    InnerClassNode {
        outer_name: inner.outer_name.as_deref().map(|o| view.map_class_or_keep(o)),
        inner_name,
        access: inner.access,
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::JsonClassCodec;
    use crate::mapping::{MappingTree, MemberKind};

    fn tree() -> MappingTree {
        let mut tree = MappingTree::new();
        tree.add_namespace("official");
        let inter = tree.add_namespace("intermediary");
        let a = tree.add_class("a");
        tree.set_class_name(a, inter, Some("net/minecraft/class_1".to_string()));
        let nested = tree.add_class("a$b");
        tree.set_class_name(nested, inter, Some("net/minecraft/class_1$class_2".to_string()));
        let m = tree.add_member(a, MemberKind::Method, "c", Some("(La;)V"));
        tree.member_mut(a, MemberKind::Method, m).unwrap().set_name(inter, Some("method_3".to_string()));
        let f = tree.add_member(a, MemberKind::Field, "d", Some("I"));
        tree.member_mut(a, MemberKind::Field, f).unwrap().set_name(inter, Some("field_4".to_string()));
        tree
    }

    #[test]
    fn test_remap_node() {
        let tree = tree();
        let view = tree.view("official", "official", "intermediary").unwrap();
        let mut node = ClassNode::new("a").with_method("c", "(La;)V").with_method("<init>", "(La;)V").with_field("d", "I");
        node.interfaces.push("java/lang/Runnable".into());
        node.inner_classes.push(InnerClassNode {
            name: "a$b".into(),
            outer_name: Some("a".into()),
            inner_name: Some("b".into()),
            access: 0,
        });

        let out = remap_node(&view, &node);
        assert_eq!(out.name, "net/minecraft/class_1");
        assert_eq!(out.interfaces, vec!["java/lang/Runnable"]);
        assert_eq!(out.methods[0].name, "method_3");
        assert_eq!(out.methods[0].desc, "(Lnet/minecraft/class_1;)V");
        assert_eq!(out.methods[1].name, "<init>");
        assert_eq!(out.fields[0].name, "field_4");
        assert_eq!(out.inner_classes[0].name, "net/minecraft/class_1$class_2");
        assert_eq!(out.inner_classes[0].outer_name.as_deref(), Some("net/minecraft/class_1"));
        assert_eq!(out.inner_classes[0].inner_name.as_deref(), Some("class_2"));
    }

    #[test]
    fn test_engine_keeps_order_and_renames_entries() {
        let tree = tree();
        let view = tree.view("official", "official", "intermediary").unwrap();
        let engine = StructuralRemapper::new(JsonClassCodec, 2).unwrap();
        assert_eq!(engine.threads(), 2);

        let inputs = vec![
            ClassFile::new("a", serde_json::to_vec(&ClassNode::new("a")).unwrap()),
            ClassFile::new("z", serde_json::to_vec(&ClassNode::new("z")).unwrap()),
        ];
        let out = engine.remap(&view, inputs).unwrap();
        assert_eq!(out.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["net/minecraft/class_1", "z"]);
        assert_eq!(out[0].entry_name(), "net/minecraft/class_1.class");
    }

    #[test]
    fn test_engine_reports_undecodable_class() {
        let tree = tree();
        let view = tree.view("official", "official", "intermediary").unwrap();
        let engine = StructuralRemapper::new(JsonClassCodec, 1).unwrap();
        let err = engine.remap(&view, vec![ClassFile::new("a", b"not json".to_vec())]).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to decode a"));
    }
}
