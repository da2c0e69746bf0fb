//! Read-only projection of a mapping tree onto one remap hop.

use super::descriptor::remap_descriptor;
use super::tree::{MappingTree, MemberKind, MemberMapping};
use crate::error::Result;

/// The tree seen as a `from -> to` rename table.
///
/// Symbols without a name in `from` are looked up in the fallback namespace.
/// Lookups that find no target name return `None`, and callers keep the
/// original name.
#[derive(Debug, Clone, Copy)]
pub struct MappingView<'a> {
    tree: &'a MappingTree,
    from: usize,
    from_fallback: usize,
    to: usize,
}

impl MappingTree {
    /// Project the tree onto `from`/`from_fallback` -> `to`
    pub fn view(&self, from: &str, from_fallback: &str, to: &str) -> Result<MappingView<'_>> {
        Ok(MappingView {
            tree: self,
            from: self.require_namespace(from, "remap view source")?,
            from_fallback: self.require_namespace(from_fallback, "remap view fallback")?,
            to: self.require_namespace(to, "remap view target")?,
        })
    }
}

impl<'a> MappingView<'a> {
    pub fn tree(&self) -> &'a MappingTree {
        self.tree
    }

    pub fn from_namespace(&self) -> &'a str {
        &self.tree.namespaces()[self.from]
    }

    pub fn to_namespace(&self) -> &'a str {
        &self.tree.namespaces()[self.to]
    }

    fn class_row(&self, name: &str) -> Option<(usize, usize)> {
        self.tree
            .find_class(name, self.from)
            .map(|idx| (idx, self.from))
            .or_else(|| self.tree.find_class(name, self.from_fallback).map(|idx| (idx, self.from_fallback)))
    }

    /// Target name of a class given by its `from` name
    pub fn map_class(&self, name: &str) -> Option<String> {
        let (idx, _) = self.class_row(name)?;
        self.tree.class_name(idx, self.to).map(str::to_string)
    }

    /// Target name of a class, or the input if unmapped
    pub fn map_class_or_keep(&self, name: &str) -> String {
        self.map_class(name).unwrap_or_else(|| name.to_string())
    }

    /// Rewrite every class reference in a descriptor
    pub fn map_descriptor(&self, desc: &str) -> String {
        remap_descriptor(desc, |name| self.map_class(name))
    }

    pub fn map_field(&self, owner: &str, name: &str, desc: Option<&str>) -> Option<String> {
        self.map_member(MemberKind::Field, owner, name, desc)
    }

    pub fn map_method(&self, owner: &str, name: &str, desc: Option<&str>) -> Option<String> {
        self.map_member(MemberKind::Method, owner, name, desc)
    }

    fn map_member(&self, kind: MemberKind, owner: &str, name: &str, desc: Option<&str>) -> Option<String> {
        let (class_idx, _) = self.class_row(owner)?;
        let class = self.tree.class(class_idx)?;
        let members = match kind {
            MemberKind::Field => class.fields(),
            MemberKind::Method => class.methods(),
        };

        let matches = |member: &MemberMapping, ns: usize| -> bool {
            if member.name(ns) != Some(name) {
                return false;
            }
            match (desc, member.src_desc()) {
                (Some(want), Some(src_desc)) => self.descriptor_in_from(src_desc) == want,
                _ => true,
            }
        };

        members
            .iter()
            .find(|m| matches(m, self.from))
            .or_else(|| members.iter().find(|m| matches(m, self.from_fallback)))
            .and_then(|m| m.name(self.to))
            .map(str::to_string)
    }

    /// A source descriptor as the caller writes it: `from` names, else fallback names
    fn descriptor_in_from(&self, src_desc: &str) -> String {
        remap_descriptor(src_desc, |name| {
            let idx = self.tree.find_class(name, 0)?;
            self.tree
                .class_name(idx, self.from)
                .or_else(|| self.tree.class_name(idx, self.from_fallback))
                .map(str::to_string)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;

    fn tree() -> MappingTree {
        let mut tree = MappingTree::new();
        tree.add_namespace("official");
        let inter = tree.add_namespace("intermediary");
        let named = tree.add_namespace("named");

        let a = tree.add_class("a");
        tree.set_class_name(a, inter, Some("net/minecraft/class_1".to_string()));
        tree.set_class_name(a, named, Some("net/minecraft/World".to_string()));
        let f = tree.add_member(a, MemberKind::Field, "b", Some("La;"));
        tree.member_mut(a, MemberKind::Field, f).unwrap().set_name(inter, Some("field_2".to_string()));
        tree.member_mut(a, MemberKind::Field, f).unwrap().set_name(named, Some("parent".to_string()));

        // only present in official
        tree.add_class("c");
        tree
    }

    #[test]
    fn test_class_mapping() {
        let tree = tree();
        let view = tree.view("intermediary", "official", "named").unwrap();
        assert_eq!(view.map_class("net/minecraft/class_1").as_deref(), Some("net/minecraft/World"));
    }

    #[test]
    fn test_fallback_lookup() {
        let tree = tree();
        let view = tree.view("intermediary", "official", "named").unwrap();
        // "a" is not an intermediary name, found through the fallback column
        assert_eq!(view.map_class("a").as_deref(), Some("net/minecraft/World"));
        assert_eq!(view.map_class("c"), None);
        assert_eq!(view.map_class_or_keep("c"), "c");
    }

    #[test]
    fn test_field_mapping_with_descriptor() {
        let tree = tree();
        let view = tree.view("intermediary", "official", "named").unwrap();
        let mapped = view.map_field("net/minecraft/class_1", "field_2", Some("Lnet/minecraft/class_1;"));
        assert_eq!(mapped.as_deref(), Some("parent"));
        assert_eq!(view.map_field("net/minecraft/class_1", "field_2", Some("I")), None);
    }

    /// Descriptors are matched in the caller's namespace even when the owner came from the fallback
    #[test]
    fn test_member_through_fallback_owner_matches_from_descriptor() {
        let tree = tree();
        let view = tree.view("intermediary", "official", "named").unwrap();
        let mapped = view.map_field("a", "b", Some("Lnet/minecraft/class_1;"));
        assert_eq!(mapped.as_deref(), Some("parent"));
        assert_eq!(view.map_field("a", "b", Some("La;")), None);
    }

    #[test]
    fn test_descriptor_mapping() {
        let tree = tree();
        let view = tree.view("official", "official", "named").unwrap();
        assert_eq!(view.map_descriptor("(La;Lc;)V"), "(Lnet/minecraft/World;Lc;)V");
    }

    #[test]
    fn test_unknown_column() {
        let tree = tree();
        let err = tree.view("official", "official", "mojmap").unwrap_err();
        assert!(matches!(err, ForgeError::UnknownNamespace { .. }));
    }
}
