//! Merging client-only and server-only versions of the same class.

use crate::classfile::{ClassNode, InnerClassNode, MemberNode, Side};
use crate::error::{ForgeError, Result};
use tracing::trace;

pub mod jar;

pub use jar::{merge_jars, IncludeFilter, JarMerger, MergeFailurePolicy, MergeStats};

/// Outcome of merging one class
#[derive(Debug)]
pub enum MergeResult {
    /// Only the client had the class, returned unchanged
    ClientOnly(ClassNode),
    /// Only the server had the class, returned unchanged
    ServerOnly(ClassNode),
    Merged(ClassNode),
    /// Both sides exist but could not be combined
    Failed { client: ClassNode, server: ClassNode, error: ForgeError },
}

impl MergeResult {
    /// The class to write, if the merge produced one
    pub fn into_node(self) -> Option<ClassNode> {
        match self {
            Self::ClientOnly(node) | Self::ServerOnly(node) | Self::Merged(node) => Some(node),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Structural class merger.
///
/// Members are matched by name and descriptor. Members found on both sides
/// are kept as the client declares them; members found on one side only are
/// kept and annotated with that side.
#[derive(Debug, Clone)]
pub struct ClassMerger {
    annotate_sides: bool,
}

impl Default for ClassMerger {
    fn default() -> Self {
        Self { annotate_sides: true }
    }
}

impl ClassMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Don't record the origin side on one-sided members
    #[must_use]
    pub fn without_side_annotations(mut self) -> Self {
        self.annotate_sides = false;
        self
    }

    /// Merge the two versions of a class. Returns `None` if neither exists.
    pub fn merge(&self, client: Option<ClassNode>, server: Option<ClassNode>) -> Option<MergeResult> {
        match (client, server) {
            (None, None) => None,
            (Some(client), None) => Some(MergeResult::ClientOnly(client)),
            (None, Some(server)) => Some(MergeResult::ServerOnly(server)),
            (Some(client), Some(server)) => Some(match self.merge_both(&client, &server) {
                Ok(merged) => MergeResult::Merged(merged),
                Err(error) => MergeResult::Failed { client, server, error },
            }),
        }
    }

    fn merge_both(&self, client: &ClassNode, server: &ClassNode) -> Result<ClassNode> {
        if client.name != server.name {
            return Err(ForgeError::merge_conflict(
                &client.name,
                format!("server class is named {}", server.name),
            ));
        }
        if client.super_name != server.super_name {
            return Err(ForgeError::merge_conflict(
                &client.name,
                format!("super class differs: client {:?}, server {:?}", client.super_name, server.super_name),
            ));
        }
        if client.is_anonymous() != server.is_anonymous() {
            return Err(ForgeError::merge_conflict(&client.name, "anonymous on one side only"));
        }

        let mut interfaces = client.interfaces.clone();
        for itf in &server.interfaces {
            if !interfaces.contains(itf) {
                interfaces.push(itf.clone());
            }
        }

        let mut inner_classes: Vec<InnerClassNode> = client.inner_classes.clone();
        for ic in &server.inner_classes {
            if !inner_classes.iter().any(|c| c.name == ic.name) {
                inner_classes.push(ic.clone());
            }
        }

        trace!("[merge] merging {}", client.name);
        Ok(ClassNode {
            access: client.access,
            name: client.name.clone(),
            super_name: client.super_name.clone(),
            interfaces,
            fields: self.merge_members(&client.fields, &server.fields),
            methods: self.merge_members(&client.methods, &server.methods),
            inner_classes,
            outer_class: client.outer_class.clone().or_else(|| server.outer_class.clone()),
            side: None,
        })
    }

    fn merge_members(&self, client: &[MemberNode], server: &[MemberNode]) -> Vec<MemberNode> {
        let mut merged = Vec::with_capacity(client.len().max(server.len()));
        for member in client {
            let shared = server.iter().any(|s| s.key() == member.key());
            merged.push(self.annotated(member, shared, Side::Client));
        }
        for member in server {
            if !client.iter().any(|c| c.key() == member.key()) {
                merged.push(self.annotated(member, false, Side::Server));
            }
        }
        merged
    }

    fn annotated(&self, member: &MemberNode, shared: bool, side: Side) -> MemberNode {
        let mut member = member.clone();
        if !shared && self.annotate_sides {
            member.side = Some(side);
        }
        member
    }
}
