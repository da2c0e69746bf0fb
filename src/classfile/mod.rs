//! Structural class model shared by the merger, patchers and remapper.
//!
//! The model is deliberately shallow: it covers the parts of a class that
//! derivation stages inspect or rewrite (names, hierarchy, members, nest
//! records). Method bodies stay opaque to this crate.

use serde::{Deserialize, Serialize};

pub mod bytecode;
pub mod codec;
pub mod hierarchy;

pub use bytecode::{read_outline, ClassOutline};
pub use codec::{ClassCodec, JsonClassCodec};
pub use hierarchy::ClassHierarchy;

/// JVM access flags
pub mod access {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SYNTHETIC: u16 = 0x1000;

    /// Mask of the three visibility bits
    pub const VISIBILITY: u16 = PUBLIC | PRIVATE | PROTECTED;

    /// Replace the visibility bits with `public`
    #[must_use]
    pub fn make_public(flags: u16) -> u16 {
        (flags & !VISIBILITY) | PUBLIC
    }
}

/// Physical side a class or member came from when merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

/// A field or method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberNode {
    #[serde(default)]
    pub access: u16,
    pub name: String,
    pub desc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Set on members present on only one side of a merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl MemberNode {
    pub fn new<S1: Into<String>, S2: Into<String>>(access: u16, name: S1, desc: S2) -> Self {
        Self { access, name: name.into(), desc: desc.into(), signature: None, side: None }
    }

    /// Identity of the member within its class
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.desc)
    }
}

/// An `InnerClasses` record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerClassNode {
    pub name: String,
    #[serde(default)]
    pub outer_name: Option<String>,
    /// Simple name, `None` for anonymous classes
    #[serde(default)]
    pub inner_name: Option<String>,
    #[serde(default)]
    pub access: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassNode {
    #[serde(default)]
    pub access: u16,
    /// Internal name, e.g. `net/minecraft/World`
    pub name: String,
    #[serde(default)]
    pub super_name: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub fields: Vec<MemberNode>,
    #[serde(default)]
    pub methods: Vec<MemberNode>,
    #[serde(default)]
    pub inner_classes: Vec<InnerClassNode>,
    /// Enclosing method owner for local and anonymous classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outer_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl ClassNode {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            access: access::PUBLIC,
            name: name.into(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            outer_class: None,
            side: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, desc: &str) -> Self {
        self.fields.push(MemberNode::new(access::PRIVATE, name, desc));
        self
    }

    #[must_use]
    pub fn with_method(mut self, name: &str, desc: &str) -> Self {
        self.methods.push(MemberNode::new(access::PUBLIC, name, desc));
        self
    }

    pub fn field(&self, name: &str, desc: &str) -> Option<&MemberNode> {
        self.fields.iter().find(|f| f.key() == (name, desc))
    }

    pub fn method(&self, name: &str, desc: &str) -> Option<&MemberNode> {
        self.methods.iter().find(|m| m.key() == (name, desc))
    }

    /// The record describing this class itself, if it is nested
    pub fn own_inner_record(&self) -> Option<&InnerClassNode> {
        self.inner_classes.iter().find(|ic| ic.name == self.name)
    }

    /// A class is anonymous when its own inner class record has no simple name
    pub fn is_anonymous(&self) -> bool {
        self.own_inner_record().is_some_and(|ic| ic.inner_name.is_none())
    }

    /// Entry name of the class inside a jar
    pub fn entry_name(&self) -> String {
        format!("{}.class", self.name)
    }
}

/// Internal class name for a `.class` jar entry
pub fn class_name_of_entry(entry: &str) -> Option<&str> {
    entry.strip_suffix(".class")
}
