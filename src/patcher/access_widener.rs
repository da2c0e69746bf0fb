//! Access wideners: text files opening up classes and members.
//!
//! ```text
//! accessWidener v2 named
//! accessible class net/minecraft/world/World
//! extendable method net/minecraft/world/World tick ()V
//! transitive-mutable field net/minecraft/world/World time J
//! ```

use super::{BasePatcher, Library, Patcher, RunConfig};
use crate::archive::{rewrite_archive, JarReader};
use crate::artifact::Artifact;
use crate::classfile::access::{self, make_public};
use crate::classfile::codec::{decode_class, encode_class};
use crate::classfile::{class_name_of_entry, ClassNode};
use crate::error::{ForgeError, Result};
use crate::mapping::MappingView;
use crate::remap::ResourceRemapper;
use crate::stage::StageContext;
use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Hex digits of the content hash kept in the stage tag
const TAG_HASH_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Accessible,
    Extendable,
    Mutable,
}

impl AccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accessible => "accessible",
            Self::Extendable => "extendable",
            Self::Mutable => "mutable",
        }
    }
}

impl FromStr for AccessKind {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "accessible" => Ok(Self::Accessible),
            "extendable" => Ok(Self::Extendable),
            "mutable" => Ok(Self::Mutable),
            other => Err(ForgeError::access_widener(format!("unknown access {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WidenTarget {
    Class(String),
    Method { owner: String, name: String, desc: String },
    Field { owner: String, name: String, desc: String },
}

impl WidenTarget {
    pub fn owner(&self) -> &str {
        match self {
            Self::Class(name) => name,
            Self::Method { owner, .. } | Self::Field { owner, .. } => owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessEntry {
    pub access: AccessKind,
    /// Inherited by mods depending on this one (v2 only)
    pub transitive: bool,
    pub target: WidenTarget,
}

/// A parsed access widener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessWidener {
    pub version: u8,
    pub namespace: String,
    pub entries: Vec<AccessEntry>,
}

impl AccessWidener {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines().enumerate().filter_map(|(idx, line)| {
            let line = line.split('#').next().unwrap_or_default().trim();
            (!line.is_empty()).then_some((idx + 1, line))
        });

        let Some((_, header)) = lines.next() else {
            return Err(ForgeError::access_widener("empty access widener"));
        };
        let version = match header.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["accessWidener", "v1", _] => 1,
            ["accessWidener", "v2", _] => 2,
            _ => return Err(ForgeError::access_widener(format!("invalid header: {header}"))),
        };
        let namespace = header.split_whitespace().nth(2).unwrap_or_default().to_string();

        let mut entries = Vec::new();
        for (line_no, line) in lines {
            let entry = parse_entry(line, version)
                .map_err(|e| ForgeError::access_widener(format!("line {line_no}: {e}")))?;
            entries.push(entry);
        }
        Ok(Self { version, namespace, entries })
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Classes with at least one entry
    pub fn targets(&self) -> FxHashSet<&str> {
        self.entries.iter().map(|e| e.target.owner()).collect()
    }

    /// Widen `node` according to every entry targeting it. Returns whether it changed.
    pub fn apply(&self, node: &mut ClassNode) -> bool {
        let before = node.clone();
        for entry in self.entries.iter().filter(|e| e.target.owner() == before.name) {
            match &entry.target {
                WidenTarget::Class(_) => widen_class(node, entry.access),
                WidenTarget::Method { name, desc, .. } => {
                    let is_ctor = name == "<init>";
                    if let Some(method) = node.methods.iter_mut().find(|m| m.key() == (name.as_str(), desc.as_str())) {
                        method.access = widen_method(method.access, entry.access, is_ctor);
                    }
                }
                WidenTarget::Field { name, desc, .. } => {
                    if let Some(field) = node.fields.iter_mut().find(|f| f.key() == (name.as_str(), desc.as_str())) {
                        field.access = widen_field(field.access, entry.access);
                    }
                }
            }
        }
        *node != before
    }

    /// Copy of this widener in the view's target namespace
    pub fn remap(&self, view: &MappingView<'_>) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|entry| {
                let target = match &entry.target {
                    WidenTarget::Class(name) => WidenTarget::Class(view.map_class_or_keep(name)),
                    WidenTarget::Method { owner, name, desc } => WidenTarget::Method {
                        owner: view.map_class_or_keep(owner),
                        name: view.map_method(owner, name, Some(desc.as_str())).unwrap_or_else(|| name.clone()),
                        desc: view.map_descriptor(desc),
                    },
                    WidenTarget::Field { owner, name, desc } => WidenTarget::Field {
                        owner: view.map_class_or_keep(owner),
                        name: view.map_field(owner, name, Some(desc.as_str())).unwrap_or_else(|| name.clone()),
                        desc: view.map_descriptor(desc),
                    },
                };
                AccessEntry { target, ..entry.clone() }
            })
            .collect();
        Self { version: self.version, namespace: view.to_namespace().to_string(), entries }
    }

    /// Stage tag, `aw+` and a prefix of the content hash
    pub fn tag(&self) -> String {
        let digest = Sha256::digest(self.to_string().as_bytes());
        let hex = hex::encode(digest);
        format!("aw+{}", &hex[..TAG_HASH_LEN])
    }
}

fn parse_entry(line: &str, version: u8) -> Result<AccessEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (raw_access, rest) = parts.split_first().ok_or_else(|| ForgeError::access_widener("empty entry"))?;
    let (transitive, raw_access) = match raw_access.strip_prefix("transitive-") {
        Some(_) if version < 2 => {
            return Err(ForgeError::access_widener("transitive entries need v2"));
        }
        Some(access) => (true, access),
        None => (false, *raw_access),
    };
    let access: AccessKind = raw_access.parse()?;

    let target = match rest {
        ["class", name] => WidenTarget::Class(name.to_string()),
        ["method", owner, name, desc] => {
            WidenTarget::Method { owner: owner.to_string(), name: name.to_string(), desc: desc.to_string() }
        }
        ["field", owner, name, desc] => {
            WidenTarget::Field { owner: owner.to_string(), name: name.to_string(), desc: desc.to_string() }
        }
        _ => return Err(ForgeError::access_widener(format!("malformed entry: {line}"))),
    };

    match (&target, access) {
        (WidenTarget::Class(_), AccessKind::Mutable) => Err(ForgeError::access_widener("classes can't be mutable")),
        (WidenTarget::Method { .. }, AccessKind::Mutable) => Err(ForgeError::access_widener("methods can't be mutable")),
        (WidenTarget::Field { .. }, AccessKind::Extendable) => Err(ForgeError::access_widener("fields can't be extendable")),
        _ => Ok(AccessEntry { access, transitive, target }),
    }
}

fn widen_class(node: &mut ClassNode, kind: AccessKind) {
    node.access = make_public(node.access);
    if kind == AccessKind::Extendable {
        node.access &= !access::FINAL;
    }
    let name = node.name.clone();
    if let Some(record) = node.inner_classes.iter_mut().find(|ic| ic.name == name) {
        record.access = make_public(record.access);
        if kind == AccessKind::Extendable {
            record.access &= !access::FINAL;
        }
    }
}

fn widen_method(flags: u16, kind: AccessKind, is_ctor: bool) -> u16 {
    match kind {
        AccessKind::Accessible => {
            let mut widened = make_public(flags);
            // Private instance methods are not virtual, keep them that way
            if flags & access::PRIVATE != 0 && flags & access::STATIC == 0 && !is_ctor {
                widened |= access::FINAL;
            }
            widened
        }
        AccessKind::Extendable => {
            let widened = if flags & access::PUBLIC != 0 { flags } else { (flags & !access::VISIBILITY) | access::PROTECTED };
            widened & !access::FINAL
        }
        AccessKind::Mutable => flags,
    }
}

fn widen_field(flags: u16, kind: AccessKind) -> u16 {
    match kind {
        AccessKind::Accessible => make_public(flags),
        AccessKind::Mutable => flags & !access::FINAL,
        AccessKind::Extendable => flags,
    }
}

impl fmt::Display for AccessWidener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "accessWidener v{} {}", self.version, self.namespace)?;
        for entry in &self.entries {
            let mut line = String::new();
            if entry.transitive {
                line.push_str("transitive-");
            }
            line.push_str(entry.access.as_str());
            match &entry.target {
                WidenTarget::Class(name) => write!(line, " class {name}")?,
                WidenTarget::Method { owner, name, desc } => write!(line, " method {owner} {name} {desc}")?,
                WidenTarget::Field { owner, name, desc } => write!(line, " field {owner} {name} {desc}")?,
            }
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Rewrites `*.accesswidener` jar entries while remapping
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessWidenerRemapper;

impl ResourceRemapper for AccessWidenerRemapper {
    fn name(&self) -> &str {
        "access-widener"
    }

    fn can_transform(&self, entry: &str) -> bool {
        entry.ends_with(".accesswidener")
    }

    fn transform(&self, entry: &str, bytes: Vec<u8>, view: &MappingView<'_>) -> Result<Vec<u8>> {
        let text = String::from_utf8(bytes)
            .map_err(|e| ForgeError::access_widener(format!("{entry} is not UTF-8: {e}")))?;
        let widener = AccessWidener::parse(&text)?;
        if widener.namespace != view.from_namespace() {
            debug!("[remap] {} is in {}, not {}; left as is", entry, widener.namespace, view.from_namespace());
            return Ok(text.into_bytes());
        }
        Ok(widener.remap(view).to_string().into_bytes())
    }
}

/// Applies an access widener to the remapped artifact.
///
/// Wraps another strategy and delegates everything else to it.
pub struct AccessWidenerPatcher {
    inner: Box<dyn Patcher>,
    widener: PathBuf,
}

impl fmt::Debug for AccessWidenerPatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessWidenerPatcher")
            .field("inner", &self.inner.name())
            .field("widener", &self.widener)
            .finish()
    }
}

impl AccessWidenerPatcher {
    pub fn new<P: Into<PathBuf>>(inner: Box<dyn Patcher>, widener: P) -> Self {
        Self { inner, widener: widener.into() }
    }

    fn widen(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        let widener = AccessWidener::read(&self.widener)?;
        if widener.namespace != input.namespace().name() {
            return Err(ForgeError::access_widener(format!(
                "{} is in namespace {}, artifact {} is in {}",
                self.widener.display(),
                widener.namespace,
                input,
                input.namespace()
            )));
        }

        let targets: FxHashSet<String> = widener.targets().into_iter().map(str::to_string).collect();
        ctx.produce("access-widener", input.derive(&widener.tag()), |output| {
            let mut widened = 0usize;
            rewrite_archive(
                input.path(),
                output,
                |entry, bytes| {
                    let Some(class) = class_name_of_entry(entry) else {
                        return Ok(Some(bytes));
                    };
                    if !targets.contains(class) {
                        return Ok(Some(bytes));
                    }
                    let mut node = decode_class(ctx.codec(), entry, &bytes)?;
                    if !widener.apply(&mut node) {
                        return Ok(Some(bytes));
                    }
                    widened += 1;
                    encode_class(ctx.codec(), &node).map(Some)
                },
                |_| Ok(()),
            )?;
            info!("[aw] widened {} classes of {}", widened, input);
            Ok(())
        })
    }
}

impl Patcher for AccessWidenerPatcher {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn base(&self) -> &BasePatcher {
        self.inner.base()
    }

    fn prod_namespace(&self) -> &str {
        self.inner.prod_namespace()
    }

    fn can_combine(&self) -> bool {
        self.inner.can_combine()
    }

    fn merge(&self, ctx: &StageContext, client: &Artifact, server: &Artifact) -> Result<Artifact> {
        self.inner.merge(ctx, client, server)
    }

    fn fix(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        self.inner.fix(ctx, input)
    }

    fn transform(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        self.inner.transform(ctx, input)
    }

    fn after_remap(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        let remapped = self.inner.after_remap(ctx, input)?;
        self.widen(ctx, &remapped)
    }

    fn apply_run_transform(&self, ctx: &StageContext, run: &mut RunConfig) {
        self.inner.apply_run_transform(ctx, run);
    }

    fn library_filter(&self, library: &Library) -> bool {
        self.inner.library_filter(library)
    }
}

/// Whether a jar ships an access widener entry
pub fn find_widener_entry(jar: &Path) -> Result<Option<String>> {
    let reader = JarReader::open(jar)?;
    Ok(reader.entry_names().into_iter().find(|name| AccessWidenerRemapper.can_transform(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_archive;
    use crate::artifact::Environment;
    use crate::classfile::{InnerClassNode, MemberNode};
    use crate::mapping::{MappingTree, MemberKind};
    use crate::patcher::tests::{context, raw_jar};
    use crate::patcher::NoTransformPatcher;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
accessWidener v2 official
# comment
accessible class a
extendable method a b ()V
transitive-mutable field a c I  # trailing
";

    #[test]
    fn test_parse() {
        let aw = AccessWidener::parse(SAMPLE).unwrap();
        assert_eq!(aw.version, 2);
        assert_eq!(aw.namespace, "official");
        assert_eq!(aw.entries.len(), 3);
        assert!(aw.entries[2].transitive);
        assert_eq!(aw.entries[1].target, WidenTarget::Method { owner: "a".into(), name: "b".into(), desc: "()V".into() });
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(AccessWidener::parse("").is_err());
        assert!(AccessWidener::parse("accessWidener v3 named").is_err());
        assert!(AccessWidener::parse("accessWidener v1 named\ntransitive-accessible class a").is_err());
        assert!(AccessWidener::parse("accessWidener v1 named\nmutable method a b ()V").is_err());
        assert!(AccessWidener::parse("accessWidener v1 named\nextendable field a b I").is_err());
        assert!(AccessWidener::parse("accessWidener v1 named\naccessible class").is_err());
    }

    #[test]
    fn test_display_reparses() {
        let aw = AccessWidener::parse(SAMPLE).unwrap();
        assert_eq!(AccessWidener::parse(&aw.to_string()).unwrap(), aw);
        assert!(aw.tag().starts_with("aw+"));
        assert_eq!(aw.tag().len(), 3 + TAG_HASH_LEN);
    }

    #[test]
    fn test_apply_widens() {
        let aw = AccessWidener::parse(SAMPLE).unwrap();
        let mut node = ClassNode::new("a");
        node.access = access::FINAL;
        node.inner_classes.push(InnerClassNode { name: "a".into(), outer_name: Some("o".into()), inner_name: Some("a".into()), access: access::PRIVATE });
        node.methods.push(MemberNode::new(access::PRIVATE | access::FINAL, "b", "()V"));
        node.fields.push(MemberNode::new(access::PRIVATE | access::FINAL, "c", "I"));

        assert!(aw.apply(&mut node));
        assert_eq!(node.access, access::PUBLIC | access::FINAL);
        assert_eq!(node.inner_classes[0].access, access::PUBLIC);
        assert_eq!(node.methods[0].access, access::PROTECTED);
        assert_eq!(node.fields[0].access, access::PRIVATE);
        assert!(!aw.apply(&mut node));
    }

    #[test]
    fn test_accessible_private_method_becomes_final() {
        assert_eq!(widen_method(access::PRIVATE, AccessKind::Accessible, false), access::PUBLIC | access::FINAL);
        assert_eq!(widen_method(access::PRIVATE, AccessKind::Accessible, true), access::PUBLIC);
        assert_eq!(widen_method(access::PRIVATE | access::STATIC, AccessKind::Accessible, false), access::PUBLIC | access::STATIC);
    }

    fn official_to_named() -> MappingTree {
        let mut tree = MappingTree::new();
        tree.add_namespace("official");
        let named = tree.add_namespace("named");
        let class = tree.add_class("a");
        tree.set_class_name(class, named, Some("net/World".to_string()));
        let method = tree.add_member(class, MemberKind::Method, "b", Some("()La;"));
        tree.member_mut(class, MemberKind::Method, method).unwrap().set_name(named, Some("tick".to_string()));
        tree
    }

    #[test]
    fn test_resource_remapper() {
        let tree = official_to_named();
        let view = tree.view("official", "official", "named").unwrap();
        let text = b"accessWidener v1 official\naccessible method a b ()La;\n".to_vec();
        let out = AccessWidenerRemapper.transform("mod.accesswidener", text, &view).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "accessWidener v1 named\naccessible method net/World tick ()Lnet/World;\n");

        let other = b"accessWidener v1 intermediary\naccessible class a\n".to_vec();
        assert_eq!(AccessWidenerRemapper.transform("x.accesswidener", other.clone(), &view).unwrap(), other);
    }

    #[test]
    fn test_patcher_applies_after_remap() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path());
        let mut node = ClassNode::new("a");
        node.access = 0;
        let class_bytes = serde_json::to_vec(&node).unwrap();
        let jar = raw_jar(&ctx, temp_dir.path(), Environment::Client, "official", &[("a.class", class_bytes), ("b.txt", b"x".to_vec())]);
        let aw_path = temp_dir.path().join("mod.accesswidener");
        std::fs::write(&aw_path, "accessWidener v1 official\naccessible class a\n").unwrap();

        let patcher = AccessWidenerPatcher::new(Box::new(NoTransformPatcher::default()), &aw_path);
        let out = patcher.after_remap(&ctx, &jar).unwrap();
        assert!(out.patches().last().unwrap().starts_with("aw+"));
        let mut reader = JarReader::open(out.path()).unwrap();
        let widened: ClassNode = serde_json::from_slice(&reader.read("a.class").unwrap()).unwrap();
        assert_eq!(widened.access, access::PUBLIC);
        assert_eq!(reader.read("b.txt").unwrap(), b"x");
    }

    #[test]
    fn test_patcher_rejects_namespace_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path());
        let jar = raw_jar(&ctx, temp_dir.path(), Environment::Client, "intermediary", &[]);
        let aw_path = temp_dir.path().join("mod.accesswidener");
        std::fs::write(&aw_path, "accessWidener v1 official\naccessible class a\n").unwrap();
        let patcher = AccessWidenerPatcher::new(Box::new(NoTransformPatcher::default()), &aw_path);
        assert!(matches!(patcher.after_remap(&ctx, &jar), Err(ForgeError::AccessWidener { .. })));
        assert_eq!(ctx.builds(), 0);
    }

    #[test]
    fn test_find_widener_entry() {
        let temp_dir = TempDir::new().unwrap();
        let jar = temp_dir.path().join("mod.jar");
        write_archive(&jar, |w| w.write_entry("mymod.accesswidener", b"accessWidener v1 named\n")).unwrap();
        assert_eq!(find_widener_entry(&jar).unwrap().as_deref(), Some("mymod.accesswidener"));
    }
}
