//! Minimal reader for compiled `.class` files.
//!
//! Reads the constant pool far enough to resolve the class header and member
//! names/descriptors. Attributes and code are skipped.

use super::{ClassNode, MemberNode};
use anyhow::{bail, Context, Result};

const MAGIC: u32 = 0xCAFE_BABE;

/// Header and member signatures of a compiled class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassOutline {
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<MemberNode>,
    pub methods: Vec<MemberNode>,
}

impl ClassOutline {
    /// Structural node without nest information
    pub fn into_node(self) -> ClassNode {
        ClassNode {
            access: self.access,
            name: self.name,
            super_name: self.super_name,
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            inner_classes: Vec::new(),
            outer_class: None,
            side: None,
        }
    }
}

#[derive(Debug, Clone)]
enum ConstantPoolEntry {
    Empty,
    Utf8(String),
    Class(u16),
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.pos + len > self.data.len() {
            bail!("Truncated {what} at offset {}", self.pos);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// True if `data` starts with the class file magic
pub fn is_class_file(data: &[u8]) -> bool {
    data.len() >= 4 && u32::from_be_bytes([data[0], data[1], data[2], data[3]]) == MAGIC
}

pub fn read_outline(data: &[u8]) -> Result<ClassOutline> {
    if data.len() < 10 {
        bail!("File too small to be a valid class file");
    }
    if !is_class_file(data) {
        bail!("Invalid class file magic number");
    }

    let mut cur = Cursor { data, pos: 8 }; // skip magic and version
    let pool = read_constant_pool(&mut cur)?;

    let utf8 = |idx: u16| -> Result<String> {
        match pool.get(idx as usize) {
            Some(ConstantPoolEntry::Utf8(s)) => Ok(s.clone()),
            _ => bail!("Constant {idx} is not a UTF8 entry"),
        }
    };
    let class = |idx: u16| -> Result<String> {
        match pool.get(idx as usize) {
            Some(ConstantPoolEntry::Class(name_idx)) => utf8(*name_idx),
            _ => bail!("Constant {idx} is not a class entry"),
        }
    };

    let access = cur.u16("access flags")?;
    let name = class(cur.u16("this class")?)?;
    let super_idx = cur.u16("super class")?;
    let super_name = if super_idx == 0 { None } else { Some(class(super_idx)?) };

    let interface_count = cur.u16("interface count")?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(class(cur.u16("interface")?)?);
    }

    let mut read_members = |what: &str| -> Result<Vec<MemberNode>> {
        let count = cur.u16(what)?;
        let mut members = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let access = cur.u16(what)?;
            let name = utf8(cur.u16(what)?)?;
            let desc = utf8(cur.u16(what)?)?;
            skip_attributes(&mut cur)?;
            members.push(MemberNode::new(access, name, desc));
        }
        Ok(members)
    };
    let fields = read_members("field")?;
    let methods = read_members("method")?;

    Ok(ClassOutline { access, name, super_name, interfaces, fields, methods })
}

fn read_constant_pool(cur: &mut Cursor<'_>) -> Result<Vec<ConstantPoolEntry>> {
    let count = cur.u16("constant pool count")? as usize;
    let mut pool = vec![ConstantPoolEntry::Empty; count];
    let mut i = 1;
    while i < count {
        let tag = cur.u8("constant tag")?;
        match tag {
            1 => {
                let len = cur.u16("UTF8 entry")? as usize;
                let bytes = cur.take(len, "UTF8 string")?;
                pool[i] = ConstantPoolEntry::Utf8(String::from_utf8_lossy(bytes).to_string());
            },
            7 => pool[i] = ConstantPoolEntry::Class(cur.u16("class entry")?),
            // Long and Double take two slots
            5 | 6 => {
                cur.take(8, "wide constant")?;
                i += 1;
            },
            3 | 4 | 9 | 10 | 11 | 12 | 17 | 18 => {
                cur.take(4, "constant")?;
            },
            15 => {
                cur.take(3, "method handle")?;
            },
            8 | 16 | 19 | 20 => {
                cur.take(2, "constant")?;
            },
            other => bail!("Unknown constant pool tag {other} at index {i}"),
        }
        i += 1;
    }
    Ok(pool)
}

fn skip_attributes(cur: &mut Cursor<'_>) -> Result<()> {
    let count = cur.u16("attribute count")?;
    for _ in 0..count {
        cur.u16("attribute name")?;
        let len = cur.u32("attribute length")? as usize;
        cur.take(len, "attribute body").context("skipping attribute")?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Assemble a class file with the given members, no attributes
    pub(crate) fn build_class(name: &str, super_name: &str, methods: &[(&str, &str)]) -> Vec<u8> {
        let mut pool: Vec<Vec<u8>> = Vec::new();
        let utf8 = |pool: &mut Vec<Vec<u8>>, s: &str| -> u16 {
            let mut entry = vec![1u8];
            entry.extend_from_slice(&(s.len() as u16).to_be_bytes());
            entry.extend_from_slice(s.as_bytes());
            pool.push(entry);
            pool.len() as u16
        };
        let name_idx = utf8(&mut pool, name);
        pool.push([vec![7u8], name_idx.to_be_bytes().to_vec()].concat());
        let this_idx = pool.len() as u16;
        let super_name_idx = utf8(&mut pool, super_name);
        pool.push([vec![7u8], super_name_idx.to_be_bytes().to_vec()].concat());
        let super_idx = pool.len() as u16;
        let method_refs: Vec<(u16, u16)> =
            methods.iter().map(|(n, d)| (utf8(&mut pool, n), utf8(&mut pool, d))).collect();

        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.extend_from_slice(&[0, 0, 0, 52]);
        out.extend_from_slice(&((pool.len() + 1) as u16).to_be_bytes());
        for entry in &pool {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&this_idx.to_be_bytes());
        out.extend_from_slice(&super_idx.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields
        out.extend_from_slice(&(method_refs.len() as u16).to_be_bytes());
        for (n, d) in method_refs {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&n.to_be_bytes());
            out.extend_from_slice(&d.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }
        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        out
    }

    #[test]
    fn test_read_outline() {
        let data = build_class("a/B", "a/A", &[("tick", "()V"), ("<init>", "()V")]);
        let outline = read_outline(&data).unwrap();
        assert_eq!(outline.name, "a/B");
        assert_eq!(outline.super_name.as_deref(), Some("a/A"));
        assert_eq!(outline.methods.len(), 2);
        assert_eq!(outline.methods[0].key(), ("tick", "()V"));
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(read_outline(b"not a class file at all").is_err());
    }

    #[test]
    fn test_rejects_truncated() {
        let data = build_class("a/B", "a/A", &[("tick", "()V")]);
        assert!(read_outline(&data[..data.len() - 6]).is_err());
    }
}
