//! Loader independent jar fixes applied in the `fixed` stage.

use crate::error::Result;
use std::fmt;

/// Rewrites or drops single jar entries
pub trait JarFix: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the new entry bytes, or `None` to drop the entry
    fn apply(&self, entry: &str, bytes: Vec<u8>) -> Result<Option<Vec<u8>>>;
}

/// Drops jar signature files, which are invalid once classes change
#[derive(Debug, Clone, Copy, Default)]
pub struct StripSignatures;

impl StripSignatures {
    pub fn is_signature(entry: &str) -> bool {
        let Some(file) = entry.strip_prefix("META-INF/") else {
            return false;
        };
        if file.contains('/') {
            return false;
        }
        let upper = file.to_ascii_uppercase();
        [".SF", ".RSA", ".DSA", ".EC"].iter().any(|ext| upper.ends_with(ext)) || upper.starts_with("SIG-")
    }
}

impl JarFix for StripSignatures {
    fn name(&self) -> &str {
        "strip-signatures"
    }

    fn apply(&self, entry: &str, bytes: Vec<u8>) -> Result<Option<Vec<u8>>> {
        if Self::is_signature(entry) {
            return Ok(None);
        }
        if entry == "META-INF/MANIFEST.MF" {
            return Ok(Some(strip_digests(&bytes)));
        }
        Ok(Some(bytes))
    }
}

/// Remove per-entry digest sections from a manifest, keeping the main section
fn strip_digests(manifest: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(manifest);
    let normalized = text.replace("\r\n", "\n");
    let main = normalized.split("\n\n").next().unwrap_or_default();
    let mut out = main.trim_end_matches('\n').replace('\n', "\r\n");
    out.push_str("\r\n\r\n");
    out.into_bytes()
}

type FixFn = dyn Fn(&str, Vec<u8>) -> Result<Option<Vec<u8>>> + Send + Sync;

/// A fix backed by a closure
pub struct ClosureFix {
    name: String,
    apply: Box<FixFn>,
}

impl ClosureFix {
    pub fn new<F>(name: &str, apply: F) -> Self
    where
        F: Fn(&str, Vec<u8>) -> Result<Option<Vec<u8>>> + Send + Sync + 'static,
    {
        Self { name: name.to_string(), apply: Box::new(apply) }
    }
}

impl fmt::Debug for ClosureFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFix").field("name", &self.name).finish_non_exhaustive()
    }
}

impl JarFix for ClosureFix {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, entry: &str, bytes: Vec<u8>) -> Result<Option<Vec<u8>>> {
        (self.apply)(entry, bytes)
    }
}
