//! Jar mods: mod archives whose entries replace the game's own.

use super::fixes::StripSignatures;
use super::{BasePatcher, Patcher};
use crate::archive::{rewrite_archive, JarReader};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::stage::StageContext;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Overlays the entries of mod jars onto the game jar, tag `jarmod`.
///
/// Later mods override earlier ones; any mod entry overrides the game entry.
#[derive(Debug, Clone, Default)]
pub struct JarModPatcher {
    base: BasePatcher,
    mods: Vec<PathBuf>,
}

impl JarModPatcher {
    pub fn new(base: BasePatcher) -> Self {
        Self { base, mods: Vec::new() }
    }

    #[must_use]
    pub fn with_mod<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.mods.push(path.into());
        self
    }

    pub fn mods(&self) -> &[PathBuf] {
        &self.mods
    }

    fn collect_overlay(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut overlay = BTreeMap::new();
        for path in &self.mods {
            let mut reader = JarReader::open(path)?;
            reader.for_each(|name, bytes| {
                if !StripSignatures::is_signature(name) && name != "META-INF/MANIFEST.MF" {
                    overlay.insert(name.to_string(), bytes);
                }
                Ok(())
            })?;
        }
        Ok(overlay)
    }
}

impl Patcher for JarModPatcher {
    fn name(&self) -> &str {
        "jarmod"
    }

    fn base(&self) -> &BasePatcher {
        &self.base
    }

    fn transform(&self, ctx: &StageContext, input: &Artifact) -> Result<Artifact> {
        if self.mods.is_empty() {
            return Ok(input.clone());
        }
        ctx.produce("jarmod", input.derive("jarmod"), |output| {
            let overlay = self.collect_overlay()?;
            debug!("[jarmod] overlaying {} entries from {} jars", overlay.len(), self.mods.len());
            let game = JarReader::open(input.path())?;
            let (mut replaced, added): (BTreeMap<_, _>, BTreeMap<_, _>) =
                overlay.into_iter().partition(|(name, _)| game.contains(name));
            rewrite_archive(
                input.path(),
                output,
                |name, bytes| Ok(Some(replaced.remove(name).unwrap_or(bytes))),
                |writer| {
                    for (name, bytes) in &added {
                        writer.write_entry(name, bytes)?;
                    }
                    Ok(())
                },
            )
        })
    }
}
