//! Jar (zip) access for the pipeline.
//!
//! Outputs are written through [`write_archive`], which owns the output path
//! for the duration of the write and deletes it if the body fails, so a
//! failed stage leaves no file behind.

use crate::error::{ForgeError, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Read-only view of a jar
pub struct JarReader {
    path: PathBuf,
    archive: ZipArchive<BufReader<File>>,
}

impl JarReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ForgeError::archive(path, format!("Failed to open jar: {e}")))?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| ForgeError::archive(path, format!("Failed to read jar: {e}")))?;
        trace!("Opened jar {} ({} entries)", path.display(), archive.len());
        Ok(Self { path: path.to_path_buf(), archive })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// File entry names in archive order, directories excluded
    pub fn entry_names(&self) -> Vec<String> {
        (0..self.archive.len())
            .filter_map(|i| self.archive.name_for_index(i))
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| ForgeError::archive(&self.path, format!("Failed to access {name}: {e}")))?;
        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Read an entry if present
    pub fn read_optional(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        if self.contains(name) {
            self.read(name).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Visit every file entry with its bytes
    pub fn for_each<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, Vec<u8>) -> Result<()>,
    {
        for i in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(i)
                .map_err(|e| ForgeError::archive(&self.path, format!("Failed to access entry {i}: {e}")))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;
            drop(entry);
            visit(&name, bytes)?;
        }
        Ok(())
    }
}

/// Mutable handle on an archive being written
pub struct JarWriter {
    path: PathBuf,
    zip: ZipWriter<BufWriter<File>>,
    written: BTreeSet<String>,
}

impl JarWriter {
    fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| ForgeError::archive(path, format!("Failed to create jar: {e}")))?;
        Ok(Self { path: path.to_path_buf(), zip: ZipWriter::new(BufWriter::new(file)), written: BTreeSet::new() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.written.contains(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.written.iter().map(String::as_str)
    }

    /// Add an entry. Writing the same name twice keeps the first copy.
    pub fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        if !self.written.insert(name.to_string()) {
            warn!("Entry {} already written to {}, skipping", name, self.path.display());
            return Ok(());
        }
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip
            .start_file(name, options)
            .map_err(|e| ForgeError::archive(&self.path, format!("Failed to start entry {name}: {e}")))?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        let mut inner = self
            .zip
            .finish()
            .map_err(|e| ForgeError::archive(&self.path, format!("Failed to finish jar: {e}")))?;
        inner.flush()?;
        Ok(())
    }
}

/// Write a new archive at `path` through `body`.
///
/// Any existing file at `path` is replaced. If `body` or closing the archive
/// fails, the partial output is deleted and the error returned.
pub fn write_archive<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut JarWriter) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        crate::cache::ensure_dir(parent)?;
    }
    if path.exists() {
        fs::remove_file(path)?;
    }

    let result = JarWriter::create(path).and_then(|mut writer| {
        body(&mut writer)?;
        let count = writer.written.len();
        writer.finish()?;
        debug!("Wrote {} ({} entries)", path.display(), count);
        Ok(())
    });

    if let Err(e) = result {
        discard_partial(path);
        return Err(e);
    }
    Ok(())
}

/// Copy `input` to `output`, letting `edit` rewrite or drop each entry
///
/// `edit` returns `None` to drop the entry. `extra` may add entries after the copy.
pub fn rewrite_archive<E, X>(input: &Path, output: &Path, mut edit: E, extra: X) -> Result<()>
where
    E: FnMut(&str, Vec<u8>) -> Result<Option<Vec<u8>>>,
    X: FnOnce(&mut JarWriter) -> Result<()>,
{
    let mut reader = JarReader::open(input)?;
    write_archive(output, |writer| {
        reader.for_each(|name, bytes| {
            if let Some(bytes) = edit(name, bytes)? {
                writer.write_entry(name, &bytes)?;
            }
            Ok(())
        })?;
        extra(writer)
    })
}

/// Path of the manifest inside a jar
pub const MANIFEST: &str = "META-INF/MANIFEST.MF";

/// Main attributes of a manifest in file order, continuation lines joined
pub fn manifest_attributes(bytes: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(bytes).replace("\r\n", "\n");
    let mut attributes: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(rest) = line.strip_prefix(' ') {
            if let Some((_, value)) = attributes.last_mut() {
                value.push_str(rest);
            }
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => attributes.push((key.trim().to_string(), value.trim_start().to_string())),
            None => trace!("Ignoring malformed manifest line {:?}", line),
        }
    }
    attributes
}

/// Manifest made of a default `Manifest-Version` overlaid with the main
/// attributes of `input`. Per-entry sections are dropped.
pub fn merge_manifest(input: Option<&[u8]>) -> Vec<u8> {
    let mut attributes = vec![("Manifest-Version".to_string(), "1.0".to_string())];
    for (key, value) in input.map(manifest_attributes).unwrap_or_default() {
        match attributes.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
            Some(slot) => slot.1 = value,
            None => attributes.push((key, value)),
        }
    }
    let mut out = String::new();
    for (key, value) in &attributes {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out.into_bytes()
}

/// Copy `input` to `output` with its manifest replaced by [`merge_manifest`]
pub fn copy_with_merged_manifest(input: &Path, output: &Path) -> Result<()> {
    let mut reader = JarReader::open(input)?;
    let manifest = merge_manifest(reader.read_optional(MANIFEST)?.as_deref());
    write_archive(output, |writer| {
        writer.write_entry(MANIFEST, &manifest)?;
        reader.for_each(|name, bytes| if name == MANIFEST { Ok(()) } else { writer.write_entry(name, &bytes) })
    })
}

/// Delete a partially written output, ignoring a missing file
pub(crate) fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Deleted partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete partial output {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read_entries() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.jar");
        write_archive(&path, |w| {
            w.write_entry("a/B.class", b"class-bytes")?;
            w.write_entry("assets/lang.json", b"{}")?;
            Ok(())
        })
        .unwrap();

        let mut reader = JarReader::open(&path).unwrap();
        assert_eq!(reader.entry_names(), vec!["a/B.class", "assets/lang.json"]);
        assert_eq!(reader.read("a/B.class").unwrap(), b"class-bytes");
        assert!(reader.read_optional("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_entry_keeps_first() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dup.jar");
        write_archive(&path, |w| {
            w.write_entry("x.txt", b"first")?;
            w.write_entry("x.txt", b"second")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(JarReader::open(&path).unwrap().read("x.txt").unwrap(), b"first");
    }

    #[test]
    fn test_failed_write_deletes_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("partial.jar");
        let result = write_archive(&path, |w| {
            w.write_entry("a.txt", b"data")?;
            Err(ForgeError::patch_failed("test", "boom"))
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_removes_previous_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stale.jar");
        fs::write(&path, b"stale").unwrap();
        let _ = write_archive(&path, |_| Err(ForgeError::patch_failed("test", "boom")));
        assert!(!path.exists());
    }

    #[test]
    fn test_rewrite_archive_drops_and_adds() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.jar");
        let output = temp_dir.path().join("out.jar");
        write_archive(&input, |w| {
            w.write_entry("keep.txt", b"keep")?;
            w.write_entry("drop.txt", b"drop")?;
            Ok(())
        })
        .unwrap();

        rewrite_archive(
            &input,
            &output,
            |name, bytes| Ok(if name == "drop.txt" { None } else { Some(bytes) }),
            |w| w.write_entry("added.txt", b"added"),
        )
        .unwrap();

        let reader = JarReader::open(&output).unwrap();
        assert_eq!(reader.entry_names(), vec!["keep.txt", "added.txt"]);
    }

    /// Input attributes override the defaults and digest sections are gone
    #[test]
    fn test_manifest_merge_keeps_main_attributes() {
        let input = b"Manifest-Version: 2.0\r\nMod-Id: demo\r\nLong: abc\r\n def\r\n\r\nName: a.class\r\nSHA-256-Digest: x\r\n\r\n";
        let merged = String::from_utf8(merge_manifest(Some(input))).unwrap();
        assert_eq!(merged, "Manifest-Version: 2.0\r\nMod-Id: demo\r\nLong: abcdef\r\n\r\n");
        assert_eq!(merge_manifest(None), b"Manifest-Version: 1.0\r\n\r\n");
    }

    #[test]
    fn test_copy_with_merged_manifest_writes_manifest_first() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.jar");
        let output = temp_dir.path().join("out").join("out.jar");
        write_archive(&input, |w| {
            w.write_entry("a.class", b"a")?;
            w.write_entry(MANIFEST, b"Mod-Id: demo\n\n")
        })
        .unwrap();

        copy_with_merged_manifest(&input, &output).unwrap();
        let mut reader = JarReader::open(&output).unwrap();
        assert_eq!(reader.entry_names(), vec![MANIFEST, "a.class"]);
        assert_eq!(reader.read(MANIFEST).unwrap(), b"Manifest-Version: 1.0\r\nMod-Id: demo\r\n\r\n");
        assert_eq!(reader.read("a.class").unwrap(), b"a");
    }

    #[test]
    fn test_open_missing_jar() {
        assert!(matches!(JarReader::open("/nonexistent/file.jar"), Err(ForgeError::Archive { .. })));
    }
}
