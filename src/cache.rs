//! Cache directory layout for derived jars.

use crate::error::{ForgeError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Get the cache directory for jarforge
/// Returns OS-appropriate cache directory:
/// - macOS: ~/Library/Caches/jarforge
/// - Linux: ~/.cache/jarforge
/// - Windows: %LOCALAPPDATA%\jarforge
pub fn cache_dir() -> Result<PathBuf> {
    let base_cache =
        dirs::cache_dir().ok_or_else(|| ForgeError::configuration("Failed to get system cache directory"))?;

    Ok(base_cache.join("jarforge"))
}

/// Directory holding every artifact derived from one game version
pub fn version_dir(root: &Path, version: &str) -> PathBuf {
    root.join(sanitize_component(version))
}

/// Create a directory (and parents) if it doesn't exist
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// List every cached jar below `root`, sorted for stable output
pub fn cached_artifacts(root: &Path) -> Vec<PathBuf> {
    if !root.exists() {
        return Vec::new();
    }

    let mut jars: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map(|ext| ext == "jar").unwrap_or(false))
        .collect();
    jars.sort();
    jars
}

/// Replace characters that are unsafe in a single path component
pub(crate) fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => '_',
            c => c,
        })
        .collect()
}
