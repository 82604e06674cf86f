//! Plugin archive handling.
//!
//! An archive `<name>.zip` (or any configured extension) in the plugin
//! directory is exploded into the sibling directory `<name>/`. Extraction
//! writes into a hidden staging directory first and renames it into place,
//! so a scan never sees a half-written plugin. The extracted directory
//! carries a stamp with the archive's modification time; a newer archive
//! means the plugin must be re-extracted.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{PluginError, PluginResult};
use crate::manifest::MANIFEST_FILE;

/// Stamp written into every extracted directory.
pub const STAMP_FILE: &str = ".source-modified";

/// Plugin name for an archive path, if its extension is one of `extensions`.
///
/// Names are lowercased so `Search.ZIP` and `search.zip` map to one plugin.
pub fn plugin_name(path: &Path, extensions: &[String]) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(stem.to_lowercase())
}

/// Whether the archive carries a plugin manifest at its root.
///
/// Archives without one are ignored rather than exploded.
pub fn contains_manifest(path: &Path) -> PluginResult<bool> {
    let archive = open(path)?;
    let found = archive.file_names().any(|name| name == MANIFEST_FILE);
    Ok(found)
}

/// Whether `dir` was produced by [`extract`].
pub fn is_extracted(dir: &Path) -> bool {
    dir.join(STAMP_FILE).is_file()
}

/// Whether the archive changed since `dir` was extracted from it.
pub fn is_stale(archive: &Path, dir: &Path) -> io::Result<bool> {
    let modified = modified_nanos(archive)?;
    match fs::read_to_string(dir.join(STAMP_FILE)) {
        Ok(stamp) => Ok(stamp.trim().parse::<u128>().map_or(true, |s| modified > s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            // Not extracted by us; fall back to the directory's own mtime.
            Ok(modified > modified_nanos(dir)?)
        }
        Err(e) => Err(e),
    }
}

/// Explodes `archive` into `dest`, replacing anything already there.
pub fn extract(archive_path: &Path, dest: &Path) -> PluginResult<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| PluginError::archive(dest, "destination has no parent directory"))?;
    let modified = modified_nanos(archive_path)?;
    let mut archive = open(archive_path)?;

    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| PluginError::archive(archive_path, e))?;
        let relative = entry
            .enclosed_name()
            .filter(|p| is_safe_relative(p))
            .ok_or_else(|| {
                PluginError::archive(archive_path, format!("unsafe entry path {:?}", entry.name()))
            })?;
        let target = staging.path().join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    fs::write(staging.path().join(STAMP_FILE), modified.to_string())?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::rename(staging.path(), dest)?;
    debug!(archive = %archive_path.display(), dest = %dest.display(), "Extracted plugin archive");
    Ok(())
}

fn open(path: &Path) -> PluginResult<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| PluginError::archive(path, e))
}

fn is_safe_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn modified_nanos(path: &Path) -> io::Result<u128> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos())
}
