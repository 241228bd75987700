//! Directory listing and path filtering.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Extension of tracked files.
const EXTENSION: &str = "json";

/// Whether a file or directory name is hidden (dotfile).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether `path` names a file this watch reports.
///
/// Only checks the name, so it also answers for paths that no longer exist
/// (removal events).
pub fn is_tracked(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !is_hidden(name) && path.extension().is_some_and(|ext| ext == EXTENSION)
}

/// List the tracked files directly inside `dir`, sorted by path.
///
/// Symlinks to regular files are included. Subdirectories are not descended
/// into.
pub fn scan_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_tracked(path) && path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// List the non-hidden subdirectories of `root` as `(name, path)` pairs,
/// sorted by name. Symlinks to directories count as subdirectories.
///
/// # Errors
///
/// Returns the I/O error if `root` cannot be listed.
pub fn scan_subdirectories(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut dirs: Vec<(String, PathBuf)> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            (!is_hidden(&name)).then(|| (name, entry.path()))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}
