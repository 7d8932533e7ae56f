//! Python file discovery.

use anyhow::Context;
use std::collections::BTreeSet;
use std::path::PathBuf;
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &["__pycache__", "node_modules", "venv", "site-packages"];

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}

/// Every `.py` file under `paths`, canonicalized, sorted and without
/// duplicates. Paths in `excluded` (the registry file) and everything under
/// `excluded_dirs` are left out.
///
/// # Errors
/// A given path that does not exist.
pub fn collect_py_files(
    paths: &[PathBuf],
    excluded: &[PathBuf],
    excluded_dirs: &[PathBuf],
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for path in paths {
        let path = dunce::canonicalize(path)
            .with_context(|| format!("input path {}", path.display()))?;
        if path.is_file() {
            files.insert(path);
            continue;
        }
        let found = WalkDir::new(&path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e))
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path().extension().and_then(|x| x.to_str()) == Some("py")
            })
            .filter_map(|e| dunce::canonicalize(e.path()).ok());
        files.extend(found);
    }
    let excluded: Vec<PathBuf> = excluded
        .iter()
        .map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.clone()))
        .collect();
    let excluded_dirs: Vec<PathBuf> = excluded_dirs
        .iter()
        .map(|p| dunce::canonicalize(p).unwrap_or_else(|_| p.clone()))
        .collect();
    Ok(files
        .into_iter()
        .filter(|f| !excluded.contains(f) && !excluded_dirs.iter().any(|d| f.starts_with(d)))
        .collect())
}
