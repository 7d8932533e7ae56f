//! Path normalization utilities for cross-platform file handling.

use std::path::Path;

use crate::AnatomistError;

/// Normalizes a file path to a canonical UTF-8 string with forward slashes.
///
/// # Process
/// 1. Canonicalizes the path using `dunce::canonicalize` (removes `\\?\` prefix on Windows)
/// 2. Converts to UTF-8 string
/// 3. Replaces backslashes with forward slashes for consistent representation
///
/// # Errors
/// - Returns `AnatomistError::IoError` if canonicalization fails (file not found, permissions, etc.)
/// - Returns `AnatomistError::ParseFailure` if the path contains non-UTF-8 characters
pub fn normalize_path(path: &Path) -> Result<String, AnatomistError> {
    let canonical = dunce::canonicalize(path)?;
    let s = canonical.to_str().ok_or_else(|| {
        AnatomistError::ParseFailure(format!("Non-UTF-8 path: {}", canonical.display()))
    })?;
    Ok(s.replace('\\', "/"))
}

/// Dotted Python module name of `file` relative to `root`.
///
/// `pkg/__init__.py` maps to `pkg`, `pkg/mod.py` to `pkg.mod`. Returns
/// `None` when `file` is outside `root` or is not a `.py` file.
///
/// # Example
/// ```
/// use anatomist::path_util::module_name;
/// use std::path::Path;
///
/// let name = module_name(Path::new("/p/interfaces/interfaces.py"), Path::new("/p"));
/// assert_eq!(name.as_deref(), Some("interfaces.interfaces"));
/// ```
pub fn module_name(file: &Path, root: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    if relative.extension()? != "py" {
        return None;
    }
    let mut parts: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect::<Option<_>>()?;
    if parts.last().map(String::as_str) == Some("__init__") {
        parts.pop();
    }
    (!parts.is_empty()).then(|| parts.join("."))
}

/// Display form of `path` relative to `root`, falling back to the full path.
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_cargo_manifest() {
        let cargo_manifest = std::env::var("CARGO_MANIFEST_DIR")
            .map(|dir| Path::new(&dir).join("Cargo.toml"))
            .unwrap();

        let normalized = normalize_path(&cargo_manifest).unwrap();
        assert!(normalized.contains('/'));
        assert!(normalized.ends_with("Cargo.toml"));
        assert!(!normalized.contains('\\'));
    }

    #[test]
    fn test_normalize_nonexistent_path() {
        let result = normalize_path(Path::new("/this/does/not/exist/nowhere.py"));
        assert!(result.is_err());
    }

    #[test]
    fn test_module_name() {
        let root = Path::new("/proj");
        assert_eq!(module_name(Path::new("/proj/a/b.py"), root).as_deref(), Some("a.b"));
        assert_eq!(module_name(Path::new("/proj/pkg/__init__.py"), root).as_deref(), Some("pkg"));
        assert_eq!(module_name(Path::new("/proj/notes.txt"), root), None);
        assert_eq!(module_name(Path::new("/elsewhere/x.py"), root), None);
        assert_eq!(module_name(Path::new("/proj/__init__.py"), root), None);
    }

    #[test]
    fn test_display_relative() {
        assert_eq!(display_relative(Path::new("/p/x/y.py"), Path::new("/p")), "x/y.py");
        assert_eq!(display_relative(Path::new("/q/y.py"), Path::new("/p")), "/q/y.py");
    }
}
