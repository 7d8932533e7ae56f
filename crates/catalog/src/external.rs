//! Discovery of candidate classes in installed Python libraries.
//!
//! A small Python script imports each requested library and its submodules
//! and prints one JSON record per public class it finds. A module's
//! `__all__` is preferred over `dir()` when present. Excluded names prune
//! the module they name and everything below it. Modules that fail to
//! import are skipped by the script.

use crate::CatalogError;
use serde::Deserialize;
use std::process::Command;
use tracing::{debug, info};

/// Separates the libraries from the exclusions on the script's command line.
const EXCLUDE_MARKER: &str = "--exclude";

const SCAN_SCRIPT: &str = r#"
import importlib, json, pkgutil, sys
args = sys.argv[1:]
split = args.index("--exclude") if "--exclude" in args else len(args)
libs, excluded = args[:split], args[split + 1:]

def is_excluded(name):
    return any(name == e or name.startswith(e + ".") for e in excluded)

def submodules(module):
    path = getattr(module, "__path__", None)
    if path is None:
        return
    for info in pkgutil.walk_packages(path, prefix=module.__name__ + ".", onerror=lambda _: None):
        if info.name.rsplit(".", 1)[-1].startswith("_") or is_excluded(info.name):
            continue
        try:
            yield importlib.import_module(info.name)
        except Exception:
            continue

seen = set()
for lib in libs:
    if is_excluded(lib):
        continue
    try:
        root = importlib.import_module(lib)
    except Exception:
        continue
    for module in [root, *submodules(root)]:
        exported = getattr(module, "__all__", None)
        names = exported if isinstance(exported, (list, tuple)) else dir(module)
        for name in names:
            if not isinstance(name, str) or name.startswith("_"):
                continue
            item = getattr(module, name, None)
            if not isinstance(item, type) or (module.__name__, name) in seen:
                continue
            seen.add((module.__name__, name))
            members = sorted(dir(item))
            if getattr(item, "__hash__", None) is None:
                members = [m for m in members if m != "__hash__"]
            print(json.dumps({"module": module.__name__, "name": name, "members": members}))
"#;

/// `true` when `module` is one of `excluded` or sits below one of them.
pub fn is_excluded(module: &str, excluded: &[String]) -> bool {
    excluded.iter().any(|e| {
        module == e
            || module
                .strip_prefix(e.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    })
}

/// One class found in an external library.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalClass {
    /// Module it is imported from.
    pub module: String,
    pub name: String,
    pub members: Vec<String>,
}

/// Runs the library scan with a Python interpreter.
#[derive(Debug, Clone)]
pub struct ExternalScanner {
    pub python: String,
    pub libraries: Vec<String>,
    pub excluded: Vec<String>,
}

impl ExternalScanner {
    pub fn new(python: impl Into<String>, libraries: Vec<String>, excluded: Vec<String>) -> Self {
        Self {
            python: python.into(),
            libraries,
            excluded,
        }
    }

    /// Libraries left after exclusions, in request order.
    pub fn effective_libraries(&self) -> Vec<&str> {
        self.libraries
            .iter()
            .filter(|lib| !is_excluded(lib, &self.excluded))
            .map(String::as_str)
            .collect()
    }

    /// Imports every requested library with its submodules and lists their
    /// public classes.
    ///
    /// # Errors
    /// - [`CatalogError::IoError`] when the interpreter cannot be launched.
    /// - [`CatalogError::ScanFailed`] when the script exits abnormally.
    /// - [`CatalogError::MalformedRecord`] when a record is not valid JSON.
    pub fn scan(&self) -> Result<Vec<ExternalClass>, CatalogError> {
        let libraries = self.effective_libraries();
        if libraries.is_empty() {
            return Ok(Vec::new());
        }
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(SCAN_SCRIPT)
            .args(&libraries)
            .arg(EXCLUDE_MARKER)
            .args(&self.excluded)
            .output()?;
        if !output.status.success() {
            return Err(CatalogError::ScanFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let classes = parse_records(&String::from_utf8_lossy(&output.stdout))?;
        info!(
            libraries = libraries.len(),
            classes = classes.len(),
            "external library scan complete"
        );
        Ok(classes)
    }
}

/// Parses the scan output, one JSON record per non-empty line.
pub fn parse_records(stdout: &str) -> Result<Vec<ExternalClass>, CatalogError> {
    let mut classes = Vec::new();
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let class: ExternalClass = serde_json::from_str(line)?;
        debug!(module = %class.module, name = %class.name, "external class");
        classes.push(class);
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let out = "{\"module\": \"pathlib\", \"name\": \"PurePath\", \"members\": [\"joinpath\"]}\n\n";
        let classes = parse_records(out).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].module, "pathlib");
        assert_eq!(classes[0].members, vec!["joinpath"]);
    }

    #[test]
    fn test_parse_records_rejects_garbage() {
        assert!(matches!(
            parse_records("not json"),
            Err(CatalogError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_submodule_records_and_dotted_exclusion() {
        let out = concat!(
            "{\"module\": \"networkx.classes.graph\", \"name\": \"Graph\", \"members\": [\"add_edge\"]}\n",
            "{\"module\": \"networkx\", \"name\": \"Graph\", \"members\": [\"add_edge\"]}\n",
        );
        let classes = parse_records(out).unwrap();
        assert_eq!(classes[0].module, "networkx.classes.graph");
        assert_eq!(classes[1].module, "networkx");

        let excluded = vec!["networkx.utils.configs".to_string()];
        assert!(is_excluded("networkx.utils.configs", &excluded));
        assert!(is_excluded("networkx.utils.configs.backends", &excluded));
        assert!(!is_excluded("networkx.utils", &excluded));
        assert!(!is_excluded("networkx.utils.configsx", &excluded));
        assert!(!is_excluded("networkx", &excluded));
    }

    #[test]
    fn test_exclusions_and_empty_scan() {
        let scanner = ExternalScanner::new(
            "python3",
            vec!["pathlib".into(), "numpy".into()],
            vec!["numpy".into()],
        );
        assert_eq!(scanner.effective_libraries(), vec!["pathlib"]);

        let nothing = ExternalScanner::new("no-such-python", Vec::new(), Vec::new());
        assert!(nothing.scan().unwrap().is_empty());
    }
}
