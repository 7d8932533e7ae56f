//! # Import Extraction & Resolution
//!
//! Collects module-level import statements and resolves them to files inside
//! the project. Supports both absolute (`import foo.bar`) and relative
//! (`from ..utils import x`) imports.

use crate::parser::{named_children, span, text};
use crate::{ImportStmt, ImportedName};
use std::path::{Path, PathBuf};
use tree_sitter::Node;

/// Module-level imports of a parsed file, in source order.
///
/// Imports nested in functions, classes or `if` blocks are ignored; only
/// top-level statements are rewritten or consulted for ordering.
pub fn collect_imports(source: &str, root: Node) -> Vec<ImportStmt> {
    named_children(root)
        .into_iter()
        .filter_map(|node| import_stmt(source, node))
        .collect()
}

fn import_stmt(source: &str, node: Node) -> Option<ImportStmt> {
    let module = match node.kind() {
        "import_statement" => String::new(),
        "import_from_statement" => text(node.child_by_field_name("module_name")?, source).to_string(),
        "future_import_statement" => "__future__".to_string(),
        _ => return None,
    };
    let mut cursor = node.walk();
    let names = node
        .children_by_field_name("name", &mut cursor)
        .filter_map(|name| imported_name(source, name))
        .collect();
    let wildcard = named_children(node)
        .iter()
        .any(|c| c.kind() == "wildcard_import");
    Some(ImportStmt {
        module,
        names,
        wildcard,
        span: span(node),
        line: node.start_position().row as u32 + 1,
    })
}

fn imported_name(source: &str, node: Node) -> Option<ImportedName> {
    match node.kind() {
        "dotted_name" => Some(ImportedName::new(text(node, source), None)),
        "aliased_import" => {
            let name = text(node.child_by_field_name("name")?, source);
            let alias = node
                .child_by_field_name("alias")
                .map(|a| text(a, source).to_string());
            Some(ImportedName::new(name, alias))
        }
        _ => None,
    }
}

/// Modules an import statement may load, most specific first.
///
/// `from pkg import mod` can load either `pkg.mod` or just `pkg`, so both are
/// reported; bare `import a.b` loads `a.b`.
pub fn imported_modules(stmt: &ImportStmt) -> Vec<String> {
    if !stmt.is_from() {
        return stmt.names.iter().map(|n| n.name.clone()).collect();
    }
    let mut modules: Vec<String> = stmt
        .names
        .iter()
        .map(|n| {
            if stmt.module.ends_with('.') {
                format!("{}{}", stmt.module, n.name)
            } else {
                format!("{}.{}", stmt.module, n.name)
            }
        })
        .collect();
    modules.push(stmt.module.clone());
    modules
}

/// Resolves a Python import path to an absolute file path.
///
/// # Examples
/// ```ignore
/// let source_file = Path::new("/project/src/api/handlers.py");
/// let project_root = Path::new("/project");
///
/// // Relative import: from ..utils import foo
/// let result = resolve_import(source_file, "..utils", project_root);
/// // Returns Some("/project/src/utils.py") or Some("/project/src/utils/__init__.py")
/// ```
pub fn resolve_import(
    source_file: &Path,
    import_path: &str,
    project_root: &Path,
) -> Option<PathBuf> {
    let dot_count = import_path.chars().take_while(|&c| c == '.').count();

    if dot_count > 0 {
        let dotted = &import_path[dot_count..];
        let mut base = source_file.parent()?;
        for _ in 1..dot_count {
            base = base.parent()?;
        }
        resolve_module_path(base, dotted)
    } else {
        resolve_module_path(project_root, import_path)
    }
}

/// Resolves a dotted module path to a file path.
///
/// Tries:
/// 1. `{base}/{parts.join("/")}.py`
/// 2. `{base}/{parts.join("/")}/__init__.py`
fn resolve_module_path(base: &Path, dotted: &str) -> Option<PathBuf> {
    if dotted.is_empty() {
        let init_py = base.join("__init__.py");
        return init_py
            .exists()
            .then(|| dunce::canonicalize(init_py).ok())
            .flatten();
    }

    let rel_path = dotted.split('.').collect::<Vec<_>>().join("/");

    let module_py = base.join(format!("{}.py", rel_path));
    if module_py.exists() {
        return dunce::canonicalize(module_py).ok();
    }

    let init_py = base.join(&rel_path).join("__init__.py");
    if init_py.exists() {
        return dunce::canonicalize(init_py).ok();
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use std::fs;

    fn imports_of(source: &str) -> Vec<ImportStmt> {
        parse_source(source).unwrap().imports
    }

    #[test]
    fn test_bare_import() {
        let imports = imports_of("import foo.bar as fb, baz\n");
        assert_eq!(imports.len(), 1);
        assert!(!imports[0].is_from());
        assert_eq!(imports[0].names[0].render(), "foo.bar as fb");
        assert_eq!(imports[0].names[1].binding(), "baz");
    }

    #[test]
    fn test_from_import_forms() {
        let src = "from __future__ import annotations\nfrom .utils import (a, b as c)\nfrom typing import *\n";
        let imports = imports_of(src);
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].module, "__future__");
        assert_eq!(imports[1].module, ".utils");
        assert_eq!(imports[1].names.len(), 2);
        assert_eq!(imports[1].names[1].alias.as_deref(), Some("c"));
        assert_eq!(imports[1].line, 2);
        assert!(imports[2].wildcard);
        assert_eq!(imports[2].span.text(src), "from typing import *");
    }

    #[test]
    fn test_nested_imports_are_ignored() {
        let imports = imports_of("def f():\n    import os\n    return os\n");
        assert!(imports.is_empty());
    }

    #[test]
    fn test_imported_modules() {
        let imports = imports_of("from pkg import mod\nfrom . import sibling\nimport a.b\n");
        assert_eq!(imported_modules(&imports[0]), vec!["pkg.mod", "pkg"]);
        assert_eq!(imported_modules(&imports[1]), vec![".sibling", "."]);
        assert_eq!(imported_modules(&imports[2]), vec!["a.b"]);
    }

    #[test]
    fn test_resolve_absolute_and_package() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("mymod.py"), "").unwrap();
        fs::create_dir_all(tmp.path().join("pkg")).unwrap();
        fs::write(tmp.path().join("pkg/__init__.py"), "").unwrap();

        let source = tmp.path().join("main.py");
        let module = resolve_import(&source, "mymod", tmp.path()).unwrap();
        assert!(module.ends_with("mymod.py"));
        let package = resolve_import(&source, "pkg", tmp.path()).unwrap();
        assert!(package.ends_with("__init__.py"));
        assert!(resolve_import(&source, "nonexistent", tmp.path()).is_none());
    }

    #[test]
    fn test_resolve_relative() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("src/api")).unwrap();
        fs::write(tmp.path().join("src/core.py"), "").unwrap();
        fs::write(tmp.path().join("src/api/utils.py"), "").unwrap();

        let source = tmp.path().join("src/api/handlers.py");
        let sibling = resolve_import(&source, ".utils", tmp.path()).unwrap();
        assert!(sibling.ends_with("utils.py"));
        let parent = resolve_import(&source, "..core", tmp.path()).unwrap();
        assert!(parent.ends_with("core.py"));
    }
}
