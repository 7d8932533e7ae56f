//! Loading the interface registry module back into memory.

use crate::parser::{named_children, parameters, text};
use crate::{AnatomistError, ParamKind, ParserHost};
use common::{InterfaceDecl, InterfaceRegistry, Member, ParamDecl, TypeExpr};
use std::path::Path;
use tracing::debug;
use tree_sitter::Node;

/// Modules the registry header always imports from.
const HEADER_MODULES: &[&str] = &["__future__", "collections.abc", "typing"];

/// Parses registry module source.
///
/// Every top-level class becomes an [`InterfaceDecl`]; `Protocol` is
/// dropped from its bases. `from` imports other than the fixed header are
/// kept as extra imports.
///
/// # Errors
/// Propagates parse failures from the host.
pub fn parse_registry(
    host: &mut ParserHost,
    source: &str,
) -> Result<InterfaceRegistry, AnatomistError> {
    let tree = host.parse_tree(source)?;
    let root = tree.root_node();
    let mut decls = Vec::new();
    let mut imports = Vec::new();
    for node in named_children(root) {
        let node = match node.kind() {
            "decorated_definition" => match node.child_by_field_name("definition") {
                Some(def) => def,
                None => continue,
            },
            _ => node,
        };
        match node.kind() {
            "class_definition" => decls.push(class_decl(node, source)),
            "import_from_statement" => {
                let module = node
                    .child_by_field_name("module_name")
                    .map(|m| text(m, source))
                    .unwrap_or("");
                if !HEADER_MODULES.contains(&module) {
                    imports.push(text(node, source).to_string());
                }
            }
            _ => {}
        }
    }
    let mut registry = InterfaceRegistry::from_decls(decls);
    for line in imports {
        registry.add_import(line);
    }
    Ok(registry)
}

/// Reads the registry file at `path`. A missing file is an empty registry.
///
/// # Errors
/// I/O failures other than "not found", and parse failures.
pub fn load_registry(path: &Path) -> Result<InterfaceRegistry, AnatomistError> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no registry file yet");
            return Ok(InterfaceRegistry::new());
        }
        Err(e) => return Err(e.into()),
    };
    let registry = parse_registry(&mut ParserHost::new()?, &source)?;
    debug!(path = %path.display(), interfaces = registry.len(), "registry loaded");
    Ok(registry)
}

fn class_decl(node: Node, source: &str) -> InterfaceDecl {
    let name = node
        .child_by_field_name("name")
        .map(|n| text(n, source))
        .unwrap_or_default();
    let mut decl = InterfaceDecl::new(name);
    if let Some(list) = node.child_by_field_name("superclasses") {
        decl.bases = named_children(list)
            .into_iter()
            .filter(|b| !matches!(b.kind(), "keyword_argument" | "comment"))
            .map(|b| text(b, source).to_string())
            .filter(|b| b != "Protocol")
            .collect();
    }
    let Some(body) = node.child_by_field_name("body") else {
        return decl;
    };
    for stmt in named_children(body) {
        let stmt = match stmt.kind() {
            "decorated_definition" => match stmt.child_by_field_name("definition") {
                Some(def) => def,
                None => continue,
            },
            _ => stmt,
        };
        match stmt.kind() {
            "function_definition" => {
                let params = parameters(stmt, source)
                    .into_iter()
                    .skip(1)
                    .map(|p| ParamDecl {
                        name: match p.kind {
                            ParamKind::Regular => p.name,
                            ParamKind::ListSplat => format!("*{}", p.name),
                            ParamKind::DictSplat => format!("**{}", p.name),
                        },
                        annotation: p.annotation.as_deref().map(TypeExpr::parse),
                        default: p.default_span.map(|s| s.text(source).to_string()),
                    })
                    .collect();
                decl.members
                    .insert(text_field(stmt, "name", source), Member::Method(params));
            }
            "expression_statement" => {
                for expr in named_children(stmt) {
                    let left = expr.child_by_field_name("left");
                    let ty = expr.child_by_field_name("type");
                    if let (Some(left), Some(ty)) = (left, ty) {
                        if expr.kind() == "assignment" && left.kind() == "identifier" {
                            decl.members.insert(
                                text(left, source).to_string(),
                                Member::Field(TypeExpr::parse(text(ty, source))),
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }
    decl
}

fn text_field(node: Node, field: &str, source: &str) -> String {
    node.child_by_field_name(field)
        .map(|n| text(n, source).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Unbound;
    use pretty_assertions::assert_eq;

    fn sample() -> InterfaceRegistry {
        let mut data = InterfaceDecl::new("Data1");
        data.members.insert(
            "content".into(),
            Member::Field(TypeExpr::union([TypeExpr::named("str"), TypeExpr::named("int")])),
        );
        let mut arg1 = ParamDecl::new("arg1", Some(TypeExpr::named("Data1")));
        arg1.default = Some("...".into());
        data.members.insert(
            "send".into(),
            Member::Method(vec![ParamDecl::new("arg0", Some(TypeExpr::named("int"))), arg1]),
        );
        data.members.insert(
            "__call__".into(),
            Member::Method(vec![ParamDecl::new("*args", None), ParamDecl::new("**kwargs", None)]),
        );
        let mut both = InterfaceDecl::new("Data");
        both.bases = vec!["Data1".into(), "Data2".into()];
        let mut registry = InterfaceRegistry::from_decls([data, both, InterfaceDecl::new("Data2")]);
        registry.add_import("from pathlib import PurePath");
        registry
    }

    #[test]
    fn test_render_then_load_is_stable() {
        let registry = sample();
        let rendered = registry.render();
        let loaded = parse_registry(&mut ParserHost::new().unwrap(), &rendered).unwrap();
        assert_eq!(loaded.render(), rendered);
        assert_eq!(loaded.get("Data").unwrap().bases, vec!["Data1", "Data2"]);
        assert_eq!(
            loaded.get("Data1").unwrap().render(&Unbound),
            registry.get("Data1").unwrap().render(&Unbound)
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = load_registry(&tmp.path().join("interfaces.py")).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("interfaces/interfaces.py");
        sample().save(&path).unwrap();
        let registry = load_registry(&path).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.extra_imports().collect::<Vec<_>>(),
            vec!["from pathlib import PurePath"]
        );
    }
}
