//! Saved-hint merging and the imports an annotation needs.

use catalog::Catalog;
use common::types::is_identifier;
use common::TypeExpr;
use std::collections::BTreeSet;

/// Names that live in `typing` rather than `collections.abc`.
const TYPING_NAMES: &[&str] = &[
    "Any", "Callable", "ClassVar", "Final", "Literal", "Optional", "Type", "Union",
];

/// Merges a freshly inferred type with the parameter's previous annotation.
///
/// - No previous annotation: the new type.
/// - New type is `Any` and `Any` is not allowed: the previous annotation.
/// - Otherwise the previous members, in their order, followed by the new
///   members the previous annotation lacked, sorted. A single member is
///   returned as is.
pub fn combine_with_hint(hint: Option<&TypeExpr>, new: TypeExpr, allow_any: bool) -> TypeExpr {
    let Some(old) = hint else {
        return new;
    };
    if new.is_any() && !allow_any {
        return old.clone();
    }
    let mut members = old.members();
    let mut added: Vec<TypeExpr> = new
        .members()
        .into_iter()
        .filter(|m| !members.contains(m))
        .collect();
    added.sort();
    members.extend(added);
    TypeExpr::union(members)
}

/// Everything an annotation needs imported, grouped by source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportPlan {
    pub abstract_names: BTreeSet<String>,
    pub typing_names: BTreeSet<String>,
    pub registry_names: BTreeSet<String>,
    /// Full `from m import X` lines for library classes.
    pub external_lines: BTreeSet<String>,
}

impl ImportPlan {
    /// Records the names `expr` refers to.
    pub fn add(&mut self, expr: &TypeExpr, catalog: &Catalog, is_registry: &dyn Fn(&str) -> bool) {
        let mut names = BTreeSet::new();
        expr.referenced_names(&mut names);
        collect_typing(expr, &mut names);
        for name in names {
            if is_registry(&name) {
                self.registry_names.insert(name);
            } else if catalog.is_abstract(&name) {
                self.abstract_names.insert(name);
            } else if TYPING_NAMES.contains(&name.as_str()) {
                self.typing_names.insert(name);
            } else if let Some(line) = catalog.get(&name).and_then(|e| e.import_line()) {
                self.external_lines.insert(line);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.abstract_names.is_empty()
            && self.typing_names.is_empty()
            && self.registry_names.is_empty()
            && self.external_lines.is_empty()
    }
}

fn collect_typing(expr: &TypeExpr, out: &mut BTreeSet<String>) {
    match expr {
        TypeExpr::Any => {
            out.insert("Any".into());
        }
        TypeExpr::Union(members) => {
            out.insert("Union".into());
            members.iter().for_each(|m| collect_typing(m, out));
        }
        TypeExpr::Generic { args, .. } => args.iter().for_each(|a| collect_typing(a, out)),
        TypeExpr::Named(name) if name.starts_with("Literal[") => {
            out.insert("Literal".into());
        }
        TypeExpr::Named(name) if !is_identifier(name) => {
            let parsed = TypeExpr::parse(name);
            if !matches!(parsed, TypeExpr::Named(_)) {
                collect_typing(&parsed, out);
            }
        }
        _ => {}
    }
}

/// `collections.abc`, `typing` and library import lines for `plan`,
/// skipping names the file already binds. Registry names are left to the
/// caller, which owns the aliasing.
pub fn import_lines(plan: &ImportPlan, bound: &BTreeSet<String>) -> Vec<String> {
    let mut lines = Vec::new();
    let missing = |names: &BTreeSet<String>| -> Vec<String> {
        names.iter().filter(|n| !bound.contains(*n)).cloned().collect()
    };
    let abstracts = missing(&plan.abstract_names);
    if !abstracts.is_empty() {
        lines.push(format!("from collections.abc import {}", abstracts.join(", ")));
    }
    let typing = missing(&plan.typing_names);
    if !typing.is_empty() {
        lines.push(format!("from typing import {}", typing.join(", ")));
    }
    for line in &plan.external_lines {
        let name = line.rsplit(' ').next().unwrap_or_default();
        if !bound.contains(name) {
            lines.push(line.clone());
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn t(text: &str) -> TypeExpr {
        TypeExpr::parse(text)
    }

    #[test]
    fn test_hint_combination() {
        assert_eq!(combine_with_hint(None, t("Data1"), false), t("Data1"));
        assert_eq!(combine_with_hint(Some(&t("str")), TypeExpr::Any, false), t("str"));
        assert_eq!(combine_with_hint(Some(&t("str")), TypeExpr::Any, true), t("Union[str, Any]"));
        assert_eq!(
            combine_with_hint(Some(&t("Union[str, int]")), t("Union[bytes, int, Data1]"), false),
            t("Union[str, int, Data1, bytes]")
        );
        assert_eq!(combine_with_hint(Some(&t("Data1")), t("Data1"), false), t("Data1"));
    }

    #[test]
    fn test_import_plan() {
        let catalog = Catalog::builtin();
        let mut plan = ImportPlan::default();
        let is_registry = |n: &str| n == "Data1";
        plan.add(&t("Union[Sequence[Data1], Callable[..., Any], str]"), &catalog, &is_registry);
        assert_eq!(plan.registry_names, BTreeSet::from(["Data1".to_string()]));
        assert!(plan.abstract_names.contains("Sequence"));
        assert!(plan.typing_names.contains("Union"));
        assert!(plan.typing_names.contains("Any"));

        let bound = BTreeSet::from(["Union".to_string()]);
        let lines = import_lines(&plan, &bound);
        assert!(lines.iter().any(|l| l.starts_with("from collections.abc import ") && l.contains("Sequence")));
        assert!(lines.iter().any(|l| l.starts_with("from typing import Any")));
        assert!(!lines.iter().any(|l| l.contains("Union")));
    }
}
