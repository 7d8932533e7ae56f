//! # Source Edits
//!
//! Every change made to a Python file is an [`Edit`]: a byte range and its
//! replacement. Constructors here produce edits from a [`SourceModel`];
//! [`apply_edits`] splices a batch of them bottom-to-top.

use crate::parser::{named_children, span, text};
use crate::{
    AnatomistError, ClassInfo, ImportStmt, ImportedName, ParamInfo, ParserHost, SourceModel, Span,
};
use std::collections::BTreeMap;
use tree_sitter::Node;

/// A byte-range replacement. `start == end` inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    pub fn replace(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            start: span.start,
            end: span.end,
            replacement: replacement.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            replacement: text.into(),
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// Applies `edits` to `source`.
///
/// Inserts at the same offset keep their relative order.
///
/// # Errors
/// [`AnatomistError::OverlappingEdits`] when two edits replace overlapping
/// byte ranges.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> Result<String, AnatomistError> {
    edits.sort_by_key(|e| (e.start, e.end));
    for pair in edits.windows(2) {
        if pair[0].end > pair[1].start {
            return Err(AnatomistError::OverlappingEdits {
                first: pair[0].span(),
                second: pair[1].span(),
            });
        }
    }
    let mut out = source.to_string();
    for edit in edits.iter().rev() {
        out.replace_range(edit.start..edit.end, &edit.replacement);
    }
    Ok(out)
}

// ---- annotations ----

/// Where a parameter's annotation text goes: `span` is replaced by
/// `prefix + annotation + suffix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationSite {
    pub span: Span,
    pub prefix: &'static str,
    pub suffix: &'static str,
}

impl AnnotationSite {
    pub fn of(param: &ParamInfo) -> Self {
        match (param.annotation_span, param.default_span) {
            (Some(annotation), _) => Self {
                span: annotation,
                prefix: "",
                suffix: "",
            },
            (None, Some(default)) => Self {
                span: Span::new(param.name_span.end, default.start),
                prefix: ": ",
                suffix: " = ",
            },
            (None, None) => Self {
                span: Span::new(param.name_span.end, param.name_span.end),
                prefix: ": ",
                suffix: "",
            },
        }
    }
}

/// Sets (or replaces) the annotation of `param`.
pub fn annotate_param(param: &ParamInfo, annotation: &str) -> Edit {
    let site = AnnotationSite::of(param);
    Edit::replace(site.span, format!("{}{annotation}{}", site.prefix, site.suffix))
}

// ---- class headers ----

/// Appends `base` to the class's base list, after positional bases and
/// before keyword arguments.
pub fn add_base_class(class: &ClassInfo, base: &str) -> Edit {
    if let Some(end) = class.last_base_end {
        return Edit::insert(end, format!(", {base}"));
    }
    if let Some(start) = class.first_keyword_start {
        return Edit::insert(start, format!("{base}, "));
    }
    match class.bases_span {
        Some(list) => Edit::replace(list, format!("({base})")),
        None => Edit::insert(class.name_span.end, format!("({base})")),
    }
}

// ---- imports ----

/// Inserts `lines` at the file's import anchor. `None` when there is
/// nothing to insert.
pub fn insert_imports(model: &SourceModel, lines: &[String]) -> Option<Edit> {
    if lines.is_empty() {
        return None;
    }
    let mut text = String::new();
    if model.anchor_needs_newline {
        text.push('\n');
    }
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    Some(Edit::insert(model.import_anchor, text))
}

/// Blanks every `from <module> import ...` statement, keeping its line so
/// line numbers of the rest of the file do not move.
pub fn remove_imports_of(model: &SourceModel, module: &str) -> Vec<Edit> {
    model
        .imports_from(module)
        .map(|stmt| Edit::replace(stmt.span, "pass"))
        .collect()
}

/// Replaces an import statement's name list. An empty list blanks the
/// statement to `pass`.
pub fn rewrite_import(stmt: &ImportStmt, names: &[ImportedName]) -> Edit {
    if names.is_empty() {
        return Edit::replace(stmt.span, "pass");
    }
    let list: Vec<String> = names.iter().map(ImportedName::render).collect();
    let text = if stmt.is_from() {
        format!("from {} import {}", stmt.module, list.join(", "))
    } else {
        format!("import {}", list.join(", "))
    };
    Edit::replace(stmt.span, text)
}

// ---- renames ----

/// Renames identifiers inside annotations and class base lists.
///
/// Only bare names are touched: the `attribute` part of `pkg.Name` and
/// string annotations stay as they are.
///
/// # Errors
/// Propagates parse failures from the host.
pub fn rename_annotation_identifiers(
    host: &mut ParserHost,
    source: &str,
    renames: &BTreeMap<String, String>,
) -> Result<Vec<Edit>, AnatomistError> {
    if renames.is_empty() {
        return Ok(Vec::new());
    }
    let tree = host.parse_tree(source)?;
    let mut edits = Vec::new();
    collect_renames(tree.root_node(), source, renames, false, &mut edits);
    Ok(edits)
}

fn collect_renames(
    node: Node,
    source: &str,
    renames: &BTreeMap<String, String>,
    in_type: bool,
    out: &mut Vec<Edit>,
) {
    if in_type && node.kind() == "identifier" {
        let is_attribute_tail = node.parent().is_some_and(|p| {
            p.kind() == "attribute" && p.child_by_field_name("attribute") == Some(node)
        });
        let is_keyword_name = node.parent().is_some_and(|p| {
            p.kind() == "keyword_argument" && p.child_by_field_name("name") == Some(node)
        });
        if !is_attribute_tail && !is_keyword_name {
            if let Some(new) = renames.get(text(node, source)) {
                out.push(Edit::replace(span(node), new.clone()));
            }
        }
        return;
    }
    if node.kind() == "string" {
        return;
    }
    for child in named_children(node) {
        let child_in_type = in_type
            || child.kind() == "type"
            || (node.kind() == "class_definition"
                && node.child_by_field_name("superclasses") == Some(child));
        collect_renames(child, source, renames, child_in_type, out);
    }
}
