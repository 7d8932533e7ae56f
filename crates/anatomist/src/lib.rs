//! # The Anatomist: Python Source Model & Edits
//!
//! **Role**: Everything the pipeline needs to know about Python source text,
//! and every change it makes to it.
//!
//! **Core Types**:
//! - [`SourceModel`]: functions (with parameters), classes (with bases,
//!   methods and fields), and module-level imports of one file.
//! - [`edits::Edit`]: a byte-range replacement. Edits are collected first
//!   and spliced bottom-to-top so earlier offsets stay valid.
//! - [`graph::ImportGraph`]: intra-project import edges and the
//!   dependency-first processing order.
//!
//! **Design**:
//! - Stores byte ranges ([`Span`]) instead of node handles so a model
//!   outlives its tree-sitter tree.
//! - Parsing is error tolerant: a file with syntax errors still yields every
//!   definition tree-sitter could recover, and [`SourceModel::has_errors`]
//!   tells the caller.

pub mod edits;
pub mod graph;
pub mod imports;
pub mod parser;
pub mod path_util;
pub mod registry_file;

pub use edits::Edit;
pub use parser::ParserHost;

use std::collections::BTreeSet;

/// Half-open byte range into a source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The spanned text.
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// How a parameter binds its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A regular positional-or-keyword (or keyword-only) parameter.
    Regular,
    /// `*args`
    ListSplat,
    /// `**kwargs`
    DictSplat,
}

/// One parameter of a function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    pub kind: ParamKind,
    /// Annotation text, if any.
    pub annotation: Option<String>,
    pub name_span: Span,
    pub annotation_span: Option<Span>,
    /// Span of the default value expression.
    pub default_span: Option<Span>,
}

/// A `def` (sync or async), possibly a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    /// `Class.method` for methods, the bare name otherwise.
    pub qualified_name: String,
    /// Directly enclosing class, if this is a method.
    pub enclosing_class: Option<String>,
    pub span: Span,
    pub params: Vec<ParamInfo>,
    /// Decorator expressions without the `@`.
    pub decorators: Vec<String>,
}

impl FunctionInfo {
    /// `true` for `@staticmethod` functions.
    pub fn is_static(&self) -> bool {
        self.decorators.iter().any(|d| d == "staticmethod")
    }

    /// Name of the implicit receiver (`self`/`cls`), if the function has one.
    pub fn receiver(&self) -> Option<&str> {
        if self.enclosing_class.is_none() || self.is_static() {
            return None;
        }
        self.params
            .first()
            .filter(|p| p.kind == ParamKind::Regular)
            .map(|p| p.name.as_str())
    }
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub span: Span,
    pub name_span: Span,
    /// Base expressions as written (keyword arguments such as
    /// `metaclass=` excluded).
    pub bases: Vec<String>,
    /// The `( ... )` argument list, parentheses included.
    pub bases_span: Option<Span>,
    /// End of the last positional base expression.
    pub last_base_end: Option<usize>,
    /// Start of the first keyword argument (`metaclass=...`).
    pub first_keyword_start: Option<usize>,
    /// Methods defined directly in the body.
    pub methods: BTreeSet<String>,
    /// Class-level names plus `self.<name>` assignments in methods.
    pub fields: BTreeSet<String>,
}

/// `name` or `name as alias` inside an import statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    pub fn new(name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            name: name.into(),
            alias,
        }
    }

    /// The name this import binds in the importing module.
    pub fn binding(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }

    pub fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {alias}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A module-level `import` / `from ... import` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    /// Source module for `from` imports (may start with dots); empty for
    /// bare `import` statements.
    pub module: String,
    pub names: Vec<ImportedName>,
    pub wildcard: bool,
    /// Statement span.
    pub span: Span,
    /// 1-indexed line.
    pub line: u32,
}

impl ImportStmt {
    pub fn is_from(&self) -> bool {
        !self.module.is_empty()
    }
}

/// Structural view of one Python file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceModel {
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<ImportStmt>,
    /// Module-level `def` names.
    pub top_level_functions: BTreeSet<String>,
    /// Byte offset where new import lines go: after the module docstring
    /// and any `__future__` imports.
    pub import_anchor: usize,
    /// `true` when the anchor sits at end of file without a trailing newline.
    pub anchor_needs_newline: bool,
    /// Tree-sitter reported syntax errors.
    pub has_errors: bool,
}

impl SourceModel {
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// `from <module> import ...` statements of one module.
    pub fn imports_from<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a ImportStmt> {
        self.imports.iter().filter(move |i| i.module == module)
    }

    /// Names bound at module level by classes, functions and imports.
    pub fn local_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.classes.iter().map(|c| c.name.clone()).collect();
        names.extend(self.top_level_functions.iter().cloned());
        for import in &self.imports {
            names.extend(import.names.iter().map(|n| n.binding().to_string()));
        }
        names
    }

    /// Module an imported binding comes from, with the original name.
    pub fn import_source(&self, binding: &str) -> Option<(&str, &str)> {
        self.imports.iter().filter(|i| i.is_from()).find_map(|i| {
            i.names
                .iter()
                .find(|n| n.binding() == binding)
                .map(|n| (i.module.as_str(), n.name.as_str()))
        })
    }
}

/// Errors from parsing, editing and import analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnatomistError {
    /// Tree-sitter parsing failed.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// I/O error (file read/write).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Two edits touch the same bytes.
    #[error("overlapping edits at bytes {first:?} and {second:?}")]
    OverlappingEdits { first: Span, second: Span },

    /// Intra-project imports form a cycle; files cannot be ordered.
    #[error("import cycle between: {}", files.join(", "))]
    ImportCycle { files: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imported_name_binding() {
        assert_eq!(ImportedName::new("os.path", None).binding(), "os");
        assert_eq!(
            ImportedName::new("Message1", Some("Message1_".into())).binding(),
            "Message1_"
        );
        assert_eq!(
            ImportedName::new("Message1", Some("M".into())).render(),
            "Message1 as M"
        );
    }

    #[test]
    fn test_receiver_detection() {
        let param = |name: &str| ParamInfo {
            name: name.into(),
            kind: ParamKind::Regular,
            annotation: None,
            name_span: Span::new(0, 0),
            annotation_span: None,
            default_span: None,
        };
        let mut f = FunctionInfo {
            name: "run".into(),
            qualified_name: "Job.run".into(),
            enclosing_class: Some("Job".into()),
            span: Span::new(0, 0),
            params: vec![param("self"), param("data")],
            decorators: vec![],
        };
        assert_eq!(f.receiver(), Some("self"));
        f.decorators.push("staticmethod".into());
        assert_eq!(f.receiver(), None);
    }
}
