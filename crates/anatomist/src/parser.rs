//! Tree-sitter front end building a [`SourceModel`].

use crate::imports::collect_imports;
use crate::{
    AnatomistError, ClassInfo, FunctionInfo, ParamInfo, ParamKind, SourceModel, Span,
};
use std::collections::BTreeSet;
use tree_sitter::{Node, Parser, Tree};

/// The Python parser host.
///
/// # Example
/// ```
/// use anatomist::ParserHost;
///
/// let mut host = ParserHost::new().unwrap();
/// let model = host.model("def greet(name):\n    return name.upper()\n").unwrap();
/// assert_eq!(model.functions[0].params[0].name, "name");
/// ```
pub struct ParserHost {
    parser: Parser,
}

impl ParserHost {
    /// Creates a new parser host with the Python grammar loaded.
    ///
    /// # Errors
    /// Returns `AnatomistError::ParseFailure` if the tree-sitter parser
    /// fails to initialize with the Python language.
    pub fn new() -> Result<Self, AnatomistError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| {
                AnatomistError::ParseFailure(format!("Failed to load Python grammar: {}", e))
            })?;
        Ok(Self { parser })
    }

    /// Parses `source` into a concrete syntax tree.
    pub fn parse_tree(&mut self, source: &str) -> Result<Tree, AnatomistError> {
        self.parser
            .parse(source, None)
            .ok_or_else(|| AnatomistError::ParseFailure("tree-sitter returned no tree".into()))
    }

    /// Parses `source` and extracts its structural model.
    pub fn model(&mut self, source: &str) -> Result<SourceModel, AnatomistError> {
        let tree = self.parse_tree(source)?;
        Ok(build_model(source, tree.root_node()))
    }
}

/// One-shot convenience wrapper around [`ParserHost::model`].
pub fn parse_source(source: &str) -> Result<SourceModel, AnatomistError> {
    ParserHost::new()?.model(source)
}

pub(crate) fn span(node: Node) -> Span {
    Span::new(node.start_byte(), node.end_byte())
}

pub(crate) fn text<'s>(node: Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub(crate) fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn build_model(source: &str, root: Node) -> SourceModel {
    let mut walker = Walker {
        source,
        model: SourceModel {
            has_errors: root.has_error(),
            imports: collect_imports(source, root),
            ..SourceModel::default()
        },
    };
    for child in named_children(root) {
        match child.kind() {
            "function_definition" => {
                walker.model.top_level_functions.insert(name_of(child, source));
            }
            "decorated_definition" => {
                if let Some(def) = child
                    .child_by_field_name("definition")
                    .filter(|d| d.kind() == "function_definition")
                {
                    walker.model.top_level_functions.insert(name_of(def, source));
                }
            }
            _ => {}
        }
    }
    walker.visit(root, None, Vec::new());
    let (anchor, needs_newline) = import_anchor(source, root);
    walker.model.import_anchor = anchor;
    walker.model.anchor_needs_newline = needs_newline;
    walker.model
}

fn name_of(node: Node, source: &str) -> String {
    node.child_by_field_name("name")
        .map(|n| text(n, source).to_string())
        .unwrap_or_default()
}

struct Walker<'s> {
    source: &'s str,
    model: SourceModel,
}

impl<'s> Walker<'s> {
    fn visit(&mut self, node: Node, class: Option<&str>, decorators: Vec<String>) {
        match node.kind() {
            "decorated_definition" => {
                let decorators = named_children(node)
                    .into_iter()
                    .filter(|c| c.kind() == "decorator")
                    .map(|d| text(d, self.source).trim_start_matches('@').trim().to_string())
                    .collect();
                if let Some(def) = node.child_by_field_name("definition") {
                    self.visit(def, class, decorators);
                }
            }
            "function_definition" => {
                self.function(node, class, decorators);
                if let Some(body) = node.child_by_field_name("body") {
                    for child in named_children(body) {
                        self.visit(child, None, Vec::new());
                    }
                }
            }
            "class_definition" => {
                let name = name_of(node, self.source);
                self.class(node, &name);
                if let Some(body) = node.child_by_field_name("body") {
                    for child in named_children(body) {
                        self.visit(child, Some(&name), Vec::new());
                    }
                }
            }
            _ => {
                for child in named_children(node) {
                    self.visit(child, class, Vec::new());
                }
            }
        }
    }

    fn function(&mut self, node: Node, class: Option<&str>, decorators: Vec<String>) {
        let name = name_of(node, self.source);
        let qualified_name = match class {
            Some(class) => format!("{class}.{name}"),
            None => name.clone(),
        };
        self.model.functions.push(FunctionInfo {
            name,
            qualified_name,
            enclosing_class: class.map(str::to_string),
            span: span(node),
            params: parameters(node, self.source),
            decorators,
        });
    }

    fn class(&mut self, node: Node, name: &str) {
        let source = self.source;
        let mut bases = Vec::new();
        let mut bases_span = None;
        let mut last_base_end = None;
        let mut first_keyword_start = None;
        if let Some(list) = node.child_by_field_name("superclasses") {
            bases_span = Some(span(list));
            for arg in named_children(list) {
                match arg.kind() {
                    "comment" => {}
                    "keyword_argument" | "dictionary_splat" => {
                        first_keyword_start.get_or_insert(arg.start_byte());
                    }
                    _ => {
                        bases.push(text(arg, source).to_string());
                        last_base_end = Some(arg.end_byte());
                    }
                }
            }
        }

        let mut methods = BTreeSet::new();
        let mut fields = BTreeSet::new();
        if let Some(body) = node.child_by_field_name("body") {
            for stmt in named_children(body) {
                let def = match stmt.kind() {
                    "decorated_definition" => stmt.child_by_field_name("definition"),
                    _ => Some(stmt),
                };
                let Some(def) = def else { continue };
                match def.kind() {
                    "function_definition" => {
                        methods.insert(name_of(def, source));
                        let params = parameters(def, source);
                        if let Some(receiver) = params.first().filter(|p| p.kind == ParamKind::Regular) {
                            if let Some(method_body) = def.child_by_field_name("body") {
                                collect_receiver_fields(method_body, &receiver.name, source, &mut fields);
                            }
                        }
                    }
                    "expression_statement" => {
                        for expr in named_children(def) {
                            if expr.kind() == "assignment" {
                                if let Some(left) = expr
                                    .child_by_field_name("left")
                                    .filter(|l| l.kind() == "identifier")
                                {
                                    fields.insert(text(left, source).to_string());
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        self.model.classes.push(ClassInfo {
            name: name.to_string(),
            span: span(node),
            name_span: node.child_by_field_name("name").map(span).unwrap_or(span(node)),
            bases,
            bases_span,
            last_base_end,
            first_keyword_start,
            methods,
            fields,
        });
    }
}

/// `self.<name> = ...` (plain, annotated or augmented) anywhere in a body.
fn collect_receiver_fields(node: Node, receiver: &str, source: &str, out: &mut BTreeSet<String>) {
    if matches!(node.kind(), "assignment" | "augmented_assignment") {
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "attribute" {
                let object = left.child_by_field_name("object");
                let attribute = left.child_by_field_name("attribute");
                if let (Some(object), Some(attribute)) = (object, attribute) {
                    if text(object, source) == receiver {
                        out.insert(text(attribute, source).to_string());
                    }
                }
            }
        }
    }
    for child in named_children(node) {
        collect_receiver_fields(child, receiver, source, out);
    }
}

/// Parameters of a `function_definition` node, in declaration order.
pub(crate) fn parameters(node: Node, source: &str) -> Vec<ParamInfo> {
    let Some(list) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    named_children(list)
        .into_iter()
        .filter_map(|child| parameter(child, source))
        .collect()
}

fn parameter(node: Node, source: &str) -> Option<ParamInfo> {
    let annotation = node.child_by_field_name("type");
    let default = node.child_by_field_name("value");
    let target = match node.kind() {
        "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => node,
        "default_parameter" | "typed_default_parameter" => node.child_by_field_name("name")?,
        "typed_parameter" => named_children(node)
            .into_iter()
            .find(|c| Some(*c) != annotation)?,
        _ => return None,
    };
    let (kind, name_node) = match target.kind() {
        "list_splat_pattern" => (ParamKind::ListSplat, named_children(target).into_iter().next()?),
        "dictionary_splat_pattern" => {
            (ParamKind::DictSplat, named_children(target).into_iter().next()?)
        }
        _ => (ParamKind::Regular, target),
    };
    Some(ParamInfo {
        name: text(name_node, source).to_string(),
        kind,
        annotation: annotation.map(|a| text(a, source).to_string()),
        name_span: span(target),
        annotation_span: annotation.map(span),
        default_span: default.map(span),
    })
}

/// Where new imports go: after leading comments, the module docstring and
/// `__future__` imports.
fn import_anchor(source: &str, root: Node) -> (usize, bool) {
    let mut anchor = 0;
    let mut seen_statement = false;
    for child in named_children(root) {
        let is_docstring = child.kind() == "expression_statement"
            && !seen_statement
            && named_children(child).len() == 1
            && named_children(child)[0].kind() == "string";
        match child.kind() {
            "comment" if !seen_statement => anchor = child.end_byte(),
            "future_import_statement" => {
                anchor = child.end_byte();
                seen_statement = true;
            }
            _ if is_docstring => {
                anchor = child.end_byte();
                seen_statement = true;
            }
            _ => break,
        }
    }
    if anchor == 0 {
        return (0, false);
    }
    match source[anchor..].find('\n') {
        Some(offset) => (anchor + offset + 1, false),
        None => (source.len(), true),
    }
}
