//! Annotation expressions and placeholder markers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a placeholder, e.g. `Content1` or `Words3Subscript`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaceholderId(pub String);

impl PlaceholderId {
    /// Builds the id of a parameter or field placeholder from its stem and suffix.
    pub fn numbered(stem: &str, number: u32) -> Self {
        PlaceholderId(format!("{stem}{number}"))
    }

    /// Element placeholder for a one-parameter generic.
    pub fn subscript(&self) -> Self {
        PlaceholderId(format!("{}Subscript", self.0))
    }

    /// Key placeholder for a two-parameter generic.
    pub fn first_subscript(&self) -> Self {
        PlaceholderId(format!("{}FirstSubscript", self.0))
    }

    /// Value placeholder for a two-parameter generic.
    pub fn second_subscript(&self) -> Self {
        PlaceholderId(format!("{}SecondSubscript", self.0))
    }

    /// The inert marker text inserted into probes: `Literal['<id>']`.
    pub fn literal(&self) -> String {
        format!("Literal['{}']", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolved placeholder lookup used while rendering.
pub trait Bindings {
    fn lookup(&self, id: &PlaceholderId) -> Option<&TypeExpr>;
}

impl Bindings for BTreeMap<PlaceholderId, TypeExpr> {
    fn lookup(&self, id: &PlaceholderId) -> Option<&TypeExpr> {
        self.get(id)
    }
}

/// Renders every placeholder as its inert marker.
pub struct Unbound;

impl Bindings for Unbound {
    fn lookup(&self, _id: &PlaceholderId) -> Option<&TypeExpr> {
        None
    }
}

/// An annotation expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeExpr {
    /// `Any`.
    Any,
    /// `None`, the inert substitution used by the baseline diff.
    NoneType,
    /// A plain name or any annotation text kept verbatim.
    Named(String),
    /// `base[arg, ...]`.
    Generic { base: String, args: Vec<TypeExpr> },
    /// `Union[a, b, ...]`; never nested and never a singleton.
    Union(Vec<TypeExpr>),
    /// A placeholder that may still be unresolved.
    Placeholder(PlaceholderId),
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into())
    }

    /// Builds a union, flattening nested unions, dropping duplicates while
    /// keeping the first occurrence, and collapsing singletons.
    ///
    /// An empty member list yields `Any`.
    pub fn union(members: impl IntoIterator<Item = TypeExpr>) -> Self {
        let mut flat: Vec<TypeExpr> = Vec::new();
        for member in members {
            let parts = match member {
                TypeExpr::Union(inner) => inner,
                other => vec![other],
            };
            for part in parts {
                if !flat.contains(&part) {
                    flat.push(part);
                }
            }
        }
        match flat.len() {
            0 => TypeExpr::Any,
            1 => flat.remove(0),
            _ => TypeExpr::Union(flat),
        }
    }

    /// Union members, or the expression itself when it is not a union.
    pub fn members(&self) -> Vec<TypeExpr> {
        match self {
            TypeExpr::Union(members) => members.clone(),
            other => vec![other.clone()],
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, TypeExpr::Any)
    }

    /// Renders the expression, resolving bound placeholders recursively and
    /// emitting `Literal['<id>']` for unbound ones.
    pub fn render(&self, bindings: &dyn Bindings) -> String {
        match self {
            TypeExpr::Any => "Any".to_string(),
            TypeExpr::NoneType => "None".to_string(),
            TypeExpr::Named(name) => name.clone(),
            TypeExpr::Generic { base, args } => {
                let args: Vec<String> = args.iter().map(|a| a.render(bindings)).collect();
                format!("{base}[{}]", args.join(", "))
            }
            TypeExpr::Union(members) => {
                let members: Vec<String> = members.iter().map(|m| m.render(bindings)).collect();
                format!("Union[{}]", members.join(", "))
            }
            TypeExpr::Placeholder(id) => match bindings.lookup(id) {
                Some(bound) => bound.render(bindings),
                None => id.literal(),
            },
        }
    }

    /// Replaces bound placeholders with their values, recursively.
    pub fn substitute(&self, bindings: &dyn Bindings) -> TypeExpr {
        match self {
            TypeExpr::Placeholder(id) => match bindings.lookup(id) {
                Some(bound) => bound.substitute(bindings),
                None => self.clone(),
            },
            TypeExpr::Generic { base, args } => TypeExpr::Generic {
                base: base.clone(),
                args: args.iter().map(|a| a.substitute(bindings)).collect(),
            },
            TypeExpr::Union(members) => {
                TypeExpr::union(members.iter().map(|m| m.substitute(bindings)))
            }
            other => other.clone(),
        }
    }

    /// Placeholders still present in the expression.
    pub fn placeholders(&self, out: &mut BTreeSet<PlaceholderId>) {
        match self {
            TypeExpr::Placeholder(id) => {
                out.insert(id.clone());
            }
            TypeExpr::Generic { args, .. } => args.iter().for_each(|a| a.placeholders(out)),
            TypeExpr::Union(members) => members.iter().for_each(|m| m.placeholders(out)),
            _ => {}
        }
    }

    /// Every plain identifier the rendered expression refers to (generic
    /// bases included; `Any`, `None` and `Union` excluded).
    pub fn referenced_names(&self, out: &mut BTreeSet<String>) {
        match self {
            TypeExpr::Named(name) => {
                if is_identifier(name) {
                    out.insert(name.clone());
                } else {
                    TypeExpr::parse(name).referenced_names_parsed(out);
                }
            }
            TypeExpr::Generic { base, args } => {
                out.insert(base.clone());
                args.iter().for_each(|a| a.referenced_names(out));
            }
            TypeExpr::Union(members) => members.iter().for_each(|m| m.referenced_names(out)),
            _ => {}
        }
    }

    fn referenced_names_parsed(&self, out: &mut BTreeSet<String>) {
        match self {
            TypeExpr::Named(name) if is_identifier(name) => {
                out.insert(name.clone());
            }
            TypeExpr::Named(_) => {}
            other => other.referenced_names(out),
        }
    }

    /// Renames referenced identifiers according to `map`.
    pub fn rename(&self, map: &BTreeMap<String, String>) -> TypeExpr {
        match self {
            TypeExpr::Named(name) => match map.get(name) {
                Some(new) => TypeExpr::Named(new.clone()),
                None if is_identifier(name) => self.clone(),
                None => {
                    let parsed = TypeExpr::parse(name);
                    if matches!(parsed, TypeExpr::Named(_)) {
                        self.clone()
                    } else {
                        parsed.rename(map)
                    }
                }
            },
            TypeExpr::Generic { base, args } => TypeExpr::Generic {
                base: map.get(base).cloned().unwrap_or_else(|| base.clone()),
                args: args.iter().map(|a| a.rename(map)).collect(),
            },
            TypeExpr::Union(members) => TypeExpr::union(members.iter().map(|m| m.rename(map))),
            other => other.clone(),
        }
    }

    /// Parses annotation text into an expression.
    ///
    /// Recognises `Any`, `None`, `Union[...]`, `Optional[...]`, top-level
    /// `a | b`, `base[args]` and `Literal['<id>']` placeholder markers. Text it
    /// cannot take apart is kept verbatim as [`TypeExpr::Named`].
    pub fn parse(text: &str) -> TypeExpr {
        let text = text.trim();
        let pipe_parts = split_top_level(text, '|');
        if pipe_parts.len() > 1 {
            return TypeExpr::union(pipe_parts.iter().map(|p| TypeExpr::parse(p)));
        }
        match text {
            "Any" | "typing.Any" => return TypeExpr::Any,
            "None" => return TypeExpr::NoneType,
            _ => {}
        }
        let Some(open) = text.find('[') else {
            return TypeExpr::Named(text.to_string());
        };
        if !text.ends_with(']') {
            return TypeExpr::Named(text.to_string());
        }
        let base = text[..open].trim();
        let inner = &text[open + 1..text.len() - 1];
        if !is_dotted_identifier(base) {
            return TypeExpr::Named(text.to_string());
        }
        let args: Vec<TypeExpr> = split_top_level(inner, ',')
            .iter()
            .filter(|a| !a.trim().is_empty())
            .map(|a| TypeExpr::parse(a))
            .collect();
        match base {
            "Union" | "typing.Union" => TypeExpr::union(args),
            "Optional" | "typing.Optional" => {
                TypeExpr::union(args.into_iter().chain([TypeExpr::NoneType]))
            }
            "Literal" => match parse_placeholder_literal(inner) {
                Some(id) => TypeExpr::Placeholder(id),
                None => TypeExpr::Named(text.to_string()),
            },
            _ if args.is_empty() => TypeExpr::Named(text.to_string()),
            _ => TypeExpr::Generic {
                base: base.to_string(),
                args,
            },
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Unbound))
    }
}

fn parse_placeholder_literal(inner: &str) -> Option<PlaceholderId> {
    let inner = inner.trim();
    let quoted = inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
    if is_identifier(quoted) && quoted.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        Some(PlaceholderId(quoted.to_string()))
    } else {
        None
    }
}

/// `true` for a Python identifier.
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

fn is_dotted_identifier(text: &str) -> bool {
    !text.is_empty() && text.split('.').all(is_identifier)
}

/// Splits `text` on `sep` occurrences outside brackets and quotes.
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for ch in text.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
                continue;
            }
            None => {}
        }
        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' | '(' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            c if c == sep && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_union_forms() {
        let expected = TypeExpr::Union(vec![TypeExpr::named("int"), TypeExpr::named("str")]);
        assert_eq!(TypeExpr::parse("Union[int, str]"), expected);
        assert_eq!(TypeExpr::parse("int | str"), expected);
        assert_eq!(TypeExpr::parse("Union[int]"), TypeExpr::named("int"));
    }

    #[test]
    fn test_parse_generic_and_placeholder() {
        assert_eq!(
            TypeExpr::parse("dict[str, list[int]]"),
            TypeExpr::Generic {
                base: "dict".into(),
                args: vec![
                    TypeExpr::named("str"),
                    TypeExpr::Generic {
                        base: "list".into(),
                        args: vec![TypeExpr::named("int")]
                    }
                ]
            }
        );
        assert_eq!(
            TypeExpr::parse("Literal['Content1']"),
            TypeExpr::Placeholder(PlaceholderId("Content1".into()))
        );
        assert_eq!(
            TypeExpr::parse("Literal['r', 'w']"),
            TypeExpr::named("Literal['r', 'w']")
        );
    }

    #[test]
    fn test_render_resolves_bindings() {
        let id = PlaceholderId("Words1".into());
        let sub = id.subscript();
        let expr = TypeExpr::Generic {
            base: "Sequence".into(),
            args: vec![TypeExpr::Placeholder(sub.clone())],
        };
        assert_eq!(expr.to_string(), "Sequence[Literal['Words1Subscript']]");

        let mut bindings = BTreeMap::new();
        bindings.insert(sub, TypeExpr::named("str"));
        assert_eq!(expr.render(&bindings), "Sequence[str]");
    }

    #[test]
    fn test_union_flattens_and_dedups() {
        let u = TypeExpr::union([
            TypeExpr::named("int"),
            TypeExpr::Union(vec![TypeExpr::named("str"), TypeExpr::named("int")]),
        ]);
        assert_eq!(u.to_string(), "Union[int, str]");
        assert_eq!(TypeExpr::union(Vec::new()), TypeExpr::Any);
    }

    #[test]
    fn test_rename_reaches_verbatim_text() {
        let mut map = BTreeMap::new();
        map.insert("Content2".to_string(), "Content1".to_string());
        let expr = TypeExpr::named("list[Content2]");
        assert_eq!(expr.rename(&map).to_string(), "list[Content1]");
    }

    #[test]
    fn test_referenced_names() {
        let mut names = BTreeSet::new();
        TypeExpr::parse("Union[Mapping[str, Content1], None]").referenced_names(&mut names);
        let names: Vec<_> = names.into_iter().collect();
        assert_eq!(names, vec!["Content1", "Mapping", "str"]);
    }
}
