//! Declarative diagnostic pattern table.
//!
//! Every pattern is matched against a diagnostic message with the error code
//! already stripped. Patterns are compiled once and shared by all workers.

use regex::Regex;
use std::sync::OnceLock;

/// What a capability pattern reveals about the probed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapabilityRule {
    /// A fixed member.
    Member(&'static str),
    /// Like `Member`, unless the captured type is a placeholder literal.
    MemberUnlessLiteral(&'static str),
    /// The captured group is a binary operator symbol.
    BinaryOperator,
    /// The captured group is a unary operator symbol.
    UnaryOperator,
    /// The captured group is an attribute name.
    Attribute,
}

const CAPABILITY_PATTERNS: &[(&str, CapabilityRule)] = &[
    (
        r#"^Unsupported target for indexed assignment \("([^"]+)"\)"#,
        CapabilityRule::Member("__setitem__"),
    ),
    (
        r#"^Value of type "([^"]+)" is not indexable"#,
        CapabilityRule::Member("__getitem__"),
    ),
    (
        r#"has incompatible type "([^"]+)"; expected "Sized"$"#,
        CapabilityRule::Member("__len__"),
    ),
    (
        r#"^No overload variant of "iter" matches argument type "([^"]+)""#,
        CapabilityRule::Member("__iter__"),
    ),
    (
        r#"^No overload variant of "next" matches argument type "([^"]+)""#,
        CapabilityRule::MemberUnlessLiteral("__next__"),
    ),
    (
        r#"^"None" not callable"#,
        CapabilityRule::Member("__call__"),
    ),
    (
        r#"^Unsupported right operand type for in \("None"\)"#,
        CapabilityRule::Member("__contains__"),
    ),
    (
        r#"^Unsupported left operand type for (\S+) \("None"\)"#,
        CapabilityRule::BinaryOperator,
    ),
    (
        r#"^Unsupported operand types for (\S+) \("None" and "[^"]+"\)"#,
        CapabilityRule::BinaryOperator,
    ),
    (
        r#"^Unsupported operand type for unary (\S+) \("None"\)"#,
        CapabilityRule::UnaryOperator,
    ),
    (
        r#"^"None" has no attribute "(\w+)""#,
        CapabilityRule::Attribute,
    ),
];

/// Patterns whose single group names a type the value must be compatible
/// with.
const COMPATIBLE_PATTERNS: &[&str] = &[
    r#"has incompatible type "None"; expected "(.+)"$"#,
    r#"^Incompatible types in assignment \(expression has type "None", variable has type "(.+)"\)$"#,
    r#"^Incompatible return value type \(got "None", expected "(.+)"\)$"#,
    r#"^Non-overlapping equality check \(left operand type: "None", right operand type: "(.+)"\)$"#,
    r#"^Non-overlapping equality check \(left operand type: "(.+)", right operand type: "None"\)$"#,
    r#"^Invalid index type "None" for "[^"]+"; expected type "(.+)"$"#,
];

/// Calls whose overloads only accept a known group of types. `"None"` may
/// sit at any argument position.
const OVERLOAD_GROUPS: &[(&str, &[&str])] = &[
    (
        r#"^No overload variant of "open" matches argument types? (?:"[^"]+", )*"None"(?:, "[^"]+")*"#,
        &["str", "bytes", "int"],
    ),
    (
        r#"^No overload variant of "pow" matches argument types? (?:"[^"]+", )*"None"(?:, "[^"]+")*"#,
        &["int", "float", "complex"],
    ),
    (
        r#"^No overload variant of "range" matches argument types? (?:"[^"]+", )*"None"(?:, "[^"]+")*"#,
        &["int", "bool"],
    ),
];

const LITERAL_EXPECTATION: &str = r#"has incompatible type "None"; expected "(Literal\[.+\])"$"#;

const TOO_MANY_ARGUMENTS: &str = r#"^Too many (?:positional )?arguments for "([^"]+)"(?: of "([^"]+)")?"#;

const MISSING_POSITIONAL: &str =
    r#"^Missing positional argument "([^"]+)" in call to "([^"]+)"(?: of "([^"]+)")?"#;

const UNEXPECTED_KEYWORD: &str =
    r#"^Unexpected keyword argument "([^"]+)" for "([^"]+)"(?: of "([^"]+)")?"#;

const ARGUMENT_TYPE: &str =
    r#"^Argument (\d+|"[^"]+") to "([^"]+)"(?: of "([^"]+)")? has incompatible type "(.+)"; expected "None"$"#;

const NOT_CALLABLE: &str = r#"^"Literal\['([A-Za-z_][A-Za-z0-9_]*)'\]\??" not callable"#;

/// Generic signs of a candidate that does not fit its use sites.
const INCOMPATIBILITY_MARKERS: &[&str] = &[" has incompatible type ", "is not indexable"];

pub(crate) struct PatternTable {
    pub capability: Vec<(Regex, CapabilityRule)>,
    pub compatible: Vec<Regex>,
    pub overload_groups: Vec<(Regex, &'static [&'static str])>,
    pub literal: Regex,
    pub too_many: Regex,
    pub missing_positional: Regex,
    pub unexpected_keyword: Regex,
    pub argument_type: Regex,
    pub not_callable: Regex,
    pub incompatibility_markers: &'static [&'static str],
}

static TABLE: OnceLock<PatternTable> = OnceLock::new();

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("diagnostic pattern is a bug in the hardcoded table")
}

pub(crate) fn table() -> &'static PatternTable {
    TABLE.get_or_init(|| PatternTable {
        capability: CAPABILITY_PATTERNS
            .iter()
            .map(|(p, rule)| (compile(p), *rule))
            .collect(),
        compatible: COMPATIBLE_PATTERNS.iter().map(|p| compile(p)).collect(),
        overload_groups: OVERLOAD_GROUPS
            .iter()
            .map(|(p, group)| (compile(p), *group))
            .collect(),
        literal: compile(LITERAL_EXPECTATION),
        too_many: compile(TOO_MANY_ARGUMENTS),
        missing_positional: compile(MISSING_POSITIONAL),
        unexpected_keyword: compile(UNEXPECTED_KEYWORD),
        argument_type: compile(ARGUMENT_TYPE),
        not_callable: compile(NOT_CALLABLE),
        incompatibility_markers: INCOMPATIBILITY_MARKERS,
    })
}

/// Dunder behind a binary operator symbol.
pub(crate) fn binary_operator_member(op: &str) -> Option<&'static str> {
    Some(match op {
        "+" => "__add__",
        "-" => "__sub__",
        "*" => "__mul__",
        "/" => "__truediv__",
        "//" => "__floordiv__",
        "%" => "__mod__",
        "**" => "__pow__",
        "@" => "__matmul__",
        "&" => "__and__",
        "|" => "__or__",
        "^" => "__xor__",
        "<<" => "__lshift__",
        ">>" => "__rshift__",
        "<" => "__lt__",
        "<=" => "__le__",
        ">" => "__gt__",
        ">=" => "__ge__",
        _ => return None,
    })
}

/// Dunder behind a unary operator symbol.
pub(crate) fn unary_operator_member(op: &str) -> Option<&'static str> {
    Some(match op {
        "-" => "__neg__",
        "+" => "__pos__",
        "~" => "__invert__",
        _ => return None,
    })
}
