//! # Miner: Diagnostics -> Capabilities
//!
//! Reads type-checker diagnostics and turns them into facts about the
//! probed value:
//!
//! - **Capabilities** it must provide (`len(x)` -> `__len__`, `x.foo` ->
//!   field `foo`, ...), mined from the diagnostics a probe raises when the
//!   placeholder is rendered as `None` but not when it is rendered as `Any`.
//! - **Compatibility hints**: concrete types the value is passed where
//!   they are expected.
//! - **Validation verdicts** for a candidate annotation.
//! - **Call-shape facts** used to widen synthesized methods: surplus
//!   arguments, missing positionals, unexpected keywords and the argument
//!   types captured at call sites.
//!
//! All patterns live in one declarative table (see `patterns.rs`).

mod patterns;

use catalog::signatures;
use common::{Capability, TypeExpr};
use oracle::Diagnostic;
use patterns::{table, CapabilityRule};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Everything learned from one baseline diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinedShape {
    pub capabilities: BTreeSet<Capability>,
    /// Types the value is required to be compatible with.
    pub compatible: BTreeSet<String>,
    /// A `Literal[...]` type the value is expected to be.
    pub literal: Option<String>,
}

impl MinedShape {
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.compatible.is_empty() && self.literal.is_none()
    }

    /// Member names required by the mined capabilities.
    pub fn required_members(&self) -> BTreeSet<String> {
        self.capabilities
            .iter()
            .map(|c| c.member_name().to_string())
            .collect()
    }
}

/// A call site reference: `"m"` or `"m" of "Class"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CallTarget {
    pub method: String,
    pub class: Option<String>,
}

impl CallTarget {
    pub fn is(&self, method: &str, class: &str) -> bool {
        self.method == method && self.class.as_deref() == Some(class)
    }
}

/// Which argument a captured type belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArgumentSlot {
    /// 1-indexed positional argument.
    Position(usize),
    Keyword(String),
}

/// Stateless diagnostic interpreter over the shared pattern table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Miner;

impl Miner {
    pub fn new() -> Self {
        Miner
    }

    /// Mines the diagnostics that only appear under the inert substitution.
    pub fn mine(&self, diagnostics: &[Diagnostic]) -> MinedShape {
        let t = table();
        let mut shape = MinedShape::default();

        'diagnostics: for diagnostic in diagnostics {
            let message = diagnostic.message.as_str();

            if let Some(caps) = t.literal.captures(message) {
                shape.literal = Some(caps[1].to_string());
                continue;
            }

            for (pattern, rule) in &t.capability {
                let Some(caps) = pattern.captures(message) else {
                    continue;
                };
                let group = caps.get(1).map_or("", |g| g.as_str());
                if let Some(capability) = capability_for(*rule, group) {
                    trace!(%capability, message, "capability mined");
                    shape.capabilities.insert(capability);
                }
                continue 'diagnostics;
            }

            for (pattern, group) in &t.overload_groups {
                if pattern.is_match(message) {
                    shape.compatible.extend(group.iter().map(|s| s.to_string()));
                    continue 'diagnostics;
                }
            }

            for pattern in &t.compatible {
                if let Some(caps) = pattern.captures(message) {
                    for member in self.translate(&caps[1]).members() {
                        if !member.is_any() && member != TypeExpr::NoneType {
                            shape.compatible.insert(member.to_string());
                        }
                    }
                    continue 'diagnostics;
                }
            }
        }
        shape
    }

    /// `true` when a candidate annotation visibly contradicts its use sites.
    ///
    /// `new_diagnostics` must already exclude the baseline (the diagnostics
    /// the probe raises with the placeholder rendered as `Any`).
    pub fn rejects_candidate(&self, candidate: &str, new_diagnostics: &[Diagnostic]) -> bool {
        let t = table();
        let name = regex::escape(candidate);
        let no_overload = Regex::new(&format!(
            r#"^No overload variant of "[^"]+" of "{name}" matches argument"#
        ));
        let literal_operand = Regex::new(&format!(
            r#"^Unsupported operand types for \S+ \("{name}" and "Literal\['"#
        ));
        let (Ok(no_overload), Ok(literal_operand)) = (no_overload, literal_operand) else {
            return true;
        };

        new_diagnostics.iter().any(|d| {
            let message = d.message.as_str();
            no_overload.is_match(message)
                || t.incompatibility_markers.iter().any(|m| message.contains(m))
                || (message.starts_with("Unsupported operand types for ")
                    && !literal_operand.is_match(message))
        })
    }

    /// Methods reported as called with surplus positional arguments.
    pub fn too_many_arguments(&self, diagnostics: &[Diagnostic]) -> BTreeSet<CallTarget> {
        let t = table();
        diagnostics
            .iter()
            .filter_map(|d| t.too_many.captures(&d.message))
            .map(|caps| CallTarget {
                method: caps[1].to_string(),
                class: caps.get(2).map(|c| c.as_str().to_string()),
            })
            .collect()
    }

    /// `true` when some call to `method` of `class` omits `param`.
    pub fn missing_positional(
        &self,
        diagnostics: &[Diagnostic],
        param: &str,
        method: &str,
        class: &str,
    ) -> bool {
        let t = table();
        diagnostics.iter().any(|d| {
            t.missing_positional.captures(&d.message).is_some_and(|caps| {
                &caps[1] == param
                    && &caps[2] == method
                    && caps.get(3).map(|c| c.as_str()) == Some(class)
            })
        })
    }

    /// Unexpected keyword arguments per call target.
    pub fn unexpected_keywords(
        &self,
        diagnostics: &[Diagnostic],
    ) -> BTreeMap<CallTarget, BTreeSet<String>> {
        let t = table();
        let mut out: BTreeMap<CallTarget, BTreeSet<String>> = BTreeMap::new();
        for caps in diagnostics
            .iter()
            .filter_map(|d| t.unexpected_keyword.captures(&d.message))
        {
            let target = CallTarget {
                method: caps[2].to_string(),
                class: caps.get(3).map(|c| c.as_str().to_string()),
            };
            out.entry(target).or_default().insert(caps[1].to_string());
        }
        out
    }

    /// Types passed to an argument declared `None`, translated and merged
    /// into one expression (`Any` when nothing usable was captured).
    pub fn captured_argument_type(
        &self,
        diagnostics: &[Diagnostic],
        method: &str,
        class: &str,
        slot: &ArgumentSlot,
    ) -> TypeExpr {
        let t = table();
        let mut members = Vec::new();
        for caps in diagnostics
            .iter()
            .filter_map(|d| t.argument_type.captures(&d.message))
        {
            if &caps[2] != method || caps.get(3).map(|c| c.as_str()) != Some(class) {
                continue;
            }
            let matches_slot = match slot {
                ArgumentSlot::Position(n) => caps[1].parse::<usize>().ok() == Some(*n),
                ArgumentSlot::Keyword(k) => caps[1].trim_matches('"') == k,
            };
            if matches_slot {
                members.extend(self.translate(&caps[4]).members());
            }
        }
        let mut members: Vec<TypeExpr> = members
            .into_iter()
            .filter(|m| !m.is_any() && !matches!(m, TypeExpr::Placeholder(_)))
            .collect();
        members.sort();
        TypeExpr::union(members)
    }

    /// Placeholder ids reported as called although they are plain fields.
    pub fn not_callable_placeholders(&self, diagnostics: &[Diagnostic]) -> BTreeSet<String> {
        let t = table();
        diagnostics
            .iter()
            .filter_map(|d| t.not_callable.captures(&d.message))
            .map(|caps| caps[1].to_string())
            .collect()
    }

    /// Normalizes a type as printed by the checker into annotation form.
    ///
    /// Module prefixes of builtins are dropped, generics whose arguments are
    /// all `Any` lose their arguments, callable signatures become
    /// `Callable[..., Any]` and inferred-literal markers (`?`) disappear.
    pub fn translate(&self, printed: &str) -> TypeExpr {
        let printed = printed.trim();
        if printed.starts_with("def ") || printed == "overloaded function" {
            return TypeExpr::named("Callable[..., Any]");
        }
        let cleaned = printed.replace("builtins.", "").replace('?', "");
        simplify(TypeExpr::parse(&cleaned))
    }
}

fn simplify(expr: TypeExpr) -> TypeExpr {
    match expr {
        TypeExpr::Generic { base, args } => {
            let args: Vec<TypeExpr> = args.into_iter().map(simplify).collect();
            if args.iter().all(TypeExpr::is_any) {
                TypeExpr::Named(base)
            } else {
                TypeExpr::Generic { base, args }
            }
        }
        TypeExpr::Union(members) => TypeExpr::union(members.into_iter().map(simplify)),
        TypeExpr::Named(name) if name == "Never" || name == "<nothing>" => TypeExpr::Any,
        other => other,
    }
}

fn capability_for(rule: CapabilityRule, group: &str) -> Option<Capability> {
    let member = match rule {
        CapabilityRule::Member(member) => member,
        CapabilityRule::MemberUnlessLiteral(member) => {
            if group.starts_with("Literal[") {
                return None;
            }
            member
        }
        CapabilityRule::BinaryOperator => patterns::binary_operator_member(group)?,
        CapabilityRule::UnaryOperator => patterns::unary_operator_member(group)?,
        CapabilityRule::Attribute => group,
    };
    if signatures::is_known_dunder(member) {
        Some(Capability::from_member(member, signatures::stub_arity(member)))
    } else {
        Some(Capability::from_member(member, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn diags(messages: &[&str]) -> Vec<Diagnostic> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| Diagnostic::error(i as u32 + 1, *m))
            .collect()
    }

    #[test]
    fn test_mine_sized_and_indexable() {
        let shape = Miner.mine(&diags(&[
            r#"Argument 1 to "len" has incompatible type "None"; expected "Sized""#,
            r#"Value of type "None" is not indexable"#,
        ]));
        let expected: BTreeSet<Capability> = [Capability::Sized, Capability::Indexable].into();
        assert_eq!(shape.capabilities, expected);
        assert!(shape.compatible.is_empty());
        assert_eq!(
            shape.required_members(),
            ["__getitem__".to_string(), "__len__".to_string()].into()
        );
    }

    #[test]
    fn test_mine_attributes_and_dunders() {
        let shape = Miner.mine(&diags(&[
            r#""None" has no attribute "content""#,
            r#""None" has no attribute "__enter__""#,
            r#""None" has no attribute "__iter__" (not iterable)"#,
            r#"Unsupported left operand type for + ("None")"#,
            r#""None" not callable"#,
        ]));
        let names: Vec<String> = shape.capabilities.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            names,
            vec!["method:__add__/1", "method:__enter__/0", "field:content", "__call__", "__iter__"]
        );
    }

    #[test]
    fn test_next_on_placeholder_literal_is_ignored() {
        let shape = Miner.mine(&diags(&[
            r#"No overload variant of "next" matches argument type "Literal['Items1']""#,
        ]));
        assert!(shape.capabilities.is_empty());
    }

    #[test]
    fn test_mine_compatibility_hints() {
        let shape = Miner.mine(&diags(&[
            r#"Argument 1 to "f" has incompatible type "None"; expected "Union[int, str]""#,
            r#"No overload variant of "range" matches argument type "None""#,
        ]));
        let expected: BTreeSet<String> =
            ["bool", "int", "str"].iter().map(|s| s.to_string()).collect();
        assert_eq!(shape.compatible, expected);
        assert!(shape.capabilities.is_empty());
    }

    #[test]
    fn test_overload_hints_at_later_positions() {
        let range = Miner.mine(&diags(&[
            r#"No overload variant of "range" matches argument types "int", "None""#,
        ]));
        assert_eq!(
            range.compatible,
            BTreeSet::from(["bool".to_string(), "int".to_string()])
        );

        let stepped = Miner.mine(&diags(&[
            r#"No overload variant of "range" matches argument types "int", "int", "None""#,
        ]));
        assert_eq!(stepped.compatible, range.compatible);

        let pow = Miner.mine(&diags(&[
            r#"No overload variant of "pow" matches argument types "float", "None""#,
        ]));
        assert!(pow.compatible.contains("complex"));

        let open = Miner.mine(&diags(&[
            r#"No overload variant of "open" matches argument types "None", "str""#,
        ]));
        assert!(open.compatible.contains("bytes"));

        let unrelated = Miner.mine(&diags(&[
            r#"No overload variant of "range" matches argument types "int", "str""#,
        ]));
        assert!(unrelated.is_empty());
    }

    #[test]
    fn test_literal_pass_through() {
        let shape = Miner.mine(&diags(&[
            r#"Argument 2 to "open" has incompatible type "None"; expected "Literal['r', 'w']""#,
        ]));
        assert_eq!(shape.literal.as_deref(), Some("Literal['r', 'w']"));
    }

    #[test]
    fn test_rejects_candidate() {
        let miner = Miner;
        assert!(miner.rejects_candidate(
            "Mapping",
            &diags(&[r#"Argument 1 to "f" has incompatible type "Mapping[Any, Any]"; expected "int""#])
        ));
        assert!(miner.rejects_candidate(
            "Sized",
            &diags(&[r#"No overload variant of "__getitem__" of "Sized" matches argument type "int""#])
        ));
        assert!(!miner.rejects_candidate(
            "Sized",
            &diags(&[r#"Unsupported operand types for + ("Sized" and "Literal['Other1']")"#])
        ));
        assert!(miner.rejects_candidate(
            "Sized",
            &diags(&[r#"Unsupported operand types for + ("Sized" and "int")"#])
        ));
        assert!(!miner.rejects_candidate("Sized", &[]));
    }

    #[test]
    fn test_call_shape_helpers() {
        let d = diags(&[
            r#"Too many arguments for "send" of "Channel1""#,
            r#"Missing positional argument "arg1" in call to "send" of "Channel1""#,
            r#"Unexpected keyword argument "timeout" for "send" of "Channel1""#,
            r#"Argument 2 to "send" of "Channel1" has incompatible type "str"; expected "None""#,
            r#"Argument 2 to "send" of "Channel1" has incompatible type "list[Any]"; expected "None""#,
            r#"Argument "timeout" to "send" of "Channel1" has incompatible type "float"; expected "None""#,
        ]);
        let miner = Miner;
        let too_many = miner.too_many_arguments(&d);
        assert!(too_many.iter().any(|t| t.is("send", "Channel1")));
        assert!(miner.missing_positional(&d, "arg1", "send", "Channel1"));
        assert!(!miner.missing_positional(&d, "arg0", "send", "Channel1"));

        let kws = miner.unexpected_keywords(&d);
        assert_eq!(kws.len(), 1);

        let second = miner.captured_argument_type(&d, "send", "Channel1", &ArgumentSlot::Position(2));
        assert_eq!(second.to_string(), "Union[list, str]");
        let timeout = miner.captured_argument_type(
            &d,
            "send",
            "Channel1",
            &ArgumentSlot::Keyword("timeout".into()),
        );
        assert_eq!(timeout.to_string(), "float");
        let first = miner.captured_argument_type(&d, "send", "Channel1", &ArgumentSlot::Position(1));
        assert!(first.is_any());
    }

    #[test]
    fn test_not_callable_placeholders() {
        let ids = Miner.not_callable_placeholders(&diags(&[
            r#""Literal['Append1']" not callable"#,
            r#""int" not callable"#,
        ]));
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["Append1"]);
    }

    #[test]
    fn test_translate() {
        let miner = Miner;
        assert_eq!(miner.translate("builtins.str").to_string(), "str");
        assert_eq!(miner.translate("dict[Any, Any]").to_string(), "dict");
        assert_eq!(miner.translate("def (x: int) -> str").to_string(), "Callable[..., Any]");
        assert_eq!(miner.translate("list[int]").to_string(), "list[int]");
    }
}
