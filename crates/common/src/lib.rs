//! # Common: Shared Data Model
//!
//! Types shared by every stage of the inference pipeline:
//!
//! - [`Capability`]: one observed use of a value (a method, a field, or a
//!   well-known protocol such as "callable" or "iterable").
//! - [`TypeExpr`] / [`PlaceholderId`]: annotation expressions and the markers
//!   that stand in for not-yet-resolved parameter types.
//! - [`InterfaceDecl`]: a synthesized structural interface.
//! - [`InterfaceRegistry`]: the persisted set of synthesized interfaces.
//! - [`NameCounters`]: the project-wide numeric suffix allocator.

pub mod counters;
pub mod interface;
pub mod registry;
pub mod types;

pub use counters::{Allocation, NameCounters};
pub use interface::{InterfaceDecl, Member, ParamDecl};
pub use registry::{InterfaceRegistry, RegistryError};
pub use types::{Bindings, PlaceholderId, TypeExpr, Unbound};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A single observed use of a value.
///
/// Ordering and equality only look at the kind and the member name, so two
/// observations of the same method with different arities collapse into one
/// entry of a `BTreeSet<Capability>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Capability {
    /// A named method call with the number of positional arguments seen.
    Method { name: String, arity: usize },
    /// A plain attribute access.
    Field { name: String },
    /// The value itself is called.
    Callable,
    /// `value[key]` is read.
    Indexable,
    /// `value[key] = ...` is written.
    IndexAssignable,
    /// The value is iterated.
    Iterable,
    /// `next(value)` is called.
    Iterator,
    /// `len(value)` is called.
    Sized,
}

impl Capability {
    /// Builds the capability for a member name, folding the dunders that have
    /// a dedicated well-known kind.
    pub fn from_member(name: &str, arity: Option<usize>) -> Self {
        match name {
            "__call__" => Capability::Callable,
            "__getitem__" => Capability::Indexable,
            "__setitem__" => Capability::IndexAssignable,
            "__iter__" => Capability::Iterable,
            "__next__" => Capability::Iterator,
            "__len__" => Capability::Sized,
            _ => match arity {
                Some(arity) => Capability::Method {
                    name: name.to_string(),
                    arity,
                },
                None => Capability::Field {
                    name: name.to_string(),
                },
            },
        }
    }

    /// The member name an interface must declare to provide this capability.
    pub fn member_name(&self) -> &str {
        match self {
            Capability::Method { name, .. } | Capability::Field { name } => name,
            Capability::Callable => "__call__",
            Capability::Indexable => "__getitem__",
            Capability::IndexAssignable => "__setitem__",
            Capability::Iterable => "__iter__",
            Capability::Iterator => "__next__",
            Capability::Sized => "__len__",
        }
    }

    /// `true` for capabilities that render as a method rather than a field.
    pub fn is_method(&self) -> bool {
        !matches!(self, Capability::Field { .. })
    }

    fn rank(&self) -> u8 {
        match self {
            Capability::Method { .. } => 0,
            Capability::Field { .. } => 1,
            Capability::Callable => 2,
            Capability::Indexable => 3,
            Capability::IndexAssignable => 4,
            Capability::Iterable => 5,
            Capability::Iterator => 6,
            Capability::Sized => 7,
        }
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Capability {}

impl PartialOrd for Capability {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Capability {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.member_name().cmp(other.member_name()))
    }
}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        self.member_name().hash(state);
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Method { name, arity } => write!(f, "method:{name}/{arity}"),
            Capability::Field { name } => write!(f, "field:{name}"),
            other => write!(f, "{}", other.member_name()),
        }
    }
}

// ---- run policies ----

/// Which parameters receive a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkPolicy {
    /// Every eligible parameter; prior annotations become saved hints.
    #[default]
    All,
    /// Only parameters without an annotation.
    UnannotatedOnly,
    /// Only parameters already annotated with a registry interface.
    ExistingInterfaceOnly,
    /// Nothing is marked; resolution is skipped.
    None,
}

impl FromStr for MarkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(MarkPolicy::All),
            "unannotated-only" => Ok(MarkPolicy::UnannotatedOnly),
            "existing-interface-only" => Ok(MarkPolicy::ExistingInterfaceOnly),
            "none" => Ok(MarkPolicy::None),
            other => Err(format!(
                "unknown mark policy '{other}' (expected all, unannotated-only, existing-interface-only or none)"
            )),
        }
    }
}

/// How per-site interfaces are presented after deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Presentation {
    /// Keep one interface per resolution site.
    Partial,
    /// Merge interfaces sharing a base name into one.
    #[default]
    Combined,
    /// Keep the partials and add one aggregator per base name.
    Both,
}

impl FromStr for Presentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "partial" => Ok(Presentation::Partial),
            "combined" => Ok(Presentation::Combined),
            "both" => Ok(Presentation::Both),
            other => Err(format!(
                "unknown presentation '{other}' (expected partial, combined or both)"
            )),
        }
    }
}

// ---- naming helpers ----

/// Converts a snake_case identifier to CamelCase (`word_list` -> `WordList`).
///
/// Leading underscores are dropped so private parameters still produce a
/// valid class name.
pub fn to_camel_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let mut upper = true;
    for ch in ident.chars() {
        if ch == '_' {
            upper = true;
            continue;
        }
        if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Stem used for a parameter's placeholder and interface names.
///
/// Trailing digits are trimmed so the numeric suffix stays unambiguous
/// (`item2` -> `Item`).
pub fn interface_stem(param: &str) -> String {
    let camel = to_camel_case(param);
    let trimmed = camel.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.is_empty() {
        String::from("Value")
    } else {
        trimmed.to_string()
    }
}

/// Removes every ASCII digit from an interface name (`Content12` -> `Content`).
pub fn strip_digits(name: &str) -> String {
    name.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// Splits a trailing numeric suffix off an interface name.
///
/// Returns `None` when the name does not end in a digit.
pub fn split_suffix(name: &str) -> Option<(&str, u32)> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    let (stem, number) = name.split_at(name.len() - digits);
    number.parse().ok().map(|n| (stem, n))
}

/// Element-placeholder tails that may follow a numeric suffix.
pub const SUBSCRIPT_TAILS: &[&str] = &["FirstSubscript", "SecondSubscript", "Subscript"];

/// Splits `Words3Subscript` into (`Words`, 3, `Subscript`).
///
/// Plain numbered names yield an empty tail.
pub fn numbered_parts(name: &str) -> Option<(&str, u32, &str)> {
    let mut head = name;
    loop {
        match SUBSCRIPT_TAILS.iter().find(|t| head.ends_with(*t)) {
            Some(tail) => head = &head[..head.len() - tail.len()],
            None => break,
        }
    }
    let (stem, number) = split_suffix(head)?;
    Some((stem, number, &name[head.len()..]))
}

/// BLAKE3 digest of `text` truncated to a `u64` (first 8 bytes, LE).
pub fn content_hash(text: &str) -> u64 {
    let digest = blake3::hash(text.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

/// Sort key preferring the smallest numeric suffix, then the name itself.
pub fn suffix_key(name: &str) -> (u32, String) {
    let number = split_suffix(name).map_or(u32::MAX, |(_, n)| n);
    (number, name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("class A: ..."), content_hash("class A: ..."));
        assert_ne!(content_hash("class A: ..."), content_hash("class B: ..."));
    }

    #[test]
    fn test_capability_identity_ignores_arity() {
        let mut set = BTreeSet::new();
        set.insert(Capability::Method {
            name: "append".into(),
            arity: 1,
        });
        set.insert(Capability::Method {
            name: "append".into(),
            arity: 2,
        });
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_from_member_folds_dunders() {
        assert_eq!(Capability::from_member("__len__", Some(0)), Capability::Sized);
        assert_eq!(
            Capability::from_member("__getitem__", Some(1)),
            Capability::Indexable
        );
        assert_eq!(
            Capability::from_member("content", None).member_name(),
            "content"
        );
        assert!(!Capability::from_member("content", None).is_method());
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("word_list"), "WordList");
        assert_eq!(to_camel_case("message"), "Message");
        assert_eq!(to_camel_case("_private_arg"), "PrivateArg");
        assert_eq!(interface_stem("item2"), "Item");
        assert_eq!(interface_stem("_"), "Value");
    }

    #[test]
    fn test_suffix_helpers() {
        assert_eq!(split_suffix("Content12"), Some(("Content", 12)));
        assert_eq!(split_suffix("Content"), None);
        assert_eq!(strip_digits("Message3Subscript"), "MessageSubscript");
        assert!(suffix_key("Message2") < suffix_key("Message10"));
        assert!(suffix_key("Message10") < suffix_key("Message"));
        assert_eq!(
            numbered_parts("Words3SubscriptFirstSubscript"),
            Some(("Words", 3, "SubscriptFirstSubscript"))
        );
        assert_eq!(numbered_parts("Words3"), Some(("Words", 3, "")));
        assert_eq!(numbered_parts("Words"), None);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("unannotated-only".parse(), Ok(MarkPolicy::UnannotatedOnly));
        assert_eq!("both".parse(), Ok(Presentation::Both));
        assert!("sometimes".parse::<MarkPolicy>().is_err());
    }
}
