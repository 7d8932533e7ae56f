//! Fixed stub signatures for well-known members.
//!
//! When a synthesized interface needs a dunder or a standard container
//! method, it is declared with the parameter list below rather than widened
//! call by call.

use common::ParamDecl;

/// `(member, parameters after the receiver)`; `name=default` marks an
/// optional parameter, `*`/`**` prefixes mark variadics.
const STUB_SIGNATURES: &[(&str, &[&str])] = &[
    ("__abs__", &[]),
    ("__add__", &["other"]),
    ("__and__", &["other"]),
    ("__bool__", &[]),
    ("__bytes__", &[]),
    ("__call__", &["*args", "**kwargs"]),
    ("__ceil__", &[]),
    ("__complex__", &[]),
    ("__contains__", &["item"]),
    ("__delitem__", &["key"]),
    ("__divmod__", &["other"]),
    ("__enter__", &[]),
    ("__eq__", &["other"]),
    ("__exit__", &["exc_type", "exc_value", "traceback"]),
    ("__float__", &[]),
    ("__floor__", &[]),
    ("__floordiv__", &["other"]),
    ("__ge__", &["other"]),
    ("__getitem__", &["key"]),
    ("__gt__", &["other"]),
    ("__hash__", &[]),
    ("__iadd__", &["other"]),
    ("__iand__", &["other"]),
    ("__imul__", &["other"]),
    ("__index__", &[]),
    ("__int__", &[]),
    ("__invert__", &[]),
    ("__ior__", &["other"]),
    ("__isub__", &["other"]),
    ("__iter__", &[]),
    ("__ixor__", &["other"]),
    ("__le__", &["other"]),
    ("__len__", &[]),
    ("__lshift__", &["other"]),
    ("__lt__", &["other"]),
    ("__matmul__", &["other"]),
    ("__mod__", &["other"]),
    ("__mul__", &["other"]),
    ("__ne__", &["other"]),
    ("__neg__", &[]),
    ("__next__", &[]),
    ("__or__", &["other"]),
    ("__pos__", &[]),
    ("__pow__", &["exponent", "modulus=None"]),
    ("__radd__", &["other"]),
    ("__rand__", &["other"]),
    ("__rdivmod__", &["other"]),
    ("__reversed__", &[]),
    ("__rfloordiv__", &["other"]),
    ("__rlshift__", &["other"]),
    ("__rmod__", &["other"]),
    ("__rmul__", &["other"]),
    ("__ror__", &["other"]),
    ("__round__", &["n"]),
    ("__rpow__", &["exponent", "modulus=None"]),
    ("__rrshift__", &["other"]),
    ("__rshift__", &["other"]),
    ("__rsub__", &["other"]),
    ("__rtruediv__", &["other"]),
    ("__rxor__", &["other"]),
    ("__setitem__", &["key", "value"]),
    ("__sub__", &["other"]),
    ("__truediv__", &["other"]),
    ("__trunc__", &[]),
    ("__xor__", &["other"]),
    ("add", &["element"]),
    ("append", &["element"]),
    ("clear", &[]),
    ("close", &[]),
    ("count", &["value"]),
    ("discard", &["element"]),
    ("extend", &["iterable"]),
    ("get", &["key", "default=None"]),
    ("index", &["value", "start=0", "stop=None"]),
    ("insert", &["index", "element"]),
    ("isdisjoint", &["other"]),
    ("items", &[]),
    ("keys", &[]),
    ("pop", &["key=None"]),
    ("popitem", &[]),
    ("remove", &["element"]),
    ("reverse", &[]),
    ("send", &["value"]),
    ("setdefault", &["key", "default=None"]),
    ("throw", &["type", "value=None", "traceback=None"]),
    ("update", &["*args", "**kwargs"]),
    ("values", &[]),
];

fn lookup(member: &str) -> Option<&'static [&'static str]> {
    STUB_SIGNATURES
        .binary_search_by(|(name, _)| name.cmp(&member))
        .ok()
        .map(|i| STUB_SIGNATURES[i].1)
}

/// `true` when `member` is a dunder with a fixed stub signature.
///
/// Only these are declared as methods straight away; any other attribute
/// starts out as a field and is promoted once it is seen being called.
pub fn is_known_dunder(member: &str) -> bool {
    member.starts_with("__") && member.ends_with("__") && lookup(member).is_some()
}

/// Stub parameters for `member`, without the receiver.
pub fn stub_params(member: &str) -> Option<Vec<ParamDecl>> {
    lookup(member).map(|params| params.iter().map(|p| param_decl(p)).collect())
}

/// Positional arity of `member`'s stub (variadics and defaults excluded).
pub fn stub_arity(member: &str) -> Option<usize> {
    lookup(member).map(|params| {
        params
            .iter()
            .filter(|p| !p.starts_with('*') && !p.contains('='))
            .count()
    })
}

fn param_decl(spec: &str) -> ParamDecl {
    match spec.split_once('=') {
        Some((name, default)) => {
            let mut decl = ParamDecl::new(name, None);
            decl.default = Some(default.to_string());
            decl
        }
        None => ParamDecl::new(spec, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        // lookup relies on binary search
        assert!(STUB_SIGNATURES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_stub_params() {
        let params = stub_params("__setitem__").unwrap();
        let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["key", "value"]);

        let get = stub_params("get").unwrap();
        assert_eq!(get[1].name, "default");
        assert_eq!(get[1].default.as_deref(), Some("None"));
        assert_eq!(stub_arity("get"), Some(1));
        assert!(stub_params("frobnicate").is_none());
    }

    #[test]
    fn test_known_dunder() {
        assert!(is_known_dunder("__len__"));
        assert!(!is_known_dunder("append"));
        assert!(!is_known_dunder("__frobnicate__"));
    }
}
