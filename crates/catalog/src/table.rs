//! Built-in candidate table.
//!
//! Abstract collection types from `collections.abc` and the concrete
//! builtins, each with its declared supertypes and the members it provides
//! beyond what every object has. Inherited members are folded in when the
//! [`Catalog`](crate::Catalog) is built.

use crate::EntryKind;

pub(crate) struct Seed {
    pub name: &'static str,
    pub kind: EntryKind,
    pub supertypes: &'static [&'static str],
    pub members: &'static [&'static str],
}

/// Number of type parameters a candidate takes when parametrized.
pub(crate) fn type_params(name: &str) -> usize {
    match name {
        "Mapping" | "MutableMapping" | "dict" => 2,
        "Iterable" | "Iterator" | "Reversible" | "Container" | "Collection" | "Sequence"
        | "MutableSequence" | "Set" | "MutableSet" | "list" | "set" | "frozenset" => 1,
        _ => 0,
    }
}

/// Members every Python object has; they never discriminate candidates.
pub(crate) const OBJECT_MEMBERS: &[&str] = &[
    "__abstractmethods__", "__annotations__", "__base__", "__bases__", "__basicsize__",
    "__class__", "__class_getitem__", "__delattr__", "__dict__", "__dictoffset__", "__dir__",
    "__doc__", "__flags__", "__format__", "__getattribute__", "__getnewargs__", "__getstate__",
    "__init__", "__init_subclass__", "__itemsize__", "__module__", "__mro__", "__name__",
    "__new__", "__prepare__", "__qualname__", "__reduce__", "__reduce_ex__", "__repr__",
    "__setattr__", "__sizeof__", "__str__", "__subclasshook__", "__text_signature__",
    "__type_params__", "__weakref__", "__weakrefoffset__",
];

pub(crate) const ABSTRACT_TYPES: &[Seed] = &[
    Seed {
        name: "Container",
        kind: EntryKind::Abstract,
        supertypes: &[],
        members: &[
            "__contains__",
        ],
    },
    Seed {
        name: "Hashable",
        kind: EntryKind::Abstract,
        supertypes: &[],
        members: &[
            "__hash__",
        ],
    },
    Seed {
        name: "Iterable",
        kind: EntryKind::Abstract,
        supertypes: &[],
        members: &[
            "__iter__",
        ],
    },
    Seed {
        name: "Iterator",
        kind: EntryKind::Abstract,
        supertypes: &["Iterable"],
        members: &[
            "__iter__", "__next__",
        ],
    },
    Seed {
        name: "Reversible",
        kind: EntryKind::Abstract,
        supertypes: &["Iterable"],
        members: &[
            "__reversed__",
        ],
    },
    Seed {
        name: "Generator",
        kind: EntryKind::Abstract,
        supertypes: &["Iterator", "Iterable"],
        members: &[
            "__iter__", "__next__", "close", "send", "throw",
        ],
    },
    Seed {
        name: "Sized",
        kind: EntryKind::Abstract,
        supertypes: &[],
        members: &[
            "__len__",
        ],
    },
    Seed {
        name: "Callable",
        kind: EntryKind::Abstract,
        supertypes: &[],
        members: &[
            "__call__",
        ],
    },
    Seed {
        name: "Collection",
        kind: EntryKind::Abstract,
        supertypes: &["Sized", "Iterable", "Container"],
        members: &[
            "__contains__", "__iter__", "__len__",
        ],
    },
    Seed {
        name: "Sequence",
        kind: EntryKind::Abstract,
        supertypes: &["Reversible", "Iterable", "Collection", "Sized", "Container"],
        members: &[
            "__contains__", "__getitem__", "__iter__", "__len__", "__reversed__", "count",
            "index",
        ],
    },
    Seed {
        name: "MutableSequence",
        kind: EntryKind::Abstract,
        supertypes: &["Sequence", "Reversible", "Iterable", "Collection", "Sized", "Container"],
        members: &[
            "__delitem__", "__getitem__", "__iadd__", "__len__", "__setitem__", "append",
            "clear", "extend", "insert", "pop", "remove", "reverse",
        ],
    },
    Seed {
        name: "ByteString",
        kind: EntryKind::Abstract,
        supertypes: &["Sequence", "Reversible", "Iterable", "Collection", "Sized", "Container"],
        members: &[
            "__getitem__", "__len__",
        ],
    },
    Seed {
        name: "Set",
        kind: EntryKind::Abstract,
        supertypes: &["Collection", "Sized", "Iterable", "Container"],
        members: &[
            "__and__", "__contains__", "__eq__", "__ge__", "__gt__", "__iter__", "__le__",
            "__len__", "__lt__", "__ne__", "__or__", "__sub__", "__xor__", "isdisjoint",
        ],
    },
    Seed {
        name: "MutableSet",
        kind: EntryKind::Abstract,
        supertypes: &["Set", "Collection", "Sized", "Iterable", "Container"],
        members: &[
            "__contains__", "__iand__", "__ior__", "__isub__", "__iter__", "__ixor__",
            "__len__", "add", "clear", "discard", "pop", "remove",
        ],
    },
    Seed {
        name: "Mapping",
        kind: EntryKind::Abstract,
        supertypes: &["Collection", "Sized", "Iterable", "Container"],
        members: &[
            "__contains__", "__eq__", "__getitem__", "__iter__", "__len__", "__ne__", "get",
            "items", "keys", "values",
        ],
    },
    Seed {
        name: "MutableMapping",
        kind: EntryKind::Abstract,
        supertypes: &["Mapping", "Collection", "Sized", "Iterable", "Container"],
        members: &[
            "__delitem__", "__getitem__", "__iter__", "__len__", "__setitem__", "clear", "pop",
            "popitem", "setdefault", "update",
        ],
    },
];

pub(crate) const BUILTIN_TYPES: &[Seed] = &[
    Seed {
        name: "int",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable"],
        members: &[
            "__abs__", "__add__", "__and__", "__bool__", "__ceil__", "__divmod__", "__eq__",
            "__float__", "__floor__", "__floordiv__", "__ge__", "__gt__", "__hash__",
            "__index__", "__int__", "__invert__", "__le__", "__lshift__", "__lt__", "__mod__",
            "__mul__", "__ne__", "__neg__", "__or__", "__pos__", "__pow__", "__radd__",
            "__rand__", "__rdivmod__", "__rfloordiv__", "__rlshift__", "__rmod__", "__rmul__",
            "__ror__", "__round__", "__rpow__", "__rrshift__", "__rshift__", "__rsub__",
            "__rtruediv__", "__rxor__", "__sub__", "__truediv__", "__trunc__", "__xor__",
            "as_integer_ratio", "bit_count", "bit_length", "conjugate", "denominator",
            "from_bytes", "imag", "is_integer", "numerator", "real", "to_bytes",
        ],
    },
    Seed {
        name: "float",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable"],
        members: &[
            "__abs__", "__add__", "__bool__", "__ceil__", "__divmod__", "__eq__", "__float__",
            "__floor__", "__floordiv__", "__ge__", "__getformat__", "__gt__", "__hash__",
            "__int__", "__le__", "__lt__", "__mod__", "__mul__", "__ne__", "__neg__",
            "__pos__", "__pow__", "__radd__", "__rdivmod__", "__rfloordiv__", "__rmod__",
            "__rmul__", "__round__", "__rpow__", "__rsub__", "__rtruediv__", "__sub__",
            "__truediv__", "__trunc__", "as_integer_ratio", "conjugate", "fromhex", "hex",
            "imag", "is_integer", "real",
        ],
    },
    Seed {
        name: "complex",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable"],
        members: &[
            "__abs__", "__add__", "__bool__", "__complex__", "__eq__", "__ge__", "__gt__",
            "__hash__", "__le__", "__lt__", "__mul__", "__ne__", "__neg__", "__pos__",
            "__pow__", "__radd__", "__rmul__", "__rpow__", "__rsub__", "__rtruediv__",
            "__sub__", "__truediv__", "conjugate", "imag", "real",
        ],
    },
    Seed {
        name: "bool",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable", "int"],
        members: &[
            "__abs__", "__add__", "__and__", "__bool__", "__ceil__", "__divmod__", "__eq__",
            "__float__", "__floor__", "__floordiv__", "__ge__", "__gt__", "__hash__",
            "__index__", "__int__", "__invert__", "__le__", "__lshift__", "__lt__", "__mod__",
            "__mul__", "__ne__", "__neg__", "__or__", "__pos__", "__pow__", "__radd__",
            "__rand__", "__rdivmod__", "__rfloordiv__", "__rlshift__", "__rmod__", "__rmul__",
            "__ror__", "__round__", "__rpow__", "__rrshift__", "__rshift__", "__rsub__",
            "__rtruediv__", "__rxor__", "__sub__", "__truediv__", "__trunc__", "__xor__",
            "as_integer_ratio", "bit_count", "bit_length", "conjugate", "denominator",
            "from_bytes", "imag", "is_integer", "numerator", "real", "to_bytes",
        ],
    },
    Seed {
        name: "str",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable", "Iterable", "Reversible", "Collection", "Container", "Sized", "Sequence"],
        members: &[
            "__add__", "__contains__", "__eq__", "__ge__", "__getitem__", "__gt__", "__hash__",
            "__iter__", "__le__", "__len__", "__lt__", "__mod__", "__mul__", "__ne__",
            "__rmod__", "__rmul__", "capitalize", "casefold", "center", "count", "encode",
            "endswith", "expandtabs", "find", "format", "format_map", "index", "isalnum",
            "isalpha", "isascii", "isdecimal", "isdigit", "isidentifier", "islower",
            "isnumeric", "isprintable", "isspace", "istitle", "isupper", "join", "ljust",
            "lower", "lstrip", "maketrans", "partition", "removeprefix", "removesuffix",
            "replace", "rfind", "rindex", "rjust", "rpartition", "rsplit", "rstrip", "split",
            "splitlines", "startswith", "strip", "swapcase", "title", "translate", "upper",
            "zfill",
        ],
    },
    Seed {
        name: "tuple",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable", "Iterable", "Reversible", "Collection", "Container", "Sized", "Sequence"],
        members: &[
            "__add__", "__contains__", "__eq__", "__ge__", "__getitem__", "__gt__", "__hash__",
            "__iter__", "__le__", "__len__", "__lt__", "__mul__", "__ne__", "__rmul__",
            "count", "index",
        ],
    },
    Seed {
        name: "list",
        kind: EntryKind::Builtin,
        supertypes: &["MutableSequence", "Iterable", "Reversible", "Collection", "Container", "Sized", "Sequence"],
        members: &[
            "__add__", "__contains__", "__delitem__", "__eq__", "__ge__", "__getitem__",
            "__gt__", "__hash__", "__iadd__", "__imul__", "__iter__", "__le__", "__len__",
            "__lt__", "__mul__", "__ne__", "__reversed__", "__rmul__", "__setitem__", "append",
            "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
            "sort",
        ],
    },
    Seed {
        name: "dict",
        kind: EntryKind::Builtin,
        supertypes: &["MutableMapping", "Iterable", "Collection", "Container", "Sized", "Mapping"],
        members: &[
            "__contains__", "__delitem__", "__eq__", "__ge__", "__getitem__", "__gt__",
            "__hash__", "__ior__", "__iter__", "__le__", "__len__", "__lt__", "__ne__",
            "__or__", "__reversed__", "__ror__", "__setitem__", "clear", "copy", "fromkeys",
            "get", "items", "keys", "pop", "popitem", "setdefault", "update", "values",
        ],
    },
    Seed {
        name: "set",
        kind: EntryKind::Builtin,
        supertypes: &["Iterable", "Set", "MutableSet", "Collection", "Container", "Sized"],
        members: &[
            "__and__", "__contains__", "__eq__", "__ge__", "__gt__", "__hash__", "__iand__",
            "__ior__", "__isub__", "__iter__", "__ixor__", "__le__", "__len__", "__lt__",
            "__ne__", "__or__", "__rand__", "__ror__", "__rsub__", "__rxor__", "__sub__",
            "__xor__", "add", "clear", "copy", "difference", "difference_update", "discard",
            "intersection", "intersection_update", "isdisjoint", "issubset", "issuperset",
            "pop", "remove", "symmetric_difference", "symmetric_difference_update", "union",
            "update",
        ],
    },
    Seed {
        name: "frozenset",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable", "Iterable", "Set", "Collection", "Container", "Sized"],
        members: &[
            "__and__", "__contains__", "__eq__", "__ge__", "__gt__", "__hash__", "__iter__",
            "__le__", "__len__", "__lt__", "__ne__", "__or__", "__rand__", "__ror__",
            "__rsub__", "__rxor__", "__sub__", "__xor__", "copy", "difference", "intersection",
            "isdisjoint", "issubset", "issuperset", "symmetric_difference", "union",
        ],
    },
    Seed {
        name: "bytes",
        kind: EntryKind::Builtin,
        supertypes: &["Hashable", "Iterable", "Reversible", "ByteString", "Collection", "Container", "Sized", "Sequence"],
        members: &[
            "__add__", "__buffer__", "__bytes__", "__contains__", "__eq__", "__ge__",
            "__getitem__", "__gt__", "__hash__", "__iter__", "__le__", "__len__", "__lt__",
            "__mod__", "__mul__", "__ne__", "__rmod__", "__rmul__", "capitalize", "center",
            "count", "decode", "endswith", "expandtabs", "find", "fromhex", "hex", "index",
            "isalnum", "isalpha", "isascii", "isdigit", "islower", "isspace", "istitle",
            "isupper", "join", "ljust", "lower", "lstrip", "maketrans", "partition",
            "removeprefix", "removesuffix", "replace", "rfind", "rindex", "rjust",
            "rpartition", "rsplit", "rstrip", "split", "splitlines", "startswith", "strip",
            "swapcase", "title", "translate", "upper", "zfill",
        ],
    },
    Seed {
        name: "bytearray",
        kind: EntryKind::Builtin,
        supertypes: &["MutableSequence", "Iterable", "Reversible", "ByteString", "Collection", "Container", "Sized", "Sequence"],
        members: &[
            "__add__", "__alloc__", "__buffer__", "__contains__", "__delitem__", "__eq__",
            "__ge__", "__getitem__", "__gt__", "__hash__", "__iadd__", "__imul__", "__iter__",
            "__le__", "__len__", "__lt__", "__mod__", "__mul__", "__ne__",
            "__release_buffer__", "__rmod__", "__rmul__", "__setitem__", "append",
            "capitalize", "center", "clear", "copy", "count", "decode", "endswith",
            "expandtabs", "extend", "find", "fromhex", "hex", "index", "insert", "isalnum",
            "isalpha", "isascii", "isdigit", "islower", "isspace", "istitle", "isupper",
            "join", "ljust", "lower", "lstrip", "maketrans", "partition", "pop", "remove",
            "removeprefix", "removesuffix", "replace", "reverse", "rfind", "rindex", "rjust",
            "rpartition", "rsplit", "rstrip", "split", "splitlines", "startswith", "strip",
            "swapcase", "title", "translate", "upper", "zfill",
        ],
    },
    Seed {
        name: "memoryview",
        kind: EntryKind::Builtin,
        supertypes: &["Iterable", "Sized"],
        members: &[
            "__buffer__", "__delitem__", "__enter__", "__eq__", "__exit__", "__ge__",
            "__getitem__", "__gt__", "__hash__", "__iter__", "__le__", "__len__", "__lt__",
            "__ne__", "__release_buffer__", "__setitem__", "_from_flags", "c_contiguous",
            "cast", "contiguous", "f_contiguous", "format", "hex", "itemsize", "nbytes",
            "ndim", "obj", "readonly", "release", "shape", "strides", "suboffsets", "tobytes",
            "tolist", "toreadonly",
        ],
    },
    Seed {
        name: "range",
        kind: EntryKind::Builtin,
        supertypes: &["Iterable", "Reversible", "Collection", "Container", "Sized", "Sequence"],
        members: &[
            "__bool__", "__contains__", "__eq__", "__ge__", "__getitem__", "__gt__",
            "__hash__", "__iter__", "__le__", "__len__", "__lt__", "__ne__", "__reversed__",
            "count", "index", "start", "step", "stop",
        ],
    },
    Seed {
        name: "slice",
        kind: EntryKind::Builtin,
        supertypes: &[],
        members: &[
            "__eq__", "__ge__", "__gt__", "__hash__", "__le__", "__lt__", "__ne__", "indices",
            "start", "step", "stop",
        ],
    },
    Seed {
        name: "type",
        kind: EntryKind::Builtin,
        supertypes: &["Callable"],
        members: &[
            "__call__", "__eq__", "__ge__", "__gt__", "__hash__", "__instancecheck__",
            "__le__", "__lt__", "__ne__", "__or__", "__ror__", "__subclasscheck__",
            "__subclasses__", "mro",
        ],
    },
];
