//! # Catalog: Candidate Interface Table
//!
//! The set of existing types a parameter may be annotated with instead of a
//! freshly synthesized interface:
//!
//! - **Abstract** types from `collections.abc` (`Sized`, `Sequence`,
//!   `Mapping`, ...).
//! - **Builtin** concrete types (`str`, `list`, `memoryview`, ...).
//! - **External** classes discovered in installed libraries by
//!   [`external::ExternalScanner`].
//!
//! Each entry carries its transitive supertypes and the members it provides
//! (own and inherited). Matching is structural: an entry matches a required
//! member set when it provides all of it. Among several matches the
//! resolver prefers the most general ones, see [`Catalog::minimal`].

pub mod external;
pub mod signatures;
mod table;

pub use external::{ExternalClass, ExternalScanner};

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Errors from catalog construction.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("library scan failed (exit status {status}): {stderr}")]
    ScanFailed { status: String, stderr: String },
    #[error("malformed library scan record: {0}")]
    MalformedRecord(#[from] serde_json::Error),
}

/// Where a candidate comes from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    Abstract,
    Builtin,
    /// Importable as `from <module> import <name>`.
    External { module: String },
}

/// One candidate type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Transitive supertypes (the entry itself excluded).
    pub supertypes: BTreeSet<String>,
    /// Own and inherited members, object-level dunders excluded.
    pub members: BTreeSet<String>,
    /// Type parameters taken when the candidate is parametrized.
    pub type_params: usize,
}

impl CatalogEntry {
    /// `true` when every required member is provided.
    pub fn provides<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> bool {
        required.into_iter().all(|m| self.members.contains(m))
    }

    /// Import line needed before the entry can be named in a probe.
    pub fn import_line(&self) -> Option<String> {
        match &self.kind {
            EntryKind::External { module } => Some(format!("from {module} import {}", self.name)),
            EntryKind::Abstract | EntryKind::Builtin => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, EntryKind::External { .. })
    }
}

/// Candidate table.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    /// The abstract and builtin candidates.
    pub fn builtin() -> Self {
        let seeds: Vec<&table::Seed> = table::ABSTRACT_TYPES
            .iter()
            .chain(table::BUILTIN_TYPES.iter())
            .collect();
        let by_name: BTreeMap<&str, &table::Seed> = seeds.iter().map(|s| (s.name, *s)).collect();

        let mut entries = BTreeMap::new();
        for seed in &seeds {
            let mut supertypes = BTreeSet::new();
            let mut members: BTreeSet<String> =
                seed.members.iter().map(|m| m.to_string()).collect();
            let mut stack: Vec<&str> = seed.supertypes.to_vec();
            while let Some(name) = stack.pop() {
                if !supertypes.insert(name.to_string()) {
                    continue;
                }
                if let Some(parent) = by_name.get(name) {
                    members.extend(parent.members.iter().map(|m| m.to_string()));
                    stack.extend(parent.supertypes.iter().copied());
                }
            }
            entries.insert(
                seed.name.to_string(),
                CatalogEntry {
                    name: seed.name.to_string(),
                    kind: seed.kind.clone(),
                    supertypes,
                    members,
                    type_params: table::type_params(seed.name),
                },
            );
        }
        Self { entries }
    }

    /// Drops a candidate (e.g. `memoryview` when excluded by configuration).
    pub fn without(mut self, name: &str) -> Self {
        self.entries.remove(name);
        for entry in self.entries.values_mut() {
            entry.supertypes.remove(name);
        }
        self
    }

    /// Adds discovered library classes.
    ///
    /// Supertypes are derived structurally from the abstract entries. A
    /// class whose name is already taken is skipped.
    pub fn add_external(&mut self, classes: impl IntoIterator<Item = ExternalClass>) {
        let abstracts: Vec<(String, BTreeSet<String>)> = self
            .entries
            .values()
            .filter(|e| e.kind == EntryKind::Abstract)
            .map(|e| (e.name.clone(), e.members.clone()))
            .collect();

        for class in classes {
            if self.entries.contains_key(&class.name) {
                debug!(name = %class.name, module = %class.module, "external class shadowed, skipped");
                continue;
            }
            let members: BTreeSet<String> = class
                .members
                .into_iter()
                .filter(|m| !table::OBJECT_MEMBERS.contains(&m.as_str()))
                .collect();
            let supertypes = abstracts
                .iter()
                .filter(|(_, needed)| !needed.is_empty() && needed.is_subset(&members))
                .map(|(name, _)| name.clone())
                .collect();
            self.entries.insert(
                class.name.clone(),
                CatalogEntry {
                    name: class.name,
                    kind: EntryKind::External {
                        module: class.module,
                    },
                    supertypes,
                    members,
                    type_params: 0,
                },
            );
        }
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// `true` for names importable from `collections.abc`.
    pub fn is_abstract(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.kind == EntryKind::Abstract)
    }

    /// `true` when `ancestor` is a (transitive) supertype of `name`.
    pub fn is_supertype(&self, ancestor: &str, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.supertypes.contains(ancestor))
    }

    /// Abstract and builtin entries providing every required member.
    pub fn matching(&self, required: &BTreeSet<String>) -> BTreeSet<String> {
        self.entries
            .values()
            .filter(|e| !e.is_external() && e.provides(required))
            .map(|e| e.name.clone())
            .collect()
    }

    /// External entries providing every required member.
    pub fn matching_external(&self, required: &BTreeSet<String>) -> Vec<&CatalogEntry> {
        self.entries
            .values()
            .filter(|e| e.is_external() && e.provides(required))
            .collect()
    }

    /// The most general names of `names`: a name is dropped when one of its
    /// supertypes is also in the set. Unknown names are kept.
    pub fn minimal(&self, names: &BTreeSet<String>) -> BTreeSet<String> {
        names
            .iter()
            .filter(|name| {
                self.entries
                    .get(*name)
                    .is_none_or(|e| e.supertypes.is_disjoint(names))
            })
            .cloned()
            .collect()
    }

    /// Names in `within` that have `ancestor` as a supertype.
    pub fn descendants(&self, ancestor: &str, within: &BTreeSet<String>) -> BTreeSet<String> {
        within
            .iter()
            .filter(|name| self.is_supertype(ancestor, name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_inherited_members_are_folded_in() {
        let catalog = Catalog::builtin();
        let seq = catalog.get("MutableSequence").unwrap();
        assert!(seq.members.contains("__iter__"));
        assert!(seq.members.contains("append"));
        assert!(seq.supertypes.contains("Sequence"));
        assert!(seq.supertypes.contains("Iterable"));
        assert_eq!(seq.type_params, 1);
        assert_eq!(catalog.get("dict").unwrap().type_params, 2);
    }

    #[test]
    fn test_minimal_sized_and_indexable() {
        let catalog = Catalog::builtin();
        let matching = catalog.matching(&set(&["__getitem__", "__len__"]));
        assert!(matching.contains("list"));
        assert!(matching.contains("Mapping"));
        assert_eq!(
            catalog.minimal(&matching),
            set(&["Mapping", "Sequence", "memoryview"])
        );
    }

    #[test]
    fn test_minimal_keeps_unknown_names() {
        let catalog = Catalog::builtin();
        assert_eq!(
            catalog.minimal(&set(&["int", "bool", "PathLike"])),
            set(&["PathLike", "int"])
        );
    }

    #[test]
    fn test_without_memoryview() {
        let catalog = Catalog::builtin().without("memoryview");
        let matching = catalog.matching(&set(&["__getitem__", "__len__"]));
        assert_eq!(catalog.minimal(&matching), set(&["Mapping", "Sequence"]));
    }

    #[test]
    fn test_external_supertypes_are_structural() {
        let mut catalog = Catalog::builtin();
        catalog.add_external([ExternalClass {
            module: "pathlib".into(),
            name: "PurePath".into(),
            members: vec!["__hash__".into(), "__truediv__".into(), "joinpath".into(), "__init__".into()],
        }]);
        let entry = catalog.get("PurePath").unwrap();
        assert!(entry.supertypes.contains("Hashable"));
        assert!(!entry.members.contains("__init__"));
        assert_eq!(entry.import_line().as_deref(), Some("from pathlib import PurePath"));
        assert_eq!(catalog.matching_external(&set(&["joinpath"])).len(), 1);
        assert!(catalog.matching(&set(&["joinpath"])).is_empty());
    }
}
