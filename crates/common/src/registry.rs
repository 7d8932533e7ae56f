//! # Interface Registry: Persisted Synthesized Interfaces
//!
//! Holds every interface declaration synthesized so far, keyed by name, and
//! renders them as one importable Python module (the registry file). The
//! file is rewritten after every resolved function and after deduplication,
//! so an interrupted run still leaves a consistent module on disk.
//!
//! Loading the file back needs a Python parser and lives in
//! `anatomist::registry_file`.

use crate::interface::InterfaceDecl;
use crate::types::Unbound;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Imports every registry module starts with.
pub const REGISTRY_HEADER: &[&str] = &[
    "from __future__ import annotations",
    "",
    "from collections.abc import *",
    "from typing import *",
    "from typing import Any, Literal, Protocol, Union, runtime_checkable",
];

/// Errors from registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("interface '{0}' is already registered with a different shape")]
    DuplicateName(String),
    #[error("interface '{name}' references '{missing}', which is not registered")]
    DanglingReference { name: String, missing: String },
}

/// In-memory interface registry, serializable to a Python module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceRegistry {
    decls: BTreeMap<String, InterfaceDecl>,
    /// Extra `from <module> import <Item>` lines needed by external-library
    /// types referenced from declarations.
    extra_imports: BTreeSet<String>,
}

impl InterfaceRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from already parsed declarations.
    pub fn from_decls(decls: impl IntoIterator<Item = InterfaceDecl>) -> Self {
        Self {
            decls: decls.into_iter().map(|d| (d.name.clone(), d)).collect(),
            extra_imports: BTreeSet::new(),
        }
    }

    /// Inserts a declaration.
    ///
    /// Re-inserting an identical declaration is a no-op.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateName`] when a different declaration
    /// already owns the name.
    pub fn insert(&mut self, decl: InterfaceDecl) -> Result<(), RegistryError> {
        match self.decls.get(&decl.name) {
            Some(existing) if *existing == decl => Ok(()),
            Some(_) => Err(RegistryError::DuplicateName(decl.name)),
            None => {
                self.decls.insert(decl.name.clone(), decl);
                Ok(())
            }
        }
    }

    /// Inserts or overwrites a declaration.
    pub fn replace(&mut self, decl: InterfaceDecl) {
        self.decls.insert(decl.name.clone(), decl);
    }

    pub fn remove(&mut self, name: &str) -> Option<InterfaceDecl> {
        self.decls.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&InterfaceDecl> {
        self.decls.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.decls.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceDecl> {
        self.decls.values()
    }

    /// Returns the number of declarations.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Returns `true` if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Records an external import line (`from m import X`).
    pub fn add_import(&mut self, line: impl Into<String>) {
        self.extra_imports.insert(line.into());
    }

    pub fn extra_imports(&self) -> impl Iterator<Item = &String> {
        self.extra_imports.iter()
    }

    /// Rewrites every reference (bases and member types) through `map`.
    pub fn rename_references(&mut self, map: &BTreeMap<String, String>) {
        for decl in self.decls.values_mut() {
            *decl = decl.rename_references(map);
        }
    }

    /// Declarations named in `roots` plus every registered declaration they
    /// reference, transitively, in name order.
    pub fn closure<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> Vec<&InterfaceDecl> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<String> = roots.into_iter().map(str::to_string).collect();
        while let Some(name) = stack.pop() {
            let Some(decl) = self.decls.get(&name) else {
                continue;
            };
            if !seen.insert(name) {
                continue;
            }
            stack.extend(
                decl.referenced_names()
                    .into_iter()
                    .filter(|n| self.decls.contains_key(n)),
            );
        }
        seen.iter().filter_map(|n| self.decls.get(n)).collect()
    }

    /// Checks that every registered name referenced by a declaration exists.
    ///
    /// `is_registry_name` decides whether an identifier is expected to live
    /// in the registry (builtins and abstract types are not).
    pub fn validate(&self, is_registry_name: impl Fn(&str) -> bool) -> Result<(), RegistryError> {
        for decl in self.decls.values() {
            for name in decl.referenced_names() {
                if is_registry_name(&name) && !self.decls.contains_key(&name) {
                    return Err(RegistryError::DanglingReference {
                        name: decl.name.clone(),
                        missing: name,
                    });
                }
            }
        }
        Ok(())
    }

    /// Renders the registry module.
    pub fn render(&self) -> String {
        let mut out = REGISTRY_HEADER.join("\n");
        out.push('\n');
        for line in &self.extra_imports {
            out.push_str(line);
            out.push('\n');
        }
        for decl in self.decls.values() {
            out.push_str("\n\n");
            out.push_str(&decl.render(&Unbound));
        }
        out
    }

    /// Saves the registry module to disk, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Member;
    use crate::types::TypeExpr;

    fn decl(name: &str, field: &str, ty: &str) -> InterfaceDecl {
        let mut d = InterfaceDecl::new(name);
        d.members
            .insert(field.into(), Member::Field(TypeExpr::parse(ty)));
        d
    }

    #[test]
    fn test_insert_rejects_conflicting_shape() {
        let mut registry = InterfaceRegistry::new();
        registry.insert(decl("Message1", "content", "str")).unwrap();
        registry.insert(decl("Message1", "content", "str")).unwrap();
        assert!(matches!(
            registry.insert(decl("Message1", "role", "str")),
            Err(RegistryError::DuplicateName(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_closure_follows_references() {
        let registry = InterfaceRegistry::from_decls([
            decl("Message1", "content", "Content1"),
            decl("Content1", "text", "list[Text1]"),
            decl("Text1", "value", "str"),
            decl("Other1", "value", "int"),
        ]);
        let names: Vec<&str> = registry
            .closure(["Message1"])
            .into_iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["Content1", "Message1", "Text1"]);
    }

    #[test]
    fn test_validate_detects_dangling() {
        let registry = InterfaceRegistry::from_decls([decl("Message1", "content", "Content9")]);
        let err = registry
            .validate(|n| n.starts_with("Content"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DanglingReference { .. }));
    }

    #[test]
    fn test_save_and_render() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interfaces/interfaces.py");
        let mut registry = InterfaceRegistry::from_decls([decl("Message1", "content", "str")]);
        registry.add_import("from pathlib import PurePath");
        registry.save(&path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("from __future__ import annotations\n"));
        assert!(text.contains("from pathlib import PurePath\n"));
        assert!(text.ends_with("class Message1(Protocol):\n    content: str\n"));
    }
}
