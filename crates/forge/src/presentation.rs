//! Presentation modes applied after deduplication.
//!
//! - `combined`: interfaces whose names agree once digits are removed
//!   (`Message1`, `Message4`) merge into one interface named without digits
//!   (`Message`).
//! - `both`: the numbered partials stay and an aggregator
//!   `Message(Message1, Message4, Protocol)` is added per digit-free name.

use crate::{apply_renames, RenameMap};
use common::{strip_digits, suffix_key, InterfaceDecl, InterfaceRegistry, Member, ParamDecl, TypeExpr};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Groups registry names by their digit-free form, members smallest suffix first.
fn groups_by_base(names: impl Iterator<Item = String>) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in names {
        groups.entry(strip_digits(&name)).or_default().push(name);
    }
    for members in groups.values_mut() {
        members.sort_by_key(|m| suffix_key(m));
    }
    groups
}

/// Merges every group of same-base interfaces into a single declaration.
///
/// Returns the merged registry and the map from each renamed partial to its
/// merged name.
pub fn combine(registry: &InterfaceRegistry) -> (InterfaceRegistry, RenameMap) {
    let groups = groups_by_base(registry.names().cloned());
    let renames: RenameMap = groups
        .iter()
        .flat_map(|(base, members)| {
            members
                .iter()
                .filter(move |m| *m != base)
                .map(move |m| (m.clone(), base.clone()))
        })
        .collect();

    let mut merged = Vec::with_capacity(groups.len());
    for (base, members) in &groups {
        let parts: Vec<&InterfaceDecl> = members.iter().filter_map(|m| registry.get(m)).collect();
        let decl = merge_group(base, &parts);
        debug!(interface = %base, parts = parts.len(), "combined");
        merged.push(decl);
    }

    let mut combined = InterfaceRegistry::from_decls(merged);
    for line in registry.extra_imports() {
        combined.add_import(line.clone());
    }
    // Members still point at the partials until references follow the merge.
    let combined = apply_renames(&combined, &renames);
    (combined, renames)
}

fn merge_group(name: &str, parts: &[&InterfaceDecl]) -> InterfaceDecl {
    let mut decl = InterfaceDecl::new(name);

    let mut bases: Vec<String> = Vec::new();
    for part in parts {
        for base in &part.bases {
            if strip_digits(base) != name && !bases.contains(base) {
                bases.push(base.clone());
            }
        }
    }
    decl.bases = bases;

    let mut fields: BTreeMap<&str, Vec<&TypeExpr>> = BTreeMap::new();
    let mut methods: BTreeMap<&str, Vec<&[ParamDecl]>> = BTreeMap::new();
    for part in parts {
        for (member, kind) in &part.members {
            match kind {
                Member::Field(ty) => fields.entry(member).or_default().push(ty),
                Member::Method(params) => methods.entry(member).or_default().push(params),
            }
        }
    }

    for (member, versions) in fields {
        // A name that is a method anywhere stays a method.
        if methods.contains_key(member) {
            continue;
        }
        let mut versions: Vec<TypeExpr> = versions.into_iter().cloned().collect();
        versions.sort();
        decl.members
            .insert(member.to_string(), Member::Field(TypeExpr::union(versions)));
    }
    for (member, implementations) in methods {
        decl.members
            .insert(member.to_string(), Member::Method(merge_methods(&implementations)));
    }
    decl
}

/// Keeps the implementations with the most parameters and merges them
/// position by position.
fn merge_methods(implementations: &[&[ParamDecl]]) -> Vec<ParamDecl> {
    let widest = implementations.iter().map(|p| p.len()).max().unwrap_or(0);
    let candidates: Vec<&[ParamDecl]> = implementations
        .iter()
        .copied()
        .filter(|p| p.len() == widest)
        .collect();

    (0..widest)
        .map(|index| {
            let column: Vec<&ParamDecl> = candidates.iter().map(|p| &p[index]).collect();
            let names: BTreeSet<&str> = column.iter().map(|p| p.name.as_str()).collect();
            let name = names
                .iter()
                .find(|n| n.starts_with("arg"))
                .or_else(|| names.iter().next())
                .copied()
                .unwrap_or("arg");
            let annotations: BTreeSet<&TypeExpr> =
                column.iter().filter_map(|p| p.annotation.as_ref()).collect();
            let annotation = if annotations.is_empty() {
                None
            } else {
                Some(TypeExpr::union(annotations.into_iter().cloned()))
            };
            let mut param = ParamDecl::new(name, annotation);
            param.default = column.iter().find_map(|p| p.default.clone());
            param
        })
        .collect()
}

/// Adds an aggregator interface for every group of numbered partials.
///
/// A digit-free name that is already declared is left alone.
pub fn aggregate(registry: &InterfaceRegistry) -> InterfaceRegistry {
    let numbered = registry
        .names()
        .filter(|n| n.chars().any(|c| c.is_ascii_digit()))
        .cloned();
    let mut out = registry.clone();
    for (base, members) in groups_by_base(numbered) {
        if out.contains(&base) {
            debug!(interface = %base, "aggregator name taken, skipped");
            continue;
        }
        let mut decl = InterfaceDecl::new(&base);
        decl.bases = members;
        out.replace(decl);
    }
    out
}
