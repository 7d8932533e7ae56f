//! # The Forge: Cross-File Interface Deduplication
//!
//! **Role**: Runs once after every file is resolved. Interfaces synthesized
//! at different call sites (often in different files, by different workers)
//! frequently have the same shape under different numeric names. The forge
//! collapses them and rewrites every reference project-wide.
//!
//! **Flow**:
//! 1. **Renumber**: suffixes handed out during the run are put in
//!    (file rank, allocation order) order so the result does not depend on
//!    which worker finished first.
//! 2. **Deduplicate**: interfaces are grouped by a BLAKE3 fingerprint of
//!    their shape (members and bases, name excluded). The member with the
//!    smallest suffix represents its group. Renaming references can make
//!    two more interfaces identical, so grouping repeats to a fixpoint.
//! 3. **Present**: `partial` keeps one interface per shape, `combined`
//!    merges interfaces sharing a base name (see [`presentation`]), `both`
//!    keeps the partials and adds one aggregator per base name.
//! 4. **Rewrite** ([`rewrite`]): registry imports and annotations of every
//!    file follow the composed rename map.

pub mod presentation;
pub mod rewrite;

use anatomist::AnatomistError;
use common::{suffix_key, InterfaceDecl, InterfaceRegistry, Presentation, RegistryError};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Errors from deduplication and reference rewriting.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("registry failure: {0}")]
    Registry(#[from] RegistryError),

    #[error("source failure: {0}")]
    Anatomist(#[from] AnatomistError),

    #[error("rename matcher: {0}")]
    Matcher(#[from] aho_corasick::BuildError),

    /// A rename points at a name the final registry does not declare.
    #[error("inconsistent rename: '{name}' -> '{target}' has no declaration")]
    InconsistentRename { name: String, target: String },
}

/// Old name -> new name. Identity entries are never stored.
pub type RenameMap = BTreeMap<String, String>;

/// Computes the structural fingerprint of an interface.
///
/// Hashes [`InterfaceDecl::shape`], so the interface's own name does not
/// take part but the names it references do.
pub fn fingerprint(decl: &InterfaceDecl) -> u64 {
    common::content_hash(&decl.shape())
}

/// Interfaces sharing one fingerprint.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// The shared structural fingerprint.
    pub hash: u64,
    /// Member names, smallest suffix first.
    pub members: Vec<String>,
}

impl DuplicateGroup {
    /// Returns the number of duplicate members in this group.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if this group has no members (should never happen in practice).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member every other member is renamed to.
    pub fn canonical(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }
}

/// Groups of two or more structurally identical interfaces.
pub fn duplicate_groups(registry: &InterfaceRegistry) -> Vec<DuplicateGroup> {
    let mut by_hash: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for decl in registry.iter() {
        by_hash
            .entry(fingerprint(decl))
            .or_default()
            .push(decl.name.clone());
    }
    by_hash
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(hash, mut members)| {
            members.sort_by_key(|m| suffix_key(m));
            DuplicateGroup { hash, members }
        })
        .collect()
}

/// Renames declarations and every reference to them.
///
/// Declarations whose new name is already taken are dropped; callers only
/// do that when the two shapes are known to agree.
pub fn apply_renames(registry: &InterfaceRegistry, renames: &RenameMap) -> InterfaceRegistry {
    let mut renamed: BTreeMap<String, InterfaceDecl> = BTreeMap::new();
    for decl in registry.iter() {
        let mut new = decl.rename_references(renames);
        if let Some(name) = renames.get(&decl.name) {
            new.name = name.clone();
        }
        // An untouched declaration wins over one renamed onto its name.
        if renamed.contains_key(&new.name) && renames.contains_key(&decl.name) {
            continue;
        }
        renamed.insert(new.name.clone(), new);
    }
    let mut out = InterfaceRegistry::from_decls(renamed.into_values());
    for line in registry.extra_imports() {
        out.add_import(line.clone());
    }
    out
}

/// `first` followed by `then`: every key ends up at its final name.
pub fn compose(first: &RenameMap, then: &RenameMap) -> RenameMap {
    let mut out: RenameMap = first
        .iter()
        .map(|(old, mid)| (old.clone(), then.get(mid).unwrap_or(mid).clone()))
        .collect();
    for (old, new) in then {
        out.entry(old.clone()).or_insert_with(|| new.clone());
    }
    out.retain(|old, new| old != new);
    out
}

/// Collapses structurally identical interfaces until none are left.
///
/// Each round renames every group onto its smallest-suffixed member; the
/// rounds stop when a pass finds no duplicate group.
pub fn deduplicate(registry: &InterfaceRegistry) -> (InterfaceRegistry, RenameMap) {
    let mut current = registry.clone();
    let mut renames = RenameMap::new();
    let mut round = 0;
    loop {
        let groups = duplicate_groups(&current);
        if groups.is_empty() {
            break;
        }
        round += 1;
        let mut step = RenameMap::new();
        for group in &groups {
            let Some(canonical) = group.canonical() else {
                continue;
            };
            for member in &group.members[1..] {
                step.insert(member.clone(), canonical.to_string());
            }
        }
        debug!(round, groups = groups.len(), collapsed = step.len(), "dedup round");
        current = apply_renames(&current, &step);
        renames = compose(&renames, &step);
    }
    (current, renames)
}

/// Checks that every rename lands on a declared interface.
///
/// # Errors
/// [`ForgeError::InconsistentRename`] for the first dangling target.
pub fn check_renames(registry: &InterfaceRegistry, renames: &RenameMap) -> Result<(), ForgeError> {
    for (name, target) in renames {
        if !registry.contains(target) {
            return Err(ForgeError::InconsistentRename {
                name: name.clone(),
                target: target.clone(),
            });
        }
    }
    Ok(())
}

/// The registry after all forge passes, and how old names map onto it.
#[derive(Debug, Clone)]
pub struct ForgeOutcome {
    pub registry: InterfaceRegistry,
    pub renames: RenameMap,
}

/// Renumbers, deduplicates and applies the presentation mode.
///
/// `renumbering` is the run's suffix renumbering (see
/// `NameCounters::renumbering`); entries for names that never reached the
/// registry are ignored.
///
/// # Errors
/// [`ForgeError::InconsistentRename`] when the composed rename map points
/// at a name the final registry lacks.
pub fn finalize(
    registry: &InterfaceRegistry,
    renumbering: &RenameMap,
    presentation: Presentation,
) -> Result<ForgeOutcome, ForgeError> {
    let renumbering: RenameMap = renumbering
        .iter()
        .filter(|(old, _)| registry.contains(old))
        .map(|(old, new)| (old.clone(), new.clone()))
        .collect();
    let renumbered = apply_renames(registry, &renumbering);

    let (deduplicated, collapsed) = deduplicate(&renumbered);
    let mut renames = compose(&renumbering, &collapsed);

    let presented = match presentation {
        Presentation::Partial => deduplicated,
        Presentation::Combined => {
            let (combined, merged) = presentation::combine(&deduplicated);
            renames = compose(&renames, &merged);
            combined
        }
        Presentation::Both => presentation::aggregate(&deduplicated),
    };
    check_renames(&presented, &renames)?;
    info!(
        interfaces = presented.len(),
        before = registry.len(),
        renames = renames.len(),
        ?presentation,
        "registry finalized"
    );
    Ok(ForgeOutcome {
        registry: presented,
        renames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Member, TypeExpr};
    use pretty_assertions::assert_eq;

    fn decl(name: &str, members: &[(&str, &str)]) -> InterfaceDecl {
        let mut d = InterfaceDecl::new(name);
        for (member, ty) in members {
            d.members
                .insert(member.to_string(), Member::Field(TypeExpr::parse(ty)));
        }
        d
    }

    #[test]
    fn test_fingerprint_ignores_own_name() {
        let a = decl("Message1", &[("content", "str")]);
        let b = decl("Message7", &[("content", "str")]);
        let c = decl("Message2", &[("content", "int")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_canonical_is_smallest_suffix() {
        let registry = InterfaceRegistry::from_decls([
            decl("Message10", &[("content", "str")]),
            decl("Message2", &[("content", "str")]),
            decl("Role1", &[("content", "int")]),
        ]);
        let groups = duplicate_groups(&registry);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].canonical(), Some("Message2"));
    }

    #[test]
    fn test_dedup_reaches_fixpoint_through_references() {
        // Content1/Content2 collapse first; only then do Message1/Message2 match.
        let registry = InterfaceRegistry::from_decls([
            decl("Content1", &[("text", "str")]),
            decl("Content2", &[("text", "str")]),
            decl("Message1", &[("content", "Content1")]),
            decl("Message2", &[("content", "Content2")]),
        ]);
        let (deduplicated, renames) = deduplicate(&registry);
        assert_eq!(
            deduplicated.names().cloned().collect::<Vec<_>>(),
            vec!["Content1", "Message1"]
        );
        assert_eq!(renames["Content2"], "Content1");
        assert_eq!(renames["Message2"], "Message1");
        check_renames(&deduplicated, &renames).unwrap();
    }

    #[test]
    fn test_compose_chains_and_drops_identity() {
        let first = RenameMap::from([
            ("A3".to_string(), "A2".to_string()),
            ("A2".to_string(), "A1".to_string()),
        ]);
        let then = RenameMap::from([("A2".to_string(), "A1".to_string())]);
        let composed = compose(&first, &then);
        assert_eq!(composed["A3"], "A1");
        assert_eq!(composed["A2"], "A1");

        let back = RenameMap::from([("A1".to_string(), "A3".to_string())]);
        let undone = compose(&RenameMap::from([("A3".to_string(), "A1".to_string())]), &back);
        assert!(!undone.contains_key("A3"));
    }

    #[test]
    fn test_finalize_renumbers_before_dedup() {
        // Worker order allocated Message2 to rank 0 and Message1 to rank 1.
        let registry = InterfaceRegistry::from_decls([
            decl("Message1", &[("role", "str")]),
            decl("Message2", &[("content", "str")]),
        ]);
        let renumbering = RenameMap::from([
            ("Message1".to_string(), "Message2".to_string()),
            ("Message2".to_string(), "Message1".to_string()),
            ("Ghost3".to_string(), "Ghost1".to_string()),
        ]);
        let outcome = finalize(&registry, &renumbering, Presentation::Partial).unwrap();
        assert_eq!(
            outcome.registry.get("Message1").map(|d| d.field_names()),
            Some(["content".to_string()].into())
        );
        assert!(!outcome.renames.contains_key("Ghost3"));
    }

    #[test]
    fn test_identical_interfaces_across_files_share_one_name() {
        use crate::rewrite::Rewriter;
        use anatomist::ParserHost;
        use std::fs;

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(
            &a,
            "from interfaces.interfaces import Message1\ndef f(message: Message1):\n    return message.content\n",
        )
        .unwrap();
        fs::write(
            &b,
            "from interfaces.interfaces import Message2\ndef g(message: Message2):\n    print(message.content)\n",
        )
        .unwrap();
        let registry = InterfaceRegistry::from_decls([
            decl("Message1", &[("content", "str")]),
            decl("Message2", &[("content", "str")]),
        ]);

        let outcome = finalize(&registry, &RenameMap::new(), Presentation::Partial).unwrap();
        assert_eq!(outcome.registry.len(), 1);
        assert!(outcome.registry.contains("Message1"));

        let rewriter = Rewriter::new("interfaces.interfaces", &outcome.renames).unwrap();
        let mut host = ParserHost::new().unwrap();
        let changed = rewriter
            .rewrite_files(&mut host, &[a.clone(), b.clone()])
            .unwrap();
        assert_eq!(changed, vec![b.clone()]);
        assert_eq!(
            fs::read_to_string(&b).unwrap(),
            "from interfaces.interfaces import Message1\ndef g(message: Message1):\n    print(message.content)\n"
        );
        assert!(fs::read_to_string(&a).unwrap().contains("message: Message1"));
    }

    #[test]
    fn test_combined_presentation_renames_to_base() {
        let registry = InterfaceRegistry::from_decls([
            decl("Message1", &[("content", "str")]),
            decl("Message2", &[("role", "str")]),
        ]);
        let outcome = finalize(&registry, &RenameMap::new(), Presentation::Combined).unwrap();
        assert_eq!(
            outcome.registry.names().cloned().collect::<Vec<_>>(),
            vec!["Message"]
        );
        assert_eq!(outcome.renames["Message1"], "Message");
        assert_eq!(outcome.renames["Message2"], "Message");
    }

    #[test]
    fn test_dangling_rename_is_fatal() {
        let registry = InterfaceRegistry::from_decls([decl("Message1", &[("content", "str")])]);
        let renames = RenameMap::from([("Message2".to_string(), "Message9".to_string())]);
        assert!(matches!(
            check_renames(&registry, &renames),
            Err(ForgeError::InconsistentRename { .. })
        ));
    }
}
