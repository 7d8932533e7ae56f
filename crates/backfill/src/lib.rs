//! # Backfill: Declaring Satisfied Interfaces
//!
//! **Role**: After deduplication, existing classes that already provide
//! everything a registry interface asks for get that interface added as a
//! base class. Nothing else in the class changes.
//!
//! **Flow** (per file, per top-level class, per interface):
//! 1. **Filter**: the class's members, collected through local, builtin,
//!    registry and imported bases ([`members`]), must cover the interface's
//!    methods and fields. Digit-free interfaces are tried first, and once
//!    one is accepted its numbered partials are skipped.
//! 2. **Speculate**: the base is inserted into the class header and a probe
//!    is assembled from the registry header, the interface declarations, the
//!    modified file and a `ClassName()` instantiation.
//! 3. **Validate**: the relation is rejected when the oracle reports an
//!    abstract-class instantiation, a field type incompatible with the base
//!    class, or a method signature incompatible with the supertype.
//!
//! **Design**:
//! - Rejections are memoized on (class source fingerprint, interface shape
//!   fingerprint) for the rest of the run, so every pair is probed at most
//!   once no matter how many files share the class text.
//! - Classes already inheriting an interface are left alone, which keeps a
//!   second run a no-op.

pub mod members;

use anatomist::edits::{add_base_class, apply_edits, insert_imports, remove_imports_of, rewrite_import};
use anatomist::{AnatomistError, ClassInfo, ImportedName, ParserHost, SourceModel};
use catalog::Catalog;
use common::registry::REGISTRY_HEADER;
use common::{content_hash, strip_digits, InterfaceRegistry, Unbound};
use members::{interface_members, MemberCollector, MemberSet};
use oracle::{CheckMode, Diagnostic, Oracle, OracleError};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Errors from the backfill pass.
#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("oracle failure: {0}")]
    Oracle(#[from] OracleError),

    #[error("source failure: {0}")]
    Anatomist(#[from] AnatomistError),
}

/// Settings shared by every file of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillConfig {
    /// Dotted module path of the registry file.
    pub registry_module: String,
    /// Root that absolute imports resolve against.
    pub project_root: PathBuf,
    pub mode: CheckMode,
}

/// Why the oracle refused a speculative base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    AbstractInstantiation,
    IncompatibleField,
    IncompatibleSignature,
}

/// Classifies the probe diagnostics of `class` inheriting from any of
/// `supertypes`. `None` means the relation holds.
pub fn rejection(class: &str, supertypes: &BTreeSet<String>, diagnostics: &[Diagnostic]) -> Option<Rejection> {
    let abstract_marker = format!("Cannot instantiate abstract class \"{class}\" with abstract attribute");
    diagnostics.iter().find_map(|d| {
        let message = d.message.as_str();
        if message.starts_with(&abstract_marker) {
            return Some(Rejection::AbstractInstantiation);
        }
        let names_supertype = |marker: &str| {
            supertypes
                .iter()
                .any(|s| message.contains(&format!("{marker} \"{s}\"")))
        };
        if message.starts_with("Incompatible types in assignment (expression has type ")
            && names_supertype("base class")
        {
            return Some(Rejection::IncompatibleField);
        }
        if message.starts_with("Signature of ") && names_supertype("incompatible with supertype") {
            return Some(Rejection::IncompatibleSignature);
        }
        None
    })
}

/// Adds satisfied registry interfaces as base classes.
pub struct Backfill<'a> {
    oracle: &'a dyn Oracle,
    catalog: &'a Catalog,
    registry: &'a InterfaceRegistry,
    config: &'a BackfillConfig,
    /// Interfaces in trial order: digit-free names first.
    order: Vec<String>,
    rejected: Mutex<HashSet<(u64, u64)>>,
}

impl<'a> Backfill<'a> {
    pub fn new(
        oracle: &'a dyn Oracle,
        catalog: &'a Catalog,
        registry: &'a InterfaceRegistry,
        config: &'a BackfillConfig,
    ) -> Self {
        let mut order: Vec<String> = registry.names().cloned().collect();
        order.sort_by_key(|n| (n.chars().any(|c| c.is_ascii_digit()), n.clone()));
        Self {
            oracle,
            catalog,
            registry,
            config,
            order,
            rejected: Mutex::new(HashSet::new()),
        }
    }

    /// Backfills `path` in place. Returns whether it changed.
    ///
    /// # Errors
    /// I/O, parse and oracle failures.
    pub fn backfill_file(&self, path: &Path) -> Result<bool, BackfillError> {
        let source = std::fs::read_to_string(path)?;
        match self.backfill_source(&source, Some(path))? {
            Some(updated) => {
                std::fs::write(path, updated)?;
                info!(path = %path.display(), "interfaces backfilled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the updated source, or `None` when no class gained a base.
    ///
    /// # Errors
    /// Parse and oracle failures.
    pub fn backfill_source(&self, source: &str, path: Option<&Path>) -> Result<Option<String>, BackfillError> {
        if self.registry.is_empty() {
            return Ok(None);
        }
        let mut host = ParserHost::new()?;
        let model = host.model(source)?;
        let classes: Vec<&ClassInfo> = model
            .classes
            .iter()
            .filter(|c| is_top_level(c, source))
            .collect();
        if classes.is_empty() {
            return Ok(None);
        }

        let module = self.config.registry_module.as_str();
        let imported: BTreeMap<String, String> = model
            .imports_from(module)
            .flat_map(|s| s.names.iter())
            .map(|n| (n.binding().to_string(), n.name.clone()))
            .collect();
        let mut taken = model.local_names();
        let mut bindings: BTreeMap<String, String> = imported
            .iter()
            .map(|(binding, name)| (name.clone(), binding.clone()))
            .collect();

        let mut collector = MemberCollector::new(
            ParserHost::new()?,
            self.catalog,
            self.registry,
            module,
            &self.config.project_root,
        );
        let provided: Vec<(String, MemberSet, u64)> = classes
            .iter()
            .map(|c| {
                let members = collector.collect(c, &model, path);
                (c.name.clone(), members, content_hash(c.span.text(source)))
            })
            .collect();

        let mut current = source.to_string();
        let mut accepted: Vec<(String, String)> = Vec::new();
        for (class_name, members, class_hash) in &provided {
            let declared: BTreeSet<&str> = classes
                .iter()
                .find(|c| c.name == *class_name)
                .map(|c| {
                    c.bases
                        .iter()
                        .filter_map(|b| imported.get(b.as_str()))
                        .map(String::as_str)
                        .collect()
                })
                .unwrap_or_default();
            let mut families: BTreeSet<String> = declared.iter().map(|n| strip_digits(n)).collect();

            for interface in &self.order {
                if declared.contains(interface.as_str()) || families.contains(&strip_digits(interface)) {
                    continue;
                }
                let required = interface_members(self.registry, interface);
                if required.is_empty() || !members.covers(&required) {
                    continue;
                }
                let key = (*class_hash, self.interface_hash(interface));
                if self.lock_rejected().contains(&key) {
                    continue;
                }

                let binding = match bindings.get(interface) {
                    Some(binding) => binding.clone(),
                    None => {
                        let mut binding = interface.clone();
                        while taken.contains(&binding) {
                            binding.push('_');
                        }
                        binding
                    }
                };
                let Some(trial) = self.trial(&mut host, &current, class_name, interface, &binding, &bindings)? else {
                    continue;
                };
                if let Some(reason) = trial.rejection {
                    debug!(class = %class_name, %interface, ?reason, "base rejected");
                    self.lock_rejected().insert(key);
                    continue;
                }
                debug!(class = %class_name, %interface, "base accepted");
                current = trial.updated;
                families.insert(strip_digits(interface));
                if !bindings.contains_key(interface) {
                    taken.insert(binding.clone());
                    bindings.insert(interface.clone(), binding);
                }
                accepted.push((class_name.clone(), interface.clone()));
            }
        }
        if accepted.is_empty() {
            return Ok(None);
        }

        let new_imports: Vec<ImportedName> = bindings
            .iter()
            .filter(|(name, _)| accepted.iter().any(|(_, i)| i == *name))
            .filter(|(_, binding)| !imported.contains_key(*binding))
            .map(|(name, binding)| {
                let alias = (binding != name).then(|| binding.clone());
                ImportedName::new(name.clone(), alias)
            })
            .collect();
        Ok(Some(self.add_imports(&mut host, &current, &new_imports)?))
    }

    /// Probes `class_name` with `binding` appended to its bases.
    fn trial(
        &self,
        host: &mut ParserHost,
        source: &str,
        class_name: &str,
        interface: &str,
        binding: &str,
        bindings: &BTreeMap<String, String>,
    ) -> Result<Option<Trial>, BackfillError> {
        let model = host.model(source)?;
        let Some(class) = model.classes.iter().find(|c| c.name == class_name && is_top_level(c, source)) else {
            return Ok(None);
        };
        let base = add_base_class(class, binding);
        let updated = apply_edits(source, vec![base.clone()])?;

        let mut body_edits = remove_imports_of(&model, &self.config.registry_module);
        body_edits.push(base);
        let body = apply_edits(source, body_edits)?;

        let mut roots: BTreeSet<&str> = bindings.keys().map(String::as_str).collect();
        roots.insert(interface);
        let mut probe: String = REGISTRY_HEADER.iter().map(|l| format!("{l}\n")).collect();
        for line in self.registry.extra_imports() {
            probe.push_str(line);
            probe.push('\n');
        }
        for decl in self.registry.closure(roots.iter().copied()) {
            probe.push_str(&decl.render(&Unbound));
        }
        let mut aliases = bindings.clone();
        aliases.insert(interface.to_string(), binding.to_string());
        for (name, alias) in &aliases {
            if alias != name {
                probe.push_str(&format!("{alias} = {name}\n"));
            }
        }
        probe.push_str(&body);
        if !probe.ends_with('\n') {
            probe.push('\n');
        }
        probe.push_str(&format!("{class_name}()\n"));

        let diagnostics = self.oracle.check(&probe, self.config.mode)?;
        let mut supertypes: BTreeSet<String> = self
            .registry
            .closure([interface])
            .into_iter()
            .map(|d| d.name.clone())
            .collect();
        supertypes.insert(binding.to_string());
        Ok(Some(Trial {
            updated,
            rejection: rejection(class_name, &supertypes, &diagnostics),
        }))
    }

    fn add_imports(
        &self,
        host: &mut ParserHost,
        source: &str,
        names: &[ImportedName],
    ) -> Result<String, BackfillError> {
        if names.is_empty() {
            return Ok(source.to_string());
        }
        let module = self.config.registry_module.as_str();
        let model: SourceModel = host.model(source)?;
        let edit = match model.imports_from(module).find(|s| !s.wildcard) {
            Some(stmt) => {
                let mut all = stmt.names.clone();
                all.extend(names.iter().cloned());
                Some(rewrite_import(stmt, &all))
            }
            None => {
                let rendered: Vec<String> = names.iter().map(ImportedName::render).collect();
                insert_imports(&model, &[format!("from {module} import {}", rendered.join(", "))])
            }
        };
        Ok(apply_edits(source, edit.into_iter().collect())?)
    }

    fn interface_hash(&self, name: &str) -> u64 {
        self.registry
            .get(name)
            .map_or(0, |decl| content_hash(&decl.shape()))
    }

    fn lock_rejected(&self) -> MutexGuard<'_, HashSet<(u64, u64)>> {
        self.rejected.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct Trial {
    /// The file with the base inserted.
    updated: String,
    rejection: Option<Rejection>,
}

/// `true` for classes defined at module level.
fn is_top_level(class: &ClassInfo, source: &str) -> bool {
    class.span.start == 0 || source[..class.span.start].ends_with('\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{InterfaceDecl, Member, ParamDecl, TypeExpr};
    use oracle::{line_of, ScriptedOracle};
    use pretty_assertions::assert_eq;

    const SOURCE: &str = "class Message:\n    def __init__(self, content):\n        self.content = content\n\n    def send(self, to):\n        pass\n\n\nclass Draft:\n    def __init__(self, content):\n        self.content = content\n";

    fn message1() -> InterfaceDecl {
        let mut decl = InterfaceDecl::new("Message1");
        decl.members
            .insert("content".into(), Member::Field(TypeExpr::named("str")));
        decl.members.insert(
            "send".into(),
            Member::Method(vec![ParamDecl::new("arg0", Some(TypeExpr::named("str")))]),
        );
        decl
    }

    fn config() -> BackfillConfig {
        BackfillConfig {
            registry_module: "interfaces.interfaces".into(),
            project_root: PathBuf::from("/nonexistent"),
            mode: CheckMode::Strict,
        }
    }

    #[test]
    fn test_satisfying_class_gains_base_and_other_is_untouched() {
        let oracle = ScriptedOracle::silent();
        let catalog = Catalog::builtin();
        let registry = InterfaceRegistry::from_decls([message1()]);
        let config = config();
        let backfill = Backfill::new(&oracle, &catalog, &registry, &config);

        let updated = backfill.backfill_source(SOURCE, None).unwrap();
        assert_eq!(
            updated.as_deref(),
            Some(
                "from interfaces.interfaces import Message1\n\
                 class Message(Message1):\n    def __init__(self, content):\n        self.content = content\n\n    def send(self, to):\n        pass\n\n\n\
                 class Draft:\n    def __init__(self, content):\n        self.content = content\n"
            )
        );
        assert_eq!(oracle.calls(), 1);
        let probe = &oracle.probes()[0];
        assert!(probe.starts_with("from __future__ import annotations\n"));
        assert!(probe.contains("class Message1(Protocol):"));
        assert!(probe.ends_with("Message()\n"));

        // Already declared: nothing left to do.
        let again = backfill.backfill_source(updated.as_deref().unwrap_or(""), None).unwrap();
        assert_eq!(again, None);
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn test_rejected_pair_is_not_probed_again() {
        let oracle = ScriptedOracle::new(|src| {
            vec![Diagnostic::error(
                line_of(src, "def send"),
                "Signature of \"send\" incompatible with supertype \"Message1\"",
            )]
        });
        let catalog = Catalog::builtin();
        let registry = InterfaceRegistry::from_decls([message1()]);
        let config = config();
        let backfill = Backfill::new(&oracle, &catalog, &registry, &config);

        assert_eq!(backfill.backfill_source(SOURCE, None).unwrap(), None);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(backfill.backfill_source(SOURCE, None).unwrap(), None);
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn test_aggregator_first_and_partials_skipped() {
        let oracle = ScriptedOracle::silent();
        let catalog = Catalog::builtin();
        let mut aggregate = InterfaceDecl::new("Message");
        aggregate.bases = vec!["Message1".into()];
        let registry = InterfaceRegistry::from_decls([message1(), aggregate]);
        let config = config();
        let backfill = Backfill::new(&oracle, &catalog, &registry, &config);

        let src = "class Letter:\n    content = ''\n\n    def send(self, to):\n        pass\n";
        let updated = backfill.backfill_source(src, None).unwrap();
        assert_eq!(
            updated.as_deref(),
            Some(
                "from interfaces.interfaces import Message\n\
                 class Letter(Message):\n    content = ''\n\n    def send(self, to):\n        pass\n"
            )
        );
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn test_local_name_collision_is_aliased() {
        let oracle = ScriptedOracle::silent();
        let catalog = Catalog::builtin();
        let mut decl = message1();
        decl.name = "Message".into();
        let registry = InterfaceRegistry::from_decls([decl]);
        let config = config();
        let backfill = Backfill::new(&oracle, &catalog, &registry, &config);

        let updated = backfill.backfill_source(SOURCE, None).unwrap().unwrap_or_default();
        assert!(updated.starts_with("from interfaces.interfaces import Message as Message_\n"));
        assert!(updated.contains("class Message(Message_):"));
        assert!(oracle.probes()[0].contains("Message_ = Message\n"));
    }

    #[test]
    fn test_rejection_classifier() {
        let supertypes = BTreeSet::from(["Message1".to_string()]);
        let diag = |m: &str| vec![Diagnostic::error(1, m)];
        assert_eq!(
            rejection(
                "Letter",
                &supertypes,
                &diag("Cannot instantiate abstract class \"Letter\" with abstract attribute \"send\"")
            ),
            Some(Rejection::AbstractInstantiation)
        );
        assert_eq!(
            rejection(
                "Letter",
                &supertypes,
                &diag("Incompatible types in assignment (expression has type \"int\", base class \"Message1\" defined the type as \"str\")")
            ),
            Some(Rejection::IncompatibleField)
        );
        assert_eq!(
            rejection("Letter", &supertypes, &diag("Name \"x\" is not defined")),
            None
        );
    }
}
