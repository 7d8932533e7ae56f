//! Resolving a whole file: one session per function, then registration,
//! annotation and import edits.

use crate::hints::{import_lines, ImportPlan};
use crate::probe::{Chunk, ProbeTemplate};
use crate::session::{Context, Session, SessionResult};
use crate::{ResolveError, ResolverConfig};
use anatomist::edits::{
    annotate_param, apply_edits, insert_imports, remove_imports_of, rewrite_import, AnnotationSite,
};
use anatomist::{FunctionInfo, ImportedName, ParamInfo, ParamKind, ParserHost, SourceModel};
use catalog::Catalog;
use common::{
    interface_stem, suffix_key, InterfaceDecl, InterfaceRegistry, MarkPolicy, NameCounters,
    PlaceholderId, TypeExpr, Unbound,
};
use oracle::Oracle;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Result of resolving one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub original: String,
    pub updated: String,
    pub changed: bool,
    /// Registry interfaces the new annotations refer to.
    pub interfaces: BTreeSet<String>,
}

/// Resolves files against shared collaborators. Cheap to build per file.
pub struct FileResolver<'a> {
    pub oracle: &'a dyn Oracle,
    pub catalog: &'a Catalog,
    pub counters: &'a NameCounters,
    pub registry: &'a Mutex<InterfaceRegistry>,
    /// Registry module path; saved whenever a resolved function adds to it.
    pub registry_path: Option<&'a Path>,
    pub config: &'a ResolverConfig,
}

impl<'a> FileResolver<'a> {
    /// Reads, resolves and (when something changed) rewrites `path`.
    ///
    /// # Errors
    /// I/O failures and every [`ResolveError`] from the functions inside.
    pub fn resolve_file(&self, path: &Path, rank: usize) -> Result<FileOutcome, ResolveError> {
        let source = std::fs::read_to_string(path)?;
        let outcome = self.resolve_source(&source, rank)?;
        if outcome.changed {
            std::fs::write(path, &outcome.updated)?;
        }
        info!(
            path = %path.display(),
            changed = outcome.changed,
            interfaces = outcome.interfaces.len(),
            "file resolved"
        );
        Ok(outcome)
    }

    /// Resolves every function of `source`, top to bottom.
    ///
    /// The file is re-parsed before each function so every session sees the
    /// annotations and imports added for the functions before it.
    ///
    /// # Errors
    /// Parse and edit failures, oracle failures and exceeded loop bounds.
    pub fn resolve_source(&self, source: &str, rank: usize) -> Result<FileOutcome, ResolveError> {
        let mut host = ParserHost::new()?;
        let mut current = source.to_string();
        let mut interfaces = BTreeSet::new();

        if self.config.mark != MarkPolicy::None {
            let count = host.model(&current)?.functions.len();
            for index in 0..count {
                let model = host.model(&current)?;
                let Some(function) = model.functions.get(index) else {
                    break;
                };
                if let Some(updated) =
                    self.resolve_function(&model, function, &current, rank, &mut interfaces)?
                {
                    current = updated;
                }
            }
        }

        Ok(FileOutcome {
            changed: current != source,
            original: source.to_string(),
            updated: current,
            interfaces,
        })
    }

    fn resolve_function(
        &self,
        model: &SourceModel,
        function: &FunctionInfo,
        source: &str,
        rank: usize,
        interfaces: &mut BTreeSet<String>,
    ) -> Result<Option<String>, ResolveError> {
        let module = self.config.registry_module.as_str();
        let imported = registry_imports(model, module);
        let targets = select_targets(function, self.config, &imported);
        if targets.is_empty() {
            return Ok(None);
        }
        debug!(function = %function.qualified_name, targets = targets.len(), "resolving");

        let mut sites: Vec<_> = remove_imports_of(model, module)
            .into_iter()
            .map(|edit| (edit.span(), vec![Chunk::Text(edit.replacement)]))
            .collect();
        let mut ids = Vec::with_capacity(targets.len());
        let mut hints = BTreeMap::new();
        for (param, hint) in &targets {
            let stem = interface_stem(&param.name);
            let id = PlaceholderId::numbered(&stem, self.counters.allocate(&stem, rank));
            let site = AnnotationSite::of(param);
            sites.push((
                site.span,
                vec![
                    Chunk::Text(site.prefix.to_string()),
                    Chunk::Slot(id.clone()),
                    Chunk::Text(site.suffix.to_string()),
                ],
            ));
            if let Some(hint) = hint {
                hints.insert(id.clone(), hint.clone());
            }
            ids.push(id);
        }
        let body = ProbeTemplate::from_source(source, sites)?;
        let preamble = preamble(&self.lock_registry(), &imported);

        let ctx = Context {
            oracle: self.oracle,
            catalog: self.catalog,
            counters: self.counters,
            config: self.config,
            rank,
        };
        let mut session = Session::new(
            ctx,
            function.qualified_name.clone(),
            preamble,
            body,
            ids.clone(),
            hints,
        );
        session.run()?;
        let (annotations, known) = self.register(session.finish())?;

        let locals = model.local_names();
        let mut edits = Vec::new();
        let mut plan = ImportPlan::default();
        let mut bindings = BTreeMap::new();
        for ((param, _), id) in targets.iter().zip(&ids) {
            let Some(ty) = annotations.get(id) else {
                continue;
            };
            if ty.is_any() && !self.config.allow_any {
                continue;
            }
            let mut names = BTreeSet::new();
            ty.referenced_names(&mut names);
            names.retain(|n| known.contains(n));
            let local = registry_bindings(&names, &imported, &locals);
            let text = ty.rename(&local).render(&Unbound);
            if param.annotation.as_deref() == Some(text.as_str()) {
                continue;
            }
            edits.push(annotate_param(param, &text));
            plan.add(ty, self.catalog, &|n| known.contains(n));
            interfaces.extend(names);
            bindings.extend(local);
        }
        if edits.is_empty() {
            return Ok(None);
        }

        let mut lines = import_lines(&plan, &locals);
        let new_names: Vec<ImportedName> = plan
            .registry_names
            .iter()
            .filter_map(|name| {
                let binding = bindings.get(name).cloned().unwrap_or_else(|| name.clone());
                if imported.contains_key(&binding) {
                    return None;
                }
                let alias = (binding != *name).then_some(binding);
                Some(ImportedName::new(name.clone(), alias))
            })
            .collect();
        if !new_names.is_empty() {
            match model.imports_from(module).find(|s| !s.wildcard) {
                Some(stmt) => {
                    let mut names = stmt.names.clone();
                    names.extend(new_names);
                    edits.push(rewrite_import(stmt, &names));
                }
                None => {
                    let rendered: Vec<String> = new_names.iter().map(ImportedName::render).collect();
                    lines.push(format!("from {module} import {}", rendered.join(", ")));
                }
            }
        }
        edits.extend(insert_imports(model, &lines));
        Ok(Some(apply_edits(source, edits)?))
    }

    /// Adds the session's interfaces to the registry, reusing registered
    /// ones of the same shape, and saves it.
    ///
    /// Returns the annotations in registry names and the registry names
    /// they may refer to.
    fn register(
        &self,
        result: SessionResult,
    ) -> Result<(BTreeMap<PlaceholderId, TypeExpr>, BTreeSet<String>), ResolveError> {
        let mut registry = self.lock_registry();
        let (renames, kept) = reuse_registered(result.decls, &registry);
        for (name, existing) in &renames {
            self.counters.record_reuse(name, existing);
        }
        let dirty = !kept.is_empty() || !result.external_imports.is_empty();
        for decl in kept {
            registry.insert(decl)?;
        }
        for line in result.external_imports {
            registry.add_import(line);
        }
        if let (true, Some(path)) = (dirty, self.registry_path) {
            registry.save(path)?;
        }

        let annotations: BTreeMap<PlaceholderId, TypeExpr> = result
            .annotations
            .into_iter()
            .map(|(id, ty)| (id, ty.rename(&renames)))
            .collect();
        let mut known = BTreeSet::new();
        for ty in annotations.values() {
            ty.referenced_names(&mut known);
        }
        known.retain(|n| registry.contains(n));
        Ok((annotations, known))
    }

    fn lock_registry(&self) -> MutexGuard<'_, InterfaceRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parameters that receive a placeholder, with their saved hints.
fn select_targets<'m>(
    function: &'m FunctionInfo,
    config: &ResolverConfig,
    imported: &BTreeMap<String, String>,
) -> Vec<(&'m ParamInfo, Option<TypeExpr>)> {
    let skip = usize::from(function.receiver().is_some());
    function
        .params
        .iter()
        .skip(skip)
        .filter(|p| p.kind == ParamKind::Regular)
        .filter_map(|param| {
            let existing = param.annotation.as_deref().map(TypeExpr::parse);
            let hint = if config.keep_hints { existing.clone() } else { None };
            match config.mark {
                MarkPolicy::All => Some((param, hint)),
                MarkPolicy::UnannotatedOnly => existing.is_none().then_some((param, None)),
                MarkPolicy::ExistingInterfaceOnly => {
                    let mut names = BTreeSet::new();
                    existing.as_ref()?.referenced_names(&mut names);
                    names
                        .iter()
                        .any(|n| imported.contains_key(n))
                        .then_some((param, hint))
                }
                MarkPolicy::None => None,
            }
        })
        .collect()
}

/// Registry imports of the file: binding -> registered name.
fn registry_imports(model: &SourceModel, module: &str) -> BTreeMap<String, String> {
    model
        .imports_from(module)
        .flat_map(|stmt| stmt.names.iter())
        .map(|n| (n.binding().to_string(), n.name.clone()))
        .collect()
}

/// The name each registry interface goes by in the file: its existing
/// import binding, `<Name>_` when a local name is in the way, or itself.
fn registry_bindings(
    names: &BTreeSet<String>,
    imported: &BTreeMap<String, String>,
    locals: &BTreeSet<String>,
) -> BTreeMap<String, String> {
    names
        .iter()
        .map(|name| {
            let binding = match imported.iter().find(|(_, original)| *original == name) {
                Some((binding, _)) => binding.clone(),
                None if locals.contains(name) => format!("{name}_"),
                None => name.clone(),
            };
            (name.clone(), binding)
        })
        .collect()
}

/// Probe lines standing in for the file's registry imports: library
/// imports, the imported interfaces with everything they reference, and
/// aliases.
fn preamble(registry: &InterfaceRegistry, imported: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for line in registry.extra_imports() {
        out.push_str(line);
        out.push('\n');
    }
    for decl in registry.closure(imported.values().map(String::as_str)) {
        out.push_str(&decl.render(&Unbound));
    }
    for (binding, name) in imported {
        if binding != name {
            out.push_str(&format!("{binding} = {name}\n"));
        }
    }
    out
}

/// Maps new interfaces onto registered ones of identical shape.
///
/// Repeats until stable: renaming one interface can make another that
/// references it match too. Returns the rename map and the interfaces that
/// stay new, their references already renamed.
fn reuse_registered(
    decls: Vec<InterfaceDecl>,
    registry: &InterfaceRegistry,
) -> (BTreeMap<String, String>, Vec<InterfaceDecl>) {
    let mut by_shape: BTreeMap<String, String> = BTreeMap::new();
    for decl in registry.iter() {
        let shape = decl.shape();
        let better = by_shape
            .get(&shape)
            .is_none_or(|existing| suffix_key(&decl.name) < suffix_key(existing));
        if better {
            by_shape.insert(shape, decl.name.clone());
        }
    }

    let mut renames = BTreeMap::new();
    loop {
        let before = renames.len();
        for decl in &decls {
            if renames.contains_key(&decl.name) {
                continue;
            }
            if let Some(existing) = by_shape.get(&decl.rename_references(&renames).shape()) {
                renames.insert(decl.name.clone(), existing.clone());
            }
        }
        if renames.len() == before {
            break;
        }
    }
    let kept = decls
        .iter()
        .filter(|d| !renames.contains_key(&d.name))
        .map(|d| d.rename_references(&renames))
        .collect();
    (renames, kept)
}
