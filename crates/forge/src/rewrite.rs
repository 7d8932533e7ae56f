//! Propagates registry renames into project files.
//!
//! A file refers to registry interfaces through `from <registry module>
//! import ...` and then by the imported binding inside annotations. Both
//! follow the rename map; when a new name collides with something else the
//! file defines, the import gets an alias with a trailing `_`.

use crate::{ForgeError, RenameMap};
use aho_corasick::AhoCorasick;
use anatomist::edits::{apply_edits, rename_annotation_identifiers, rewrite_import};
use anatomist::{Edit, ImportedName, ParserHost, SourceModel, Span};
use common::{TypeExpr, Unbound};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rewrites sources against one rename map.
pub struct Rewriter<'a> {
    module: &'a str,
    renames: &'a RenameMap,
    /// Matches any old name; files without a hit are skipped unparsed.
    automaton: Option<AhoCorasick>,
}

impl<'a> Rewriter<'a> {
    /// # Errors
    /// Fails when the old-name automaton cannot be built.
    pub fn new(module: &'a str, renames: &'a RenameMap) -> Result<Self, ForgeError> {
        let automaton = if renames.is_empty() {
            None
        } else {
            let patterns: Vec<&str> = renames.keys().map(String::as_str).collect();
            Some(AhoCorasick::new(&patterns)?)
        };
        Ok(Self {
            module,
            renames,
            automaton,
        })
    }

    /// Returns the rewritten source, or `None` when nothing changes.
    ///
    /// # Errors
    /// Propagates parse and edit failures.
    pub fn rewrite_source(
        &self,
        host: &mut ParserHost,
        source: &str,
    ) -> Result<Option<String>, ForgeError> {
        let Some(automaton) = &self.automaton else {
            return Ok(None);
        };
        if !automaton.is_match(source) {
            return Ok(None);
        }
        let model = host.model(source)?;
        let (mut edits, bindings) = self.import_edits(&model);
        if bindings.is_empty() {
            return Ok(None);
        }

        let mut replaced: Vec<Span> = Vec::new();
        for param in model.functions.iter().flat_map(|f| &f.params) {
            let (Some(text), Some(span)) = (&param.annotation, param.annotation_span) else {
                continue;
            };
            let parsed = TypeExpr::parse(text);
            let renamed = parsed.rename(&bindings);
            if renamed != parsed {
                edits.push(Edit::replace(span, renamed.render(&Unbound)));
                replaced.push(span);
            }
        }
        let inside_replaced =
            |e: &Edit| replaced.iter().any(|s| s.start <= e.start && e.end <= s.end);
        edits.extend(
            rename_annotation_identifiers(host, source, &bindings)?
                .into_iter()
                .filter(|e| !inside_replaced(e)),
        );

        let updated = apply_edits(source, edits)?;
        Ok((updated != source).then_some(updated))
    }

    /// Edits for the registry imports and the map from old to new bindings.
    fn import_edits(&self, model: &SourceModel) -> (Vec<Edit>, BTreeMap<String, String>) {
        let registry_bindings: BTreeSet<String> = model
            .imports_from(self.module)
            .flat_map(|i| i.names.iter().map(|n| n.binding().to_string()))
            .collect();
        let taken: BTreeSet<String> = model
            .local_names()
            .into_iter()
            .filter(|n| !registry_bindings.contains(n))
            .collect();

        let mut edits = Vec::new();
        let mut bindings = BTreeMap::new();
        for stmt in model.imports_from(self.module) {
            if stmt.wildcard {
                continue;
            }
            let mut names: Vec<ImportedName> = Vec::new();
            for imported in &stmt.names {
                let Some(new) = self.renames.get(&imported.name) else {
                    if !names.contains(imported) {
                        names.push(imported.clone());
                    }
                    continue;
                };
                let mut binding = new.clone();
                while taken.contains(&binding) {
                    binding.push('_');
                }
                let alias = (binding != *new).then(|| binding.clone());
                let renamed = ImportedName::new(new.clone(), alias);
                if imported.binding() != binding {
                    bindings.insert(imported.binding().to_string(), binding);
                }
                if !names.contains(&renamed) {
                    names.push(renamed);
                }
            }
            if names != stmt.names {
                edits.push(rewrite_import(stmt, &names));
            }
        }
        (edits, bindings)
    }

    /// Rewrites `paths` in place. Returns the files that changed.
    ///
    /// # Errors
    /// Stops at the first unreadable, unparsable or unwritable file.
    pub fn rewrite_files(
        &self,
        host: &mut ParserHost,
        paths: &[PathBuf],
    ) -> Result<Vec<PathBuf>, ForgeError> {
        let mut changed = Vec::new();
        for path in paths {
            if self.rewrite_file(host, path)? {
                changed.push(path.clone());
            }
        }
        Ok(changed)
    }

    fn rewrite_file(&self, host: &mut ParserHost, path: &Path) -> Result<bool, ForgeError> {
        let source = fs::read_to_string(path)?;
        match self.rewrite_source(host, &source)? {
            Some(updated) => {
                fs::write(path, updated)?;
                debug!(file = %path.display(), "registry references rewritten");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MODULE: &str = "interfaces.interfaces";

    fn rewrite(source: &str, renames: &[(&str, &str)]) -> Option<String> {
        let renames: RenameMap = renames
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let rewriter = Rewriter::new(MODULE, &renames).unwrap();
        let mut host = ParserHost::new().unwrap();
        rewriter.rewrite_source(&mut host, source).unwrap()
    }

    #[test]
    fn test_import_and_annotation_follow_rename() {
        let src = "from interfaces.interfaces import Message2\ndef f(m: Message2) -> Message2:\n    return m\n";
        assert_eq!(
            rewrite(src, &[("Message2", "Message1")]).as_deref(),
            Some("from interfaces.interfaces import Message1\ndef f(m: Message1) -> Message1:\n    return m\n")
        );
    }

    #[test]
    fn test_merged_names_collapse_unions_and_imports() {
        let src = "from interfaces.interfaces import Message1, Message2\n\
                   def f(m: Union[Message1, Message2]):\n    pass\n";
        assert_eq!(
            rewrite(src, &[("Message1", "Message"), ("Message2", "Message")]).as_deref(),
            Some("from interfaces.interfaces import Message\ndef f(m: Message):\n    pass\n")
        );
    }

    #[test]
    fn test_collision_with_local_name_gets_alias() {
        let src = "from interfaces.interfaces import Message1\n\
                   class Message:\n    pass\n\
                   def f(m: Message1):\n    pass\n";
        assert_eq!(
            rewrite(src, &[("Message1", "Message")]).as_deref(),
            Some(
                "from interfaces.interfaces import Message as Message_\n\
                 class Message:\n    pass\n\
                 def f(m: Message_):\n    pass\n"
            )
        );
    }

    #[test]
    fn test_swapped_numbers_are_applied_once() {
        let src = "from interfaces.interfaces import Data1, Data2\ndef f(a: Data1, b: Data2):\n    pass\n";
        assert_eq!(
            rewrite(src, &[("Data1", "Data2"), ("Data2", "Data1")]).as_deref(),
            Some("from interfaces.interfaces import Data2, Data1\ndef f(a: Data2, b: Data1):\n    pass\n")
        );
    }

    #[test]
    fn test_unrelated_files_are_untouched() {
        assert_eq!(rewrite("def f(m):\n    pass\n", &[("Message2", "Message1")]), None);
        // Same text, but not imported from the registry.
        assert_eq!(
            rewrite("from other import Message2\ndef f(m: Message2):\n    pass\n", &[("Message2", "Message1")]),
            None
        );
    }
}
