//! # Import Graph
//!
//! Intra-project import edges between the files being processed, and the
//! dependency-first order in which they are annotated. An edge runs from a
//! dependency to the file that imports it.

use crate::imports::resolve_import;
use crate::{AnatomistError, ImportStmt};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Statistics about the import graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub file_count: usize,
    pub edge_count: usize,
}

/// Import edges between project files.
#[derive(Debug, Default)]
pub struct ImportGraph {
    graph: DiGraph<PathBuf, ()>,
    index: HashMap<PathBuf, NodeIndex>,
}

impl ImportGraph {
    /// Builds the graph from each file's module-level imports.
    ///
    /// Files are added in sorted path order so node indices, and with them
    /// the processing order, do not depend on discovery order. Imports that
    /// resolve outside `files` are ignored.
    pub fn build(project_root: &Path, files: &[(PathBuf, Vec<ImportStmt>)]) -> Self {
        let mut sorted: Vec<&(PathBuf, Vec<ImportStmt>)> = files.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut graph = ImportGraph::default();
        for (path, _) in &sorted {
            let node = graph.graph.add_node(path.clone());
            graph.index.insert(path.clone(), node);
        }

        for (path, imports) in &sorted {
            let importer = graph.index[path];
            let mut dependencies = BTreeSet::new();
            for stmt in imports {
                for target in resolve_statement(path, stmt, project_root) {
                    if let Some(&dep) = graph.index.get(&target) {
                        if dep != importer {
                            dependencies.insert(dep);
                        }
                    }
                }
            }
            for dep in dependencies {
                graph.graph.add_edge(dep, importer, ());
            }
        }
        debug!(stats = ?graph.stats(), "import graph built");
        graph
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            file_count: self.graph.node_count(),
            edge_count: self.graph.edge_count(),
        }
    }

    /// All files, in sorted order.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.graph.node_weights()
    }

    /// Files `file` imports.
    pub fn dependencies(&self, file: &Path) -> Vec<&PathBuf> {
        self.neighbors(file, Direction::Incoming)
    }

    /// Files importing `file`.
    pub fn dependents(&self, file: &Path) -> Vec<&PathBuf> {
        self.neighbors(file, Direction::Outgoing)
    }

    fn neighbors(&self, file: &Path, direction: Direction) -> Vec<&PathBuf> {
        let Some(&node) = self.index.get(file) else {
            return Vec::new();
        };
        let mut out: Vec<&PathBuf> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| &self.graph[n])
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Dependency-first order (Kahn's algorithm). Among files that are ready
    /// at the same time the smallest path goes first.
    ///
    /// # Errors
    /// [`AnatomistError::ImportCycle`] naming every file left unordered.
    pub fn topological_order(&self) -> Result<Vec<PathBuf>, AnatomistError> {
        let mut pending: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut ready: BTreeSet<NodeIndex> = pending
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&n, _)| n)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(node) = ready.pop_first() {
            pending.remove(&node);
            order.push(self.graph[node].clone());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(count) = pending.get_mut(&next) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(next);
                    }
                }
            }
        }

        if !pending.is_empty() {
            let mut files: Vec<String> = pending
                .keys()
                .map(|n| self.graph[*n].display().to_string())
                .collect();
            files.sort();
            return Err(AnatomistError::ImportCycle { files });
        }
        Ok(order)
    }
}

/// Files one statement loads. For `from pkg import name` the submodule
/// `pkg.name` wins when it exists; otherwise the statement depends on `pkg`.
fn resolve_statement(file: &Path, stmt: &ImportStmt, root: &Path) -> Vec<PathBuf> {
    if !stmt.is_from() {
        return stmt
            .names
            .iter()
            .filter_map(|n| resolve_import(file, &n.name, root))
            .collect();
    }
    if stmt.module == "__future__" {
        return Vec::new();
    }
    let mut targets = Vec::new();
    let mut needs_module = stmt.wildcard;
    for name in &stmt.names {
        let submodule = if stmt.module.ends_with('.') {
            format!("{}{}", stmt.module, name.name)
        } else {
            format!("{}.{}", stmt.module, name.name)
        };
        match resolve_import(file, &submodule, root) {
            Some(target) => targets.push(target),
            None => needs_module = true,
        }
    }
    if needs_module {
        targets.extend(resolve_import(file, &stmt.module, root));
    }
    targets
}
