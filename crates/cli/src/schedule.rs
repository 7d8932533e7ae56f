//! Worker pool over the import graph.
//!
//! A file is dispatched once every file it imports has been resolved. Up to
//! `workers` files run at once on blocking threads; each completion unlocks
//! its dependents. Among ready files the lowest topological rank goes first.

use anatomist::graph::ImportGraph;
use anyhow::anyhow;
use catalog::Catalog;
use common::{InterfaceRegistry, NameCounters};
use oracle::Oracle;
use resolver::{FileOutcome, FileResolver, ResolverConfig};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Collaborators every worker shares.
#[derive(Clone)]
pub struct Shared {
    pub oracle: Arc<dyn Oracle>,
    pub catalog: Arc<Catalog>,
    pub counters: Arc<NameCounters>,
    pub registry: Arc<Mutex<InterfaceRegistry>>,
    pub registry_path: Arc<PathBuf>,
    pub config: Arc<ResolverConfig>,
}

impl Shared {
    fn resolve(&self, path: &Path, rank: usize) -> Result<FileOutcome, resolver::ResolveError> {
        let resolver = FileResolver {
            oracle: self.oracle.as_ref(),
            catalog: &self.catalog,
            counters: &self.counters,
            registry: &self.registry,
            registry_path: Some(self.registry_path.as_path()),
            config: &self.config,
        };
        resolver.resolve_file(path, rank)
    }
}

/// Resolves every file of `order` (a topological order of `graph`).
///
/// Returns the outcomes in completion order. After the first failure no new
/// file is started; files already running are drained before the error is
/// returned.
///
/// # Errors
/// The first resolver failure or worker panic.
pub async fn resolve_all(
    shared: Shared,
    graph: &ImportGraph,
    order: &[PathBuf],
    workers: usize,
) -> anyhow::Result<Vec<(PathBuf, FileOutcome)>> {
    let rank: HashMap<&PathBuf, usize> = order.iter().enumerate().map(|(i, p)| (p, i)).collect();
    let mut waiting: HashMap<&PathBuf, usize> = order
        .iter()
        .map(|p| (p, graph.dependencies(p).len()))
        .collect();
    let mut ready: BTreeSet<(usize, &PathBuf)> = waiting
        .iter()
        .filter(|(_, &pending)| pending == 0)
        .map(|(p, _)| (rank[p], *p))
        .collect();

    let mut running = JoinSet::new();
    let mut outcomes = Vec::with_capacity(order.len());
    let mut failure: Option<anyhow::Error> = None;

    loop {
        while failure.is_none() && running.len() < workers.max(1) {
            let Some((file_rank, path)) = ready.pop_first() else {
                break;
            };
            waiting.remove(path);
            debug!(file = %path.display(), rank = file_rank, "dispatched");
            let shared = shared.clone();
            let path = path.clone();
            running.spawn_blocking(move || {
                let outcome = shared.resolve(&path, file_rank);
                (path, outcome)
            });
        }

        let Some(joined) = running.join_next().await else {
            break;
        };
        match joined {
            Ok((path, Ok(outcome))) => {
                for dependent in graph.dependents(&path) {
                    if let Some(pending) = waiting.get_mut(dependent) {
                        *pending -= 1;
                        if *pending == 0 {
                            ready.insert((rank[dependent], dependent));
                        }
                    }
                }
                outcomes.push((path, outcome));
            }
            Ok((path, Err(e))) => {
                error!(file = %path.display(), error = %e, "resolution failed");
                failure.get_or_insert_with(|| {
                    anyhow::Error::new(e).context(format!("resolving {}", path.display()))
                });
            }
            Err(e) => {
                failure.get_or_insert_with(|| anyhow!("resolver worker panicked: {e}"));
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oracle::ScriptedOracle;
    use std::fs;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf, ImportGraph, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        let mut host = anatomist::ParserHost::new().unwrap();
        let mut parsed = Vec::new();
        for (name, source) in files {
            let path = root.join(name);
            fs::write(&path, source).unwrap();
            parsed.push((path, host.model(source).unwrap().imports));
        }
        let graph = ImportGraph::build(&root, &parsed);
        let order = graph.topological_order().unwrap();
        (dir, root, graph, order)
    }

    fn shared(root: &Path, oracle: Arc<dyn Oracle>) -> Shared {
        Shared {
            oracle,
            catalog: Arc::new(Catalog::builtin()),
            counters: Arc::new(NameCounters::new()),
            registry: Arc::new(Mutex::new(InterfaceRegistry::new())),
            registry_path: Arc::new(root.join("interfaces").join("interfaces.py")),
            config: Arc::new(ResolverConfig::default()),
        }
    }

    #[tokio::test]
    async fn test_dependencies_complete_before_dependents() {
        let (_dir, root, graph, order) = setup(&[
            ("a.py", "from b import g\ndef f(x):\n    return g(x)\n"),
            ("b.py", "def g(y):\n    return y\n"),
            ("c.py", "def h(z):\n    return z\n"),
        ]);
        let oracle: Arc<dyn Oracle> = Arc::new(ScriptedOracle::silent());
        let outcomes = resolve_all(shared(&root, oracle), &graph, &order, 2)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        let position = |name: &str| {
            outcomes
                .iter()
                .position(|(p, _)| p == &root.join(name))
                .unwrap()
        };
        assert!(position("b.py") < position("a.py"));
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let (_dir, root, graph, order) = setup(&[("a.py", "def f(x):\n    return x\n")]);
        // Removing the file makes the worker's read fail.
        fs::remove_file(root.join("a.py")).unwrap();
        let oracle: Arc<dyn Oracle> = Arc::new(ScriptedOracle::silent());
        let err = resolve_all(shared(&root, oracle), &graph, &order, 1)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("a.py"));
    }
}
