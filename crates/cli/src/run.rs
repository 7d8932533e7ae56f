//! One whole run: discovery, resolution, deduplication, backfill.
//!
//! Every input file and the registry are snapshotted first; any failure
//! restores all of them before the error surfaces.

use crate::config::Settings;
use crate::discover::collect_py_files;
use crate::schedule::{self, Shared};
use crate::transaction::Transaction;
use anatomist::graph::ImportGraph;
use anatomist::path_util::display_relative;
use anatomist::registry_file::load_registry;
use anatomist::ParserHost;
use anyhow::Context;
use backfill::{Backfill, BackfillConfig};
use catalog::{Catalog, ExternalScanner};
use common::{InterfaceRegistry, MarkPolicy, NameCounters};
use forge::rewrite::Rewriter;
use oracle::Oracle;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Per-file result of a successful run.
#[derive(Debug, Default)]
pub struct Report {
    pub project_root: PathBuf,
    /// `(file, changed)` in path order.
    pub files: Vec<(PathBuf, bool)>,
}

impl Report {
    pub fn any_changed(&self) -> bool {
        self.files.iter().any(|(_, changed)| *changed)
    }

    /// `modified <file>` / `unchanged <file>` lines.
    pub fn lines(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|(path, changed)| {
                let status = if *changed { "modified" } else { "unchanged" };
                format!("{status} {}", display_relative(path, &self.project_root))
            })
            .collect()
    }
}

/// Runs the whole pipeline against `oracle`.
///
/// # Errors
/// Any failure of a stage. The project is restored before returning it.
pub async fn run(settings: &Settings, oracle: Arc<dyn Oracle>) -> anyhow::Result<Report> {
    let files = collect_py_files(
        &settings.paths,
        &[settings.interfaces_path.clone()],
        &[settings.scratch_dir.clone()],
    )?;
    let mut report = Report {
        project_root: settings.project_root.clone(),
        files: Vec::with_capacity(files.len()),
    };
    if files.is_empty() {
        warn!("no Python files found");
        return Ok(report);
    }
    info!(files = files.len(), "starting run");

    let mut transaction = Transaction::begin(&settings.project_root)?;
    for file in &files {
        transaction.snapshot(file)?;
    }
    transaction.snapshot(&settings.interfaces_path)?;

    if let Err(e) = pipeline(settings, &files, oracle).await {
        error!(error = %e, "run failed, restoring files");
        transaction
            .restore_all()
            .context("restoring files after a failed run")?;
        return Err(e);
    }

    for file in files {
        let changed = transaction.changed(&file)?;
        report.files.push((file, changed));
    }
    transaction.commit();
    Ok(report)
}

async fn pipeline(
    settings: &Settings,
    files: &[PathBuf],
    oracle: Arc<dyn Oracle>,
) -> anyhow::Result<()> {
    let config = Arc::new(settings.resolver_config()?);
    let catalog = Arc::new(build_catalog(settings).await?);

    let registry = load_registry(&settings.interfaces_path)
        .with_context(|| format!("loading {}", settings.interfaces_path.display()))?;
    let counters = Arc::new(NameCounters::new());
    counters.seed(registry.names().map(String::as_str));
    let registry_existed = settings.interfaces_path.exists();

    let (graph, order) = import_order(&settings.project_root, files)?;

    let registry = Arc::new(Mutex::new(registry));
    if config.mark == MarkPolicy::None {
        info!("mark policy is none, resolution skipped");
    } else {
        let shared = Shared {
            oracle: Arc::clone(&oracle),
            catalog: Arc::clone(&catalog),
            counters: Arc::clone(&counters),
            registry: Arc::clone(&registry),
            registry_path: Arc::new(settings.interfaces_path.clone()),
            config: Arc::clone(&config),
        };
        let outcomes = schedule::resolve_all(shared, &graph, &order, settings.workers).await?;
        let changed = outcomes.iter().filter(|(_, o)| o.changed).count();
        info!(files = outcomes.len(), changed, "resolution complete");
    }

    let registry = registry.lock().unwrap_or_else(|e| e.into_inner()).clone();
    let settings = settings.clone();
    let module = config.registry_module.clone();
    tokio::task::spawn_blocking(move || {
        let finish = Finish {
            settings: &settings,
            module: &module,
            oracle: oracle.as_ref(),
            catalog: &catalog,
        };
        finish.run(&registry, &counters, &order, registry_existed)
    })
    .await
    .context("finishing worker panicked")?
}

/// Builtin catalog plus the scanned external libraries.
async fn build_catalog(settings: &Settings) -> anyhow::Result<Catalog> {
    let mut catalog = Catalog::builtin();
    if settings.exclude_memoryview {
        catalog = catalog.without("memoryview");
    }
    let scanner = ExternalScanner::new(
        settings.python.clone(),
        settings.external_libraries.clone(),
        settings.excluded_libraries.clone(),
    );
    let classes = tokio::task::spawn_blocking(move || scanner.scan())
        .await
        .context("library scan panicked")?
        .context("scanning external libraries")?;
    catalog.add_external(classes);
    Ok(catalog)
}

/// Builds the import graph of `files` and orders it dependencies first.
fn import_order(root: &Path, files: &[PathBuf]) -> anyhow::Result<(ImportGraph, Vec<PathBuf>)> {
    let mut host = ParserHost::new()?;
    let mut parsed = Vec::with_capacity(files.len());
    for file in files {
        let source = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        let model = host
            .model(&source)
            .with_context(|| format!("parsing {}", file.display()))?;
        if model.has_errors {
            warn!(file = %file.display(), "syntax errors, results may be partial");
        }
        parsed.push((file.clone(), model.imports));
    }
    let graph = ImportGraph::build(root, &parsed);
    let order = graph.topological_order()?;
    Ok((graph, order))
}

// ---- after resolution ----

/// Deduplication, presentation, reference rewrite and backfill.
struct Finish<'a> {
    settings: &'a Settings,
    module: &'a str,
    oracle: &'a dyn Oracle,
    catalog: &'a Catalog,
}

impl Finish<'_> {
    fn run(
        &self,
        registry: &InterfaceRegistry,
        counters: &NameCounters,
        order: &[PathBuf],
        registry_existed: bool,
    ) -> anyhow::Result<()> {
        let renumbering = counters.renumbering(registry.names().map(String::as_str));
        let outcome = forge::finalize(registry, &renumbering, self.settings.presentation)?;
        let path = &self.settings.interfaces_path;
        if registry_existed || !outcome.registry.is_empty() {
            outcome
                .registry
                .save(path)
                .with_context(|| format!("saving {}", path.display()))?;
        }

        let mut host = ParserHost::new()?;
        let rewritten = Rewriter::new(self.module, &outcome.renames)?.rewrite_files(&mut host, order)?;
        info!(
            interfaces = outcome.registry.len(),
            renames = outcome.renames.len(),
            files = rewritten.len(),
            "registry finalized"
        );

        let config = BackfillConfig {
            registry_module: self.module.to_string(),
            project_root: self.settings.project_root.clone(),
            mode: self.settings.check_mode(),
        };
        let backfill = Backfill::new(self.oracle, self.catalog, &outcome.registry, &config);
        let mut backfilled = 0usize;
        for file in order {
            if backfill.backfill_file(file)? {
                backfilled += 1;
            }
        }
        info!(files = backfilled, "backfill complete");
        Ok(())
    }
}
