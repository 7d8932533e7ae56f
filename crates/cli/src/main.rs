//! `retrotype`: infers structural parameter types for a Python project.
//!
//! **Flow**: settings → discovery → snapshot → per-file resolution over the
//! import graph → deduplication and presentation → reference rewrite →
//! inheritance backfill → report.
//!
//! Exit status is 1 when any file changed or the run failed, 0 otherwise.

mod config;
mod discover;
mod run;
mod schedule;
mod transaction;

use clap::Parser;
use config::{Options, Settings};
use oracle::{MypyConfig, MypyOracle, Oracle};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Log filter variable; `RUST_LOG` is the fallback.
const LOG_ENV: &str = "RETROTYPE_LOG";

#[derive(Parser)]
#[command(name = "retrotype")]
#[command(about = "Retrofit structural type annotations onto Python code", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    options: Options,
}

/// Installs a stderr subscriber when `RETROTYPE_LOG` or `RUST_LOG` is set.
fn init_tracing() {
    let directives = env::var(LOG_ENV).or_else(|_| env::var("RUST_LOG"));
    let Ok(directives) = directives else {
        return;
    };
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("warning: {LOG_ENV}: {e}");
        EnvFilter::new("warn")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    let cwd = env::current_dir()?;
    let settings = Settings::load(&cli.options, &cwd)?;

    let mut mypy = MypyConfig::new(&settings.project_root, &settings.scratch_dir);
    mypy.program = settings.mypy.clone();
    let oracle: Arc<dyn Oracle> = Arc::new(MypyOracle::new(mypy)?);

    let report = run::run(&settings, oracle).await?;
    for line in report.lines() {
        println!("{line}");
    }
    Ok(if report.any_changed() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
