//! `mypy` process client.

use crate::{CheckMode, Diagnostic, Oracle, OracleError};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Arguments that make the report machine-readable and stable.
const REPORT_ARGS: &[&str] = &[
    "--show-column-numbers",
    "--no-error-summary",
    "--no-color-output",
    "--no-pretty",
    "--hide-error-context",
    "--follow-imports=silent",
];

/// How to launch the checker.
#[derive(Debug, Clone)]
pub struct MypyConfig {
    /// Executable name or path.
    pub program: String,
    /// Directory receiving the uuid-named probe files.
    pub scratch_dir: PathBuf,
    /// Working directory (and `MYPYPATH`) so project imports resolve.
    pub project_root: PathBuf,
    /// Extra arguments appended after the fixed ones.
    pub extra_args: Vec<String>,
}

impl MypyConfig {
    pub fn new(project_root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: String::from("mypy"),
            scratch_dir: scratch_dir.into(),
            project_root: project_root.into(),
            extra_args: Vec::new(),
        }
    }
}

/// Runs `mypy` once per probe.
///
/// Each call writes the probe to `<scratch_dir>/probe_<uuid>.py`, so concurrent
/// workers never share a file. The file is removed again whatever the
/// outcome.
#[derive(Debug, Clone)]
pub struct MypyOracle {
    config: MypyConfig,
}

impl MypyOracle {
    /// Creates the client, making sure the scratch directory exists.
    pub fn new(config: MypyConfig) -> Result<Self, OracleError> {
        fs::create_dir_all(&config.scratch_dir)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MypyConfig {
        &self.config
    }

    fn run(&self, probe: &Path, mode: CheckMode) -> Result<Vec<Diagnostic>, OracleError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(REPORT_ARGS)
            .args(&self.config.extra_args)
            .current_dir(&self.config.project_root)
            .env("MYPYPATH", &self.config.project_root);
        if mode == CheckMode::Strict {
            command.arg("--strict");
        }
        command.arg(probe);

        let output = command.output().map_err(|source| OracleError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;

        // 0 = clean, 1 = diagnostics reported, anything else is a crash.
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                return Err(OracleError::Crashed {
                    status: output.status.to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let file_name = probe
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Ok(Diagnostic::parse_report(&stdout, Some(file_name)))
    }
}

impl Oracle for MypyOracle {
    fn check(&self, source: &str, mode: CheckMode) -> Result<Vec<Diagnostic>, OracleError> {
        let probe = self
            .config
            .scratch_dir
            .join(format!("probe_{}.py", Uuid::new_v4().simple()));
        fs::write(&probe, source)?;
        let result = self.run(&probe, mode);
        if let Err(e) = fs::remove_file(&probe) {
            debug!(path = %probe.display(), error = %e, "scratch probe already gone");
        }
        let diagnostics = result?;
        debug!(
            bytes = source.len(),
            diagnostics = diagnostics.len(),
            ?mode,
            "probe checked"
        );
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MypyConfig::new(dir.path(), dir.path().join("scratch"));
        config.program = String::from("definitely-not-a-type-checker-binary");
        let oracle = MypyOracle::new(config).unwrap();

        let err = oracle.check("x = 1\n", CheckMode::Strict).unwrap_err();
        assert!(matches!(err, OracleError::Spawn { .. }));
        // probe file cleaned up even on failure
        let leftovers = fs::read_dir(dir.path().join("scratch")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_abnormal_exit_is_crash() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MypyConfig::new(dir.path(), dir.path().join("scratch"));
        // sh rejects the report flags as unknown options and exits 2
        config.program = String::from("sh");
        let oracle = MypyOracle::new(config).unwrap();

        let err = oracle.check("x = 1\n", CheckMode::Lenient).unwrap_err();
        assert!(matches!(err, OracleError::Crashed { .. }));
    }
}
