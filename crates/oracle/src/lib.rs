//! # Oracle: Static Type Checker Client
//!
//! Every inference decision is made by asking an external static type
//! checker about a synthesized probe program and reading back its
//! diagnostics. This crate owns that conversation:
//!
//! - [`Oracle`]: the seam the resolver and the backfill talk to.
//! - [`MypyOracle`]: runs `mypy` on a uuid-named scratch file and parses
//!   its report.
//! - [`ScriptedOracle`]: an in-memory oracle driven by a closure, used by
//!   tests throughout the workspace.
//!
//! Diagnostics are stripped of the scratch file path so that two probes of
//! the same program compare equal regardless of where they were written.

pub mod mypy;
pub mod scripted;

pub use mypy::{MypyConfig, MypyOracle};
pub use scripted::{line_of, ScriptedOracle};

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Errors from oracle invocations.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to launch type checker '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// The checker exited abnormally. Fatal for the whole run.
    #[error("type checker crashed (exit status {status}): {stderr}")]
    Crashed { status: String, stderr: String },
}

/// Checking mode forwarded to the type checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CheckMode {
    #[default]
    Strict,
    Lenient,
}

/// Anything that can type-check a probe program.
///
/// Implementations must be safe to call from several workers at once.
pub trait Oracle: Send + Sync {
    /// Type-checks `source` and returns its diagnostics in report order.
    ///
    /// # Errors
    /// Returns [`OracleError::Crashed`] when the checker itself fails; that
    /// is fatal for the run and must not be mistaken for an empty report.
    fn check(&self, source: &str, mode: CheckMode) -> Result<Vec<Diagnostic>, OracleError>;
}

impl<T: Oracle + ?Sized> Oracle for std::sync::Arc<T> {
    fn check(&self, source: &str, mode: CheckMode) -> Result<Vec<Diagnostic>, OracleError> {
        (**self).check(source, mode)
    }
}

// ---- diagnostics ----

/// Severity of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// One checker message, without the file path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Diagnostic {
    /// 1-indexed line in the probe.
    pub line: u32,
    pub column: Option<u32>,
    pub severity: Severity,
    pub message: String,
    /// Error code, e.g. `attr-defined`.
    pub code: Option<String>,
}

static LINE_PATTERN: OnceLock<Regex> = OnceLock::new();

impl Diagnostic {
    /// Builds an error diagnostic (mostly for scripted oracles).
    pub fn error(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            severity: Severity::Error,
            message: message.into(),
            code: None,
        }
    }

    /// Parses one report line: `<file>:<line>[:<col>]: <severity>: <message> [<code>]`.
    ///
    /// Returns `None` for lines that are not diagnostics (summaries,
    /// continuation lines).
    pub fn parse_line(text: &str) -> Option<Self> {
        let pattern = LINE_PATTERN.get_or_init(|| {
            Regex::new(
                r"^(?P<path>.*?):(?P<line>\d+):(?:(?P<col>\d+):)? (?P<sev>error|warning|note): (?P<msg>.*?)(?:\s+\[(?P<code>[a-z0-9-]+)\])?$",
            )
            .expect("diagnostic line regex is a bug in the hardcoded pattern")
        });
        let caps = pattern.captures(text.trim_end())?;
        let severity = match &caps["sev"] {
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Note,
        };
        Some(Self {
            line: caps["line"].parse().ok()?,
            column: caps.name("col").and_then(|c| c.as_str().parse().ok()),
            severity,
            message: caps["msg"].to_string(),
            code: caps.name("code").map(|c| c.as_str().to_string()),
        })
    }

    /// Parses a full report, keeping only lines about `file_name` when given.
    pub fn parse_report(report: &str, file_name: Option<&str>) -> Vec<Self> {
        report
            .lines()
            .filter(|line| file_name.is_none_or(|name| line_mentions_file(line, name)))
            .filter_map(Self::parse_line)
            .collect()
    }
}

fn line_mentions_file(line: &str, file_name: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(path, _)| path.ends_with(file_name))
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line)?;
        if let Some(column) = self.column {
            write!(f, ":{column}")?;
        }
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        write!(f, ": {severity}: {}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, "  [{code}]")?;
        }
        Ok(())
    }
}
