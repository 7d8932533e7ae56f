//! In-memory oracle for tests.

use crate::{CheckMode, Diagnostic, Oracle, OracleError};
use std::sync::Mutex;

type Script = dyn Fn(&str) -> Vec<Diagnostic> + Send + Sync;

/// Answers every probe by calling a closure instead of a real checker.
///
/// The closure sees the full probe text and returns the diagnostics a real
/// checker would report for it. Every probe is recorded so tests can assert
/// on what was asked.
pub struct ScriptedOracle {
    script: Box<Script>,
    probes: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(script: impl Fn(&str) -> Vec<Diagnostic> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// An oracle that reports no diagnostics for anything.
    pub fn silent() -> Self {
        Self::new(|_| Vec::new())
    }

    /// Number of probes checked so far.
    pub fn calls(&self) -> usize {
        self.lock().len()
    }

    /// Every probe checked so far, in order.
    pub fn probes(&self) -> Vec<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.probes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Oracle for ScriptedOracle {
    fn check(&self, source: &str, _mode: CheckMode) -> Result<Vec<Diagnostic>, OracleError> {
        self.lock().push(source.to_string());
        Ok((self.script)(source))
    }
}

/// 1-indexed number of the first line containing `needle`, or 0.
pub fn line_of(source: &str, needle: &str) -> u32 {
    source
        .lines()
        .position(|l| l.contains(needle))
        .map_or(0, |i| i as u32 + 1)
}
