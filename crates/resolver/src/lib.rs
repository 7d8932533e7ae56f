//! # Resolver: Placeholder Fixpoint
//!
//! **Role**: Infers an annotation for every targeted parameter of a file.
//!
//! **Flow** (per function, strictly sequential):
//! 1. Each targeted parameter gets a placeholder (`Literal['Data3']`) in a
//!    [`ProbeTemplate`] of the whole file.
//! 2. [`Session`] probes the oracle with the placeholder rendered as `Any`
//!    and as `None`, mines the difference, validates catalog candidates,
//!    parametrizes generic ones and synthesizes an interface for whatever no
//!    candidate covers.
//! 3. Synthesized fields get placeholders of their own; fields seen being
//!    called are promoted to methods and widened until the oracle accepts
//!    every call site. The loop runs to a fixpoint, bounded by
//!    [`MAX_PASSES`].
//! 4. [`FileResolver`] registers the resulting interfaces, annotates the
//!    parameters and adds the imports the annotations need.
//!
//! **Design**:
//! - The oracle, catalog, counters and registry are shared by reference so
//!   several workers can resolve different files at once.
//! - Every loop is bounded; hitting a bound is an error, never a silent stop.

mod file;
mod hints;
mod probe;
mod session;

pub use file::{FileOutcome, FileResolver};
pub use hints::{combine_with_hint, import_lines, ImportPlan};
pub use probe::{Chunk, Overlay, Overrides, ProbeTemplate, PROBE_PRELUDE};
pub use session::{Context, Session, SessionResult};

use anatomist::AnatomistError;
use common::{MarkPolicy, RegistryError};
use oracle::{CheckMode, OracleError};

/// Passes of the per-function fixpoint before giving up.
pub const MAX_PASSES: usize = 20;

/// Parameters added to one synthesized method before giving up.
pub const MAX_WIDENING_STEPS: usize = 100;

/// Nesting limit for element-type placeholders (`Sequence[Sequence[...]]`).
pub const MAX_SUBSCRIPT_DEPTH: usize = 3;

/// Errors from resolution. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("oracle failure: {0}")]
    Oracle(#[from] OracleError),

    #[error("registry failure: {0}")]
    Registry(#[from] RegistryError),

    #[error("source failure: {0}")]
    Anatomist(#[from] AnatomistError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// New placeholders kept appearing.
    #[error("no fixpoint for '{function}' after {passes} passes")]
    FixpointExceeded { function: String, passes: usize },

    /// The oracle kept reporting surplus arguments.
    #[error("widening '{method}' of '{interface}' did not converge")]
    WideningExceeded { interface: String, method: String },
}

/// Knobs that change what gets resolved and how results are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Annotate with `Any` when nothing was learned.
    pub allow_any: bool,
    /// Merge a parameter's previous annotation into the new one.
    pub keep_hints: bool,
    /// Rendered generic annotations longer than this stay unparametrized.
    pub max_hint_length: Option<usize>,
    pub mark: MarkPolicy,
    pub mode: CheckMode,
    /// Synthesize an interface even when a catalog candidate fits.
    pub add_protocols_on_builtin: bool,
    pub exclude_memoryview: bool,
    /// Dotted module path of the registry file (`interfaces.interfaces`).
    pub registry_module: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            allow_any: false,
            keep_hints: true,
            max_hint_length: None,
            mark: MarkPolicy::All,
            mode: CheckMode::Strict,
            add_protocols_on_builtin: false,
            exclude_memoryview: false,
            registry_module: String::from("interfaces.interfaces"),
        }
    }
}
