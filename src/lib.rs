//! Softshell: sweep hard-coded values in text files without editing them by hand
//!
//! A YAML configuration names, per file, which `(line, variable)` pairs to
//! override and with which candidate values. Every combination of values is
//! expanded into an [`EditStrategy`]; for each one the target files are
//! backed up and patched, a command is run against the patched tree, and the
//! files are restored byte for byte.
//!
//! # Architecture
//!
//! - [`config`] loads the YAML stream and expands it into strategies.
//! - [`line`] rewrites one variable's value on one line.
//! - [`edit`] backs up, patches and restores single files.
//! - [`runner`] drives edit → run → restore for every strategy.
//!
//! # Guarantees
//!
//! - A file is written only after every directive for it succeeded.
//! - Files edited by a strategy are restored before the next strategy starts,
//!   whether the command succeeded, failed, or could not be launched.
//! - An edit failure restores the strategy's already-edited files and aborts
//!   the sweep.
//!
//! Restoration is not guaranteed if the process is killed mid-strategy.
//!
//! # Example
//!
//! ```no_run
//! use softshell::{expand, load_from_path, ExperimentRunner, FileTransaction, ProcessExecutor, RunnerOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let specs = load_from_path("sweep.yml")?;
//! let strategies = expand(&specs);
//!
//! let executor = ProcessExecutor::from_tokens(["make".to_string(), "bench".to_string()])
//!     .expect("non-empty command");
//! let mut runner = ExperimentRunner::new(FileTransaction::default(), executor, RunnerOptions::default());
//! let report = runner.run(&strategies)?;
//! println!("{} runs", report.runs.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod diff;
pub mod edit;
pub mod line;
pub mod logging;
pub mod runner;

// Re-exports
pub use config::{
    expand, load_from_path, load_from_str, ConfigError, EditDirective, EditStrategy,
    FileEditPlan, FileSpec, ParamValue, ParameterAxis, Scalar,
};
pub use edit::{Backup, EditError, EditFailure, FileTransaction};
pub use line::{LineError, LinePatcher, LiteralPatcher, SpanPatcher};
pub use runner::{
    CommandExecutor, CommandOutcome, ExperimentRunner, ProcessExecutor, RunError, RunRecord,
    RunReport, RunnerOptions,
};
