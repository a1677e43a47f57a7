//! Sweep execution: for each strategy, edit every file, run the command,
//! restore every file.
//!
//! Strategies run strictly one after another and never overlap in file
//! state. An edit failure restores what the current strategy already edited
//! and aborts the whole sweep. Command failures (non-zero exit, launch
//! failure) are recorded and the sweep carries on.
//!
//! There is no timeout: a command that never exits blocks the sweep.

use crate::config::{EditStrategy, FileEditPlan};
use crate::diff;
use crate::edit::{Backup, EditError, FileTransaction};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

/// Runs the external command for one strategy.
pub trait CommandExecutor {
    /// Run with stdout and stderr sent to `output` and block until exit.
    ///
    /// Returns the exit code, or `None` when the process was killed by a
    /// signal. An `Err` means the command could not be launched.
    fn execute(&mut self, strategy: &EditStrategy, output: File) -> io::Result<Option<i32>>;
}

/// Spawns a program with fixed arguments.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
}

impl ProcessExecutor {
    /// `None` if `tokens` is empty.
    pub fn from_tokens(tokens: impl IntoIterator<Item = String>) -> Option<Self> {
        let mut tokens = tokens.into_iter();
        let program = tokens.next()?;
        Some(Self {
            program,
            args: tokens.collect(),
        })
    }
}

impl CommandExecutor for ProcessExecutor {
    fn execute(&mut self, _strategy: &EditStrategy, output: File) -> io::Result<Option<i32>> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output.try_clone()?))
            .stderr(Stdio::from(output))
            .status()?;
        Ok(status.code())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Directory for per-run logs; the system temp dir when unset
    pub log_dir: Option<PathBuf>,
    /// Print a diff of every patched file
    pub show_diff: bool,
    /// Pause after each file edit
    pub edit_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Exited(i32),
    Signaled,
    LaunchFailed(String),
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Exited(0))
    }
}

/// What happened for one strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub index: usize,
    /// Captured output of the command; `None` if the log could not be created
    pub log_path: Option<PathBuf>,
    pub outcome: CommandOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub runs: Vec<RunRecord>,
}

impl RunReport {
    /// Runs whose command exited non-zero or was killed.
    pub fn failed(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| match run.outcome {
                CommandOutcome::Exited(code) => code != 0,
                CommandOutcome::Signaled => true,
                CommandOutcome::LaunchFailed(_) => false,
            })
            .count()
    }

    pub fn launch_failures(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| matches!(run.outcome, CommandOutcome::LaunchFailed(_)))
            .count()
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    /// A file of the strategy could not be edited; the sweep was aborted
    /// after restoring the files already edited.
    #[error("strategy {number}: error updating {} with {plan}", .file.display())]
    Edit {
        number: usize,
        file: PathBuf,
        plan: FileEditPlan,
        #[source]
        source: EditError,
    },

    /// Files could not be put back after the command ran.
    #[error("strategy {number}: {} file(s) could not be restored", .failures.len())]
    Restore {
        number: usize,
        failures: Vec<EditError>,
    },
}

/// Backups of the strategy in flight. Whatever is still outstanding is
/// restored on drop.
#[derive(Default)]
struct StrategyGuard {
    backups: Vec<Backup>,
}

impl StrategyGuard {
    /// Restore in reverse edit order, collecting failures.
    fn restore_all(&mut self) -> Vec<EditError> {
        let mut failures = Vec::new();
        while let Some(backup) = self.backups.pop() {
            if let Err(error) = backup.restore() {
                error!(%error, "restore failed");
                failures.push(error);
            }
        }
        failures
    }
}

impl Drop for StrategyGuard {
    fn drop(&mut self) {
        if !self.backups.is_empty() {
            warn!(files = self.backups.len(), "restoring files left patched");
            self.restore_all();
        }
    }
}

pub struct ExperimentRunner<E> {
    transaction: FileTransaction,
    executor: E,
    options: RunnerOptions,
}

impl<E: CommandExecutor> ExperimentRunner<E> {
    pub fn new(transaction: FileTransaction, executor: E, options: RunnerOptions) -> Self {
        Self {
            transaction,
            executor,
            options,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run every strategy in order.
    pub fn run(&mut self, strategies: &[EditStrategy]) -> Result<RunReport, RunError> {
        let total = strategies.len();
        let mut report = RunReport::default();

        for strategy in strategies {
            let number = strategy.index + 1;
            let span = info_span!("strategy", number, total);
            let _enter = span.enter();

            info!("going through edit {}/{}", number, total);
            report.runs.push(self.run_strategy(strategy, number)?);
        }

        Ok(report)
    }

    fn run_strategy(
        &mut self,
        strategy: &EditStrategy,
        number: usize,
    ) -> Result<RunRecord, RunError> {
        let mut guard = StrategyGuard::default();

        for (file, plan) in &strategy.files {
            match self.transaction.apply(file, plan) {
                Ok(backup) => {
                    if self.options.show_diff {
                        show_diff(&backup);
                    }
                    guard.backups.push(backup);
                    if !self.options.edit_delay.is_zero() {
                        thread::sleep(self.options.edit_delay);
                    }
                }
                Err(source) => {
                    error!(
                        file = %file.display(),
                        instructions = %plan,
                        error = %source,
                        "error updating file"
                    );
                    guard.restore_all();
                    return Err(RunError::Edit {
                        number,
                        file: file.clone(),
                        plan: plan.clone(),
                        source,
                    });
                }
            }
        }

        let record = self.run_command(strategy);

        let failures = guard.restore_all();
        if !failures.is_empty() {
            return Err(RunError::Restore { number, failures });
        }
        debug!("all files restored");

        Ok(record)
    }

    fn run_command(&mut self, strategy: &EditStrategy) -> RunRecord {
        info!(configuration = %strategy, "running command");

        let (log_path, outcome) = match self.open_run_log(strategy) {
            Ok((output, path)) => {
                info!(log = %path.display(), "logs can be found here");
                let outcome = match self.executor.execute(strategy, output) {
                    Ok(Some(code)) => CommandOutcome::Exited(code),
                    Ok(None) => CommandOutcome::Signaled,
                    Err(e) => CommandOutcome::LaunchFailed(e.to_string()),
                };
                (Some(path), outcome)
            }
            Err(e) => (
                None,
                CommandOutcome::LaunchFailed(format!("could not create run log: {e}")),
            ),
        };

        match &outcome {
            CommandOutcome::Exited(code) => info!(code, "command ended"),
            CommandOutcome::Signaled => warn!("command was terminated by a signal"),
            CommandOutcome::LaunchFailed(reason) => error!(%reason, "unable to run command"),
        }

        RunRecord {
            index: strategy.index,
            log_path,
            outcome,
        }
    }

    /// Create the per-run log and write the strategy header to it.
    fn open_run_log(&self, strategy: &EditStrategy) -> io::Result<(File, PathBuf)> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("softshell-run-").suffix(".log");
        let temp = match &self.options.log_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let (mut file, path) = temp.keep().map_err(|e| e.error)?;
        writeln!(file, "Configuration is: {strategy}")?;
        file.flush()?;
        Ok((file, path))
    }
}

fn show_diff(backup: &Backup) {
    let original = match backup.original() {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(%error, "cannot show diff");
            return;
        }
    };
    let patched = match fs::read(backup.file()) {
        Ok(bytes) => bytes,
        Err(error) => {
            warn!(%error, "cannot show diff");
            return;
        }
    };

    print!(
        "{}",
        diff::render(
            backup.file(),
            &String::from_utf8_lossy(&original),
            &String::from_utf8_lossy(&patched),
        )
    );
}
