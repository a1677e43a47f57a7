use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use softshell::config::{axes, expand, load_from_path, strategy_count, EditStrategy};
use softshell::logging::{init_subscriber, Verbosity};
use softshell::runner::{CommandOutcome, RunReport};
use softshell::{ExperimentRunner, FileTransaction, ProcessExecutor, RunnerOptions, SpanPatcher};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "softshell")]
#[command(
    about = "Sweep combinations of hard-coded values in files and run a command against each",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Path to the YAML sweep configuration
    #[arg(short = 'f', long = "file", value_name = "CONFIG")]
    config: PathBuf,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// List the strategies without editing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Show a diff of every patched file
    #[arg(short, long)]
    diff: bool,

    /// Replace values by position instead of by their old text
    #[arg(long)]
    span_rewrite: bool,

    /// Directory for per-run logs (system temp dir by default)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Pause after each file edit, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    edit_delay_ms: u64,

    /// Command to run for every strategy
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "dry_run",
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet));

    info!(command = ?cli.command, "command is");
    info!(config = %cli.config.display(), "loading configuration");
    let specs = load_from_path(&cli.config)?;

    let axes = axes(&specs);
    for axis in &axes {
        debug!(
            file = %axis.path.display(),
            line = axis.line_number,
            variable = %axis.variable,
            candidates = axis.values.len(),
            "axis"
        );
    }
    let count = strategy_count(&axes).context("too many combinations to enumerate")?;
    info!(documents = specs.len(), axes = axes.len(), strategies = count, "configuration loaded");

    let strategies = expand(&specs);
    if strategies.is_empty() {
        warn!("configuration expands to no strategies");
    }

    if cli.dry_run {
        print_strategies(&strategies);
        return Ok(());
    }

    let executor = ProcessExecutor::from_tokens(cli.command).context("no command given")?;
    let transaction = if cli.span_rewrite {
        FileTransaction::new(SpanPatcher)
    } else {
        FileTransaction::default()
    };
    let options = RunnerOptions {
        log_dir: cli.log_dir,
        show_diff: cli.diff,
        edit_delay: Duration::from_millis(cli.edit_delay_ms),
    };

    let mut runner = ExperimentRunner::new(transaction, executor, options);
    let report = runner.run(&strategies)?;
    print_summary(&report);

    Ok(())
}

fn print_strategies(strategies: &[EditStrategy]) {
    println!("{}", format!("{} strategies", strategies.len()).bold());
    for strategy in strategies {
        println!("{} {}", format!("#{}", strategy.index + 1).cyan(), strategy);
    }
}

fn print_summary(report: &RunReport) {
    println!();
    println!("{}", "Summary:".bold());
    for run in &report.runs {
        let log = run
            .log_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let status = match &run.outcome {
            CommandOutcome::Exited(0) => "exit 0".green(),
            CommandOutcome::Exited(code) => format!("exit {code}").yellow(),
            CommandOutcome::Signaled => "killed".red(),
            CommandOutcome::LaunchFailed(reason) => format!("not run: {reason}").red(),
        };
        println!("  #{} {} {}", run.index + 1, status, log.dimmed());
    }
    println!("  {} runs", format!("{}", report.runs.len()).green());
    println!("  {} failed", format!("{}", report.failed()).yellow());
    println!(
        "  {} could not be launched",
        format!("{}", report.launch_failures()).red()
    );
}
