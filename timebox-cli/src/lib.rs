//! Timebox CLI Library
//!
//! Command-line front end for running problem solutions under a timeout.
//! By default each method runs inside a disposable worker process that is
//! killed and replaced whenever a method overruns its limit.
//!
//! Binaries with their own problem set call [`run_with_cli`] with that set;
//! the same binary then serves as its own worker.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     let problems = vec![Problem::new(1, "One").answer(1).method("naive", || 1)];
//!     timebox_cli::run_with_cli(timebox_cli::Cli::parse(), problems)
//! }
//! ```

mod catalogue;
mod config;
mod executor;
mod plan;
mod report;
mod supervisor;

pub use catalogue::problems;
pub use config::{ConfigError, SupervisorConfig};
pub use executor::{IsolatedExecutor, LocalExecutor};
pub use plan::{build_plan, ExecutionPlan, PlanEntry};
pub use report::{format_text, generate_json_report, OutputFormat, ProblemOutcome};
pub use supervisor::{Supervisor, SupervisorError, WorkerCommand, WorkerProcess};

pub use clap::Parser;

use anyhow::Context;
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use timebox_core::{Problem, ProblemRegistry, ProblemRunInfo, TimeoutLimits, Worker, WorkerExit};
use tracing_subscriber::EnvFilter;

/// Timebox CLI arguments
#[derive(Parser, Debug)]
#[command(name = "timebox")]
#[command(author, version, about = "Run problem solutions under a timeout in disposable worker processes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Problems to run, as `id` or `id.method` (default: all)
    pub problems: Vec<String>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// First port tried for the worker; the listening port in worker mode
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Time limit for all methods of a problem, in milliseconds (0 = none)
    #[arg(long, global = true)]
    pub problem_timeout: Option<u64>,

    /// Time limit for a single method, in milliseconds (0 = none)
    #[arg(long, global = true)]
    pub method_timeout: Option<u64>,

    /// Show worker diagnostics on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: text, json
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Hide the progress bar
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run problems in an isolated worker process (default)
    Run {
        /// Problems to run, as `id` or `id.method`
        problems: Vec<String>,
    },
    /// Run problems in-process; a hung method is abandoned, not killed
    Local {
        /// Problems to run, as `id` or `id.method`
        problems: Vec<String>,

        /// Time limit for the whole batch, in milliseconds (0 = none)
        #[arg(long, default_value = "0")]
        total_timeout: u64,
    },
    /// List registered problems and their methods
    List,
    /// Internal: serve run requests (spawned by the supervisor)
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

/// Run the Timebox CLI over the built-in catalogue.
pub fn run() -> anyhow::Result<()> {
    run_with_cli(Cli::parse(), catalogue::problems())
}

/// Run the Timebox CLI with pre-parsed arguments over `problems`.
pub fn run_with_cli(cli: Cli, problems: Vec<Problem>) -> anyhow::Result<()> {
    init_tracing(cli.verbose);

    let registry = Arc::new(ProblemRegistry::import(problems).context("invalid problem catalogue")?);

    match cli.command {
        Some(Commands::Worker { ref host }) => {
            let port = cli.port.context("worker mode needs --port")?;
            run_worker(host, port, registry)
        }
        Some(Commands::List) => {
            list_problems(&registry, cli.verbose);
            Ok(())
        }
        Some(Commands::Local {
            ref problems,
            total_timeout,
        }) => {
            let config = load_config(&cli)?;
            run_local(&cli, &config, problems, non_zero_millis(total_timeout), registry)
        }
        Some(Commands::Run { ref problems }) => {
            let config = load_config(&cli)?;
            run_isolated(&cli, config, problems, registry)
        }
        None => {
            let config = load_config(&cli)?;
            run_isolated(&cli, config, &cli.problems, registry)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "timebox=debug" } else { "timebox=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded in tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Config file first, then command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<SupervisorConfig> {
    let mut config = SupervisorConfig::load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port_range_start = port;
        config.port_range_end = config.port_range_end.max(port);
    }
    if let Some(ms) = cli.problem_timeout {
        config.problem_timeout_ms = ms;
    }
    if let Some(ms) = cli.method_timeout {
        config.method_timeout_ms = ms;
    }
    config.debug |= cli.debug;

    config.validate()?;
    Ok(config)
}

/// Run as a worker process
fn run_worker(host: &str, port: u16, registry: Arc<ProblemRegistry>) -> anyhow::Result<()> {
    let worker = Worker::bind((host, port), registry)
        .with_context(|| format!("failed to bind worker on {}:{}", host, port))?;

    match worker.run()? {
        WorkerExit::Closed => Ok(()),
        WorkerExit::FailFast => anyhow::bail!("worker stopped after a failed method"),
    }
}

fn list_problems(registry: &ProblemRegistry, verbose: bool) {
    for problem in registry.iter() {
        println!("{:<5} {}", problem.id(), problem.title());
        if verbose {
            for line in problem.description().lines() {
                println!("      | {}", line);
            }
        }
        for method in problem.method_names() {
            println!("      + {}", method);
        }
    }
    println!("{} problems registered.", registry.len());
}

fn run_isolated(
    cli: &Cli,
    config: SupervisorConfig,
    selectors: &[String],
    registry: Arc<ProblemRegistry>,
) -> anyhow::Result<()> {
    let infos = ProblemRunInfo::parse_list(selectors)?;
    let mut command = WorkerCommand::current_exe().context("cannot locate worker executable")?;
    if cli.verbose {
        command = command.arg("--verbose");
    }

    let outcomes = IsolatedExecutor::new(config, command)
        .quiet(cli.quiet)
        .execute(registry, &infos)?;
    print_outcomes(cli.format, &outcomes)
}

fn run_local(
    cli: &Cli,
    config: &SupervisorConfig,
    selectors: &[String],
    total_timeout: Option<Duration>,
    registry: Arc<ProblemRegistry>,
) -> anyhow::Result<()> {
    let infos = ProblemRunInfo::parse_list(selectors)?;
    let limits = TimeoutLimits::new(config.problem_timeout(), config.method_timeout());

    let outcomes = LocalExecutor::new(limits, total_timeout)
        .quiet(cli.quiet)
        .execute(registry, &infos);
    print_outcomes(cli.format, &outcomes)
}

fn print_outcomes(format: OutputFormat, outcomes: &[ProblemOutcome]) -> anyhow::Result<()> {
    let output = match format {
        OutputFormat::Json => generate_json_report(outcomes)?,
        OutputFormat::Text => format_text(outcomes),
    };
    print!("{}", output);
    Ok(())
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
