//! Regress CLI
//!
//! Drives the checker regression harness: the full reference suite, or any
//! one stage of it (replay, a single checker run, a comparison).

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use console::style;
use regress_certify::{CaseKind, ComparisonResult, Suite, SuiteReport, compare_logs, compare_structured};
use regress_core::{CheckerBinary, FailurePolicy, HarnessConfig, TimeScale};
use regress_replay::{ReplayConfig, ReplayReport, ReplaySession, collect_stream_files, reset_sink, sink_dir_for};
use regress_runtime::CheckerSupervisor;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,regress=info";

#[derive(Parser)]
#[command(name = "regress")]
#[command(about = "Regression harness for trace invariant checkers", long_about = None)]
struct Cli {
    /// Log filter directives, overriding RUST_LOG
    #[arg(long, global = true)]
    log_filter: Option<String>,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    /// Harness configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every reference case and compare against recorded results
    Suite {
        /// Reference result root
        #[arg(long)]
        root: Option<PathBuf>,
        /// Directory for run and replay output
        #[arg(long)]
        work_dir: Option<PathBuf>,
        /// Keep going after a failing case
        #[arg(long)]
        collect_all: bool,
        /// Online checker command line
        #[arg(long)]
        checker_online: Option<String>,
        /// Offline checker command line
        #[arg(long)]
        checker_offline: Option<String>,
    },
    /// Replay a trace directory into a sink directory at recorded pace
    Replay {
        /// Trace directory
        #[arg(short = 'f', long)]
        trace_dir: PathBuf,
        /// Sink directory, cleared first (default: <work_dir>/<trace basename>_simulated)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Nanoseconds of wall time per trace time unit
        #[arg(long)]
        nanos_per_unit: Option<u64>,
        /// Also run the online checker on the sink with this invariant file
        #[arg(short = 'i', long)]
        spec: Option<PathBuf>,
    },
    /// Run a checker once and print the result it produced
    Run {
        /// Bounded (online) or to completion (offline)
        #[arg(value_enum)]
        mode: RunModeArg,
        /// Trace input
        #[arg(short = 'f', long)]
        input: PathBuf,
        /// Invariant specification
        #[arg(short = 'i', long)]
        spec: PathBuf,
        /// Checker command line (default from configuration)
        #[arg(long)]
        checker: Option<String>,
        /// Print the run record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare a candidate result log against a reference
    Compare {
        /// Candidate log
        candidate: PathBuf,
        /// Reference log
        reference: PathBuf,
        /// Compare offline logs as invariant record multisets
        #[arg(long)]
        structured: bool,
        /// Relative violation count tolerance
        #[arg(long)]
        tolerance: Option<f64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
enum RunModeArg {
    /// Grace window, then terminate
    Bounded,
    /// Wait for the checker to exit
    Complete,
}

fn init_tracing(filter: Option<&str>, json: bool) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let config = match path {
        Some(path) => HarnessConfig::load(path)
            .wrap_err_with(|| format!("loading configuration from {}", path.display()))?,
        None => HarnessConfig::default(),
    };
    Ok(config)
}

/// Split a command line like `python3 sim.py --fast` into program and args
fn checker_from_arg(command: &str) -> Result<CheckerBinary> {
    let mut words = command.split_whitespace();
    let program = words.next().ok_or_else(|| eyre!("empty checker command"))?;
    Ok(words.fold(CheckerBinary::new(program), |checker, arg| checker.with_arg(arg)))
}

fn verdict(passed: bool) -> console::StyledObject<&'static str> {
    if passed {
        style("PASS").green().bold()
    } else {
        style("FAIL").red().bold()
    }
}

fn print_report(report: &SuiteReport) -> Result<()> {
    for outcome in &report.outcomes {
        println!("{} {}", verdict(outcome.passed()), outcome);

        if !outcome.passed() && outcome.kind == CaseKind::OnlineStatic {
            if let Some(candidate) = &outcome.candidate {
                let log = std::fs::read_to_string(candidate)
                    .wrap_err_with(|| format!("reading candidate log {}", candidate.display()))?;
                println!("{}", style(format!("--- {}", candidate.display())).dim());
                println!("{}", log);
            }
        }
    }

    let summary = report.summary();
    if report.passed() {
        println!("{}", style(summary).green());
    } else {
        println!("{}", style(summary).red());
    }
    Ok(())
}

fn print_comparison(result: &ComparisonResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{} {}", verdict(result.passed), result);
        if let Some(d) = &result.diagnostics {
            println!(
                "  violations {:?} vs {:?}, invariants {:?} vs {:?}",
                d.candidate.violations, d.reference.violations, d.candidate.invariants, d.reference.invariants
            );
        }
    }
    Ok(())
}

/// Replay `trace_dir` into a cleared sink, optionally under the online
/// checker, and return the report with the sink used.
async fn replay_trace(
    config: &HarnessConfig,
    trace_dir: &Path,
    output: Option<PathBuf>,
    spec: Option<&Path>,
) -> Result<(ReplayReport, PathBuf)> {
    let replay = &config.replay;
    let streams = collect_stream_files(trace_dir, &replay.stream_prefix, &replay.stream_suffix)?;
    let sink = output.unwrap_or_else(|| sink_dir_for(trace_dir, &config.work_dir, &replay.sink_suffix));
    reset_sink(&sink).await?;
    let mut session = ReplaySession::start(&streams, &sink, ReplayConfig::from(replay)).await?;

    let report = match spec {
        None => session.join(None).await?,
        Some(spec) => {
            session.ready(config.supervisor.replay_ready_timeout()).await?;
            let supervisor = CheckerSupervisor::new(
                config.online_checker.clone(),
                config.supervisor.clone(),
                &config.work_dir,
            );
            let (report, outcome) = supervisor
                .run_bounded_with(&sink, spec, session.join(None))
                .await?;
            tracing::info!(result = %outcome.result.display(), state = ?outcome.run.state, "online checker finished");
            println!("{}", outcome.result.display());
            report?
        }
    };
    Ok((report, sink))
}

fn exit_code(passed: bool) -> ExitCode {
    if passed { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref(), cli.log_json);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Suite {
            root,
            work_dir,
            collect_all,
            checker_online,
            checker_offline,
        } => {
            if let Some(root) = root {
                config.reference_root = root;
            }
            if let Some(work_dir) = work_dir {
                config.work_dir = work_dir;
            }
            if collect_all {
                config.failure_policy = FailurePolicy::CollectAll;
            }
            if let Some(command) = checker_online {
                config.online_checker = checker_from_arg(&command)?;
            }
            if let Some(command) = checker_offline {
                config.offline_checker = checker_from_arg(&command)?;
            }

            tracing::debug!(root = %config.reference_root.display(), policy = ?config.failure_policy, "starting suite");
            let suite = Suite::new(config)?;
            let report = suite.run().await?;
            tracing::info!(passed = report.passed(), cases = report.outcomes.len(), "suite report ready");
            print_report(&report)?;
            Ok(exit_code(report.passed()))
        }

        Commands::Replay {
            trace_dir,
            output,
            nanos_per_unit,
            spec,
        } => {
            if let Some(nanos) = nanos_per_unit {
                config.replay.time_scale = TimeScale::from_nanos_per_unit(nanos);
            }
            config.validate()?;

            let (report, sink) = replay_trace(&config, &trace_dir, output, spec.as_deref()).await?;
            eprintln!(
                "{} {} stream(s), {} line(s) written, {} skipped -> {}",
                style("replayed").cyan(),
                report.streams.len(),
                report.total_written(),
                report.total_skipped(),
                sink.display()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run {
            mode,
            input,
            spec,
            checker,
            json,
        } => {
            config.validate()?;
            let checker = match (checker, mode) {
                (Some(command), _) => checker_from_arg(&command)?,
                (None, RunModeArg::Bounded) => config.online_checker.clone(),
                (None, RunModeArg::Complete) => config.offline_checker.clone(),
            };

            let supervisor = CheckerSupervisor::new(checker, config.supervisor.clone(), &config.work_dir);
            let outcome = match mode {
                RunModeArg::Bounded => supervisor.run_bounded(&input, &spec).await?,
                RunModeArg::Complete => supervisor.run_to_completion(&input, &spec).await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.result.display());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Compare {
            candidate,
            reference,
            structured,
            tolerance,
            json,
        } => {
            if let Some(tolerance) = tolerance {
                config.comparator.tolerance = tolerance;
            }
            config.validate()?;

            let result = if structured {
                compare_structured(&candidate, &reference)?
            } else {
                compare_logs(&candidate, &reference, &config.comparator)?
            };
            tracing::info!(passed = result.passed, stage = ?result.stage, "comparison finished");
            print_comparison(&result, json)?;
            Ok(exit_code(result.passed))
        }
    }
}
