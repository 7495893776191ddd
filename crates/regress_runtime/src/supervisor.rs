//! Checker process supervision.
//!
//! ```text
//! Pending -> Running -> Completed
//!                    -> TimedOut -> Terminated
//!                                -> Killed
//! ```
//!
//! A bounded run sends the graceful signal once the grace window expires and
//! escalates to a forced kill after the kill timeout. A run to completion
//! only waits. Either way the checker's whole process group is swept before
//! the call returns.

use crate::discover::{newest_dir_with_prefix, newest_file_with_extension};
use crate::signal::Signal;
use regress_core::{CheckerBinary, CoreError, OutputBinding, StdioMode, SupervisorSettings};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use uuid::Uuid;

/// Supervisor error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    /// Preparing the run directory or resolving paths failed
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// The checker could not be started
    #[error("Failed to start {program}: {reason}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error message
        reason: String,
    },

    /// Waiting on or signalling the checker failed
    #[error("Lost control of {program}: {reason}")]
    Control {
        /// Program being supervised
        program: String,
        /// Underlying error message
        reason: String,
    },

    /// The checker exited without leaving a result artifact
    #[error("No checker output found in {location}")]
    MissingOutput {
        /// Directory that was searched
        location: String,
    },
}

impl From<SupervisorError> for CoreError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Io { path, reason } => CoreError::Io { path, reason },
            SupervisorError::Spawn { program, reason }
            | SupervisorError::Control { program, reason } => {
                CoreError::Process { program, reason }
            }
            SupervisorError::MissingOutput { location } => CoreError::MissingOutput { location },
        }
    }
}

/// How a run is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Grace window, graceful signal, forced kill; result is a log file
    Bounded,
    /// Wait for exit; result is a directory
    ToCompletion,
}

/// Lifecycle state of a checker run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not yet spawned
    Pending,
    /// Process is alive
    Running,
    /// Exited on its own
    Completed,
    /// Grace window expired with the process still alive
    TimedOut,
    /// Exited after the graceful signal
    Terminated,
    /// Forced down after the kill timeout
    Killed,
}

impl RunState {
    /// Whether `next` is a legal successor of this state
    #[must_use]
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::TimedOut)
                | (Self::TimedOut, Self::Terminated)
                | (Self::TimedOut, Self::Killed)
        )
    }

    /// Whether the process is known to be gone
    #[must_use]
    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Terminated | Self::Killed)
    }
}

/// Record of one checker invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerRun {
    /// Run identifier, also names the run directory
    pub id: Uuid,
    /// How the run was bounded
    pub mode: RunMode,
    /// Current lifecycle state
    pub state: RunState,
    /// Program that was run
    pub program: String,
    /// Process id (and process group id) once spawned
    pub pid: Option<u32>,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Private directory the checker wrote into
    pub run_dir: PathBuf,
    /// Wall time from spawn to exit
    pub elapsed: Duration,
}

impl CheckerRun {
    fn new(mode: RunMode, program: &str, work_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            mode,
            state: RunState::Pending,
            program: program.to_string(),
            pid: None,
            exit_code: None,
            run_dir: work_dir.join(format!("run-{}", id)),
            elapsed: Duration::ZERO,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(run = %self.id, from = ?self.state, to = ?next, "checker run transition");
        self.state = next;
    }

    fn exited(&mut self, next: RunState, status: ExitStatus, started: Instant) {
        self.exit_code = status.code();
        self.elapsed = started.elapsed();
        self.advance(next);
    }
}

/// A finished run together with its result artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerOutcome {
    /// The run record
    pub run: CheckerRun,
    /// Log file (bounded) or result directory (to completion)
    pub result: PathBuf,
}

/// Runs one checker binary under the configured limits
#[derive(Debug, Clone)]
pub struct CheckerSupervisor {
    checker: CheckerBinary,
    settings: SupervisorSettings,
    work_dir: PathBuf,
    grace_window: Duration,
    kill_timeout: Duration,
}

impl CheckerSupervisor {
    /// Create a supervisor that places run directories under `work_dir`
    pub fn new(
        checker: CheckerBinary,
        settings: SupervisorSettings,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            grace_window: settings.grace_window(),
            kill_timeout: settings.kill_timeout(),
            checker,
            settings,
            work_dir: work_dir.into(),
        }
    }

    /// Override the grace window of bounded runs
    #[must_use]
    pub fn with_grace_window(mut self, grace_window: Duration) -> Self {
        self.grace_window = grace_window;
        self
    }

    /// Override the wait between the graceful signal and the forced kill
    #[must_use]
    pub fn with_kill_timeout(mut self, kill_timeout: Duration) -> Self {
        self.kill_timeout = kill_timeout;
        self
    }

    /// The supervised checker
    #[must_use]
    pub fn checker(&self) -> &CheckerBinary {
        &self.checker
    }

    /// Run an online checker for the grace window and return its newest log.
    ///
    /// # Errors
    ///
    /// Returns error if the checker cannot be started or controlled, or if
    /// it leaves no log behind
    pub async fn run_bounded(
        &self,
        input: &Path,
        spec: &Path,
    ) -> Result<CheckerOutcome, SupervisorError> {
        let ((), outcome) = self.run_bounded_with(input, spec, std::future::ready(())).await?;
        Ok(outcome)
    }

    /// Bounded run whose grace window starts only once `gate` resolves.
    ///
    /// The checker is spawned first, so it is already watching `input` while
    /// `gate` (typically a replay feeding `input`) makes progress. If the
    /// checker cannot be spawned, `gate` is dropped without being polled.
    ///
    /// # Errors
    ///
    /// See [`CheckerSupervisor::run_bounded`]
    pub async fn run_bounded_with<F>(
        &self,
        input: &Path,
        spec: &Path,
        gate: F,
    ) -> Result<(F::Output, CheckerOutcome), SupervisorError>
    where
        F: Future,
    {
        let mut run = CheckerRun::new(RunMode::Bounded, &self.checker.program, &self.work_dir);
        let (mut child, started) = self.spawn(&mut run, input, spec).await?;
        let sweep = GroupSweep::new(&run);

        let gate_output = gate.await;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|e| self.control_error(e))?;
                run.exited(RunState::Completed, status, started);
                tracing::info!(run = %run.id, %status, "checker exited within grace window");
            }
            () = tokio::time::sleep(self.grace_window) => {
                run.advance(RunState::TimedOut);
                self.shut_down(&mut child, &mut run, started).await?;
            }
        }
        drop(sweep);

        let found = newest_file_with_extension(&run.run_dir, &self.settings.result_log_extension)
            .map_err(|e| io_error(&run.run_dir, &e))?;
        let result = found.ok_or_else(|| SupervisorError::MissingOutput {
            location: run.run_dir.display().to_string(),
        })?;

        tracing::info!(
            run = %run.id,
            state = ?run.state,
            elapsed_ms = run.elapsed.as_millis() as u64,
            result = %result.display(),
            "bounded checker run finished"
        );
        Ok((gate_output, CheckerOutcome { run, result }))
    }

    /// Run an offline checker until it exits and return its newest result
    /// directory.
    ///
    /// A non-zero exit status is logged, not treated as failure; the result
    /// artifact decides.
    ///
    /// # Errors
    ///
    /// Returns error if the checker cannot be started or waited on, or if it
    /// leaves no result directory behind
    pub async fn run_to_completion(
        &self,
        input: &Path,
        spec: &Path,
    ) -> Result<CheckerOutcome, SupervisorError> {
        let mut run = CheckerRun::new(RunMode::ToCompletion, &self.checker.program, &self.work_dir);
        let (mut child, started) = self.spawn(&mut run, input, spec).await?;
        let sweep = GroupSweep::new(&run);

        let status = child.wait().await.map_err(|e| self.control_error(e))?;
        run.exited(RunState::Completed, status, started);
        if !status.success() {
            tracing::warn!(run = %run.id, %status, "checker exited unsuccessfully");
        }
        drop(sweep);

        let found = newest_dir_with_prefix(&run.run_dir, &self.settings.result_dir_prefix)
            .map_err(|e| io_error(&run.run_dir, &e))?;
        let result = found.ok_or_else(|| SupervisorError::MissingOutput {
            location: run.run_dir.display().to_string(),
        })?;

        tracing::info!(
            run = %run.id,
            elapsed_ms = run.elapsed.as_millis() as u64,
            result = %result.display(),
            "checker run completed"
        );
        Ok(CheckerOutcome { run, result })
    }

    async fn spawn(
        &self,
        run: &mut CheckerRun,
        input: &Path,
        spec: &Path,
    ) -> Result<(Child, Instant), SupervisorError> {
        // The checker runs inside the run dir, so it must not be relative.
        run.run_dir = absolute(&run.run_dir)?;
        tokio::fs::create_dir_all(&run.run_dir)
            .await
            .map_err(|e| io_error(&run.run_dir, &e))?;

        let mut command = self.command(input, spec, &run.run_dir)?;
        let child = command.spawn().map_err(|e| SupervisorError::Spawn {
            program: self.checker.program.clone(),
            reason: e.to_string(),
        })?;
        let started = Instant::now();

        run.pid = child.id();
        run.advance(RunState::Running);
        tracing::info!(
            run = %run.id,
            program = %self.checker.program,
            pid = ?run.pid,
            input = %input.display(),
            run_dir = %run.run_dir.display(),
            "checker started"
        );
        Ok((child, started))
    }

    fn command(&self, input: &Path, spec: &Path, run_dir: &Path) -> Result<Command, SupervisorError> {
        let input = absolute(input)?;
        let spec = absolute(spec)?;

        let mut command = Command::new(resolve_program(&self.checker.program)?);
        command
            .args(&self.checker.args)
            .arg("-f")
            .arg(&input)
            .arg("-i")
            .arg(&spec)
            .current_dir(run_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        if let OutputBinding::Flag { flag } = &self.settings.output {
            command.arg(flag).arg(run_dir);
        }

        match self.settings.stdio {
            StdioMode::Null => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            StdioMode::Inherit => {
                command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
        }

        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }

    async fn shut_down(
        &self,
        child: &mut Child,
        run: &mut CheckerRun,
        started: Instant,
    ) -> Result<(), SupervisorError> {
        tracing::debug!(run = %run.id, "grace window expired, terminating checker");
        self.deliver(child, run, Signal::Terminate)?;

        match tokio::time::timeout(self.kill_timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|e| self.control_error(e))?;
                run.exited(RunState::Terminated, status, started);
            }
            Err(_) => {
                tracing::warn!(
                    run = %run.id,
                    kill_timeout_ms = self.kill_timeout.as_millis() as u64,
                    "checker ignored termination, killing"
                );
                self.deliver(child, run, Signal::Kill)?;
                let status = child.wait().await.map_err(|e| self.control_error(e))?;
                run.exited(RunState::Killed, status, started);
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn deliver(&self, _child: &mut Child, run: &CheckerRun, signal: Signal) -> Result<(), SupervisorError> {
        let Some(pid) = run.pid else {
            return Ok(());
        };
        crate::signal::signal_group(pid, signal).map_err(|e| self.control_error(e))
    }

    #[cfg(not(unix))]
    fn deliver(&self, child: &mut Child, _run: &CheckerRun, _signal: Signal) -> Result<(), SupervisorError> {
        child.start_kill().map_err(|e| self.control_error(e))
    }

    fn control_error(&self, err: std::io::Error) -> SupervisorError {
        SupervisorError::Control {
            program: self.checker.program.clone(),
            reason: err.to_string(),
        }
    }
}

/// Kills whatever the checker left running in its group once dropped.
///
/// Held from spawn until the run is over, so the group is swept on error
/// returns and cancellation as well as on the normal path. `kill_on_drop`
/// alone only reaches the group leader.
struct GroupSweep {
    run: Uuid,
    pgid: Option<u32>,
}

impl GroupSweep {
    fn new(run: &CheckerRun) -> Self {
        Self {
            run: run.id,
            pgid: run.pid,
        }
    }
}

impl Drop for GroupSweep {
    #[cfg(unix)]
    fn drop(&mut self) {
        let Some(pgid) = self.pgid else {
            return;
        };
        if let Err(e) = crate::signal::signal_group(pgid, Signal::Kill) {
            tracing::warn!(run = %self.run, error = %e, "failed to sweep checker process group");
        }
    }

    #[cfg(not(unix))]
    fn drop(&mut self) {}
}

fn io_error(path: &Path, err: &std::io::Error) -> SupervisorError {
    SupervisorError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, SupervisorError> {
    std::path::absolute(path).map_err(|e| io_error(path, &e))
}

/// Programs given as relative paths are resolved against our working
/// directory, since the checker runs inside its run directory. Bare names
/// are left for `PATH` lookup.
fn resolve_program(program: &str) -> Result<PathBuf, SupervisorError> {
    let path = Path::new(program);
    if path.is_relative() && path.components().count() > 1 {
        absolute(path)
    } else {
        Ok(path.to_path_buf())
    }
}
