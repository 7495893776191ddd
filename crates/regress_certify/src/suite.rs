//! Suite orchestration.
//!
//! Runs every discovered case through its checker and compares the result
//! against the recorded reference. Cases run one at a time, in three
//! phases: online static, online simulated, offline.

use crate::case::{CaseKind, discover_cases, locate_failed_log, resolve_components};
use crate::compare::{ComparisonResult, compare_logs};
use crate::structured::compare_structured;
use regress_core::{CoreError, CoreResult, FailurePolicy, HarnessConfig};
use regress_replay::{ReplayConfig, ReplaySession, collect_stream_files, reset_sink, sink_dir_for};
use regress_runtime::CheckerSupervisor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Errors that stop a suite before any case runs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuiteError {
    /// The configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(CoreError),

    /// The work directory could not be prepared
    #[error("cannot prepare work directory {path}: {reason}")]
    WorkDir {
        /// Work directory
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// The reference root could not be walked
    #[error("case discovery failed: {0}")]
    Discovery(CoreError),
}

impl From<SuiteError> for CoreError {
    fn from(err: SuiteError) -> Self {
        match err {
            SuiteError::Config(e) | SuiteError::Discovery(e) => e,
            SuiteError::WorkDir { path, reason } => CoreError::Io { path, reason },
        }
    }
}

/// Result of one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Candidate matches the reference
    Passed,
    /// Candidate differs from the reference
    Failed,
    /// The case could not be checked
    Error,
}

/// Outcome of running one case
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    /// Case directory
    pub case: PathBuf,
    /// Phase the case ran in
    pub kind: CaseKind,
    /// Verdict
    pub verdict: Verdict,
    /// Result artifact the checker produced, if it got that far
    pub candidate: Option<PathBuf>,
    /// Comparison details, if a comparison ran
    pub comparison: Option<ComparisonResult>,
    /// Infrastructure error, if the case errored
    pub error: Option<CoreError>,
    /// Wall time spent on the case
    pub elapsed: Duration,
}

impl CaseOutcome {
    /// Whether the case passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

impl std::fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: ", self.kind, self.case.display())?;
        match (&self.error, &self.comparison) {
            (Some(error), _) => write!(f, "error: {}", error),
            (None, Some(comparison)) => write!(f, "{}", comparison),
            (None, None) => write!(f, "{:?}", self.verdict),
        }
    }
}

/// Outcomes of a suite run, in execution order
#[derive(Debug, Clone, Default)]
pub struct SuiteReport {
    /// Per-case outcomes
    pub outcomes: Vec<CaseOutcome>,
    /// Whether a failure stopped the run before every case ran
    pub stopped_early: bool,
}

impl SuiteReport {
    /// Whether every case that ran passed and none were skipped
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.stopped_early && self.outcomes.iter().all(CaseOutcome::passed)
    }

    /// Outcomes that did not pass
    #[must_use]
    pub fn failures(&self) -> Vec<&CaseOutcome> {
        self.outcomes.iter().filter(|o| !o.passed()).collect()
    }

    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        let passed = self.outcomes.iter().filter(|o| o.passed()).count();
        format!(
            "Suite {}: {}/{} cases passed{}",
            if self.passed() { "PASSED" } else { "FAILED" },
            passed,
            self.outcomes.len(),
            if self.stopped_early { ", stopped at first failure" } else { "" }
        )
    }
}

/// Drives discovery, checker runs and comparison
#[derive(Debug, Clone)]
pub struct Suite {
    config: HarnessConfig,
    online: CheckerSupervisor,
    offline: CheckerSupervisor,
}

impl Suite {
    /// Build a suite from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Config`] if the configuration does not validate
    pub fn new(config: HarnessConfig) -> Result<Self, SuiteError> {
        config.validate().map_err(SuiteError::Config)?;
        let online = CheckerSupervisor::new(
            config.online_checker.clone(),
            config.supervisor.clone(),
            &config.work_dir,
        );
        let offline = CheckerSupervisor::new(
            config.offline_checker.clone(),
            config.supervisor.clone(),
            &config.work_dir,
        );
        Ok(Self {
            config,
            online,
            offline,
        })
    }

    /// The configuration in use
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Discover every case under the reference root and run them
    ///
    /// # Errors
    ///
    /// Returns error if the work directory cannot be created or the
    /// reference root cannot be walked; case failures are in the report
    pub async fn run(&self) -> Result<SuiteReport, SuiteError> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| SuiteError::WorkDir {
                path: self.config.work_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let cases = discover_cases(&self.config.reference_root, &self.config.layout)
            .map_err(SuiteError::Discovery)?;
        if cases.is_empty() {
            tracing::warn!(root = %self.config.reference_root.display(), "no reference cases found");
        }
        Ok(self.run_plan(&cases.plan(&self.config.layout)).await)
    }

    /// Run the given cases in order, honoring the failure policy
    pub async fn run_plan(&self, plan: &[(CaseKind, PathBuf)]) -> SuiteReport {
        let mut report = SuiteReport::default();

        for (index, (kind, case)) in plan.iter().enumerate() {
            let outcome = self.run_case(*kind, case).await;
            let failed = !outcome.passed();
            report.outcomes.push(outcome);

            if failed && self.config.failure_policy == FailurePolicy::FailFast {
                let skipped = plan.len() - index - 1;
                if skipped > 0 {
                    tracing::warn!(skipped, "stopping at first failing case");
                    report.stopped_early = true;
                }
                break;
            }
        }

        tracing::info!(summary = %report.summary(), "suite finished");
        report
    }

    /// Run a single case and record its outcome
    pub async fn run_case(&self, kind: CaseKind, case: &Path) -> CaseOutcome {
        let span = tracing::info_span!("case", %kind, case = %case.display());
        self.run_case_inner(kind, case).instrument(span).await
    }

    async fn run_case_inner(&self, kind: CaseKind, case: &Path) -> CaseOutcome {
        let started = Instant::now();

        let (verdict, candidate, comparison, error) = match self.check(kind, case).await {
            Ok((candidate, comparison)) => {
                let verdict = if comparison.passed {
                    tracing::info!(%comparison, "check passed");
                    Verdict::Passed
                } else {
                    tracing::warn!(%comparison, candidate = %candidate.display(), "check failed");
                    Verdict::Failed
                };
                (verdict, Some(candidate), Some(comparison), None)
            }
            Err(error) => {
                tracing::error!(%error, "case errored");
                (Verdict::Error, None, None, Some(error))
            }
        };

        CaseOutcome {
            case: case.to_path_buf(),
            kind,
            verdict,
            candidate,
            comparison,
            error,
            elapsed: started.elapsed(),
        }
    }

    async fn check(&self, kind: CaseKind, case: &Path) -> CoreResult<(PathBuf, ComparisonResult)> {
        let case_dir = case.to_path_buf();
        let layout = self.config.layout.clone();
        let components = off_runtime(move || resolve_components(&case_dir, kind, &layout)).await?;
        tracing::debug!(
            trace = %components.trace.display(),
            spec = %components.spec.display(),
            "case components resolved"
        );

        match kind {
            CaseKind::OnlineStatic => {
                let outcome = self
                    .online
                    .run_bounded(&components.trace, &components.spec)
                    .await?;
                let comparison = self.compare_online(&outcome.result, &components.reference).await?;
                Ok((outcome.result, comparison))
            }
            CaseKind::OnlineSimulated => {
                let candidate = self.replay_and_check(&components.trace, &components.spec).await?;
                let comparison = self.compare_online(&candidate, &components.reference).await?;
                Ok((candidate, comparison))
            }
            CaseKind::Offline => {
                let outcome = self
                    .offline
                    .run_to_completion(&components.trace, &components.spec)
                    .await?;
                let layout = self.config.layout.clone();
                let reference = components.reference;
                off_runtime(move || {
                    let candidate = locate_failed_log(&outcome.result, &layout)?;
                    let comparison = compare_structured(&candidate, &reference)?;
                    Ok((candidate, comparison))
                })
                .await
            }
        }
    }

    async fn compare_online(&self, candidate: &Path, reference: &Path) -> CoreResult<ComparisonResult> {
        let candidate = candidate.to_path_buf();
        let reference = reference.to_path_buf();
        let settings = self.config.comparator.clone();
        off_runtime(move || Ok(compare_logs(&candidate, &reference, &settings)?)).await
    }

    /// Replay `trace_dir` into a fresh sink directory while the online
    /// checker watches it. The grace window starts once replay finishes.
    async fn replay_and_check(&self, trace_dir: &Path, spec: &Path) -> CoreResult<PathBuf> {
        let replay = &self.config.replay;
        let streams = collect_stream_files(trace_dir, &replay.stream_prefix, &replay.stream_suffix)?;
        let sink = sink_dir_for(trace_dir, &self.config.work_dir, &replay.sink_suffix);
        reset_sink(&sink).await?;

        let mut session = ReplaySession::start(&streams, &sink, ReplayConfig::from(replay)).await?;
        session
            .ready(self.config.supervisor.replay_ready_timeout())
            .await?;

        let join_bound = self.config.supervisor.replay_join_timeout();
        let (replayed, outcome) = self
            .online
            .run_bounded_with(&sink, spec, session.join(Some(join_bound)))
            .await?;
        let replayed = replayed?;

        tracing::info!(
            streams = replayed.streams.len(),
            written = replayed.total_written(),
            skipped = replayed.total_skipped(),
            "replay finished"
        );
        Ok(outcome.result)
    }
}

/// Run filesystem-bound work on the blocking pool
async fn off_runtime<T, F>(work: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("blocking task failed: {}", e),
        })?
}
