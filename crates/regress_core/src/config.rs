//! Harness configuration.
//!
//! Every knob has a default matching the reference harness the recorded
//! baselines were produced with; a JSON file may override any subset.

use crate::error::{CoreError, CoreResult};
use crate::time::TimeScale;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Root holding `<group>/<case>` reference directories
    pub reference_root: PathBuf,
    /// Scratch area for simulated stream sinks and per-run directories
    pub work_dir: PathBuf,
    /// Checker consuming live streams (bounded mode)
    pub online_checker: CheckerBinary,
    /// Checker consuming complete traces (run-to-completion mode)
    pub offline_checker: CheckerBinary,
    /// Event replay settings
    pub replay: ReplaySettings,
    /// Process supervision settings
    pub supervisor: SupervisorSettings,
    /// Log comparison settings
    pub comparator: ComparatorSettings,
    /// Case directory naming conventions
    pub layout: CaseLayout,
    /// What to do after the first failing case
    pub failure_policy: FailurePolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            reference_root: PathBuf::from("./reference_result"),
            work_dir: PathBuf::from("./.regress"),
            online_checker: CheckerBinary::new("traincheck-onlinecheck"),
            offline_checker: CheckerBinary::new("traincheck-check"),
            replay: ReplaySettings::default(),
            supervisor: SupervisorSettings::default(),
            comparator: ComparatorSettings::default(),
            layout: CaseLayout::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl HarnessConfig {
    /// Load a configuration file, filling unspecified fields with defaults
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid JSON, or
    /// fails validation
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, &e))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the harness misbehave
    ///
    /// # Errors
    ///
    /// Returns the first invalid field found
    pub fn validate(&self) -> CoreResult<()> {
        self.online_checker.validate("online_checker")?;
        self.offline_checker.validate("offline_checker")?;

        if self.replay.time_scale.nanos_per_unit() == 0 {
            return Err(CoreError::Validation {
                field: "replay.time_scale".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let tolerance = self.comparator.tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(CoreError::Validation {
                field: "comparator.tolerance".to_string(),
                reason: format!("must be a finite non-negative ratio, got {}", tolerance),
            });
        }

        if self.comparator.tail_lines == 0 {
            return Err(CoreError::Validation {
                field: "comparator.tail_lines".to_string(),
                reason: "must scan at least one line".to_string(),
            });
        }

        if let OutputBinding::Flag { flag } = &self.supervisor.output {
            if flag.trim().is_empty() {
                return Err(CoreError::Validation {
                    field: "supervisor.output.flag".to_string(),
                    reason: "flag must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// External checker executable plus fixed leading arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerBinary {
    /// Program name or path
    pub program: String,
    /// Arguments placed before `-f <input> -i <spec>`
    #[serde(default)]
    pub args: Vec<String>,
}

impl CheckerBinary {
    /// Checker with no leading arguments
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add a leading argument
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn validate(&self, field: &str) -> CoreResult<()> {
        if self.program.trim().is_empty() {
            return Err(CoreError::Validation {
                field: format!("{}.program", field),
                reason: "program must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Event replay settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Wall time per trace time unit
    pub time_scale: TimeScale,
    /// Trace directory entries starting with this are replayed as streams
    pub stream_prefix: String,
    /// Trace directory entries ending with this are replayed as streams
    pub stream_suffix: String,
    /// Suffix appended to the trace directory name to form the sink directory
    pub sink_suffix: String,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            time_scale: TimeScale::NANOSECONDS,
            stream_prefix: "trace_".to_string(),
            stream_suffix: ".json".to_string(),
            sink_suffix: "_simulated".to_string(),
        }
    }
}

/// How the supervisor tells the checker where to put its results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputBinding {
    /// Run the checker with its private run directory as working directory
    #[default]
    WorkingDir,
    /// Pass `<flag> <run-dir>` after the standard arguments
    Flag {
        /// Flag name, e.g. `--output-dir`
        flag: String,
    },
}

/// What happens to the checker's stdout and stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StdioMode {
    /// Discard output
    #[default]
    Null,
    /// Share the harness terminal
    Inherit,
}

/// Process supervision settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Time a bounded checker runs before the graceful signal
    pub grace_window_ms: u64,
    /// Time allowed between the graceful signal and the forced kill
    pub kill_timeout_ms: u64,
    /// Upper bound on waiting for replay streams to become ready
    pub replay_ready_timeout_ms: u64,
    /// Upper bound on waiting for replay streams to finish
    pub replay_join_timeout_ms: u64,
    /// Extension of result files discovered after a bounded run
    pub result_log_extension: String,
    /// Prefix of result directories discovered after a run to completion
    pub result_dir_prefix: String,
    /// Result location binding
    pub output: OutputBinding,
    /// Checker stdio handling
    pub stdio: StdioMode,
}

impl SupervisorSettings {
    /// Grace window as a duration
    #[must_use]
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }

    /// Kill timeout as a duration
    #[must_use]
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Replay readiness bound as a duration
    #[must_use]
    pub fn replay_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_ready_timeout_ms)
    }

    /// Replay join bound as a duration
    #[must_use]
    pub fn replay_join_timeout(&self) -> Duration {
        Duration::from_millis(self.replay_join_timeout_ms)
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_window_ms: 20_000,
            kill_timeout_ms: 5_000,
            replay_ready_timeout_ms: 5_000,
            replay_join_timeout_ms: 600_000,
            result_log_extension: "log".to_string(),
            result_dir_prefix: "traincheck_checker_result".to_string(),
            output: OutputBinding::default(),
            stdio: StdioMode::default(),
        }
    }
}

/// Log comparison settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorSettings {
    /// Maximum relative drift of violation counts in the soft stage
    pub tolerance: f64,
    /// Number of trailing lines searched for summary counts
    pub tail_lines: usize,
}

impl Default for ComparatorSettings {
    fn default() -> Self {
        Self {
            tolerance: 0.10,
            tail_lines: 3,
        }
    }
}

/// Naming conventions of a reference case directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseLayout {
    /// Prefix of the trace artifact (file or directory)
    pub trace_prefix: String,
    /// Prefix of the online reference log
    pub online_reference_prefix: String,
    /// Extension of the online reference log
    pub online_reference_extension: String,
    /// Prefix of the directory holding the online invariant spec
    pub online_spec_dir_prefix: String,
    /// Prefix of the offline checker directory (spec and reference result)
    pub offline_spec_dir_prefix: String,
    /// Prefix of the per-trace directory inside an offline result directory
    pub offline_result_dir_prefix: String,
    /// Offline result log name
    pub failed_log_name: String,
    /// Invariant spec file name
    pub invariant_file_name: String,
    /// Case directories ending with this are online-static (and offline) cases
    pub static_suffix: String,
    /// Case directories ending with this are online-simulated cases
    pub simulated_suffix: String,
    /// Static case paths containing this are skipped for offline checking
    pub offline_skip_marker: String,
}

impl Default for CaseLayout {
    fn default() -> Self {
        Self {
            trace_prefix: "trace".to_string(),
            online_reference_prefix: "traincheck_onlinecheck".to_string(),
            online_reference_extension: "log".to_string(),
            online_spec_dir_prefix: "traincheck_onlinechecker".to_string(),
            offline_spec_dir_prefix: "traincheck_checker".to_string(),
            offline_result_dir_prefix: "trace".to_string(),
            failed_log_name: "failed.log".to_string(),
            invariant_file_name: "invariants.json".to_string(),
            static_suffix: "static".to_string(),
            simulated_suffix: "simulated".to_string(),
            offline_skip_marker: "modified".to_string(),
        }
    }
}

/// Suite behavior after a failing case
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failing case
    #[default]
    FailFast,
    /// Run every case and report all failures
    CollectAll,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_harness() {
        let config = HarnessConfig::default();
        assert_eq!(config.supervisor.grace_window(), Duration::from_secs(20));
        assert_eq!(config.supervisor.kill_timeout(), Duration::from_secs(5));
        assert_eq!(config.comparator.tail_lines, 3);
        assert!((config.comparator.tolerance - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.replay.time_scale, TimeScale::NANOSECONDS);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "online_checker": { "program": "my-online" },
            "supervisor": { "grace_window_ms": 250, "output": { "mode": "flag", "flag": "--out" } },
            "failure_policy": "collect_all"
        }"#;
        let config: HarnessConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.online_checker.program, "my-online");
        assert!(config.online_checker.args.is_empty());
        assert_eq!(config.supervisor.grace_window_ms, 250);
        assert_eq!(config.supervisor.kill_timeout_ms, 5_000);
        assert_eq!(
            config.supervisor.output,
            OutputBinding::Flag {
                flag: "--out".to_string()
            }
        );
        assert_eq!(config.failure_policy, FailurePolicy::CollectAll);
        assert_eq!(config.offline_checker.program, "traincheck-check");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "comparator": {{ "tolerance": 0.25 }} }}"#).unwrap();

        let config = HarnessConfig::load(file.path()).unwrap();
        assert!((config.comparator.tolerance - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.comparator.tail_lines, 3);
    }

    #[test]
    fn test_load_missing_file() {
        let result = HarnessConfig::load("/nonexistent/regress.json");
        assert!(matches!(result, Err(CoreError::Io { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = HarnessConfig::default();
        config.comparator.tolerance = -0.1;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.comparator.tolerance = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.comparator.tail_lines = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.replay.time_scale = TimeScale::from_nanos_per_unit(0);
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.online_checker.program = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(CoreError::Validation { field, .. }) if field == "online_checker.program"
        ));
    }

    #[test]
    fn test_checker_binary_builder() {
        let checker = CheckerBinary::new("sh").with_arg("-c").with_arg("exit 0");
        assert_eq!(checker.program, "sh");
        assert_eq!(checker.args, vec!["-c".to_string(), "exit 0".to_string()]);
    }
}
