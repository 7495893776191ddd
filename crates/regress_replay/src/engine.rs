//! Concurrent replay of trace streams into sink files.
//!
//! A [`ReplaySession`] loads every stream up front, then spawns one task per
//! stream. Each task creates its output file, reports readiness, and writes
//! its events in order, sleeping for the scaled gap between consecutive
//! timestamps and flushing after every line so a tailing reader sees output
//! as it would during a live run.

use crate::trace::{Event, TraceStream};
use futures::future::join_all;
use regress_core::{CoreError, ReplaySettings, TimeScale};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};

/// Replay configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Wall time per trace time unit
    pub time_scale: TimeScale,
}

impl From<&ReplaySettings> for ReplayConfig {
    fn from(settings: &ReplaySettings) -> Self {
        Self {
            time_scale: settings.time_scale,
        }
    }
}

/// Replay error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Reading a trace or writing a sink failed
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path involved
        path: String,
        /// Underlying error message
        reason: String,
    },
    /// Streams did not create their sinks within the readiness bound
    #[error("{pending} replay stream(s) not ready in time")]
    NotReady {
        /// Streams still without a sink file
        pending: usize,
    },
    /// Streams were still writing when the join bound elapsed
    #[error("{pending} replay stream(s) still running at join deadline")]
    JoinTimeout {
        /// Streams aborted at the deadline
        pending: usize,
    },
    /// A replay task panicked or was cancelled
    #[error("replay of {stream} failed: {reason}")]
    TaskFailed {
        /// Stream name
        stream: String,
        /// Join error message
        reason: String,
    },
}

impl From<ReplayError> for CoreError {
    fn from(err: ReplayError) -> Self {
        match err {
            ReplayError::Io { path, reason } => CoreError::Io { path, reason },
            ReplayError::NotReady { .. } | ReplayError::JoinTimeout { .. } => CoreError::Timeout {
                operation: err.to_string(),
            },
            ReplayError::TaskFailed { .. } => CoreError::Internal {
                message: err.to_string(),
            },
        }
    }
}

/// Outcome of one stream's replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    /// Stream name (source file name)
    pub name: String,
    /// Sink file written
    pub output: PathBuf,
    /// Lines written
    pub written: usize,
    /// Source lines dropped as undecodable
    pub skipped: usize,
}

/// Outcome of a whole session, streams in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Per-stream outcomes
    pub streams: Vec<StreamReport>,
}

impl ReplayReport {
    /// Lines written across all streams
    #[must_use]
    pub fn total_written(&self) -> usize {
        self.streams.iter().map(|s| s.written).sum()
    }

    /// Lines skipped across all streams
    #[must_use]
    pub fn total_skipped(&self) -> usize {
        self.streams.iter().map(|s| s.skipped).sum()
    }
}

struct StreamTask {
    name: String,
    handle: JoinHandle<Result<StreamReport, ReplayError>>,
}

/// A running replay of one case's streams
pub struct ReplaySession {
    output_dir: PathBuf,
    ready: Vec<oneshot::Receiver<()>>,
    tasks: Vec<StreamTask>,
}

impl ReplaySession {
    /// Load every input file and start one replay task per stream.
    ///
    /// All files are decoded before any task starts, so the tasks begin
    /// writing together.
    ///
    /// # Errors
    ///
    /// Returns error if the output directory cannot be created or an input
    /// file cannot be read
    pub async fn start(
        inputs: &[PathBuf],
        output_dir: impl AsRef<Path>,
        config: ReplayConfig,
    ) -> Result<Self, ReplayError> {
        let output_dir = output_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| ReplayError::Io {
                path: output_dir.display().to_string(),
                reason: e.to_string(),
            })?;

        let mut streams = Vec::with_capacity(inputs.len());
        for input in inputs {
            streams.push(TraceStream::load(input).await?);
        }

        let mut ready = Vec::with_capacity(streams.len());
        let mut tasks = Vec::with_capacity(streams.len());
        for stream in streams {
            let (tx, rx) = oneshot::channel();
            let output = output_dir.join(stream.name());
            let name = stream.name().to_string();
            let handle = tokio::spawn(write_stream(stream, output, config.time_scale, tx));
            ready.push(rx);
            tasks.push(StreamTask { name, handle });
        }

        tracing::info!(
            streams = tasks.len(),
            output = %output_dir.display(),
            scale = %config.time_scale,
            "replay session started"
        );

        Ok(Self {
            output_dir,
            ready,
            tasks,
        })
    }

    /// Directory receiving the sink files
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Number of streams in the session
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every stream has created its sink file.
    ///
    /// A stream whose task ended before signalling counts as ready; its
    /// failure surfaces from [`ReplaySession::join`].
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::NotReady`] if `bound` elapses first
    pub async fn ready(&mut self, bound: Duration) -> Result<(), ReplayError> {
        let pending = std::mem::take(&mut self.ready);
        let total = pending.len();
        match tokio::time::timeout(bound, join_all(pending)).await {
            Ok(_) => {
                tracing::debug!(streams = total, "replay sinks ready");
                Ok(())
            }
            Err(_) => Err(ReplayError::NotReady {
                pending: self.missing_sinks(),
            }),
        }
    }

    fn missing_sinks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| !self.output_dir.join(&t.name).exists())
            .count()
    }

    /// Wait for every stream to finish writing.
    ///
    /// With a bound, streams still running at the deadline are aborted and
    /// [`ReplayError::JoinTimeout`] is returned.
    ///
    /// # Errors
    ///
    /// Returns the first stream failure, or a timeout
    pub async fn join(mut self, bound: Option<Duration>) -> Result<ReplayReport, ReplayError> {
        let tasks = std::mem::take(&mut self.tasks);
        let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
        let aborts: Vec<AbortHandle> = tasks.iter().map(|t| t.handle.abort_handle()).collect();
        let all = join_all(tasks.into_iter().map(|t| t.handle));

        let results = match bound {
            Some(bound) => match tokio::time::timeout(bound, all).await {
                Ok(results) => results,
                Err(_) => {
                    let pending = aborts.iter().filter(|a| !a.is_finished()).count();
                    aborts.iter().for_each(AbortHandle::abort);
                    tracing::warn!(pending, ?bound, "aborting replay streams at join deadline");
                    return Err(ReplayError::JoinTimeout { pending });
                }
            },
            None => all.await,
        };

        let mut report = ReplayReport::default();
        for (name, result) in names.into_iter().zip(results) {
            let stream = result.map_err(|e| ReplayError::TaskFailed {
                stream: name,
                reason: e.to_string(),
            })??;
            report.streams.push(stream);
        }

        tracing::info!(
            streams = report.streams.len(),
            written = report.total_written(),
            skipped = report.total_skipped(),
            "replay session finished"
        );
        Ok(report)
    }
}

impl Drop for ReplaySession {
    fn drop(&mut self) {
        // Unjoined sessions must not leave writers behind.
        for task in &self.tasks {
            task.handle.abort();
        }
    }
}

/// Empty `dir` of a previous replay's output, creating it if absent.
///
/// Sinks hold exactly one file per input stream, so stale stream files from
/// an earlier replay must not survive into the next one.
///
/// # Errors
///
/// Returns error if the old directory cannot be removed or the new one
/// cannot be created
pub async fn reset_sink(dir: impl AsRef<Path>) -> Result<(), ReplayError> {
    let dir = dir.as_ref();
    let io_err = |e: std::io::Error| ReplayError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };

    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => tracing::debug!(sink = %dir.display(), "cleared previous replay output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(e)),
    }
    tokio::fs::create_dir_all(dir).await.map_err(io_err)
}

/// Replay `inputs` into `output_dir` and return once every stream is written
///
/// # Errors
///
/// Returns error if any input cannot be read or any sink cannot be written
pub async fn replay(
    inputs: &[PathBuf],
    output_dir: impl AsRef<Path>,
    config: ReplayConfig,
) -> Result<ReplayReport, ReplayError> {
    ReplaySession::start(inputs, output_dir, config)
        .await?
        .join(None)
        .await
}

async fn write_stream(
    stream: TraceStream,
    output: PathBuf,
    scale: TimeScale,
    ready: oneshot::Sender<()>,
) -> Result<StreamReport, ReplayError> {
    let io_err = |e: std::io::Error| ReplayError::Io {
        path: output.display().to_string(),
        reason: e.to_string(),
    };

    let mut file = tokio::fs::File::create(&output).await.map_err(io_err)?;
    let _ = ready.send(());

    let mut previous: Option<&Event> = None;
    for event in stream.events() {
        if let Some(prev) = previous {
            if let Some(delay) = scale.delay_between(prev.time, event.time) {
                tokio::time::sleep(delay).await;
            }
        }
        file.write_all(event.payload.as_bytes()).await.map_err(io_err)?;
        file.write_all(b"\n").await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        previous = Some(event);
    }

    tracing::debug!(stream = stream.name(), events = stream.len(), "replay stream done");
    Ok(StreamReport {
        name: stream.name().to_string(),
        output,
        written: stream.len(),
        skipped: stream.skipped(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;
    use std::time::Instant;

    fn write_input(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }

    fn ms_config() -> ReplayConfig {
        ReplayConfig {
            time_scale: TimeScale::MILLISECONDS,
        }
    }

    #[tokio::test]
    async fn test_replay_writes_sorted_lines_per_stream() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let a = write_input(
            input_dir.path(),
            "trace_a",
            &[
                r#"{"time": 2, "v": "a2"}"#.to_string(),
                r#"{"time": 1, "v": "a1"}"#.to_string(),
                "oops".to_string(),
            ],
        );
        let b = write_input(input_dir.path(), "trace_b", &[r#"{"time": 9, "v": "b9"}"#.to_string()]);

        let report = replay(&[a, b], out_dir.path(), ms_config()).await.unwrap();
        assert_eq!(report.streams.len(), 2);
        assert_eq!(report.streams[0].name, "trace_a");
        assert_eq!(report.streams[0].written, 2);
        assert_eq!(report.streams[0].skipped, 1);
        assert_eq!(report.total_written(), 3);

        let out_a = std::fs::read_to_string(out_dir.path().join("trace_a")).unwrap();
        assert_eq!(out_a, "{\"time\": 1, \"v\": \"a1\"}\n{\"time\": 2, \"v\": \"a2\"}\n");
        let out_b = std::fs::read_to_string(out_dir.path().join("trace_b")).unwrap();
        assert_eq!(out_b, "{\"time\": 9, \"v\": \"b9\"}\n");
    }

    #[tokio::test]
    async fn test_replay_sleeps_scaled_gaps() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = write_input(
            input_dir.path(),
            "trace_0",
            &[
                r#"{"time": 1000}"#.to_string(),
                r#"{"time": 1060}"#.to_string(),
                r#"{"time": 1120}"#.to_string(),
            ],
        );

        let started = Instant::now();
        replay(&[input], out_dir.path(), ms_config()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_empty_stream_yields_empty_file_immediately() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = write_input(input_dir.path(), "trace_empty", &["not json".to_string()]);

        // Seconds per unit: any suspension at all would be visible.
        let config = ReplayConfig {
            time_scale: TimeScale::from_nanos_per_unit(1_000_000_000),
        };
        let started = Instant::now();
        let report = replay(&[input], out_dir.path(), config).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(report.streams[0].written, 0);
        assert_eq!(report.streams[0].skipped, 1);
        let out = std::fs::read_to_string(out_dir.path().join("trace_empty")).unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_partial_output_visible_while_sleeping() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = write_input(
            input_dir.path(),
            "trace_slow",
            &[r#"{"time": 0}"#.to_string(), r#"{"time": 400}"#.to_string()],
        );

        let mut session = ReplaySession::start(&[input], out_dir.path(), ms_config())
            .await
            .unwrap();
        session.ready(Duration::from_secs(5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let partial = std::fs::read_to_string(out_dir.path().join("trace_slow")).unwrap();
        assert_eq!(partial, "{\"time\": 0}\n");

        let report = session.join(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(report.total_written(), 2);
    }

    #[tokio::test]
    async fn test_join_deadline_aborts_streams() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = write_input(
            input_dir.path(),
            "trace_long",
            &[r#"{"time": 0}"#.to_string(), r#"{"time": 60000}"#.to_string()],
        );

        let session = ReplaySession::start(&[input], out_dir.path(), ms_config())
            .await
            .unwrap();
        assert_eq!(session.stream_count(), 1);
        let result = session.join(Some(Duration::from_millis(100))).await;
        assert_eq!(result, Err(ReplayError::JoinTimeout { pending: 1 }));
    }

    #[tokio::test]
    async fn test_dropped_session_stops_writing() {
        let input_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let input = write_input(
            input_dir.path(),
            "trace_dropped",
            &[r#"{"time": 0}"#.to_string(), r#"{"time": 200}"#.to_string()],
        );

        let mut session = ReplaySession::start(&[input], out_dir.path(), ms_config())
            .await
            .unwrap();
        session.ready(Duration::from_secs(5)).await.unwrap();
        drop(session);
        tokio::time::sleep(Duration::from_millis(400)).await;

        let out = std::fs::read_to_string(out_dir.path().join("trace_dropped")).unwrap();
        assert!(out.lines().count() <= 1);
    }

    #[tokio::test]
    async fn test_start_fails_on_missing_input() {
        let out_dir = tempfile::tempdir().unwrap();
        let result = ReplaySession::start(
            &[PathBuf::from("/nonexistent/trace_0")],
            out_dir.path(),
            ms_config(),
        )
        .await;
        assert!(matches!(result, Err(ReplayError::Io { .. })));
    }

    #[tokio::test]
    async fn test_no_inputs() {
        let out_dir = tempfile::tempdir().unwrap();
        let sink = out_dir.path().join("nested_simulated");
        let report = replay(&[], &sink, ms_config()).await.unwrap();
        assert!(report.streams.is_empty());
        assert!(sink.is_dir());
    }

    #[tokio::test]
    async fn test_reset_sink_drops_stale_streams() {
        let input_dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let sink = work.path().join("trace_run_simulated");
        let first = write_input(input_dir.path(), "trace_0.json", &[r#"{"time": 0}"#.to_string()]);
        let second = write_input(input_dir.path(), "trace_1.json", &[r#"{"time": 0}"#.to_string()]);

        reset_sink(&sink).await.unwrap();
        replay(&[first.clone(), second], &sink, ms_config()).await.unwrap();

        reset_sink(&sink).await.unwrap();
        let report = replay(&[first], &sink, ms_config()).await.unwrap();
        assert_eq!(report.streams.len(), 1);

        let mut names: Vec<String> = std::fs::read_dir(&sink)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["trace_0.json"]);
    }

    #[tokio::test]
    async fn test_reset_sink_creates_missing_dir() {
        let work = tempfile::tempdir().unwrap();
        let sink = work.path().join("a").join("b_simulated");
        reset_sink(&sink).await.unwrap();
        assert!(sink.is_dir());
    }

    #[tokio::test]
    async fn test_reset_sink_reports_io_errors() {
        let work = tempfile::tempdir().unwrap();
        let blocker = work.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let result = reset_sink(&blocker).await;
        assert!(matches!(result, Err(ReplayError::Io { .. })));
        assert!(blocker.is_file());
    }

    #[test]
    fn test_error_into_core() {
        let core: CoreError = ReplayError::JoinTimeout { pending: 2 }.into();
        assert!(matches!(core, CoreError::Timeout { .. }));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_replay_preserves_lines_and_order(times in prop::collection::vec(0i64..1_000, 0..40)) {
            let input_dir = tempfile::tempdir().unwrap();
            let out_dir = tempfile::tempdir().unwrap();
            let lines: Vec<String> = times
                .iter()
                .enumerate()
                .map(|(seq, t)| format!("{{\"time\": {}, \"seq\": {}}}", t, seq))
                .collect();
            let input = write_input(input_dir.path(), "trace_p", &lines);

            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let config = ReplayConfig { time_scale: TimeScale::NANOSECONDS };
            rt.block_on(replay(&[input], out_dir.path(), config)).unwrap();

            let out = std::fs::read_to_string(out_dir.path().join("trace_p")).unwrap();
            let written: Vec<(i64, u64)> = out
                .lines()
                .map(|l| {
                    let v: Value = serde_json::from_str(l).unwrap();
                    (v["time"].as_i64().unwrap(), v["seq"].as_u64().unwrap())
                })
                .collect();

            // Same multiset of lines.
            let mut expected: Vec<String> = lines.clone();
            let mut actual: Vec<String> = out.lines().map(str::to_string).collect();
            expected.sort();
            actual.sort();
            prop_assert_eq!(actual, expected);

            // Non-decreasing time; ties keep input order.
            for pair in written.windows(2) {
                prop_assert!(pair[0].0 <= pair[1].0);
                if pair[0].0 == pair[1].0 {
                    prop_assert!(pair[0].1 < pair[1].1);
                }
            }
        }
    }
}
