//! Trace streams loaded from recorded event files.

use crate::engine::ReplayError;
use regress_core::TraceTime;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// One recorded event: its timestamp and the original line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Timestamp taken from the record's `time` field
    pub time: TraceTime,
    /// The record line, trimmed, written back out verbatim
    pub payload: String,
}

impl Event {
    /// Decode one trace line
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if the line is not a JSON object
    /// with an integer `time` field
    pub fn decode(line: &str) -> Result<Self, String> {
        let payload = line.trim();
        let value: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;
        let time = value
            .get("time")
            .ok_or_else(|| "missing 'time' field".to_string())?;
        let raw = time
            .as_i64()
            .ok_or_else(|| format!("'time' is not an integer: {}", time))?;

        Ok(Self {
            time: TraceTime::from_raw(raw),
            payload: payload.to_string(),
        })
    }
}

/// Events of one source file in replay order.
///
/// Sorted ascending by timestamp; events with equal timestamps keep their
/// file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceStream {
    name: String,
    source: PathBuf,
    events: Vec<Event>,
    skipped: usize,
}

impl TraceStream {
    /// Read and decode a whole trace file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read; undecodable lines are
    /// skipped, not errors
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| ReplayError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "stream".to_string());

        let mut stream = Self::from_text(name, &String::from_utf8_lossy(&bytes));
        stream.source = path.to_path_buf();
        Ok(stream)
    }

    /// Decode stream text held in memory
    #[must_use]
    pub fn from_text(name: impl Into<String>, text: &str) -> Self {
        let name = name.into();
        let mut events = Vec::new();
        let mut skipped = 0;

        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match Event::decode(line) {
                Ok(event) => events.push(event),
                Err(reason) => {
                    skipped += 1;
                    tracing::warn!(stream = %name, line = lineno + 1, %reason, "skipping undecodable trace line");
                }
            }
        }

        // Stable: ties keep file order.
        events.sort_by_key(|e| e.time);

        Self {
            source: PathBuf::from(&name),
            name,
            events,
            skipped,
        }
    }

    /// File name of the source, reused for the output file
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the stream was loaded from
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Events in replay order
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of decodable events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the stream has no decodable events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of lines dropped during decoding
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// List the stream files of a trace directory, sorted by name.
///
/// A regular file is a stream if its name starts with `prefix` or ends with
/// `suffix`.
///
/// # Errors
///
/// Returns error if the directory cannot be listed
pub fn collect_stream_files(
    dir: impl AsRef<Path>,
    prefix: &str,
    suffix: &str,
) -> Result<Vec<PathBuf>, ReplayError> {
    let dir = dir.as_ref();
    let io_err = |e: std::io::Error| ReplayError::Io {
        path: dir.display().to_string(),
        reason: e.to_string(),
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !(name.starts_with(prefix) || name.ends_with(suffix)) {
            continue;
        }
        if entry.file_type().map_err(io_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Sink directory for a simulated replay of `trace_dir`: `<work_dir>/<basename><suffix>`
#[must_use]
pub fn sink_dir_for(trace_dir: &Path, work_dir: &Path, suffix: &str) -> PathBuf {
    let base = trace_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "trace".to_string());
    work_dir.join(format!("{}{}", base, suffix))
}
