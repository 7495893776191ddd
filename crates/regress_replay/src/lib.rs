//! Regress Replay Engine
//!
//! Feeds recorded trace streams back out at the pace they were captured,
//! so an online checker can consume them as if the instrumented run were
//! live. One task per stream; streams are independent of each other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod trace;

pub use engine::{ReplayConfig, ReplayError, ReplayReport, ReplaySession, StreamReport, replay, reset_sink};
pub use trace::{Event, TraceStream, collect_stream_files, sink_dir_for};
