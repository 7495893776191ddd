//! Regress Core Types
//!
//! Pure types shared by every harness crate: the error model, trace time
//! scaling, and the harness configuration. No process or task management
//! lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod time;

// Re-exports
pub use config::{
    CaseLayout, CheckerBinary, ComparatorSettings, FailurePolicy, HarnessConfig, OutputBinding,
    ReplaySettings, StdioMode, SupervisorSettings,
};
pub use error::{CoreError, CoreResult};
pub use time::{TimeScale, TraceTime};
