//! Regress Runtime
//!
//! Runs an external checker against one input and one invariant spec and
//! hands back the artifact it produced. Online checkers never exit on their
//! own, so they get a bounded run: a grace window, a graceful signal, then a
//! forced kill. Offline checkers run to completion.
//!
//! Every run gets a private directory under the work dir; the result
//! artifact is looked up there, never in a shared location.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod discover;
pub mod signal;
pub mod supervisor;

pub use discover::{newest_dir_with_prefix, newest_file_with_extension};
pub use supervisor::{
    CheckerOutcome, CheckerRun, CheckerSupervisor, RunMode, RunState, SupervisorError,
};
