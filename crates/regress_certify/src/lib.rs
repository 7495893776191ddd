//! Regress Certify
//!
//! Decides whether a checker still produces the results it produced when
//! the reference suite was recorded. Online logs are compared exactly, with
//! a tolerance on the summary counts as fallback; offline logs are compared
//! as multisets of invariant records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod case;
pub mod compare;
pub mod structured;
pub mod suite;

pub use case::{CaseComponents, CaseKind, DiscoveredCases, discover_cases, locate_failed_log, resolve_components};
pub use compare::{
    CompareError, ComparisonResult, ComparisonStage, Mismatch, SoftDiagnostics, compare_log_text,
    compare_logs, soft_match,
};
pub use structured::{RecordCount, StructuredDiff, compare_structured, diff_records};
pub use suite::{CaseOutcome, Suite, SuiteError, SuiteReport, Verdict};
