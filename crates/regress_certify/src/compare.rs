//! Comparison of plain-text checker logs.
//!
//! Two stages. The exact stage compares the logs line by line with all
//! whitespace inside each line ignored. If that fails, the soft stage reads
//! the summary counts from the last few lines of both logs: invariant
//! counts must match exactly, violation counts may drift by a relative
//! tolerance.

use crate::structured::StructuredDiff;
use regress_core::{ComparatorSettings, CoreError};
use regress_log::{ParseError, SummaryCounts, extract_summary};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Comparison error
///
/// Only infrastructure faults are errors; a mismatch is a failed
/// [`ComparisonResult`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompareError {
    /// A log could not be read
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// A structured log could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl From<CompareError> for CoreError {
    fn from(err: CompareError) -> Self {
        match err {
            CompareError::Io { path, reason } => CoreError::Io { path, reason },
            CompareError::Parse(e) => e.into(),
        }
    }
}

/// Stage that decided a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStage {
    /// Whitespace-insensitive line comparison
    Exact,
    /// Summary count comparison with tolerance
    Soft,
    /// Multiset comparison of invariant records
    Structured,
}

/// Summary counts of both sides, recorded whenever the soft stage ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDiagnostics {
    /// Counts from the candidate log
    pub candidate: SummaryCounts,
    /// Counts from the reference log
    pub reference: SummaryCounts,
}

/// Why a comparison failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    /// One of the logs lacks a summary count
    MissingSummary,
    /// Invariant counts differ
    InvariantCount {
        /// Candidate count
        candidate: u64,
        /// Reference count
        reference: u64,
    },
    /// Violation counts differ by more than the tolerance
    ViolationDrift {
        /// Candidate count
        candidate: u64,
        /// Reference count
        reference: u64,
        /// Relative difference
        ratio: f64,
        /// Allowed relative difference
        tolerance: f64,
    },
    /// Invariant record multisets differ
    Records(StructuredDiff),
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSummary => write!(f, "summary counts missing"),
            Self::InvariantCount {
                candidate,
                reference,
            } => write!(f, "invariants violated {} vs {}", candidate, reference),
            Self::ViolationDrift {
                candidate,
                reference,
                ratio,
                tolerance,
            } => write!(
                f,
                "violations {} vs {} differ by {:.1}% (allowed {:.1}%)",
                candidate,
                reference,
                ratio * 100.0,
                tolerance * 100.0
            ),
            Self::Records(diff) => write!(
                f,
                "{} record(s) missing, {} unexpected",
                diff.missing_total(),
                diff.unexpected_total()
            ),
        }
    }
}

/// Outcome of comparing a candidate against a reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Whether the candidate is equivalent to the reference
    pub passed: bool,
    /// Stage that decided the outcome
    pub stage: ComparisonStage,
    /// Summary counts, if the soft stage ran
    pub diagnostics: Option<SoftDiagnostics>,
    /// Reason for failure
    pub mismatch: Option<Mismatch>,
}

impl ComparisonResult {
    fn exact_match() -> Self {
        Self {
            passed: true,
            stage: ComparisonStage::Exact,
            diagnostics: None,
            mismatch: None,
        }
    }

    pub(crate) fn structured(mismatch: Option<Mismatch>) -> Self {
        Self {
            passed: mismatch.is_none(),
            stage: ComparisonStage::Structured,
            diagnostics: None,
            mismatch,
        }
    }
}

impl std::fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self.stage {
            ComparisonStage::Exact => "exact",
            ComparisonStage::Soft => "soft",
            ComparisonStage::Structured => "structured",
        };
        match &self.mismatch {
            None => write!(f, "passed ({} match)", stage),
            Some(mismatch) => write!(f, "failed ({} stage): {}", stage, mismatch),
        }
    }
}

fn read_log(path: &Path) -> Result<String, CompareError> {
    let bytes = std::fs::read(path).map_err(|e| CompareError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Compare two plain-text checker logs on disk
///
/// # Errors
///
/// Returns [`CompareError::Io`] if either log cannot be read
pub fn compare_logs(
    candidate: &Path,
    reference: &Path,
    settings: &ComparatorSettings,
) -> Result<ComparisonResult, CompareError> {
    let result = compare_log_text(&read_log(candidate)?, &read_log(reference)?, settings);
    if result.passed {
        tracing::debug!(candidate = %candidate.display(), %result, "log comparison");
    } else {
        tracing::info!(
            candidate = %candidate.display(),
            reference = %reference.display(),
            %result,
            "log comparison"
        );
    }
    Ok(result)
}

/// Compare two plain-text checker logs held in memory
#[must_use]
pub fn compare_log_text(
    candidate: &str,
    reference: &str,
    settings: &ComparatorSettings,
) -> ComparisonResult {
    let Some(line) = first_difference(candidate, reference) else {
        return ComparisonResult::exact_match();
    };
    tracing::debug!(line, "logs differ, falling back to summary counts");

    let diagnostics = SoftDiagnostics {
        candidate: extract_summary(candidate, settings.tail_lines),
        reference: extract_summary(reference, settings.tail_lines),
    };
    let mismatch = soft_match(diagnostics.candidate, diagnostics.reference, settings.tolerance).err();

    ComparisonResult {
        passed: mismatch.is_none(),
        stage: ComparisonStage::Soft,
        diagnostics: Some(diagnostics),
        mismatch,
    }
}

/// Decide the soft stage from the two sets of summary counts
///
/// # Errors
///
/// Returns the reason the counts are not equivalent
pub fn soft_match(
    candidate: SummaryCounts,
    reference: SummaryCounts,
    tolerance: f64,
) -> Result<(), Mismatch> {
    let (Some((v_c, i_c)), Some((v_r, i_r))) = (candidate.complete(), reference.complete()) else {
        return Err(Mismatch::MissingSummary);
    };

    if i_c != i_r {
        return Err(Mismatch::InvariantCount {
            candidate: i_c,
            reference: i_r,
        });
    }
    if v_c == 0 && v_r == 0 {
        return Ok(());
    }

    let ratio = v_c.abs_diff(v_r) as f64 / v_c.max(v_r) as f64;
    if ratio <= tolerance {
        Ok(())
    } else {
        Err(Mismatch::ViolationDrift {
            candidate: v_c,
            reference: v_r,
            ratio,
            tolerance,
        })
    }
}

/// 1-based number of the first line that differs once whitespace is removed
fn first_difference(a: &str, b: &str) -> Option<usize> {
    let mut a_lines = a.lines().map(squeeze);
    let mut b_lines = b.lines().map(squeeze);
    let mut lineno = 0;
    loop {
        lineno += 1;
        match (a_lines.next(), b_lines.next()) {
            (None, None) => return None,
            (Some(x), Some(y)) if x == y => continue,
            _ => return Some(lineno),
        }
    }
}

fn squeeze(line: &str) -> String {
    line.chars().filter(|c| !c.is_whitespace()).collect()
}
