//! Multiset comparison of offline invariant logs.

use crate::compare::{CompareError, ComparisonResult, Mismatch};
use indexmap::IndexMap;
use regress_log::{InvariantRecord, parse_file};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A record and how many times it is over-represented on one side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCount {
    /// The invariant record
    pub record: InvariantRecord,
    /// Surplus occurrences
    pub count: usize,
}

/// Difference between two record multisets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDiff {
    /// Records the reference has more of than the candidate
    pub missing: Vec<RecordCount>,
    /// Records the candidate has more of than the reference
    pub unexpected: Vec<RecordCount>,
}

impl StructuredDiff {
    /// Whether the multisets are equal
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }

    /// Total missing occurrences
    #[must_use]
    pub fn missing_total(&self) -> usize {
        self.missing.iter().map(|r| r.count).sum()
    }

    /// Total unexpected occurrences
    #[must_use]
    pub fn unexpected_total(&self) -> usize {
        self.unexpected.iter().map(|r| r.count).sum()
    }
}

/// Multiset difference of two record lists.
///
/// Order is irrelevant; multiplicity is not. Entries are reported in order
/// of first appearance, reference first.
#[must_use]
pub fn diff_records(candidate: &[InvariantRecord], reference: &[InvariantRecord]) -> StructuredDiff {
    let mut balance: IndexMap<&InvariantRecord, i64> = IndexMap::new();
    for record in reference {
        *balance.entry(record).or_default() += 1;
    }
    for record in candidate {
        *balance.entry(record).or_default() -= 1;
    }

    let mut diff = StructuredDiff::default();
    for (record, surplus) in balance {
        let entry = RecordCount {
            record: record.clone(),
            count: surplus.unsigned_abs() as usize,
        };
        match surplus {
            0 => {}
            n if n > 0 => diff.missing.push(entry),
            _ => diff.unexpected.push(entry),
        }
    }
    diff
}

/// Parse two offline logs and compare their records as multisets
///
/// # Errors
///
/// Returns [`CompareError::Parse`] if either log cannot be read or parsed
pub fn compare_structured(candidate: &Path, reference: &Path) -> Result<ComparisonResult, CompareError> {
    let candidate_records = parse_file(candidate)?;
    let reference_records = parse_file(reference)?;

    let diff = diff_records(&candidate_records, &reference_records);
    if diff.is_empty() {
        tracing::debug!(
            candidate = %candidate.display(),
            records = candidate_records.len(),
            "structured logs match"
        );
        return Ok(ComparisonResult::structured(None));
    }

    for entry in &diff.missing {
        tracing::info!(count = entry.count, record = %entry.record, "missing from candidate");
    }
    for entry in &diff.unexpected {
        tracing::info!(count = entry.count, record = %entry.record, "unexpected in candidate");
    }
    Ok(ComparisonResult::structured(Some(Mismatch::Records(diff))))
}
