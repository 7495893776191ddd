//! Summary lines at the end of a checker log.
//!
//! The online checker finishes its log with
//!
//! ```text
//! Total 12 violations found
//! Total 3 invariants violated
//! ```
//!
//! Only the last few lines are searched; counts printed earlier in the log
//! (progress reports) are ignored.

use crate::error::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

static VIOLATIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Total (\d+) violations found").expect("static regex"));
static INVARIANTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Total (\d+) invariants violated").expect("static regex"));

/// Counts recovered from a log's trailing lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    /// Total violation events
    pub violations: Option<u64>,
    /// Distinct invariants violated
    pub invariants: Option<u64>,
}

impl SummaryCounts {
    /// Both counts, if both were found
    #[must_use]
    pub fn complete(&self) -> Option<(u64, u64)> {
        Some((self.violations?, self.invariants?))
    }
}

fn capture_count(re: &Regex, line: &str) -> Option<u64> {
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Scan the last `tail_lines` lines of `text` for the summary counts.
///
/// When a marker appears more than once in the window, the later line wins.
#[must_use]
pub fn extract_summary(text: &str, tail_lines: usize) -> SummaryCounts {
    let lines: Vec<&str> = text.lines().collect();
    let window = &lines[lines.len().saturating_sub(tail_lines)..];

    let mut counts = SummaryCounts::default();
    for line in window {
        if line.contains("violations found") {
            if let Some(n) = capture_count(&VIOLATIONS, line) {
                counts.violations = Some(n);
            }
        } else if line.contains("invariants violated") {
            if let Some(n) = capture_count(&INVARIANTS, line) {
                counts.invariants = Some(n);
            }
        }
    }
    counts
}

/// Read a log file and extract its summary counts
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read
pub fn read_summary(path: impl AsRef<Path>, tail_lines: usize) -> Result<SummaryCounts, ParseError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| ParseError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(extract_summary(&String::from_utf8_lossy(&bytes), tail_lines))
}
