//! Regress Result Logs
//!
//! Readers for the two artifacts a checker leaves behind: the structured
//! invariant log written by the offline checker, and the plain-text log
//! whose trailing summary lines the soft comparator relies on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parser;
pub mod record;
pub mod summary;
pub mod tokenizer;

pub use error::ParseError;
pub use parser::{parse_file, parse_str};
pub use record::{InvariantRecord, SENTINEL};
pub use summary::{SummaryCounts, extract_summary, read_summary};
pub use tokenizer::{ObjectSpan, assemble_array, split_objects};
