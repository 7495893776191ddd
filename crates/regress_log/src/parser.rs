//! Structured log parser.

use crate::error::ParseError;
use crate::record::{InvariantRecord, strip_sentinel};
use crate::tokenizer::{assemble_array, split_objects};
use serde_json::Value;
use std::path::Path;

/// Parse an offline checker log file into its invariant records, in file order.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read, otherwise see
/// [`parse_str`]
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<InvariantRecord>, ParseError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let records = parse_str(&text)?;
    tracing::debug!(path = %path.display(), records = records.len(), "parsed invariant log");
    Ok(records)
}

/// Parse concatenated invariant objects.
///
/// # Errors
///
/// Returns error if object boundaries cannot be found, the repaired text is
/// not valid JSON, an object lacks the `invariant` key, or a record has the
/// wrong shape
pub fn parse_str(text: &str) -> Result<Vec<InvariantRecord>, ParseError> {
    let spans = split_objects(text)?;
    let repaired = assemble_array(text, &spans);

    let objects: Vec<Value> = serde_json::from_str(&repaired).map_err(|e| ParseError::Decode {
        index: None,
        reason: e.to_string(),
    })?;

    objects
        .into_iter()
        .enumerate()
        .map(|(index, object)| decode_object(index, object))
        .collect()
}

fn decode_object(index: usize, object: Value) -> Result<InvariantRecord, ParseError> {
    let Value::Object(mut map) = object else {
        return Err(ParseError::MissingInvariantKey { index });
    };
    let mut invariant = map
        .remove("invariant")
        .ok_or(ParseError::MissingInvariantKey { index })?;

    strip_sentinel(&mut invariant);
    InvariantRecord::from_value(invariant).map_err(|e| ParseError::Decode {
        index: Some(index),
        reason: e.to_string(),
    })
}
