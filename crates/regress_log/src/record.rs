//! Invariant records as they appear in offline checker logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token the checker writes where a field has no value
pub const SENTINEL: &str = "MD_NONE";

/// One violated invariant reported by the offline checker.
///
/// Equality is structural over the fields below; two records describing the
/// same invariant compare equal no matter where they appear in a log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvariantRecord {
    /// Relation kind, e.g. `Consistent` or `APISequence`
    pub relation: String,
    /// Human-readable description
    pub text_description: String,
    /// Whether the invariant is gated by a precondition
    pub has_precondition: bool,
    /// Examples supporting the invariant
    pub num_positive_examples: u64,
    /// Examples contradicting the invariant
    pub num_negative_examples: u64,
}

/// Wire shape of the `invariant` object
#[derive(Debug, Deserialize)]
struct RawInvariant {
    relation: String,
    #[serde(default)]
    text_description: Option<String>,
    #[serde(default)]
    precondition: Option<Value>,
    #[serde(default)]
    num_positive_examples: Option<u64>,
    #[serde(default)]
    num_negative_examples: Option<u64>,
}

impl InvariantRecord {
    /// Build a record from the value under an object's `invariant` key.
    ///
    /// Sentinel strings must already be replaced with `null`.
    ///
    /// # Errors
    ///
    /// Returns the decoder message if the value does not have the expected
    /// shape
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawInvariant = serde_json::from_value(value)?;
        Ok(Self {
            relation: raw.relation,
            text_description: raw.text_description.unwrap_or_default(),
            has_precondition: raw.precondition.is_some_and(|p| !p.is_null()),
            num_positive_examples: raw.num_positive_examples.unwrap_or(0),
            num_negative_examples: raw.num_negative_examples.unwrap_or(0),
        })
    }
}

impl std::fmt::Display for InvariantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} (+{}/-{}{})",
            self.relation,
            self.text_description,
            self.num_positive_examples,
            self.num_negative_examples,
            if self.has_precondition { ", conditional" } else { "" }
        )
    }
}

/// Replace every `"MD_NONE"` string in `value` with `null`
pub fn strip_sentinel(value: &mut Value) {
    match value {
        Value::String(s) if s == SENTINEL => *value = Value::Null,
        Value::Array(items) => items.iter_mut().for_each(strip_sentinel),
        Value::Object(map) => map.values_mut().for_each(strip_sentinel),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_full() {
        let value = json!({
            "relation": "Consistent",
            "text_description": "weights stay in sync",
            "precondition": { "inverted": false, "clauses": [] },
            "params": [{ "name": "w" }],
            "num_positive_examples": 12,
            "num_negative_examples": 1
        });
        let record = InvariantRecord::from_value(value).unwrap();
        assert_eq!(record.relation, "Consistent");
        assert!(record.has_precondition);
        assert_eq!(record.num_positive_examples, 12);
        assert_eq!(record.num_negative_examples, 1);
    }

    #[test]
    fn test_from_value_defaults() {
        let record = InvariantRecord::from_value(json!({ "relation": "APISequence" })).unwrap();
        assert_eq!(record.text_description, "");
        assert!(!record.has_precondition);
        assert_eq!(record.num_positive_examples, 0);
    }

    #[test]
    fn test_from_value_missing_relation() {
        assert!(InvariantRecord::from_value(json!({ "text_description": "x" })).is_err());
    }

    #[test]
    fn test_null_precondition_is_absent() {
        let record =
            InvariantRecord::from_value(json!({ "relation": "R", "precondition": null })).unwrap();
        assert!(!record.has_precondition);
    }

    #[test]
    fn test_strip_sentinel_nested() {
        let mut value = json!({
            "a": "MD_NONE",
            "b": ["MD_NONE", "kept", { "c": "MD_NONE" }],
            "d": "MD_NONE_NOT"
        });
        strip_sentinel(&mut value);
        assert_eq!(
            value,
            json!({ "a": null, "b": [null, "kept", { "c": null }], "d": "MD_NONE_NOT" })
        );
    }

    #[test]
    fn test_structural_equality() {
        let a = InvariantRecord::from_value(json!({ "relation": "R", "num_positive_examples": 3 }))
            .unwrap();
        let b = InvariantRecord::from_value(json!({
            "num_positive_examples": 3,
            "relation": "R",
            "params": ["ignored"]
        }))
        .unwrap();
        assert_eq!(a, b);
    }
}
