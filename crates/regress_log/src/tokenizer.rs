//! Object boundary detection for concatenated JSON logs.
//!
//! The offline checker appends one pretty-printed JSON object per violated
//! invariant with no separator between them. Repair happens in two passes:
//!
//! 1. [`split_objects`] walks the text once, tracking string and escape
//!    state and brace depth. Every time depth returns to zero a top-level
//!    object ends. Only whitespace may appear between objects.
//! 2. [`assemble_array`] joins the spans into a single JSON array and
//!    rewrites bare sentinel tokens (outside strings) to `null`.
//!
//! Braces inside string literals never move the depth counter, so record
//! text such as `"expected {x}"` cannot split an object.

use crate::error::ParseError;
use crate::record::SENTINEL;

/// Byte range of one top-level object, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSpan {
    /// Offset of the opening brace
    pub start: usize,
    /// Offset one past the closing brace
    pub end: usize,
}

impl ObjectSpan {
    /// Slice the object out of the source text
    #[must_use]
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Find every top-level object in `text`.
///
/// # Errors
///
/// Returns [`ParseError::Malformed`] on non-whitespace outside an object,
/// a stray closing brace, or an unterminated object or string
pub fn split_objects(text: &str) -> Result<Vec<ObjectSpan>, ParseError> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        if depth == 0 {
            match byte {
                b'{' => {
                    start = offset;
                    depth = 1;
                }
                b if b.is_ascii_whitespace() => {}
                other => {
                    return Err(ParseError::Malformed {
                        offset,
                        reason: format!("unexpected {:?} between objects", other as char),
                    });
                }
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    spans.push(ObjectSpan {
                        start,
                        end: offset + 1,
                    });
                }
            }
            _ => {}
        }
    }

    if in_string {
        return Err(ParseError::Malformed {
            offset: bytes.len(),
            reason: "unterminated string".to_string(),
        });
    }
    if depth > 0 {
        return Err(ParseError::Malformed {
            offset: start,
            reason: "unterminated object".to_string(),
        });
    }

    Ok(spans)
}

/// Join object spans into one JSON array, nulling bare sentinel tokens
#[must_use]
pub fn assemble_array(text: &str, spans: &[ObjectSpan]) -> String {
    let mut out = String::with_capacity(text.len() + spans.len() * 2 + 2);
    out.push('[');
    for (i, span) in spans.iter().enumerate() {
        if i > 0 {
            out.push_str(",\n");
        }
        rewrite_bare_sentinel(span.slice(text), &mut out);
    }
    out.push(']');
    out
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Copy `object` into `out`, replacing `MD_NONE` tokens outside strings
fn rewrite_bare_sentinel(object: &str, out: &mut String) {
    let bytes = object.as_bytes();
    let token = SENTINEL.as_bytes();
    let mut in_string = false;
    let mut escaped = false;
    let mut copied = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let byte = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if byte == b'"' {
            in_string = true;
            i += 1;
            continue;
        }

        let bounded_before = i == 0 || !is_ident_byte(bytes[i - 1]);
        let after = i + token.len();
        if bounded_before
            && bytes[i..].starts_with(token)
            && (after == bytes.len() || !is_ident_byte(bytes[after]))
        {
            // Token and its neighbours are ASCII, so these are char boundaries.
            out.push_str(&object[copied..i]);
            out.push_str("null");
            i = after;
            copied = after;
            continue;
        }

        i += 1;
    }

    out.push_str(&object[copied..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_pretty_printed_objects() {
        let text = "{\n  \"a\": 1\n}\n{\n  \"b\": {\"c\": 2}\n}\n";
        let spans = split_objects(text).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].slice(text), "{\n  \"a\": 1\n}");
        assert_eq!(spans[1].slice(text), "{\n  \"b\": {\"c\": 2}\n}");
    }

    #[test]
    fn test_split_adjacent_without_newline() {
        let spans = split_objects("{}{} {}").unwrap();
        assert_eq!(spans.len(), 3);
    }

    #[test]
    fn test_braces_in_strings_ignored() {
        let text = r#"{"t": "} {\" {"}{"u": "\\"}"#;
        let spans = split_objects(text).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].slice(text), r#"{"t": "} {\" {"}"#);
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert!(split_objects("").unwrap().is_empty());
        assert!(split_objects(" \n\t\n").unwrap().is_empty());
    }

    #[test]
    fn test_garbage_between_objects() {
        let err = split_objects("{} , {}").unwrap_err();
        assert_eq!(
            err,
            ParseError::Malformed {
                offset: 3,
                reason: "unexpected ',' between objects".to_string(),
            }
        );
    }

    #[test]
    fn test_stray_closing_brace() {
        assert!(matches!(
            split_objects("{}}"),
            Err(ParseError::Malformed { offset: 2, .. })
        ));
    }

    #[test]
    fn test_unterminated() {
        assert!(matches!(
            split_objects("{\"a\": {"),
            Err(ParseError::Malformed { offset: 0, .. })
        ));
        assert!(matches!(
            split_objects("{\"a"),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_assemble_inserts_commas() {
        let text = "{\"a\":1}\n{\"a\":2}";
        let spans = split_objects(text).unwrap();
        let array = assemble_array(text, &spans);
        assert_eq!(array, "[{\"a\":1},\n{\"a\":2}]");
        let parsed: serde_json::Value = serde_json::from_str(&array).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_assemble_rewrites_bare_sentinel_only() {
        let text = r#"{"a": MD_NONE, "b": "MD_NONE", "c": [MD_NONE], "d": MD_NONE_X}"#;
        let spans = split_objects(text).unwrap();
        let array = assemble_array(text, &spans);
        assert_eq!(
            array,
            r#"[{"a": null, "b": "MD_NONE", "c": [null], "d": MD_NONE_X}]"#
        );
    }

    #[test]
    fn test_assemble_empty() {
        assert_eq!(assemble_array("", &[]), "[]");
    }

    proptest! {
        #[test]
        fn prop_string_content_never_splits(descriptions in prop::collection::vec(".*", 0..6)) {
            let text: String = descriptions
                .iter()
                .map(|d| serde_json::json!({ "invariant": { "text_description": d } }).to_string())
                .collect::<Vec<_>>()
                .join("\n");
            let spans = split_objects(&text).unwrap();
            prop_assert_eq!(spans.len(), descriptions.len());

            let parsed: Vec<serde_json::Value> =
                serde_json::from_str(&assemble_array(&text, &spans)).unwrap();
            let recovered: Vec<String> = parsed
                .iter()
                .map(|v| v["invariant"]["text_description"].as_str().unwrap().to_string())
                .collect();
            prop_assert_eq!(recovered, descriptions);
        }
    }
}
