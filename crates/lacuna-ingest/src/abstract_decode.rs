//! Decode OpenAlex abstract inverted index to plaintext
//!
//! OpenAlex stores abstracts as inverted indexes for legal reasons:
//! ```json
//! {"Despite": [0], "growing": [1], "interest": [2, 50], ...}
//! ```
//!
//! Reconstruction allocates a slot per position and writes each token at its
//! positions. Snapshot payloads sometimes wrap the map with an explicit
//! length (`{"IndexLength": ..., "InvertedIndex": {...}}`); the bare form
//! falls back to `max(position) + 1`.

use serde_json::{Map, Value};

/// Decode an inverted index map to plaintext.
///
/// `length` overrides the slot count; positions beyond it are dropped.
pub fn revert_index(index: &Map<String, Value>, length: Option<usize>) -> Option<String> {
    if index.is_empty() {
        return None;
    }

    let max_position = index
        .values()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_u64)
        .max()?;
    let n_slots = length.unwrap_or(max_position as usize + 1);
    if n_slots == 0 {
        return None;
    }

    let mut slots: Vec<&str> = vec![""; n_slots];
    for (token, positions) in index {
        if let Some(positions) = positions.as_array() {
            for position in positions.iter().filter_map(Value::as_u64) {
                if (position as usize) < n_slots {
                    slots[position as usize] = token.as_str();
                }
            }
        }
    }

    let text = slots.join(" ");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Decode the `abstract_inverted_index` field of a work payload.
///
/// Accepts both the bare map and the wrapped snapshot form; returns `None`
/// for null, non-object or effectively empty values.
pub fn decode_abstract(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let (Some(length), Some(inverted)) = (value.get("IndexLength"), value.get("InvertedIndex")) {
        let index = inverted.as_object()?;
        return revert_index(index, length.as_u64().map(|l| l as usize));
    }
    revert_index(value.as_object()?, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn empty_index() {
        assert_eq!(revert_index(&obj(json!({})), None), None);
    }

    #[test]
    fn single_word() {
        assert_eq!(
            revert_index(&obj(json!({"Hello": [0]})), None).as_deref(),
            Some("Hello")
        );
    }

    #[test]
    fn words_in_position_order() {
        let index = obj(json!({"world": [1], "Hello": [0], "!": [2]}));
        assert_eq!(revert_index(&index, None).as_deref(), Some("Hello world !"));
    }

    #[test]
    fn repeated_word() {
        let index = obj(json!({"the": [0, 2], "cat": [1], "sat": [3]}));
        assert_eq!(
            revert_index(&index, None).as_deref(),
            Some("the cat the sat")
        );
    }

    #[test]
    fn explicit_length_drops_out_of_range() {
        let index = obj(json!({"kept": [0], "dropped": [5]}));
        assert_eq!(revert_index(&index, Some(2)).as_deref(), Some("kept "));
    }

    #[test]
    fn gap_positions_leave_empty_slots() {
        let index = obj(json!({"a": [0], "c": [2]}));
        assert_eq!(revert_index(&index, None).as_deref(), Some("a  c"));
    }

    #[test]
    fn decode_null_and_non_object() {
        assert_eq!(decode_abstract(None), None);
        assert_eq!(decode_abstract(Some(&Value::Null)), None);
        assert_eq!(decode_abstract(Some(&json!("text"))), None);
    }

    #[test]
    fn decode_bare_map() {
        let value = json!({"Hello": [0], "world": [1]});
        assert_eq!(
            decode_abstract(Some(&value)).as_deref(),
            Some("Hello world")
        );
    }

    #[test]
    fn decode_wrapped_snapshot_form() {
        let value = json!({
            "IndexLength": 3,
            "InvertedIndex": {"We": [0], "present": [1], "results": [2]}
        });
        assert_eq!(
            decode_abstract(Some(&value)).as_deref(),
            Some("We present results")
        );
    }

    #[test]
    fn decode_whitespace_only_is_null() {
        let value = json!({" ": [0]});
        assert_eq!(decode_abstract(Some(&value)), None);
    }
}
