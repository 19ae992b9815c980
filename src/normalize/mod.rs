//! Reasoning normalization.
//!
//! Upstream providers surface chain-of-thought output through incompatible
//! schema conventions. This module resolves whichever convention a message
//! or delta carries and rewrites the result into one uniform shape: the
//! reasoning span wrapped in a single `<think>`/`</think>` pair embedded in
//! the ordinary content text.
//!
//! Known conventions, in extraction priority order:
//! - segmented list: `reasoning_details: [{type: "reasoning.text", text}]`
//! - scalar field: `reasoning: "..."`
//! - separate channel field: `reasoning_content: "..."`
//! - typed content array: `content: [{type: "thinking", ...}, {type:
//!   "text", ...}]`, which yields reasoning and content in one walk

pub mod stream;
pub mod whole;

pub use stream::{normalized_sse_stream, StreamNormalizer};
pub use whole::{normalize_whole, splice_normalized_response};

use serde_json::{Map, Value};

/// Opening delimiter of a normalized reasoning span.
pub const THINK_OPEN: &str = "<think>";
/// Closing delimiter of a normalized reasoning span.
pub const THINK_CLOSE: &str = "</think>";

/// Reasoning-bearing fields stripped from rewritten messages and deltas.
pub(crate) const REASONING_FIELDS: [&str; 3] =
    ["reasoning_details", "reasoning", "reasoning_content"];

const SEGMENT_REASONING_TEXT: &str = "reasoning.text";

/// Read the segmented-list convention: reasoning segments concatenated in
/// array order. Returns `None` when nothing usable is present.
pub(crate) fn segmented_list_text(obj: &Map<String, Value>) -> Option<String> {
    let segments = obj.get("reasoning_details")?.as_array()?;
    let mut text = String::new();
    for segment in segments {
        if segment.get("type").and_then(Value::as_str) == Some(SEGMENT_REASONING_TEXT) {
            if let Some(piece) = segment.get("text").and_then(Value::as_str) {
                text.push_str(piece);
            }
        }
    }
    (!text.is_empty()).then_some(text)
}

/// Read the scalar-field convention.
pub(crate) fn scalar_field_text(obj: &Map<String, Value>) -> Option<String> {
    let text = obj.get("reasoning")?.as_str()?;
    (!text.is_empty()).then(|| text.to_string())
}

/// Read the separate-channel convention.
pub(crate) fn channel_field_text(obj: &Map<String, Value>) -> Option<String> {
    let text = obj.get("reasoning_content")?.as_str()?;
    (!text.is_empty()).then(|| text.to_string())
}

/// Walk a typed content array, collecting `thinking` items into `reasoning`
/// and `text` items into `content`, both in array order. Malformed items
/// contribute nothing.
pub(crate) fn walk_typed_content(items: &[Value], reasoning: &mut String, content: &mut String) {
    for item in items {
        match item.get("type").and_then(Value::as_str) {
            Some("thinking") => {
                if let Some(parts) = item.get("thinking").and_then(Value::as_array) {
                    for part in parts {
                        if part.get("type").and_then(Value::as_str) == Some("text") {
                            if let Some(text) = part.get("text").and_then(Value::as_str) {
                                reasoning.push_str(text);
                            }
                        }
                    }
                }
            }
            Some("text") => {
                if let Some(text) = item.get("text").and_then(Value::as_str) {
                    content.push_str(text);
                }
            }
            _ => {}
        }
    }
}
