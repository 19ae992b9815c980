//! Whole-response normalization for the non-streaming path.

use serde_json::{Map, Value};

use crate::error::ProxyError;

use super::{
    channel_field_text, scalar_field_text, segmented_list_text, walk_typed_content,
    REASONING_FIELDS, THINK_CLOSE, THINK_OPEN,
};

enum WholeOutcome {
    /// The model already emits native delimiters, or there was no reasoning
    /// to splice; the original message must stay untouched.
    Untouched(String),
    Rewritten(String),
}

fn normalize_message(message: &Map<String, Value>, reasoning_capable: bool) -> WholeOutcome {
    let mut reasoning = String::new();
    let mut content = String::new();

    match message.get("content") {
        Some(Value::Array(items)) => walk_typed_content(items, &mut reasoning, &mut content),
        Some(Value::String(text)) => content.push_str(text),
        _ => {}
    }

    // Native passthrough: the model wrapped its own reasoning.
    if content.trim_start().starts_with(THINK_OPEN) {
        return WholeOutcome::Untouched(content);
    }

    if reasoning_capable && reasoning.is_empty() {
        // Message-level probes, concatenated in priority order.
        let probes: [fn(&Map<String, Value>) -> Option<String>; 3] =
            [segmented_list_text, scalar_field_text, channel_field_text];
        for probe in probes {
            if let Some(text) = probe(message) {
                reasoning.push_str(&text);
            }
        }
    }

    if reasoning.is_empty() {
        if matches!(message.get("content"), Some(Value::Array(_))) {
            // Typed arrays still collapse to a plain string.
            WholeOutcome::Rewritten(content)
        } else {
            WholeOutcome::Untouched(content)
        }
    } else {
        WholeOutcome::Rewritten(format!("{THINK_OPEN}{reasoning}{THINK_CLOSE}{content}"))
    }
}

fn response_message(response: &Value) -> Option<&Map<String, Value>> {
    response
        .get("choices")?
        .get(0)?
        .get("message")?
        .as_object()
}

/// Normalize one complete upstream response into a single content string
/// with the uniform delimiter convention.
///
/// # Errors
///
/// Returns [`ProxyError::NoMessageInResponse`] when the response carries no
/// message object; there is nothing to normalize. Malformed nested fields
/// are treated as absent, never as errors.
pub fn normalize_whole(response: &Value, reasoning_capable: bool) -> Result<String, ProxyError> {
    let message = response_message(response).ok_or(ProxyError::NoMessageInResponse)?;
    Ok(match normalize_message(message, reasoning_capable) {
        WholeOutcome::Untouched(content) | WholeOutcome::Rewritten(content) => content,
    })
}

/// Normalize a response in place: the message content is replaced with the
/// normalized string and reasoning-bearing fields are stripped. Native
/// passthrough responses are left untouched.
///
/// # Errors
///
/// Returns [`ProxyError::NoMessageInResponse`] when the response carries no
/// message object.
pub fn splice_normalized_response(
    response: &mut Value,
    reasoning_capable: bool,
) -> Result<(), ProxyError> {
    let outcome = {
        let message = response_message(response).ok_or(ProxyError::NoMessageInResponse)?;
        normalize_message(message, reasoning_capable)
    };

    let WholeOutcome::Rewritten(content) = outcome else {
        return Ok(());
    };

    if let Some(message) = response
        .get_mut("choices")
        .and_then(|choices| choices.get_mut(0))
        .and_then(|choice| choice.get_mut("message"))
        .and_then(Value::as_object_mut)
    {
        for field in REASONING_FIELDS {
            message.remove(field);
        }
        message.insert("content".to_string(), Value::String(content));
    }
    Ok(())
}
