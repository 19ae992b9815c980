//! Chat-completions orchestrator.
//!
//! Wires the pieces together: validates the call before any network I/O,
//! augments the outbound body for the detected provider pattern, dispatches
//! through the transport, and routes the upstream response through the
//! streaming or whole-response normalizer depending on call mode.

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde_json::Value;

use crate::augment::{apply_to_request, plan_augmentation};
use crate::error::ProxyError;
use crate::normalize::{normalized_sse_stream, splice_normalized_response};
use crate::provider::{detect_pattern, ReasoningPattern};
use crate::state::AppState;

pub async fn handler(State(state): State<Arc<AppState>>, body: bytes::Bytes) -> Response {
    match handle_chat(state, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "chat completion failed");
            err.into_response()
        }
    }
}

async fn handle_chat(state: Arc<AppState>, body: bytes::Bytes) -> Result<Response, ProxyError> {
    let request: Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::InvalidRequest(format!("malformed JSON body: {e}")))?;
    let Some(request_obj) = request.as_object() else {
        return Err(ProxyError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        ));
    };

    // Configuration problems are caught before any network call.
    let upstream = &state.config.upstream;
    if upstream.base_url.trim().is_empty() {
        return Err(ProxyError::Config(
            "upstream base_url is not configured".to_string(),
        ));
    }
    if upstream.api_key.trim().is_empty() {
        return Err(ProxyError::Config(
            "upstream api_key is not configured".to_string(),
        ));
    }
    let has_messages = request_obj
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|messages| !messages.is_empty());
    if !has_messages {
        return Err(ProxyError::InvalidRequest(
            "messages must be a non-empty array".to_string(),
        ));
    }

    let model = request_obj
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let stream_requested = request_obj
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let reasoning_capable = upstream.reasoning_models.iter().any(|m| m == model);

    let api_key = state.credentials.resolve(&upstream.api_key)?;
    let pattern = detect_pattern(&upstream.base_url);

    let mut outbound = request_obj.clone();
    let plan = plan_augmentation(pattern, &state.config.features.reasoning_effort);
    apply_to_request(&mut outbound, &plan);
    let outbound_body = serde_json::to_vec(&Value::Object(outbound))
        .map_err(|e| ProxyError::Internal(format!("failed to encode outbound body: {e}")))?;

    let url = completions_endpoint(&upstream.base_url);
    let headers = upstream_headers(&api_key)?;

    tracing::debug!(
        model,
        ?pattern,
        stream = stream_requested,
        reasoning_capable,
        "forwarding chat completion"
    );

    if stream_requested {
        handle_streaming(&state, &url, headers, outbound_body.into(), pattern).await
    } else {
        handle_non_streaming(&state, &url, headers, outbound_body.into(), reasoning_capable).await
    }
}

async fn handle_streaming(
    state: &AppState,
    url: &str,
    headers: http::HeaderMap,
    body: bytes::Bytes,
    pattern: ReasoningPattern,
) -> Result<Response, ProxyError> {
    let response = state.transport.send_stream(url, &headers, body).await?;
    let status = response.status();
    if !status.is_success() {
        let body_bytes = response
            .bytes()
            .await
            .map_err(|e| ProxyError::Transport(format!("Failed to read error body: {e}")))?;
        return Err(ProxyError::Upstream {
            status: status.as_u16(),
            message: sanitize_upstream_error(&body_bytes),
        });
    }

    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .cloned();
    let is_event_stream = content_type
        .as_ref()
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));

    if !is_event_stream {
        // No transform state is allocated for non-SSE bodies.
        let mut passthrough = Response::new(axum::body::Body::from_stream(response.bytes_stream()));
        *passthrough.status_mut() = status;
        passthrough.headers_mut().insert(
            http::header::CONTENT_TYPE,
            content_type.unwrap_or_else(|| http::HeaderValue::from_static("application/json")),
        );
        return Ok(passthrough);
    }

    let normalized = normalized_sse_stream(response.bytes_stream(), pattern);
    let body =
        axum::body::Body::from_stream(normalized.map(Ok::<_, std::convert::Infallible>));
    Ok(sse_ok_response(body))
}

async fn handle_non_streaming(
    state: &AppState,
    url: &str,
    headers: http::HeaderMap,
    body: bytes::Bytes,
    reasoning_capable: bool,
) -> Result<Response, ProxyError> {
    let response = state.transport.send_request(url, &headers, body).await?;
    let status = response.status();
    let body_bytes = response
        .bytes()
        .await
        .map_err(|e| ProxyError::Transport(format!("Failed to read response body: {e}")))?;

    if !status.is_success() {
        return Err(ProxyError::Upstream {
            status: status.as_u16(),
            message: sanitize_upstream_error(&body_bytes),
        });
    }

    let mut payload: Value = serde_json::from_slice(&body_bytes).map_err(|e| {
        ProxyError::Transport(format!("Failed to decode upstream response: {e}"))
    })?;
    splice_normalized_response(&mut payload, reasoning_capable)?;
    let normalized_bytes = serde_json::to_vec(&payload)
        .map_err(|e| ProxyError::Internal(format!("failed to encode response: {e}")))?;

    Ok(ok_json_response(normalized_bytes.into()))
}

fn completions_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn upstream_headers(api_key: &str) -> Result<http::HeaderMap, ProxyError> {
    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    let bearer = http::HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ProxyError::Credential("api key contains invalid characters".to_string()))?;
    headers.insert(http::header::AUTHORIZATION, bearer);
    Ok(headers)
}

#[inline]
fn ok_json_response(body_bytes: bytes::Bytes) -> Response {
    let mut response = Response::new(axum::body::Body::from(body_bytes));
    *response.status_mut() = http::StatusCode::OK;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}

#[inline]
fn sse_ok_response(body: axum::body::Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}

/// Sanitize an upstream error body for inclusion in a proxy error payload.
///
/// Attempts to extract just the `error.message` field from JSON responses.
/// Falls back to a truncated UTF-8 representation capped at 500 chars.
fn sanitize_upstream_error(body: &[u8]) -> String {
    const MAX_LEN: usize = 500;

    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return truncate_chars(message, MAX_LEN);
        }
    }

    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        "upstream returned an empty error body".to_string()
    } else {
        truncate_chars(trimmed, MAX_LEN)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{truncated}...")
}
