//! Streaming normalization.
//!
//! A stateful transform sitting between the upstream SSE byte stream and
//! the downstream client. Frames are buffered until complete, the JSON
//! payload of each `data:` line is rewritten so reasoning increments land
//! inside a single `<think>`/`</think>` span in the content stream, and
//! everything the transform does not understand is forwarded verbatim.
//!
//! Per-connection state only; nothing is shared between connections, and
//! frames are processed strictly in arrival order.

use std::sync::LazyLock;

use futures_util::Stream;
use memchr::memmem;
use serde_json::Value;
use smallvec::SmallVec;

use crate::provider::ReasoningPattern;

use super::{
    channel_field_text, scalar_field_text, segmented_list_text, walk_typed_content,
    REASONING_FIELDS, THINK_CLOSE, THINK_OPEN,
};

const DONE_MARKER: &str = "[DONE]";

/// Delimiter bookkeeping across one response.
///
/// `Idle -> ThinkingOpen` on the first reasoning increment.
/// `ThinkingOpen -> ThinkingClosed` on the first content increment after
/// reasoning began, or synthetically at stream end. `ThinkingClosed` is
/// terminal: later reasoning increments append without re-opening, so the
/// delimiter pair appears at most once per response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DelimiterPhase {
    Idle,
    ThinkingOpen,
    ThinkingClosed,
}

/// Resolved on the first non-empty plain-string content fragment, then
/// fixed for the rest of the stream. `Passthrough` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeDetection {
    Unresolved,
    Rewrite,
    Passthrough,
}

enum LineOutcome {
    Keep,
    Replace(String),
    Native,
}

enum DeltaOutcome {
    Unchanged,
    Rewritten,
    Native,
}

/// Incremental SSE rewriter for one upstream response.
///
/// Feed it decoded text chunks (arriving at arbitrary byte boundaries) and
/// it yields rewritten SSE text chunks. Call [`StreamNormalizer::finish_into`]
/// when the upstream ends and [`StreamNormalizer::abort_into`] when it
/// fails mid-stream.
pub struct StreamNormalizer {
    buffer: String,
    phase: DelimiterPhase,
    native: NativeDetection,
}

impl StreamNormalizer {
    #[must_use]
    pub fn new(pattern: ReasoningPattern) -> Self {
        tracing::debug!(?pattern, "attaching stream normalizer");
        Self {
            buffer: String::new(),
            phase: DelimiterPhase::Idle,
            native: NativeDetection::Unresolved,
        }
    }

    /// Feed a chunk of decoded upstream text and return the output chunks.
    #[must_use]
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed a chunk of decoded upstream text, appending output chunks into
    /// a caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<String>) {
        if self.native == NativeDetection::Passthrough {
            if !chunk.is_empty() {
                out.push(chunk.to_string());
            }
            return;
        }

        self.buffer.push_str(chunk);
        while let Some((body_len, term_len)) = find_frame_terminator(self.buffer.as_bytes()) {
            let frame: String = self.buffer.drain(..body_len + term_len).collect();
            self.process_frame(&frame, body_len, out);
            if self.native == NativeDetection::Passthrough {
                if !self.buffer.is_empty() {
                    out.push(std::mem::take(&mut self.buffer));
                }
                return;
            }
        }
    }

    /// Flush state when the upstream ends normally.
    ///
    /// Any leftover non-whitespace buffer is processed as a final frame;
    /// a reasoning span still open afterwards is closed with one
    /// synthesized event carrying only the closing delimiter.
    pub fn finish_into(&mut self, out: &mut Vec<String>) {
        if self.native == NativeDetection::Passthrough {
            if !self.buffer.is_empty() {
                out.push(std::mem::take(&mut self.buffer));
            }
            return;
        }

        if !self.buffer.is_empty() {
            let remainder = std::mem::take(&mut self.buffer);
            if remainder.trim().is_empty() {
                out.push(remainder);
            } else {
                let body_len = remainder.len();
                self.process_frame(&remainder, body_len, out);
            }
        }

        if self.phase == DelimiterPhase::ThinkingOpen {
            out.push(closing_delimiter_event());
            self.phase = DelimiterPhase::ThinkingClosed;
        }
    }

    /// Flush the closing delimiter on an upstream read error, so a client
    /// mid-render never gets stuck inside an unterminated reasoning block.
    pub fn abort_into(&mut self, out: &mut Vec<String>) {
        if self.native != NativeDetection::Passthrough && self.phase == DelimiterPhase::ThinkingOpen
        {
            out.push(closing_delimiter_event());
            self.phase = DelimiterPhase::ThinkingClosed;
        }
    }

    fn process_frame(&mut self, frame: &str, body_len: usize, out: &mut Vec<String>) {
        let body = &frame[..body_len];
        let mut replacements: SmallVec<[(usize, String); 2]> = SmallVec::new();

        for (index, line) in body.split('\n').enumerate() {
            match self.process_line(line) {
                LineOutcome::Keep => {}
                LineOutcome::Replace(text) => replacements.push((index, text)),
                LineOutcome::Native => {
                    // The model emits its own delimiters; re-wrapping would
                    // corrupt the stream. Forward verbatim from here on.
                    self.native = NativeDetection::Passthrough;
                    out.push(frame.to_string());
                    return;
                }
            }
        }

        if replacements.is_empty() {
            if !frame.is_empty() {
                out.push(frame.to_string());
            }
            return;
        }

        let terminator = &frame[body_len..];
        let mut rebuilt = String::with_capacity(frame.len() + 32);
        let mut next = replacements.into_iter();
        let mut pending = next.next();
        for (index, line) in body.split('\n').enumerate() {
            if index > 0 {
                rebuilt.push('\n');
            }
            if pending.as_ref().is_some_and(|(replace_at, _)| *replace_at == index) {
                if let Some((_, text)) = pending.take() {
                    rebuilt.push_str(&text);
                }
                pending = next.next();
            } else {
                rebuilt.push_str(line);
            }
        }
        if terminator.is_empty() {
            rebuilt.push_str("\n\n");
        } else {
            rebuilt.push_str(terminator);
        }
        out.push(rebuilt);
    }

    fn process_line(&mut self, line: &str) -> LineOutcome {
        let stripped = line.strip_suffix('\r').unwrap_or(line);
        let Some(payload) = stripped.strip_prefix("data:") else {
            // SSE comments, event names, ids: not ours to touch.
            return LineOutcome::Keep;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload.trim() == DONE_MARKER {
            return LineOutcome::Keep;
        }
        let Ok(mut event) = serde_json::from_str::<Value>(payload) else {
            // Fail open: never drop or corrupt a line we cannot parse.
            return LineOutcome::Keep;
        };
        match self.rewrite_event(&mut event) {
            DeltaOutcome::Unchanged => LineOutcome::Keep,
            DeltaOutcome::Rewritten => LineOutcome::Replace(format!("data: {event}")),
            DeltaOutcome::Native => LineOutcome::Native,
        }
    }

    fn rewrite_event(&mut self, event: &mut Value) -> DeltaOutcome {
        let Some(delta) = event
            .get_mut("choices")
            .and_then(|choices| choices.get_mut(0))
            .and_then(|choice| choice.get_mut("delta"))
            .and_then(Value::as_object_mut)
        else {
            return DeltaOutcome::Unchanged;
        };

        let had_reasoning_fields = REASONING_FIELDS
            .iter()
            .any(|field| delta.contains_key(*field));

        // One ordered match over the known conventions; the first hit is
        // the reasoning source for this delta.
        let mut reasoning = segmented_list_text(delta)
            .or_else(|| scalar_field_text(delta))
            .or_else(|| channel_field_text(delta))
            .unwrap_or_default();

        let mut content = String::new();
        match delta.get("content") {
            Some(Value::Array(items)) => {
                // Typed content array: one walk yields both increments.
                let mut array_reasoning = String::new();
                walk_typed_content(items, &mut array_reasoning, &mut content);
                if reasoning.is_empty() {
                    reasoning = array_reasoning;
                }
            }
            Some(Value::String(text)) => {
                if self.native == NativeDetection::Unresolved && !text.is_empty() {
                    if text.trim_start().starts_with(THINK_OPEN) {
                        return DeltaOutcome::Native;
                    }
                    self.native = NativeDetection::Rewrite;
                }
                content.push_str(text);
            }
            _ => {}
        }

        if reasoning.is_empty() && content.is_empty() {
            // Role markers, finish reasons, usage frames: forward as-is.
            return DeltaOutcome::Unchanged;
        }

        let mut composed =
            String::with_capacity(reasoning.len() + content.len() + THINK_CLOSE.len());
        if !reasoning.is_empty() {
            if self.phase == DelimiterPhase::Idle {
                composed.push_str(THINK_OPEN);
                self.phase = DelimiterPhase::ThinkingOpen;
            }
            composed.push_str(&reasoning);
        }
        if !content.is_empty() {
            if self.phase == DelimiterPhase::ThinkingOpen {
                composed.push_str(THINK_CLOSE);
                self.phase = DelimiterPhase::ThinkingClosed;
            }
            composed.push_str(&content);
        }

        let plain_content_untouched = !had_reasoning_fields
            && matches!(delta.get("content"), Some(Value::String(text)) if *text == composed);
        if plain_content_untouched {
            return DeltaOutcome::Unchanged;
        }

        for field in REASONING_FIELDS {
            delta.remove(field);
        }
        delta.insert("content".to_string(), Value::String(composed));
        DeltaOutcome::Rewritten
    }
}

fn closing_delimiter_event() -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": THINK_CLOSE } }] })
    )
}

fn upstream_error_event(message: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({
            "error": {
                "message": message,
                "type": "server_error",
                "code": "upstream_stream_error",
                "param": null,
            }
        })
    )
}

#[inline]
fn find_frame_terminator(buffer: &[u8]) -> Option<(usize, usize)> {
    static LF_LF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\n\n"));
    static CRLF_CRLF_FINDER: LazyLock<memmem::Finder<'static>> =
        LazyLock::new(|| memmem::Finder::new(b"\r\n\r\n"));

    let lf_lf = LF_LF_FINDER.find(buffer);
    let crlf_crlf = CRLF_CRLF_FINDER.find(buffer);
    match (lf_lf, crlf_crlf) {
        (Some(lf_pos), Some(crlf_pos)) => {
            if lf_pos <= crlf_pos {
                Some((lf_pos, 2))
            } else {
                Some((crlf_pos, 4))
            }
        }
        (Some(lf_pos), None) => Some((lf_pos, 2)),
        (None, Some(crlf_pos)) => Some((crlf_pos, 4)),
        (None, None) => None,
    }
}

// ---------------------------------------------------------------------------
// Byte-stream adapter
// ---------------------------------------------------------------------------

struct PendingChunks {
    chunks: SmallVec<[String; 8]>,
    head: usize,
}

impl PendingChunks {
    #[inline]
    fn with_capacity(capacity: usize) -> Self {
        let mut chunks = SmallVec::new();
        chunks.reserve(capacity);
        Self { chunks, head: 0 }
    }

    #[inline]
    fn pop_front(&mut self) -> Option<String> {
        if self.head >= self.chunks.len() {
            return None;
        }
        let chunk = std::mem::take(&mut self.chunks[self.head]);
        self.head += 1;
        if self.head == self.chunks.len() {
            self.chunks.clear();
            self.head = 0;
        }
        Some(chunk)
    }

    #[inline]
    fn extend_from_vec(&mut self, produced: &mut Vec<String>) {
        if produced.is_empty() {
            return;
        }
        self.chunks.reserve(produced.len());
        self.chunks.extend(produced.drain(..));
    }
}

/// Decode arriving bytes at UTF-8 boundaries and feed the normalizer.
///
/// Incomplete trailing sequences are carried in `remainder` until the next
/// read completes them.
fn feed_decoded(
    normalizer: &mut StreamNormalizer,
    remainder: &mut Vec<u8>,
    bytes: &[u8],
    out: &mut Vec<String>,
) {
    if remainder.is_empty() {
        match std::str::from_utf8(bytes) {
            Ok(text) => normalizer.feed_into(text, out),
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                let text = unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) };
                normalizer.feed_into(text, out);
                remainder.extend_from_slice(&bytes[valid_up_to..]);
            }
        }
        return;
    }

    remainder.extend_from_slice(bytes);
    match std::str::from_utf8(remainder.as_slice()) {
        Ok(text) => {
            normalizer.feed_into(text, out);
            remainder.clear();
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
            let text = unsafe { std::str::from_utf8_unchecked(&remainder[..valid_up_to]) };
            normalizer.feed_into(text, out);
            if valid_up_to > 0 {
                let remain_len = remainder.len() - valid_up_to;
                remainder.copy_within(valid_up_to.., 0);
                remainder.truncate(remain_len);
            }
        }
    }
}

/// Wrap an upstream byte stream in the streaming normalizer.
///
/// This is the transform attached by the orchestrator once the upstream
/// response has declared an event-stream content type. Output preserves
/// the SSE framing contract; a mid-stream read error closes any open
/// reasoning span and surfaces one structured error event before the
/// stream ends. When the downstream consumer stops polling, the upstream
/// stream is dropped with the state and no further bytes are requested.
pub fn normalized_sse_stream<S, E>(
    byte_stream: S,
    pattern: ReasoningPattern,
) -> impl Stream<Item = bytes::Bytes> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            StreamNormalizer::new(pattern),
            Vec::<u8>::new(),
            Vec::<String>::with_capacity(8),
            PendingChunks::with_capacity(8),
            false,
        ),
        |(mut stream, mut normalizer, mut remainder, mut produced, mut pending, mut finished)| async move {
            loop {
                if let Some(chunk) = pending.pop_front() {
                    return Some((
                        bytes::Bytes::from(chunk),
                        (stream, normalizer, remainder, produced, pending, finished),
                    ));
                }
                if finished {
                    return None;
                }
                match stream.as_mut().next().await {
                    Some(Ok(bytes)) => {
                        feed_decoded(&mut normalizer, &mut remainder, &bytes, &mut produced);
                        pending.extend_from_vec(&mut produced);
                    }
                    Some(Err(err)) => {
                        normalizer.abort_into(&mut produced);
                        produced.push(upstream_error_event(&err.to_string()));
                        pending.extend_from_vec(&mut produced);
                        finished = true;
                    }
                    None => {
                        normalizer.finish_into(&mut produced);
                        pending.extend_from_vec(&mut produced);
                        finished = true;
                    }
                }
            }
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer() -> StreamNormalizer {
        StreamNormalizer::new(ReasoningPattern::ImplicitDefault)
    }

    fn run(body: &str, chunk_size: usize) -> String {
        let mut n = normalizer();
        let mut out = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let mut take = chunk_size.min(rest.len());
            // Split only at char boundaries for the test harness.
            while !rest.is_char_boundary(take) {
                take += 1;
            }
            let (chunk, tail) = rest.split_at(take);
            n.feed_into(chunk, &mut out);
            rest = tail;
        }
        n.finish_into(&mut out);
        out.concat()
    }

    /// Concatenate every `delta.content` string in the output, in order.
    fn assembled_content(output: &str) -> String {
        let mut text = String::new();
        for line in output.split('\n') {
            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            if payload.trim() == DONE_MARKER {
                continue;
            }
            let Ok(event) = serde_json::from_str::<Value>(payload) else {
                continue;
            };
            if let Some(content) = event["choices"][0]["delta"]["content"].as_str() {
                text.push_str(content);
            }
        }
        text
    }

    fn delta_frame(delta: Value) -> String {
        format!("data: {}\n\n", json!({ "choices": [{ "index": 0, "delta": delta }] }))
    }

    #[test]
    fn reasoning_then_content_is_wrapped_once() {
        let body = [
            delta_frame(json!({ "reasoning": "Let's " })),
            delta_frame(json!({ "reasoning": "think." })),
            delta_frame(json!({ "content": "Answer." })),
            "data: [DONE]\n\n".to_string(),
        ]
        .concat();

        let output = run(&body, usize::MAX);
        assert_eq!(assembled_content(&output), "<think>Let's think.</think>Answer.");
        assert!(output.ends_with("data: [DONE]\n\n"));
    }

    #[test]
    fn reasoning_only_stream_synthesizes_closing_event() {
        let body = delta_frame(json!({ "reasoning": "partial" }));
        let output = run(&body, usize::MAX);
        assert_eq!(assembled_content(&output), "<think>partial</think>");
        // The close arrives as its own final event.
        let events: Vec<&str> = output.split("\n\n").filter(|s| !s.is_empty()).collect();
        assert_eq!(events.len(), 2);
        assert!(events[1].contains(THINK_CLOSE));
    }

    #[test]
    fn chunking_does_not_change_output() {
        let body = [
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n".to_string(),
            delta_frame(json!({ "reasoning_content": "a thought, " })),
            delta_frame(json!({ "reasoning_content": "continued" })),
            delta_frame(json!({ "content": "result: 42" })),
            delta_frame(json!({ "content": " (done)" })),
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n"
                .to_string(),
            "data: [DONE]\n\n".to_string(),
        ]
        .concat();

        let whole = run(&body, usize::MAX);
        for chunk_size in [1, 2, 3, 7, 17, 64] {
            assert_eq!(run(&body, chunk_size), whole, "chunk size {chunk_size}");
        }
        assert_eq!(
            assembled_content(&whole),
            "<think>a thought, continued</think>result: 42 (done)"
        );
    }

    #[test]
    fn delimiter_pair_appears_at_most_once() {
        let body = [
            delta_frame(json!({ "reasoning": "first" })),
            delta_frame(json!({ "content": "middle" })),
            delta_frame(json!({ "reasoning": "late thought" })),
            delta_frame(json!({ "content": "end" })),
        ]
        .concat();

        let output = run(&body, usize::MAX);
        let text = assembled_content(&output);
        assert_eq!(text.matches(THINK_OPEN).count(), 1);
        assert_eq!(text.matches(THINK_CLOSE).count(), 1);
        assert_eq!(text, "<think>first</think>middlelate thoughtend");
    }

    #[test]
    fn malformed_json_line_is_forwarded_verbatim() {
        let body = [
            delta_frame(json!({ "reasoning": "ok" })),
            "data: {not json at all\n\n".to_string(),
            delta_frame(json!({ "content": "fine" })),
        ]
        .concat();

        let output = run(&body, usize::MAX);
        assert!(output.contains("data: {not json at all\n\n"));
        assert_eq!(assembled_content(&output), "<think>ok</think>fine");
    }

    #[test]
    fn native_delimiter_stream_passes_through_byte_identical() {
        let body = [
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"<think>my own\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"</think>answer\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]
        .concat();

        let whole = run(&body, usize::MAX);
        assert_eq!(whole, body);
        for chunk_size in [1, 5, 13] {
            assert_eq!(run(&body, chunk_size), body, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn empty_first_content_fragment_does_not_resolve_detection() {
        let body = [
            delta_frame(json!({ "content": "" })),
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"<think>native\"}}]}\n\n"
                .to_string(),
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"</think>done\"}}]}\n\n"
                .to_string(),
        ]
        .concat();

        let output = run(&body, usize::MAX);
        // Detection resolved on the first non-empty fragment: passthrough.
        assert_eq!(assembled_content(&output), "<think>native</think>done");
        assert_eq!(output.matches(THINK_OPEN).count(), 1);
    }

    #[test]
    fn typed_content_array_yields_both_increments() {
        let body = delta_frame(json!({
            "content": [
                { "type": "thinking", "thinking": [{ "type": "text", "text": "hmm" }] },
                { "type": "text", "text": "done" }
            ]
        }));

        let output = run(&body, usize::MAX);
        assert_eq!(assembled_content(&output), "<think>hmm</think>done");
    }

    #[test]
    fn segmented_list_takes_priority_over_other_fields() {
        let body = delta_frame(json!({
            "reasoning_details": [{ "type": "reasoning.text", "text": "from details" }],
            "reasoning": "from scalar",
            "reasoning_content": "from channel"
        }));

        let output = run(&body, usize::MAX);
        assert_eq!(assembled_content(&output), "<think>from details</think>");
    }

    #[test]
    fn reasoning_fields_are_stripped_from_rewritten_events() {
        let body = delta_frame(json!({ "reasoning": "thought", "content": "answer" }));
        let output = run(&body, usize::MAX);

        let payload = output
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .expect("data line");
        let event: Value = serde_json::from_str(payload).expect("json");
        let delta = &event["choices"][0]["delta"];
        assert!(delta.get("reasoning").is_none());
        assert_eq!(delta["content"], "<think>thought</think>answer");
    }

    #[test]
    fn non_data_lines_and_done_are_untouched() {
        let body = ": keep-alive comment\n\nevent: ping\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        let output = run(body, usize::MAX);
        assert_eq!(output, body);
    }

    #[test]
    fn role_and_finish_reason_deltas_forward_unchanged() {
        let role = "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n";
        let finish =
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n";
        let body = [role, finish].concat();
        let output = run(&body, usize::MAX);
        assert_eq!(output, body);
    }

    #[test]
    fn crlf_framing_is_handled() {
        let body = "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\"r\"}}]}\r\n\r\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"c\"}}]}\r\n\r\n";
        let output = run(body, usize::MAX);
        assert_eq!(assembled_content(&output), "<think>r</think>c");
    }

    #[test]
    fn abort_closes_open_reasoning_span() {
        let mut n = normalizer();
        let mut out = Vec::new();
        n.feed_into(&delta_frame(json!({ "reasoning": "cut off" })), &mut out);
        n.abort_into(&mut out);
        let text = assembled_content(&out.concat());
        assert_eq!(text, "<think>cut off</think>");

        // A second abort must not emit another close.
        let mut again = Vec::new();
        n.abort_into(&mut again);
        assert!(again.is_empty());
    }

    #[test]
    fn final_frame_without_terminator_is_still_processed() {
        let mut n = normalizer();
        let mut out = Vec::new();
        n.feed_into(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"reasoning\":\"tail\"}}]}",
            &mut out,
        );
        assert!(out.is_empty());
        n.finish_into(&mut out);
        assert_eq!(assembled_content(&out.concat()), "<think>tail</think>");
    }

    #[tokio::test]
    async fn byte_stream_adapter_normalizes_and_splits_utf8() {
        use futures_util::StreamExt;

        let frame = delta_frame(json!({ "reasoning": "héllo" }));
        let bytes = frame.as_bytes();
        // Split inside the two-byte 'é' sequence.
        let split = frame.find('é').unwrap() + 1;
        let chunks: Vec<Result<bytes::Bytes, String>> = vec![
            Ok(bytes::Bytes::copy_from_slice(&bytes[..split])),
            Ok(bytes::Bytes::copy_from_slice(&bytes[split..])),
        ];
        let stream = normalized_sse_stream(
            futures_util::stream::iter(chunks),
            ReasoningPattern::ImplicitDefault,
        );
        let collected: Vec<bytes::Bytes> = stream.collect().await;
        let mut output = String::new();
        for chunk in &collected {
            output.push_str(std::str::from_utf8(chunk).expect("utf8 chunk"));
        }
        assert_eq!(assembled_content(&output), "<think>héllo</think>");
    }

    #[tokio::test]
    async fn byte_stream_adapter_surfaces_error_after_closing_delimiter() {
        use futures_util::StreamExt;

        let frame = delta_frame(json!({ "reasoning": "thinking" }));
        let chunks: Vec<Result<bytes::Bytes, String>> = vec![
            Ok(bytes::Bytes::from(frame)),
            Err("connection reset".to_string()),
        ];
        let stream = normalized_sse_stream(
            futures_util::stream::iter(chunks),
            ReasoningPattern::ImplicitDefault,
        );
        let collected: Vec<bytes::Bytes> = stream.collect().await;
        let mut output = String::new();
        for chunk in &collected {
            output.push_str(std::str::from_utf8(chunk).expect("utf8 chunk"));
        }

        let close_at = output.find(THINK_CLOSE).expect("closing delimiter");
        let error_at = output.find("upstream_stream_error").expect("error event");
        assert!(close_at < error_at);
        assert!(output.contains("connection reset"));
    }
}
