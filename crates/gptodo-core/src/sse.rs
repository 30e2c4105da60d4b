//! Event-stream codec for extraction responses.
//!
//! The backend streams newline-delimited records:
//!
//! ```text
//! data: {"thought":true,"text":"**Reading** the note"}
//!
//! data: {"thought":false,"text":"[{\"text\":\"Milk\"}]"}
//!
//! data: [DONE]
//! ```
//!
//! An `{"error": "..."}` record replaces `[DONE]` when the model fails after
//! the response has started.
//!
//! [`LineBuffer`] handles transport chunking; it is also used to read the
//! vision model's own SSE stream. [`StreamDecoder`] interprets records and
//! accumulates the final answer.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DecodeError;

/// Marker that starts every data line.
pub const DATA_PREFIX: &str = "data:";
/// Payload of the terminal record.
pub const DONE_SENTINEL: &str = "[DONE]";
/// The terminal record as written on the wire.
pub const DONE_EVENT: &str = "data: [DONE]\n\n";

/// One record of the extraction stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StreamRecord {
    pub fn part(thought: bool, text: impl Into<String>) -> Self {
        Self {
            error: None,
            thought: Some(thought),
            text: Some(text.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Encode a record as a `data:` event.
pub fn format_event(record: &StreamRecord) -> String {
    // StreamRecord only holds strings and bools, serialization cannot fail.
    let json = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    format!("{} {}\n\n", DATA_PREFIX, json)
}

/// Strip the `data:` marker (and one optional space) from a line.
///
/// Returns `None` for lines that are not data lines.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Splits a byte stream into complete lines.
///
/// Bytes after the last newline stay buffered until more input arrives, so
/// a line cut by a transport boundary is never handed out early. Splitting
/// happens on raw bytes, so multi-byte characters split across chunks are
/// reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Prefix of `pending` already known to hold no newline.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// trailing `\n` or `\r\n`.
    ///
    /// Only the newly appended bytes are searched for line breaks.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search = self.scanned;
        while let Some(pos) = self.pending[search..].iter().position(|b| *b == b'\n') {
            let end = search + pos;
            let mut line = &self.pending[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            search = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Bytes received after the last newline.
    pub fn remainder(&self) -> &[u8] {
        &self.pending
    }
}

/// A fragment surfaced while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Intermediate reasoning text, for progress display only.
    Thought(String),
    /// A piece of the final answer.
    Answer(String),
}

/// Incremental decoder for the extraction stream.
///
/// Feed transport chunks with [`feed`](StreamDecoder::feed); collect the
/// answer with [`finish`](StreamDecoder::finish).
#[derive(Debug, Default)]
pub struct StreamDecoder {
    lines: LineBuffer,
    answer: String,
    done: bool,
    skipped: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, returning the events it completed in order.
    ///
    /// After the `[DONE]` record every further byte is ignored. An error
    /// record aborts decoding.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, DecodeError> {
        let mut events = Vec::new();
        if self.done {
            return Ok(events);
        }

        for line in self.lines.push(chunk) {
            let Some(payload) = data_payload(line.trim_start()) else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }
            if payload == DONE_SENTINEL {
                self.done = true;
                break;
            }

            let record: StreamRecord = match serde_json::from_str(payload) {
                Ok(r) => r,
                Err(e) => {
                    self.skipped += 1;
                    warn!(error = %e, "skipping malformed stream line");
                    continue;
                }
            };

            if let Some(message) = record.error {
                return Err(DecodeError::Remote(message));
            }

            let Some(text) = record.text else {
                continue;
            };
            if record.thought.unwrap_or(false) {
                events.push(StreamEvent::Thought(text));
            } else {
                self.answer.push_str(&text);
                events.push(StreamEvent::Answer(text));
            }
        }

        Ok(events)
    }

    /// Whether the terminal record has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Number of lines dropped because they were not valid JSON.
    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    /// The answer accumulated so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// End of stream: return the accumulated answer.
    ///
    /// A trailing fragment with no newline is discarded.
    pub fn finish(self) -> String {
        if !self.done && !self.lines.remainder().is_empty() {
            debug!(
                bytes = self.lines.remainder().len(),
                "discarding unterminated trailing stream fragment"
            );
        }
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = "data: {\"thought\":true,\"text\":\"**Step**: looking\"}\n\n\
                           data: {\"thought\":false,\"text\":\"[{\\\"text\\\":\\\"Milk\\\"}]\"}\n\n\
                           data: [DONE]\n\n";

    #[test]
    fn decodes_thought_and_answer() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(EXAMPLE.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                StreamEvent::Thought("**Step**: looking".into()),
                StreamEvent::Answer(r#"[{"text":"Milk"}]"#.into()),
            ]
        );
        assert!(decoder.is_done());
        assert_eq!(decoder.finish(), r#"[{"text":"Milk"}]"#);
    }

    #[test]
    fn byte_at_a_time_matches_whole() {
        let mut decoder = StreamDecoder::new();
        let mut events = Vec::new();
        for b in EXAMPLE.as_bytes() {
            events.extend(decoder.feed(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(events.len(), 2);
        assert_eq!(decoder.finish(), r#"[{"text":"Milk"}]"#);
    }

    #[test]
    fn long_line_in_small_chunks() {
        let text = "x".repeat(10_000);
        let line = format!("data: {{\"text\":\"{}\"}}\n", text);
        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        for chunk in line.as_bytes().chunks(7) {
            lines.extend(buffer.push(chunk));
            assert_eq!(buffer.scanned, buffer.pending.len());
        }
        assert_eq!(lines, vec![line.trim_end().to_string()]);
        assert!(buffer.remainder().is_empty());

        let lines = buffer.push(b"a\r\nb\nc");
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(buffer.remainder(), b"c");
        assert_eq!(buffer.push(b"d\n"), vec!["cd"]);
    }

    #[test]
    fn partial_line_is_held_back() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(b"data: {\"text\":\"[{\\\"te").unwrap();
        assert!(events.is_empty());
        assert_eq!(decoder.answer(), "");
        let events = decoder.feed(b"xt\\\":\\\"A\\\"}]\"}\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(decoder.answer(), r#"[{"text":"A"}]"#);
    }

    #[test]
    fn answer_fragments_concatenate() {
        let mut decoder = StreamDecoder::new();
        decoder
            .feed(b"data: {\"text\":\"[{\\\"text\\\":\"}\n\ndata: {\"text\":\"\\\"Eggs\\\"}]\"}\n\n")
            .unwrap();
        assert_eq!(decoder.finish(), r#"[{"text":"Eggs"}]"#);
    }

    #[test]
    fn malformed_line_is_skipped() {
        let mut decoder = StreamDecoder::new();
        let events = decoder
            .feed(b"data: {not json\n\ndata: {\"text\":\"ok\"}\n\n")
            .unwrap();
        assert_eq!(events, vec![StreamEvent::Answer("ok".into())]);
        assert_eq!(decoder.skipped_lines(), 1);
    }

    #[test]
    fn non_data_lines_ignored() {
        let mut decoder = StreamDecoder::new();
        let events = decoder
            .feed(b": keep-alive\nevent: message\nid: 4\n\ndata: {\"text\":\"x\"}\n")
            .unwrap();
        assert_eq!(events, vec![StreamEvent::Answer("x".into())]);
    }

    #[test]
    fn error_record_aborts() {
        let mut decoder = StreamDecoder::new();
        let err = decoder
            .feed(b"data: {\"text\":\"[\"}\n\ndata: {\"error\":\"503 Service Unavailable\"}\n\n")
            .unwrap_err();
        assert_eq!(err, DecodeError::Remote("503 Service Unavailable".into()));
    }

    #[test]
    fn bytes_after_done_are_ignored() {
        let mut decoder = StreamDecoder::new();
        decoder
            .feed(b"data: {\"text\":\"a\"}\n\ndata: [DONE]\n\ndata: {\"text\":\"b\"}\n\n")
            .unwrap();
        let events = decoder.feed(b"data: {\"error\":\"late\"}\n\n").unwrap();
        assert!(events.is_empty());
        assert_eq!(decoder.finish(), "a");
    }

    #[test]
    fn crlf_lines() {
        let mut decoder = StreamDecoder::new();
        decoder
            .feed(b"data: {\"text\":\"a\"}\r\n\r\ndata: [DONE]\r\n\r\n")
            .unwrap();
        assert!(decoder.is_done());
        assert_eq!(decoder.finish(), "a");
    }

    #[test]
    fn record_without_text_is_ignored() {
        let mut decoder = StreamDecoder::new();
        let events = decoder.feed(b"data: {\"thought\":true}\n\n").unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn multibyte_split_across_chunks() {
        let line = "data: {\"text\":\"caf\u{e9}\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut decoder = StreamDecoder::new();
        decoder.feed(&line[..split]).unwrap();
        decoder.feed(&line[split..]).unwrap();
        assert_eq!(decoder.finish(), "caf\u{e9}");
    }

    #[test]
    fn format_event_round_trips_through_decoder() {
        let wire = format!(
            "{}{}",
            format_event(&StreamRecord::part(false, "[]")),
            DONE_EVENT
        );
        assert!(wire.starts_with("data: {"));
        let mut decoder = StreamDecoder::new();
        decoder.feed(wire.as_bytes()).unwrap();
        assert!(decoder.is_done());
        assert_eq!(decoder.finish(), "[]");
    }

    #[test]
    fn error_record_serialization_omits_absent_fields() {
        let wire = format_event(&StreamRecord::error("boom"));
        assert_eq!(wire, "data: {\"error\":\"boom\"}\n\n");
    }
}
