//! Incremental decoding of Server-Sent-Events byte streams.
//!
//! The upstream delivers `data: <json>\n\n` frames in whatever chunk sizes
//! the transport produces. [`SseReader`] is line-oriented: raw bytes
//! accumulate into lines, lines accumulate into the event in progress, and
//! a blank line completes the event, releasing its joined data payload.
//! Callers only ever see whole payloads.

use std::collections::VecDeque;

/// Ceiling on bytes held for an event still being assembled (4 MiB).
/// A stream that crosses it never terminates its event and gets dropped.
pub const MAX_EVENT_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Stateful SSE decoder fed from a byte stream.
#[derive(Debug, Default)]
pub struct SseReader {
    /// The current line, still waiting for its terminating `\n`.
    tail: Vec<u8>,
    /// `data:` payloads of the event in progress.
    data_lines: Vec<String>,
    /// Completed payloads not yet handed to the caller.
    ready: VecDeque<String>,
}

impl SseReader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb one chunk of raw bytes.
    pub fn feed(&mut self, chunk: &[u8]) {
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.tail);
                self.finish_line(&line);
            } else {
                self.tail.push(byte);
            }
        }
    }

    /// Hand out the next completed data payload, oldest first.
    pub fn take_data(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Bytes held for the event still being assembled. Grows without bound
    /// only when the upstream never sends a blank line.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.tail.len() + self.data_lines.iter().map(String::len).sum::<usize>()
    }

    fn finish_line(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        // A blank line terminates the event in progress.
        if raw.is_empty() {
            if !self.data_lines.is_empty() {
                self.ready.push_back(self.data_lines.join("\n"));
                self.data_lines.clear();
            }
            return;
        }

        let Ok(line) = std::str::from_utf8(raw) else {
            tracing::warn!("skipping non-UTF-8 line in event stream");
            return;
        };
        if let Some(payload) = data_payload(line) {
            self.data_lines.push(payload.to_string());
        }
        // Comments and other field names (`event:`, `id:`, `retry:`) are not
        // part of the upstream protocol and fall through ignored.
    }
}

/// The payload of a `data:` line, with the optional single space after the
/// colon removed.
fn data_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data:")?;
    Some(payload.strip_prefix(' ').unwrap_or(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(reader: &mut SseReader) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(payload) = reader.take_data() {
            out.push(payload);
        }
        out
    }

    #[test]
    fn reassembles_events_from_arbitrary_chunk_boundaries() {
        let mut reader = SseReader::new();
        // Split mid-line and mid-event.
        reader.feed(b"data: {\"a\"");
        assert!(reader.take_data().is_none());
        reader.feed(b":1}\n\ndata: {\"b\":2}\n");
        assert_eq!(drain(&mut reader), vec![r#"{"a":1}"#]);
        reader.feed(b"\n");
        assert_eq!(drain(&mut reader), vec![r#"{"b":2}"#]);
    }

    #[test]
    fn tolerates_carriage_returns() {
        let mut reader = SseReader::new();
        reader.feed(b"data: one\r\n\r\ndata: two\r\n\r\n");
        assert_eq!(drain(&mut reader), vec!["one", "two"]);
    }

    #[test]
    fn joins_multi_line_data_with_newlines() {
        let mut reader = SseReader::new();
        reader.feed(b"data: first\ndata: second\n\n");
        assert_eq!(drain(&mut reader), vec!["first\nsecond"]);
    }

    #[test]
    fn accepts_data_lines_without_a_space_after_the_colon() {
        let mut reader = SseReader::new();
        reader.feed(b"data:tight\n\n");
        assert_eq!(drain(&mut reader), vec!["tight"]);
    }

    #[test]
    fn ignores_comments_and_foreign_fields() {
        let mut reader = SseReader::new();
        reader.feed(b": keepalive\nevent: message\nid: 7\ndata: body\n\n");
        assert_eq!(drain(&mut reader), vec!["body"]);
    }

    #[test]
    fn blank_lines_without_data_release_nothing() {
        let mut reader = SseReader::new();
        reader.feed(b"\n\n: comment\n\n");
        assert!(reader.take_data().is_none());
    }

    #[test]
    fn incomplete_trailing_event_is_never_released() {
        let mut reader = SseReader::new();
        reader.feed(b"data: cut off mid-stre");
        assert!(reader.take_data().is_none());
        assert!(reader.pending_bytes() > 0);
    }

    #[test]
    fn pending_bytes_resets_once_an_event_completes() {
        let mut reader = SseReader::new();
        reader.feed(b"data: payload");
        assert!(reader.pending_bytes() > 0);
        reader.feed(b"\n\n");
        assert_eq!(reader.pending_bytes(), 0);
        assert_eq!(drain(&mut reader), vec!["payload"]);
    }
}
