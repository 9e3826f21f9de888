//! Incremental SSE (Server-Sent Events) frame parser.
//!
//! Frames may arrive split across TCP chunks or several per chunk; `data`
//! fields may span multiple lines; line endings may be LF or CRLF. Consumed
//! bytes are periodically reclaimed so the buffer stays bounded over long
//! streams.

use bytes::{Buf, BytesMut};
use memchr::memchr;

/// A complete SSE frame.
///
/// The inference server only ever sets the `data` field, but the `event`
/// label is kept so a frame from a stricter server still parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Line-based SSE parser over a growable byte buffer.
pub struct SseParser {
    buffer: BytesMut,
    /// Offset of unconsumed data in buffer.
    consumed: usize,
}

impl SseParser {
    /// Create a new parser with default buffer capacity.
    pub fn new() -> Self {
        Self::with_capacity(8192)
    }

    /// Create a new parser with specified initial capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(cap),
            consumed: 0,
        }
    }

    /// Feed bytes into the parser.
    #[inline]
    pub fn feed(&mut self, data: &[u8]) {
        // Reclaim space once the consumed prefix dominates the buffer
        if self.consumed > self.buffer.len() / 2 && self.consumed > 4096 {
            self.compact();
        }
        self.buffer.extend_from_slice(data);
    }

    /// Drop the already-consumed prefix.
    fn compact(&mut self) {
        if self.consumed > 0 {
            self.buffer.advance(self.consumed);
            self.consumed = 0;
        }
    }

    /// Try to parse the next complete frame.
    /// Returns `None` if more data is needed.
    pub fn next_frame(&mut self) -> Option<SseFrame> {
        loop {
            let buf = &self.buffer[self.consumed..];
            let mut pos = 0;
            let mut frame_end = None;
            let mut data = String::new();
            let mut event = String::new();

            // Walk line by line until the blank separator
            while pos < buf.len() {
                let line_end = match memchr(b'\n', &buf[pos..]) {
                    Some(i) => pos + i,
                    // Last line still incomplete, wait for more bytes
                    None => return None,
                };

                let line = &buf[pos..line_end];
                // Strip the CR of a CRLF ending
                let line = if line.ends_with(b"\r") {
                    &line[..line.len() - 1]
                } else {
                    line
                };

                // Blank line marks the frame boundary
                if line.is_empty() {
                    frame_end = Some(line_end + 1);
                    break;
                }

                if let Some(colon_pos) = memchr(b':', line) {
                    let field = &line[..colon_pos];
                    // The value begins after the colon and one optional space
                    let value_start = if colon_pos + 1 < line.len() && line[colon_pos + 1] == b' ' {
                        colon_pos + 2
                    } else {
                        colon_pos + 1
                    };
                    let value = &line[value_start..];

                    // SSE requires UTF-8; skip fields that aren't
                    if let Ok(value_str) = std::str::from_utf8(value) {
                        match field {
                            b"data" => {
                                if !data.is_empty() {
                                    data.push('\n');
                                }
                                data.push_str(value_str);
                            }
                            b"event" => {
                                event.clear();
                                event.push_str(value_str);
                            }
                            // Comment lines (leading ':') parse as an empty
                            // field name; `id` and `retry` land here too
                            _ => {}
                        }
                    }
                }

                pos = line_end + 1;
            }

            let Some(end) = frame_end else {
                // No blank separator yet, the frame is still in flight
                return None;
            };
            self.consumed += end;

            // Frames without data (comments, keep-alives) are skipped
            if data.is_empty() {
                continue;
            }

            return Some(SseFrame {
                event: if event.is_empty() { None } else { Some(event) },
                data,
            });
        }
    }

    /// Check if the data indicates end of stream.
    #[inline]
    pub fn is_done(data: &str) -> bool {
        data == "[DONE]"
    }

    /// Bytes buffered but not yet consumed.
    pub fn buffer_len(&self) -> usize {
        self.buffer.len() - self.consumed
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_frame() {
        let mut parser = SseParser::new();
        parser.feed(b"data: one token\n\n");

        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.data, "one token");
        assert!(frame.event.is_none());
    }

    #[test]
    fn test_multiline_data_joined_with_newlines() {
        let mut parser = SseParser::new();
        parser.feed(b"data: first\ndata: second\ndata: third\n\n");

        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.data, "first\nsecond\nthird");
    }

    #[test]
    fn test_event_label() {
        let mut parser = SseParser::new();
        parser.feed(b"event: message\ndata: payload\n\n");

        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.event.as_deref(), Some("message"));
        assert_eq!(frame.data, "payload");
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        parser.feed(b"data: token\r\n\r\n");

        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.data, "token");
    }

    #[test]
    fn test_frame_split_mid_value() {
        let mut parser = SseParser::new();
        parser.feed(b"data: Mer");
        assert!(parser.next_frame().is_none());

        parser.feed(b"cury\n\n");
        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.data, "Mercury");
    }

    #[test]
    fn test_coalesced_frames() {
        let mut parser = SseParser::new();
        // Multiple frames in one TCP chunk
        parser.feed(b"data: a\n\ndata: b\n\ndata: c\n\n");

        assert_eq!(parser.next_frame().unwrap().data, "a");
        assert_eq!(parser.next_frame().unwrap().data, "b");
        assert_eq!(parser.next_frame().unwrap().data, "c");
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_comment_and_empty_frames_skipped() {
        let mut parser = SseParser::new();
        parser.feed(b": keep-alive\n\ndata: real\n\n");

        let frame = parser.next_frame().unwrap();
        assert_eq!(frame.data, "real");
    }

    #[test]
    fn test_done_marker() {
        assert!(SseParser::is_done("[DONE]"));
        assert!(!SseParser::is_done("data"));
    }

    #[test]
    fn test_json_data() {
        let mut parser = SseParser::new();
        parser.feed(b"data: {\"msg_type\":\"token\",\"content\":\"Hi\",\"num\":1}\n\n");

        let frame = parser.next_frame().unwrap();
        assert!(frame.data.starts_with('{'));
        assert!(frame.data.ends_with('}'));
    }

    #[test]
    fn test_compaction_keeps_pending_data() {
        let mut parser = SseParser::new();
        for i in 0..200 {
            parser.feed(format!("data: token-{i}\n\n").as_bytes());
            assert_eq!(parser.next_frame().unwrap().data, format!("token-{i}"));
        }
        parser.feed(b"data: tail");
        parser.feed(b"-end\n\n");
        assert_eq!(parser.next_frame().unwrap().data, "tail-end");
        assert_eq!(parser.buffer_len(), 0);
    }
}
