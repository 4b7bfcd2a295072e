//! Incremental SSE line parser.
//!
//! Accumulates raw bytes and yields complete `data:` payloads as they
//! arrive. Frames that are not valid JSON are skipped, matching the
//! tolerant behavior expected from event streams.

use serde_json::Value;

/// Buffering parser over an SSE byte stream.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns the JSON payloads of any completed
    /// `data:` lines.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(raw) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
                match serde_json::from_str::<Value>(raw.trim()) {
                    Ok(value) => payloads.push(value),
                    Err(_) => continue,
                }
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_data_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b"data: {\"a\": 1}\n\ndata: {\"b\": 2}\n");
        assert_eq!(payloads, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[test]
    fn buffers_partial_lines_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"split\"").is_empty());
        let payloads = parser.feed(b": true}\n");
        assert_eq!(payloads, vec![json!({"split": true})]);
    }

    #[test]
    fn skips_non_json_and_comment_lines() {
        let mut parser = SseParser::new();
        let payloads = parser.feed(b": keepalive\ndata: not-json\ndata: {\"ok\": 1}\n");
        assert_eq!(payloads, vec![json!({"ok": 1})]);
    }
}
