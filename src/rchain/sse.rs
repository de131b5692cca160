//! Incremental decoder for chat-completions `text/event-stream` bodies.

use serde::Deserialize;

use crate::rchain::ai::Usage;

/// One decoded `data:` event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SseEvent {
    /// JSON payload of a `data:` line.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Buffers raw bytes and yields complete events.
///
/// Chunks may end anywhere, including inside a UTF-8 sequence, so lines are
/// split on raw bytes and only decoded once complete.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feeds one chunk and returns the events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line = self.buffer.drain(..=newline).collect::<Vec<_>>();
            if let Some(event) = self.decode_line(&line) {
                let done = event == SseEvent::Done;
                events.push(event);
                if done {
                    self.finished = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.finished || self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.finished = true;
        self.decode_line(&line)
    }

    fn decode_line(&self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);
        let payload = line.strip_prefix("data:")?.trim_start();
        if payload.is_empty() {
            return None;
        }
        if payload == "[DONE]" {
            return Some(SseEvent::Done);
        }
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
    pub usage: Option<Usage>,
    pub error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Delta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamError {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl StreamChunk {
    /// Text carried by the first choice, if any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|text| !text.is_empty())
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .iter()
            .find_map(|choice| choice.finish_reason.as_deref())
    }
}

impl StreamError {
    pub fn describe(&self) -> String {
        match (&self.kind, &self.message) {
            (Some(kind), Some(message)) => format!("{kind}: {message}"),
            (None, Some(message)) => message.clone(),
            (Some(kind), None) => kind.clone(),
            (None, None) => "unknown stream error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SseDecoder, SseEvent, StreamChunk};

    #[test]
    fn events_split_across_chunks_are_reassembled() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let events = decoder.push(b":1}\n\ndata: [DO");
        assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".to_string())]);
        let events = decoder.push(b"NE]\n\ndata: {\"ignored\":true}\n");
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(decoder.is_finished());
        assert!(decoder.push(b"data: more\n").is_empty());
    }

    #[test]
    fn multibyte_characters_survive_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        let line = "data: {\"t\":\"天气\"}\n".as_bytes();
        let (head, tail) = line.split_at(14);
        assert!(decoder.push(head).is_empty());
        assert_eq!(
            decoder.push(tail),
            vec![SseEvent::Data("{\"t\":\"天气\"}".to_string())]
        );
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\nevent: message\r\nid: 7\r\ndata: x\r\n");
        assert_eq!(events, vec![SseEvent::Data("x".to_string())]);
    }

    #[test]
    fn unterminated_tail_is_flushed_on_finish() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some(SseEvent::Data("tail".to_string())));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn chunk_text_skips_empty_deltas() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#)
                .expect("chunk parses");
        assert_eq!(chunk.text(), None);

        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#)
                .expect("chunk parses");
        assert_eq!(chunk.text(), Some("Hi"));
        assert_eq!(chunk.finish_reason(), None);
    }

    #[test]
    fn chunk_reports_finish_reason() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"delta":{},"finish_reason":"length"}]}"#)
                .expect("chunk parses");
        assert_eq!(chunk.text(), None);
        assert_eq!(chunk.finish_reason(), Some("length"));
    }
}
