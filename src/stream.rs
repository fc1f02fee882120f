//! Stream Reader: turns a chunked reply body into discrete [`StreamEvent`]s.
//!
//! The backend answers `/chat/{id}/stream` with newline-delimited JSON. Chunks
//! arrive at arbitrary byte boundaries, so decoding happens in three layers:
//!
//! 1. [`Utf8Decoder`] holds back an incomplete multi-byte sequence at the end
//!    of a chunk until the next chunk completes it.
//! 2. [`LineSplitter`] keeps the unterminated trailing fragment and prefixes it
//!    onto the next decoded text.
//! 3. [`parse_line`] parses each complete line; malformed lines are logged and
//!    skipped without ending the stream.
//!
//! [`EventDecoder`] bundles the three synchronously and [`EventReader`] drives
//! it from any byte stream (normally `reqwest::Response::bytes_stream`).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Alt text used when an image event carries none.
pub const DEFAULT_ALT_TEXT: &str = "Generated image";

fn default_alt_text() -> String {
    DEFAULT_ALT_TEXT.to_string()
}

/// A generated image as referenced by `image` and `text_done` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    #[serde(default = "default_alt_text")]
    pub alt_text: String,
}

/// One record of the reply stream, routed by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental reply text.
    TextDelta {
        #[serde(default)]
        text: String,
    },
    /// The model started producing an image.
    ImageStart,
    /// A generated image has been stored and can be referenced.
    Image {
        url: String,
        #[serde(default = "default_alt_text")]
        alt_text: String,
        /// Markdown the backend appended to its own copy of the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        markdown: Option<String>,
    },
    /// End of generation with the backend's view of the full reply.
    TextDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        images: Option<Vec<ImageRef>>,
    },
    /// Generation failed (model or tool error).
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        analysis: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        markdown: Option<String>,
    },
    /// Any record type this client does not know about.
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// The wire tag of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::TextDelta { .. } => "text_delta",
            StreamEvent::ImageStart => "image_start",
            StreamEvent::Image { .. } => "image",
            StreamEvent::TextDone { .. } => "text_done",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Unknown => "unknown",
        }
    }

    /// Serialize as one wire line (JSON followed by `\n`).
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

// ---------------------------------------------------------------------------
// UTF-8 decoding
// ---------------------------------------------------------------------------

/// Incremental UTF-8 decoder that never splits a code point across chunks.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `pending + bytes` as forms complete characters.
    ///
    /// Invalid sequences become U+FFFD; an incomplete sequence at the end is
    /// held back for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back, replacing it lossily.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }

    /// Number of bytes waiting for the rest of their code point.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

/// Splits decoded text on `\n`, carrying the unterminated tail forward.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return every line it completes, trimmed, with empty
    /// lines dropped.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let mut lines = Vec::new();
        while let Some(line_end) = self.partial.find('\n') {
            let line = self.partial[..line_end].trim().to_string();
            self.partial.drain(..=line_end);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Take the unterminated tail, if it holds anything but whitespace.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.partial);
        let tail = tail.trim();
        if tail.is_empty() {
            None
        } else {
            Some(tail.to_string())
        }
    }

    /// The fragment currently carried over to the next chunk.
    pub fn partial(&self) -> &str {
        &self.partial
    }
}

/// Parse one complete line. Malformed JSON is logged and skipped.
pub fn parse_line(line: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<StreamEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, line = %truncate_for_log(line), "skipping malformed stream line");
            None
        }
    }
}

fn truncate_for_log(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

// ---------------------------------------------------------------------------
// Decoder + async reader
// ---------------------------------------------------------------------------

/// Synchronous chunk → events decoder.
#[derive(Debug, Default)]
pub struct EventDecoder {
    utf8: Utf8Decoder,
    lines: LineSplitter,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and return the events it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let text = self.utf8.decode(chunk);
        self.lines
            .push(&text)
            .iter()
            .filter_map(|line| parse_line(line))
            .collect()
    }

    /// End of input: flush held-back bytes and parse a final unterminated line.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let tail = self.utf8.finish();
        let mut lines = self.lines.push(&tail);
        lines.extend(self.lines.finish());
        lines.iter().filter_map(|line| parse_line(line)).collect()
    }
}

/// Pulls chunks from a byte stream and yields events strictly in arrival order.
pub struct EventReader<S> {
    inner: S,
    source: String,
    decoder: EventDecoder,
    queue: VecDeque<StreamEvent>,
    done: bool,
}

impl<S, B, E> EventReader<S>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    /// Wrap `inner`; `source` names the stream in errors and logs (usually its URL).
    pub fn new(inner: S, source: impl Into<String>) -> Self {
        Self {
            inner,
            source: source.into(),
            decoder: EventDecoder::new(),
            queue: VecDeque::new(),
            done: false,
        }
    }

    /// Next event, `None` once the body is exhausted.
    ///
    /// A transport error is returned once; the reader is finished afterwards.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                debug!(kind = event.kind(), source = %self.source, "stream event");
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    let events = self.decoder.feed(chunk.as_ref());
                    self.queue.extend(events);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ClientError::connect(&self.source, e)));
                }
                None => {
                    self.done = true;
                    let events = self.decoder.finish();
                    self.queue.extend(events);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Event parsing
    // -----------------------------------------------------------------------

    #[test]
    fn test_parses_text_delta() {
        let ev = parse_line(r#"{"type":"text_delta","text":"Hi"}"#).unwrap();
        assert_eq!(ev, StreamEvent::TextDelta { text: "Hi".into() });
    }

    #[test]
    fn test_parses_image_start_without_fields() {
        assert_eq!(parse_line(r#"{"type":"image_start"}"#), Some(StreamEvent::ImageStart));
    }

    #[test]
    fn test_image_without_alt_text_gets_default() {
        let ev = parse_line(r#"{"type":"image","url":"/images/a.png"}"#).unwrap();
        match ev {
            StreamEvent::Image { url, alt_text, markdown } => {
                assert_eq!(url, "/images/a.png");
                assert_eq!(alt_text, DEFAULT_ALT_TEXT);
                assert!(markdown.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_text_done_with_images() {
        let line = r#"{"type":"text_done","text":"all","images":[{"url":"/images/x.png","alt_text":"x"}]}"#;
        let ev = parse_line(line).unwrap();
        assert_eq!(
            ev,
            StreamEvent::TextDone {
                text: Some("all".into()),
                images: Some(vec![ImageRef { url: "/images/x.png".into(), alt_text: "x".into() }]),
            }
        );
    }

    #[test]
    fn test_unknown_type_maps_to_unknown() {
        assert_eq!(parse_line(r#"{"type":"heartbeat"}"#), Some(StreamEvent::Unknown));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        assert!(parse_line("{not json").is_none());
        assert!(parse_line(r#"{"text":"no type"}"#).is_none());
    }

    #[test]
    fn test_to_line_is_newline_terminated_json() {
        let line = StreamEvent::TextDelta { text: "a".into() }.to_line();
        assert!(line.ends_with('\n'));
        assert_eq!(parse_line(line.trim()), Some(StreamEvent::TextDelta { text: "a".into() }));
    }

    // -----------------------------------------------------------------------
    // UTF-8 decoder
    // -----------------------------------------------------------------------

    #[test]
    fn test_utf8_decoder_holds_back_split_code_point() {
        let bytes = "señor".as_bytes();
        // 'ñ' is two bytes at index 2..4
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(&bytes[..3]), "se");
        assert_eq!(dec.pending_len(), 1);
        assert_eq!(dec.decode(&bytes[3..]), "ñor");
        assert_eq!(dec.pending_len(), 0);
    }

    #[test]
    fn test_utf8_decoder_replaces_invalid_bytes() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(&[b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_decoder_finish_flushes_lossily() {
        let mut dec = Utf8Decoder::new();
        assert_eq!(dec.decode(&[0xE2, 0x82]), "");
        assert_eq!(dec.finish(), "\u{FFFD}");
        assert_eq!(dec.pending_len(), 0);
    }

    // -----------------------------------------------------------------------
    // Line splitter
    // -----------------------------------------------------------------------

    #[test]
    fn test_splitter_carries_partial_line() {
        let mut s = LineSplitter::new();
        assert!(s.push(r#"{"type":"text_"#).is_empty());
        assert_eq!(s.partial(), r#"{"type":"text_"#);
        let lines = s.push("delta\",\"text\":\"x\"}\n");
        assert_eq!(lines, vec![r#"{"type":"text_delta","text":"x"}"#.to_string()]);
        assert_eq!(s.partial(), "");
    }

    #[test]
    fn test_splitter_drops_empty_lines() {
        let mut s = LineSplitter::new();
        assert_eq!(s.push("a\n\n  \r\nb\n"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_splitter_finish_returns_tail() {
        let mut s = LineSplitter::new();
        s.push("a\nbc");
        assert_eq!(s.finish().as_deref(), Some("bc"));
        assert!(s.finish().is_none());
    }

    // -----------------------------------------------------------------------
    // EventDecoder / EventReader
    // -----------------------------------------------------------------------

    #[test]
    fn test_decoder_skips_bad_line_and_continues() {
        let mut d = EventDecoder::new();
        let events = d.feed(b"{\"type\":\"text_delta\",\"text\":\"a\"}\ngarbage\n{\"type\":\"image_start\"}\n");
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta { text: "a".into() }, StreamEvent::ImageStart]
        );
    }

    #[test]
    fn test_decoder_finish_parses_unterminated_last_line() {
        let mut d = EventDecoder::new();
        assert!(d.feed(br#"{"type":"text_done","text":"end"}"#).is_empty());
        assert_eq!(
            d.finish(),
            vec![StreamEvent::TextDone { text: Some("end".into()), images: None }]
        );
    }

    #[tokio::test]
    async fn test_reader_yields_events_in_order_across_chunks() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"type\":\"text_delta\",\"te".to_vec()),
            Ok(b"xt\":\"Hi\"}\n{\"type\":\"text_delta\",\"text\":\" there\"}\n".to_vec()),
            Ok(b"{\"type\":\"text_done\",\"text\":\"Hi there\"}".to_vec()),
        ];
        let mut reader = EventReader::new(tokio_stream::iter(chunks), "test");
        let mut got = Vec::new();
        while let Some(ev) = reader.next_event().await {
            got.push(ev.unwrap());
        }
        assert_eq!(
            got,
            vec![
                StreamEvent::TextDelta { text: "Hi".into() },
                StreamEvent::TextDelta { text: " there".into() },
                StreamEvent::TextDone { text: Some("Hi there".into()), images: None },
            ]
        );
    }

    #[tokio::test]
    async fn test_reader_surfaces_transport_error_once() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"type\":\"image_start\"}\n".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut reader = EventReader::new(tokio_stream::iter(chunks), "http://x/stream");
        assert_eq!(reader.next_event().await.unwrap().unwrap(), StreamEvent::ImageStart);
        let err = reader.next_event().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("reset"));
        assert!(reader.next_event().await.is_none());
    }
}
