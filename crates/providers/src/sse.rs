//! Incremental server-sent-events decoding for provider adapters.
//!
//! [`SseDecoder`] owns a byte buffer: feed it whatever `read()` returned
//! and it hands back every frame that is now complete. Frames split across
//! chunks (including multi-byte UTF-8 sequences and `\r\n` pairs) stay
//! buffered until their terminating blank line arrives.
//!
//! [`sse_response_stream`] wires a decoder to a `reqwest::Response` and a
//! provider-specific frame parser.

use crate::util::from_reqwest;
use hb_domain::error::Result;
use hb_domain::stream::{BoxStream, StreamEvent};

/// One complete SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if the frame carried one.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

/// Streaming SSE frame decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Line endings normalized to `\n`.
    buf: Vec<u8>,
    /// A `\r` was the last byte seen; it may be the first half of `\r\n`.
    pending_cr: bool,
    /// Bytes before this offset are known not to contain a frame boundary.
    scan_from: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        for &b in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                self.buf.push(b'\n');
                if b == b'\n' {
                    continue;
                }
            }
            if b == b'\r' {
                self.pending_cr = true;
            } else {
                self.buf.push(b);
            }
        }
        self.drain_frames()
    }

    /// Flush whatever is left when the byte stream ends. A trailing frame
    /// without its blank-line terminator is still delivered.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.pending_cr {
            self.pending_cr = false;
            self.buf.push(b'\n');
        }
        let mut frames = self.drain_frames();
        if !self.buf.iter().all(u8::is_ascii_whitespace) {
            let rest = std::mem::take(&mut self.buf);
            if let Some(frame) = parse_frame(&rest) {
                frames.push(frame);
            }
        }
        self.buf.clear();
        self.scan_from = 0;
        frames
    }

    /// Bytes currently buffered (incomplete frame).
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn drain_frames(&mut self) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        loop {
            let start = self.scan_from.saturating_sub(1);
            let found = self.buf[start..]
                .windows(2)
                .position(|w| w == b"\n\n")
                .map(|p| p + start);
            match found {
                Some(pos) => {
                    let block: Vec<u8> = self.buf.drain(..pos + 2).collect();
                    self.scan_from = 0;
                    if let Some(frame) = parse_frame(&block[..pos]) {
                        frames.push(frame);
                    }
                }
                None => {
                    self.scan_from = self.buf.len();
                    break;
                }
            }
        }
        frames
    }
}

/// Parse one frame body (without its terminating blank line). Comment
/// lines and unknown fields are ignored; a frame with neither data nor an
/// event name yields nothing.
fn parse_frame(block: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(block);
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.find(':') {
            Some(i) => (&line[..i], &line[i + 1..]),
            None => (line, ""),
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and a provider-specific
/// parser closure.
///
/// The closure receives each frame and returns zero or more stream events.
/// It is `FnMut` because providers keep assembly state across frames.
///
/// The stream:
/// 1. Feeds every body chunk through an [`SseDecoder`]
/// 2. Flushes the decoder when the body closes
/// 3. Emits a fallback `Done` if the parser never produced one and no
///    error was yielded
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_frame: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&SseFrame) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut decoder = SseDecoder::new();
        let mut done_emitted = false;
        let mut failed = false;

        loop {
            let frames = match response.chunk().await {
                Ok(Some(bytes)) => decoder.feed(&bytes),
                Ok(None) => {
                    for frame in decoder.finish() {
                        for event in parse_frame(&frame) {
                            match &event {
                                Ok(StreamEvent::Done { .. }) => done_emitted = true,
                                Err(_) => failed = true,
                                _ => {}
                            }
                            yield event;
                        }
                    }
                    break;
                }
                Err(e) => {
                    failed = true;
                    yield Err(from_reqwest(e));
                    break;
                }
            };
            for frame in frames {
                for event in parse_frame(&frame) {
                    match &event {
                        Ok(StreamEvent::Done { .. }) => done_emitted = true,
                        Err(_) => failed = true,
                        _ => {}
                    }
                    yield event;
                }
            }
        }

        if !done_emitted && !failed {
            yield Ok(StreamEvent::Done {
                usage: None,
                stop_reason: None,
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn data(frames: &[SseFrame]) -> Vec<&str> {
        frames.iter().map(|f| f.data.as_str()).collect()
    }

    #[test]
    fn single_complete_frame() {
        let mut d = SseDecoder::new();
        let frames = d.feed(b"event: message_start\ndata: {\"a\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("message_start"));
        assert_eq!(frames[0].data, "{\"a\":1}");
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn multiple_frames_in_one_chunk() {
        let mut d = SseDecoder::new();
        let frames = d.feed(b"data: first\n\ndata: second\n\n");
        assert_eq!(data(&frames), vec!["first", "second"]);
    }

    #[test]
    fn frame_split_across_reads() {
        let mut d = SseDecoder::new();
        assert!(d.feed(b"event: content_block_delta\nda").is_empty());
        assert!(d.feed(b"ta: {\"text\":\"hel").is_empty());
        assert!(d.feed(b"lo\"}\n").is_empty());
        let frames = d.feed(b"\ndata: next");
        assert_eq!(data(&frames), vec!["{\"text\":\"hello\"}"]);
        assert!(d.pending() > 0);
    }

    #[test]
    fn boundary_split_between_newlines() {
        let mut d = SseDecoder::new();
        assert!(d.feed(b"data: x\n").is_empty());
        let frames = d.feed(b"\n");
        assert_eq!(data(&frames), vec!["x"]);
    }

    #[test]
    fn crlf_line_endings_including_split_pair() {
        let mut d = SseDecoder::new();
        let mut frames = d.feed(b"event: ping\r\ndata: {}\r\n\r");
        assert!(frames.is_empty());
        frames.extend(d.feed(b"\ndata: after\r\n\r\n"));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].event.as_deref(), Some("ping"));
        assert_eq!(frames[1].data, "after");
    }

    #[test]
    fn multibyte_utf8_split_across_chunks() {
        let payload = "data: caf\u{e9} \u{1f3e1}\n\n".as_bytes().to_vec();
        // Split inside the 4-byte emoji.
        let cut = payload.len() - 4;
        let mut d = SseDecoder::new();
        assert!(d.feed(&payload[..cut]).is_empty());
        let frames = d.feed(&payload[cut..]);
        assert_eq!(frames[0].data, "caf\u{e9} \u{1f3e1}");
    }

    #[test]
    fn multiline_data_is_joined() {
        let mut d = SseDecoder::new();
        let frames = d.feed(b"data: line one\ndata: line two\n\n");
        assert_eq!(frames[0].data, "line one\nline two");
    }

    #[test]
    fn comments_and_unknown_fields_ignored() {
        let mut d = SseDecoder::new();
        let frames = d.feed(b": keepalive\n\nid: 7\nretry: 100\ndata: payload\n\n");
        assert_eq!(data(&frames), vec!["payload"]);
    }

    #[test]
    fn only_first_space_after_colon_is_stripped() {
        let mut d = SseDecoder::new();
        let frames = d.feed(b"data:  two spaces\ndata:none\n\n");
        assert_eq!(frames[0].data, " two spaces\nnone");
    }

    #[test]
    fn finish_flushes_unterminated_frame() {
        let mut d = SseDecoder::new();
        assert!(d.feed(b"data: complete\n\ndata: tail").len() == 1);
        let frames = d.finish();
        assert_eq!(data(&frames), vec!["tail"]);
        assert_eq!(d.pending(), 0);
    }

    #[test]
    fn finish_on_whitespace_only_yields_nothing() {
        let mut d = SseDecoder::new();
        d.feed(b"\n");
        assert!(d.finish().is_empty());
    }

    #[test]
    fn byte_at_a_time_matches_whole_feed() {
        let input = b"event: a\ndata: 1\n\nevent: b\r\ndata: 2\r\n\r\n";
        let mut whole = SseDecoder::new();
        let expected = whole.feed(input);

        let mut d = SseDecoder::new();
        let mut got = Vec::new();
        for b in input.iter() {
            got.extend(d.feed(std::slice::from_ref(b)));
        }
        assert_eq!(got, expected);
        assert_eq!(got.len(), 2);
    }
}
