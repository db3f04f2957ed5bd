//! Server-sent event framing shared by the HTTP providers

use std::fmt;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};

use super::{EventStream, ProviderError, StreamEvent};

/// Decode an SSE body into stream events.
///
/// `decode` sees every frame in order and returns `Ok(None)` for frames that
/// carry nothing of interest. A body that fails mid-way ends the stream with
/// `ProviderError::Stream`.
pub(crate) fn event_stream<S, B, E, D>(mut bytes: S, mut decode: D) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
    D: FnMut(&SseFrame) -> Result<Option<StreamEvent>, ProviderError> + Send + 'static,
{
    let stream = try_stream! {
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            for frame in decoder.push(chunk.as_ref()) {
                if let Some(event) = decode(&frame)? {
                    yield event;
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            if let Some(event) = decode(&frame)? {
                yield event;
            }
        }
    };
    stream.boxed()
}

/// One complete SSE event block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn is_done_marker(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incremental SSE decoder.
///
/// Network chunks may split events (and UTF-8 sequences) anywhere, so raw
/// bytes are buffered until a blank line closes an event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some((end, sep_len)) = find_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            if let Some(frame) = parse_block(&String::from_utf8_lossy(&block)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing event that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&rest))
    }
}

fn find_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if data_lines.is_empty() && frame.event.is_none() {
        return None;
    }
    frame.data = data_lines.join("\n");
    Some(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn text_frames(frame: &SseFrame) -> Result<Option<StreamEvent>, ProviderError> {
        Ok(Some(StreamEvent::Delta(frame.data.clone())))
    }

    #[tokio::test]
    async fn body_failure_ends_with_stream_error() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"data: one\n\n".as_slice()),
            Err("connection reset".to_string()),
        ];
        let events: Vec<_> = event_stream(stream::iter(chunks), text_frames).collect().await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("one".to_string()));
        let err = events[1].as_ref().unwrap_err();
        assert!(matches!(err, ProviderError::Stream(_)));
        assert_eq!(err.to_string(), "Stream ended unexpectedly: connection reset");
    }

    #[tokio::test]
    async fn trailing_frame_without_blank_line_is_flushed() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![Ok(b"data: last".as_slice())];
        let events: Vec<_> = event_stream(stream::iter(chunks), text_frames).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("last".to_string()));
    }

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: ping\nda").is_empty());
        let frames = decoder.push(b"ta: {\"a\":1}\n\ndata: second\n\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: Some("ping".to_string()),
                    data: "{\"a\":1}".to_string(),
                },
                SseFrame {
                    event: None,
                    data: "second".to_string(),
                },
            ]
        );
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: café\n\n".as_bytes();
        let (head, tail) = bytes.split_at(10);
        assert!(decoder.push(head).is_empty());
        let frames = decoder.push(tail);
        assert_eq!(frames[0].data, "café");
    }

    #[test]
    fn handles_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\r\n\r\ndata: [DONE]\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_done_marker());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().map(|f| f.data), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }
}
