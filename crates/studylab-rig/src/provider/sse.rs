//! Server-sent events parser for provider responses.
//!
//! Lines are split on raw bytes so multi-byte UTF-8 characters split across
//! network chunks decode correctly.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type (from `event:` field), if any.
    pub event_type: Option<String>,
    /// The event data, multiple `data:` lines joined by `\n`.
    pub data: String,
}

#[derive(Default)]
struct ParserState {
    line_buf: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
}

impl ParserState {
    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.flush();
        }

        // Lines without a colon and comment lines carry nothing we use.
        let (field, value) = line.split_once(':')?;
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event_type = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            _ => {}
        }
        None
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            return None;
        }

        let event = SseEvent {
            event_type: self.event_type.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(event)
    }

    fn feed(&mut self, bytes: &[u8], out: &mut VecDeque<SseEvent>) {
        for &byte in bytes {
            if byte != b'\n' {
                self.line_buf.push(byte);
                continue;
            }

            let mut line = std::mem::take(&mut self.line_buf);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                out.push_back(event);
            }
        }
    }
}

/// Stream adapter that parses SSE events from a byte stream.
pub struct SseStream<S> {
    inner: S,
    state: ParserState,
    pending: VecDeque<SseEvent>,
    done: bool,
}

impl<S> SseStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: ParserState::default(),
            pending: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, E> Stream for SseStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<SseEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.state.feed(&bytes, &mut this.pending);
                }
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => {
                    this.done = true;
                    if !this.state.line_buf.is_empty() {
                        let line = std::mem::take(&mut this.state.line_buf);
                        let line = String::from_utf8_lossy(&line).into_owned();
                        if let Some(event) = this.state.process_line(&line) {
                            this.pending.push_back(event);
                        }
                    }
                    if let Some(event) = this.state.flush() {
                        this.pending.push_back(event);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    fn bytes_stream(
        chunks: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        futures::stream::iter(chunks.into_iter().map(|s| Ok(Bytes::from_static(s))))
    }

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<SseEvent> {
        SseStream::new(bytes_stream(chunks))
            .filter_map(|event| async move { event.ok() })
            .collect()
            .await
    }

    #[tokio::test]
    async fn parse_simple_event() {
        let events = collect(vec![b"data: hello\n\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, None);
        assert_eq!(events[0].data, "hello");
    }

    #[tokio::test]
    async fn parse_multiple_events_with_types() {
        let events = collect(vec![b"event: first\ndata: one\n\nevent: second\ndata: two\n\n"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("first"));
        assert_eq!(events[1].data, "two");
    }

    #[tokio::test]
    async fn parse_chunked_data() {
        let events = collect(vec![b"data: hel", b"lo wor", b"ld\n\n"]).await;
        assert_eq!(events[0].data, "hello world");
    }

    #[tokio::test]
    async fn parse_split_multibyte_character() {
        // "时" is e6 97 b6
        let events = collect(vec![b"data: \xe6\x97", b"\xb6\n\n"]).await;
        assert_eq!(events[0].data, "时");
    }

    #[tokio::test]
    async fn parse_with_crlf_and_comments() {
        let events = collect(vec![b": keep-alive\r\ndata: hello\r\n\r\n"]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "hello");
    }

    #[tokio::test]
    async fn event_at_stream_end_without_trailing_newline() {
        let events = collect(vec![b"data: [DONE]"]).await;
        assert_eq!(events[0].data, "[DONE]");
    }
}
