//! Incremental server-sent-event parsing for provider streams.
//!
//! Vendors deliver completions as an event-delimited byte stream. Chunk
//! boundaries fall anywhere, including mid-line and mid-codepoint, so
//! [`SseLineBuffer`] carries partial lines across receive boundaries
//! and only yields complete lines. Unparseable events are discarded
//! rather than failing the whole stream.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{Stream, StreamExt};

use crate::error::{GatewayError, Result};

/// A lazy sequence of text fragments from a streaming completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a received chunk, returning every line completed by it.
    /// Trailing bytes without a newline stay buffered for the next chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the newline itself
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }
}

/// Extract the payload of a `data:` line, if this is one.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Decoded meaning of one SSE data payload.
pub enum SseEvent {
    /// A text fragment to surface to the caller.
    Fragment(String),
    /// Explicit end-of-stream marker; stop cleanly.
    Done,
    /// Anything else (keep-alives, deltas without text, malformed
    /// events): skip without failing the stream.
    Ignore,
}

/// Adapt a raw byte stream into a fragment stream using a per-vendor
/// payload decoder. Terminates on the decoder's `Done`, or on
/// connection close.
pub fn fragment_stream<S, B, F>(inner: S, decode: F) -> FragmentStream
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]>,
    F: Fn(&str) -> SseEvent + Send + 'static,
{
    struct State<S, F> {
        inner: Pin<Box<S>>,
        decode: F,
        buffer: SseLineBuffer,
        pending: VecDeque<String>,
        done: bool,
    }

    let state = State {
        inner: Box::pin(inner),
        decode,
        buffer: SseLineBuffer::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures_util::stream::try_unfold(state, |mut st| async move {
        loop {
            if let Some(fragment) = st.pending.pop_front() {
                return Ok(Some((fragment, st)));
            }
            if st.done {
                return Ok(None);
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    for line in st.buffer.push(chunk.as_ref()) {
                        let Some(payload) = data_payload(&line) else {
                            continue;
                        };
                        match (st.decode)(payload) {
                            SseEvent::Fragment(text) => st.pending.push_back(text),
                            SseEvent::Done => {
                                st.done = true;
                                break;
                            }
                            SseEvent::Ignore => {}
                        }
                    }
                }
                Some(Err(err)) => return Err(GatewayError::Stream(err.to_string())),
                None => return Ok(None),
            }
        }
    }))
}
