//! `data: <json>\n\n` framing used by `POST /query/stream`.
//!
//! The decoder splits on raw bytes, so a UTF-8 sequence cut across two chunks
//! is only decoded once its whole frame has arrived.

use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::TransportError;

/// Raw response body as delivered by the transport.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

pub const DATA_PREFIX: &str = "data:";
/// Payload of the frame that ends a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Payload text with the `data:` prefix removed.
    Data(String),
    Done,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a boundary.
    scanned: usize,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if !self.finished {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Next complete frame, or `None` until more bytes arrive.
    ///
    /// Frames that do not start with `data:` are dropped. Once the sentinel is
    /// seen the decoder is finished and yields nothing further.
    pub fn next_frame(&mut self) -> Option<Frame> {
        while !self.finished {
            let Some((end, delim_len)) = find_boundary(&self.buffer, self.scanned) else {
                self.scanned = self.buffer.len();
                return None;
            };
            let mut raw: Vec<u8> = self.buffer.drain(..end + delim_len).collect();
            self.scanned = 0;
            raw.truncate(end);
            let text = String::from_utf8_lossy(&raw);
            match data_payload(&text) {
                Some(payload) if payload.trim() == DONE_SENTINEL => {
                    self.finished = true;
                    self.buffer.clear();
                    self.scanned = 0;
                    return Some(Frame::Done);
                }
                Some(payload) => return Some(Frame::Data(payload)),
                None => {
                    if !text.trim().is_empty() {
                        tracing::trace!(frame = %text, "dropping frame without data prefix");
                    }
                }
            }
        }
        None
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes held back waiting for a frame boundary.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Earliest blank-line boundary: `\n\n` or `\r\n\r\n`. Returns (frame end, delimiter length).
///
/// `scanned` bytes were already searched; the last three are revisited since a
/// delimiter may straddle the old end of the buffer.
fn find_boundary(buf: &[u8], scanned: usize) -> Option<(usize, usize)> {
    let mut i = scanned.saturating_sub(3);
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

/// Joined `data:` lines of a frame whose first line carries the prefix.
fn data_payload(frame: &str) -> Option<String> {
    let mut lines = frame.lines();
    let first = lines.next()?;
    let first = strip_data_prefix(first)?;
    let mut out = first.to_string();
    for line in lines {
        if let Some(rest) = strip_data_prefix(line) {
            out.push('\n');
            out.push_str(rest);
        }
    }
    Some(out)
}

fn strip_data_prefix(line: &str) -> Option<&str> {
    let rest = line.trim_end_matches('\r').strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

struct DecodeState {
    body: ByteStream,
    decoder: FrameDecoder,
    idle_timeout: Option<Duration>,
    done: bool,
}

/// Lazily turn a byte stream into frame payloads.
///
/// Ends after the `[DONE]` sentinel, or quietly when the transport closes; a
/// missing sentinel is for the caller to judge. With `idle_timeout` set, a
/// wait longer than that for the next chunk yields [`TransportError::Stalled`].
pub fn decode_frames(
    body: ByteStream,
    idle_timeout: Option<Duration>,
) -> BoxStream<'static, Result<String, TransportError>> {
    let state = DecodeState {
        body,
        decoder: FrameDecoder::new(),
        idle_timeout,
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if st.done {
                return None;
            }
            match st.decoder.next_frame() {
                Some(Frame::Data(payload)) => return Some((Ok(payload), st)),
                Some(Frame::Done) => {
                    tracing::debug!("stream reached [DONE]");
                    return None;
                }
                None => {}
            }
            let next = match st.idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, st.body.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        st.done = true;
                        return Some((Err(TransportError::Stalled { after: limit }), st));
                    }
                },
                None => st.body.next().await,
            };
            match next {
                Some(Ok(chunk)) => st.decoder.push(&chunk),
                Some(Err(err)) => {
                    st.done = true;
                    return Some((Err(err), st));
                }
                None => {
                    let pending = st.decoder.pending_bytes();
                    if pending > 0 {
                        tracing::debug!(pending, "transport closed mid-frame; dropping tail");
                    }
                    return None;
                }
            }
        }
    })
    .boxed()
}
