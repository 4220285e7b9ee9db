//! Frame decoder for `event:` / `data:` line-delimited event streams.
//!
//! Raw text arrives at arbitrary chunk boundaries. The decoder buffers the
//! trailing partial line, and every complete `data:` line yields exactly one
//! record paired with the most recent `event:` name.
use std::collections::VecDeque;

use futures_util::Stream;
use memchr::memchr_iter;

use super::{is_done_payload, DecodedRecord, Record};
use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// FrameDecoder: incremental line decoder
// ---------------------------------------------------------------------------

/// Incremental record decoder.
///
/// Feed it raw text chunks and it yields one [`DecodedRecord`] per complete
/// `data:` line. A malformed payload yields an `Err` for that line only.
pub struct FrameDecoder {
    buffer: String,
    read_offset: usize,
    event_name: Option<String>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            event_name: None,
        }
    }

    /// Feed raw text and return any complete records.
    pub fn feed(&mut self, chunk: &str) -> Vec<DecodedRecord> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed raw text and append complete records into a caller-provided buffer.
    ///
    /// Line rules:
    /// - `event:` sets the event name carried to the next data line
    /// - `data:` yields one record and consumes the pending event name
    /// - an empty line is a record boundary and drops any pending event name
    /// - `:` comments and unknown fields (`id:`, `retry:`) are ignored
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<DecodedRecord>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let scan_start = processed_up_to;
        let bytes = self.buffer.as_bytes();
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(line, &mut self.event_name, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Flush a trailing line that never received its line break.
    ///
    /// Called once the source reports end-of-stream.
    pub fn finish_into(&mut self, out: &mut Vec<DecodedRecord>) {
        if self.read_offset < self.buffer.len() {
            let tail = self.buffer[self.read_offset..].to_owned();
            let line = tail.strip_suffix('\r').unwrap_or(&tail);
            Self::process_line(line, &mut self.event_name, out);
        }
        self.buffer.clear();
        self.read_offset = 0;
        self.event_name = None;
    }

    /// Whether a partial line is still buffered.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.read_offset < self.buffer.len()
    }

    fn process_line(line: &str, event_name: &mut Option<String>, out: &mut Vec<DecodedRecord>) {
        if line.is_empty() {
            *event_name = None;
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            let event = event_name.take();
            if is_done_payload(value) {
                return;
            }
            let decoded = match serde_json::from_str::<serde_json::Value>(value) {
                Ok(data) => Ok(Record { event, data }),
                Err(source) => Err(DecodeError::MalformedJson {
                    event,
                    line: value.to_owned(),
                    source,
                }),
            };
            out.push(decoded);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_name = Some(value.to_owned());
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Stream utility
// ---------------------------------------------------------------------------

/// Feed a byte chunk to the decoder, holding back an incomplete UTF-8 tail
/// until the next chunk completes it.
fn feed_utf8_chunk(
    decoder: &mut FrameDecoder,
    remainder: &mut Vec<u8>,
    bytes: &[u8],
    out: &mut Vec<DecodedRecord>,
) {
    if remainder.is_empty() {
        if let Ok(text) = std::str::from_utf8(bytes) {
            decoder.feed_into(text, out);
            return;
        }
    }

    remainder.extend_from_slice(bytes);
    match std::str::from_utf8(remainder) {
        Ok(text) => {
            decoder.feed_into(text, out);
            remainder.clear();
        }
        Err(e) if e.error_len().is_some() => {
            // Invalid sequence in the middle, not a split code point.
            let text = String::from_utf8_lossy(remainder).into_owned();
            decoder.feed_into(&text, out);
            remainder.clear();
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            if let Ok(text) = std::str::from_utf8(&remainder[..valid_up_to]) {
                decoder.feed_into(text, out);
            }
            remainder.drain(..valid_up_to);
        }
    }
}

/// Decode whatever is still buffered once the source has ended.
fn flush_tail(decoder: &mut FrameDecoder, remainder: &mut Vec<u8>, out: &mut Vec<DecodedRecord>) {
    if !remainder.is_empty() {
        let tail = String::from_utf8_lossy(remainder).into_owned();
        remainder.clear();
        decoder.feed_into(&tail, out);
    }
    decoder.finish_into(out);
}

/// Turn a byte stream into a lazy stream of decoded records.
///
/// Chunks are pulled only after every record of the previous chunk has been
/// yielded. A transport error ends the stream the same way end-of-stream does.
pub fn record_stream<S, E>(byte_stream: S) -> impl Stream<Item = DecodedRecord> + Send
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    use futures_util::StreamExt;

    struct DecodeState<S> {
        stream: std::pin::Pin<Box<S>>,
        decoder: FrameDecoder,
        remainder: Vec<u8>,
        parsed: Vec<DecodedRecord>,
        pending: VecDeque<DecodedRecord>,
        finished: bool,
    }

    let state = DecodeState {
        stream: Box::pin(byte_stream),
        decoder: FrameDecoder::new(),
        remainder: Vec::new(),
        parsed: Vec::with_capacity(8),
        pending: VecDeque::with_capacity(8),
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(record) = state.pending.pop_front() {
                return Some((record, state));
            }
            if state.finished {
                return None;
            }

            match state.stream.as_mut().next().await {
                Some(Ok(bytes)) => {
                    feed_utf8_chunk(
                        &mut state.decoder,
                        &mut state.remainder,
                        &bytes,
                        &mut state.parsed,
                    );
                }
                Some(Err(err)) => {
                    tracing::warn!("record source failed, ending stream: {err}");
                    state.finished = true;
                    flush_tail(&mut state.decoder, &mut state.remainder, &mut state.parsed);
                }
                None => {
                    state.finished = true;
                    flush_tail(&mut state.decoder, &mut state.remainder, &mut state.parsed);
                }
            }
            state.pending.extend(state.parsed.drain(..));
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
