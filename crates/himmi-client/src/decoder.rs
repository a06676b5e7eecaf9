//! Incremental decoding of gateway responses into protocol events
//!
//! The response shape is decided once, from the `Content-Type` header, when
//! decoding starts: an event stream is split into `data:` lines as bytes
//! arrive, while a JSON document is read whole and surfaced as a single
//! fallback payload.

use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

use crate::error::{ClientError, Result};
use crate::types::{CompletionPayload, StreamChunk, UsageRecord};

/// Media type of a streamed response
pub const EVENT_STREAM: &str = "text/event-stream";

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Boxed sequence of decoded events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProtocolEvent>> + Send>>;

/// Transport-level event decoded from a completion response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// Non-empty text appended to the assistant message
    Delta(String),
    /// Token usage record
    Usage(UsageRecord),
    /// End of the response
    Done,
    /// Complete JSON body returned instead of a stream
    Fallback(CompletionPayload),
}

/// How a response body must be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// `text/event-stream` lines
    EventStream,
    /// One JSON document
    Json,
}

impl BodyKind {
    /// Pick the body kind from the response `Content-Type`
    ///
    /// A missing or unrecognized content type falls back to what the
    /// request asked for.
    pub fn resolve(content_type: Option<&str>, requested_stream: bool) -> Self {
        let media_type = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase());

        match media_type.as_deref() {
            Some(EVENT_STREAM) => Self::EventStream,
            Some(mt) if mt == "application/json" || mt.ends_with("+json") => Self::Json,
            _ if requested_stream => Self::EventStream,
            _ => Self::Json,
        }
    }
}

/// Line decoder for event-stream bodies
///
/// Holds the single carry-over buffer for a line split across reads.
#[derive(Debug, Default)]
pub struct TransportDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to contain no newline
    scanned: usize,
    finished: bool,
    skipped: usize,
}

impl TransportDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one network read, appending complete events to `events`
    ///
    /// Malformed frames are skipped. After the `[DONE]` sentinel the
    /// decoder is finished and ignores any further input.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Stream` when the gateway reports an error
    /// frame; events decoded before it remain in `events`
    pub fn feed(&mut self, chunk: &[u8], events: &mut Vec<ProtocolEvent>) -> Result<()> {
        if self.finished {
            return Ok(());
        }

        self.buffer.extend_from_slice(chunk);

        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.scanned = 0;
            let line = String::from_utf8_lossy(&line[..pos]);

            self.decode_line(line.trim_end_matches('\r'), events)?;

            if self.finished {
                self.buffer.clear();
                break;
            }
        }

        self.scanned = self.buffer.len();

        Ok(())
    }

    /// Whether the terminal sentinel has been seen
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of frames dropped because they were not valid JSON
    pub const fn skipped_frames(&self) -> usize {
        self.skipped
    }

    /// Signal the end of the body, discarding any unterminated line
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!(
                bytes = self.buffer.len(),
                "discarding unterminated line at end of stream"
            );
            self.buffer.clear();
        }
        self.scanned = 0;
        self.finished = true;
    }

    fn decode_line(&mut self, line: &str, events: &mut Vec<ProtocolEvent>) -> Result<()> {
        // Comments, `event:` and `id:` fields carry nothing we use
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return Ok(());
        };

        let data = data.trim();
        if data.is_empty() {
            return Ok(());
        }

        if data == DONE_SENTINEL {
            self.finished = true;
            events.push(ProtocolEvent::Done);
            return Ok(());
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(error = %e, frame_len = data.len(), "skipping malformed stream frame");
                return Ok(());
            }
        };

        if let Some(error) = chunk.error {
            return Err(ClientError::Stream(error_message(&error)));
        }

        if let Some(text) = chunk.choices.into_iter().next().and_then(|c| c.delta.content)
            && !text.is_empty()
        {
            events.push(ProtocolEvent::Delta(text));
        }

        if let Some(usage) = chunk.usage {
            events.push(ProtocolEvent::Usage(usage));
        }

        Ok(())
    }
}

/// Decode a response body of the given kind
pub fn decode<S, E>(kind: BodyKind, body: S) -> EventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    match kind {
        BodyKind::EventStream => decode_event_stream(body),
        BodyKind::Json => decode_json(body),
    }
}

struct StreamState<S> {
    body: Pin<Box<S>>,
    decoder: TransportDecoder,
    pending: VecDeque<Result<ProtocolEvent>>,
    exhausted: bool,
}

/// Lazily decode an event-stream body
///
/// The body is dropped as soon as the sequence ends, releasing the
/// connection even if the server keeps sending after `[DONE]`.
pub fn decode_event_stream<S, E>(body: S) -> EventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = StreamState {
        body: Box::pin(body),
        decoder: TransportDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }

            if state.exhausted || state.decoder.is_finished() {
                let skipped = state.decoder.skipped_frames();
                if skipped > 0 {
                    tracing::warn!(skipped, "event stream ended with malformed frames");
                }
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let mut events = Vec::new();
                    let result = state.decoder.feed(&bytes, &mut events);
                    state.pending.extend(events.into_iter().map(Ok));
                    if let Err(e) = result {
                        state.pending.push_back(Err(e));
                        state.exhausted = true;
                    }
                }
                Some(Err(e)) => {
                    state.exhausted = true;
                    return Some((Err(e.into()), state));
                }
                None => state.decoder.finish(),
            }
        }
    })
    .boxed()
}

/// Read a JSON body whole and yield it as a fallback payload followed by `Done`
pub fn decode_json<S, E>(body: S) -> EventStream
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    stream::once(async move {
        let bytes = body
            .map_err(Into::<ClientError>::into)
            .try_fold(Vec::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await?;

        serde_json::from_slice::<CompletionPayload>(&bytes)
            .map_err(|e| ClientError::Parse(format!("invalid completion body: {e}")))
    })
    .flat_map(|result| {
        let events = match result {
            Ok(payload) => vec![Ok(ProtocolEvent::Fallback(payload)), Ok(ProtocolEvent::Done)],
            Err(e) => vec![Err(e)],
        };
        stream::iter(events)
    })
    .boxed()
}

/// Extract a readable message from an error frame
fn error_message(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(message) => message.clone(),
        other => other
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| other.to_string(), str::to_owned),
    }
}
