//! Server-Sent Events decoder.
//!
//! Incremental parser for the `text/event-stream` format. Bytes arrive in
//! arbitrary chunks from the HTTP body; the decoder buffers partial lines and
//! emits an [`SseEvent`] each time a blank line terminates an event block.
//!
//! Follows the WHATWG event-stream interpretation rules: lines end in CRLF,
//! LF or CR; lines starting with `:` are comments; `data` lines accumulate
//! with `\n` separators; `id` updates the last event id (ignored if it
//! contains NUL); `retry` updates the reconnection time when it is all ASCII
//! digits; blocks without data are not dispatched.
//!
//! A line longer than the decoder's limit is a protocol error: the stream is
//! broken or hostile and must be dropped.

use std::time::Duration;

use crate::errors::{ProtocolError, Result};

/// Event type used when a block carries no `event` field.
pub const DEFAULT_EVENT: &str = "message";

/// Default limit on one line, terminator excluded.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// A dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`event:` field, or [`DEFAULT_EVENT`])
    pub event: String,
    /// Accumulated `data:` lines joined by `\n`
    pub data: String,
    /// Last event id at dispatch time. `None` if the server never sent one.
    pub id: Option<String>,
}

/// Incremental event-stream decoder.
#[derive(Debug)]
pub struct SseDecoder {
    /// Bytes not yet terminated by an end-of-line
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no line terminator
    scanned: usize,
    /// Longest accepted line
    max_line: usize,
    /// Whether the leading byte-order mark has been checked
    started: bool,
    /// `data` buffer of the block being assembled
    data: String,
    /// `event` field of the block being assembled
    event: String,
    /// Whether the block being assembled has seen a `data` field
    has_data: bool,
    /// Last event id buffer
    last_event_id: Option<String>,
    /// Most recent `retry` value not yet taken by the caller
    retry: Option<Duration>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line: MAX_LINE_LEN,
            started: false,
            data: String::new(),
            event: String::new(),
            has_data: false,
            last_event_id: None,
            retry: None,
        }
    }
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject lines longer than `max_line` bytes.
    #[must_use]
    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Feed a chunk of the response body and return every completed event.
    ///
    /// # Errors
    ///
    /// `ProtocolError::LineTooLong` if a line, complete or still partial,
    /// exceeds the limit. Buffered input is discarded; the caller should drop
    /// the stream.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buf.extend_from_slice(chunk);

        if !self.started {
            if self.buf.len() < 3 && b"\xEF\xBB\xBF".starts_with(&self.buf) {
                return Ok(Vec::new());
            }
            if self.buf.starts_with(b"\xEF\xBB\xBF") {
                self.buf.drain(..3);
            }
            self.started = true;
        }

        let mut events = Vec::new();
        let mut line_start = 0;
        let mut i = self.scanned.min(self.buf.len());

        while i < self.buf.len() {
            let byte = self.buf[i];
            if byte != b'\n' && byte != b'\r' {
                i += 1;
                continue;
            }

            // A trailing CR may be the first half of CRLF; wait for more input.
            if byte == b'\r' && i + 1 == self.buf.len() {
                break;
            }

            if i - line_start > self.max_line {
                return Err(self.overflow(i - line_start));
            }

            let line = String::from_utf8_lossy(&self.buf[line_start..i]).into_owned();
            let terminator_len = if byte == b'\r' && self.buf.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            i += terminator_len;
            line_start = i;

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if i - line_start > self.max_line {
            return Err(self.overflow(i - line_start));
        }

        self.buf.drain(..line_start);
        self.scanned = i - line_start;
        Ok(events)
    }

    fn overflow(&mut self, size: usize) -> ProtocolError {
        self.reset();
        ProtocolError::LineTooLong { size, max: self.max_line }
    }

    /// Most recent `retry` hint, cleared on read.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    /// Last event id seen on the stream.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Discard buffered partial input and any half-assembled block.
    ///
    /// Call on reconnect; the last event id survives.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.started = false;
        self.data.clear();
        self.event.clear();
        self.has_data = false;
        self.retry = None;
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            },
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            },
            _ => {},
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        if !self.has_data {
            self.data.clear();
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        self.has_data = false;

        let event = if event.is_empty() { DEFAULT_EVENT.to_string() } else { event };
        Some(SseEvent { event, data, id: self.last_event_id.clone() })
    }
}
