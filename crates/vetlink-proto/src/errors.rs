//! Error types for wire-format parsing.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames and payloads.
///
/// Every variant describes a malformed peer input. None of them are
/// recoverable for the frame in question; callers drop the frame and keep the
/// connection, except for [`ProtocolError::LineTooLong`], which ends the stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Command line is not a STOMP command we understand.
    #[error("unknown STOMP command: {0:?}")]
    UnknownCommand(String),

    /// Input ended before the frame was complete.
    #[error("frame truncated: {0}")]
    FrameTruncated(&'static str),

    /// Header line without a `:` separator.
    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    /// Header contains an escape sequence STOMP 1.2 does not define.
    #[error("invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    /// Frame exceeds the configured size limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Size of the offending frame
        size: usize,
        /// Maximum permitted size
        max: usize,
    },

    /// Event-stream line exceeds the decoder's limit.
    #[error("event-stream line too long: {size} bytes (max {max})")]
    LineTooLong {
        /// Bytes buffered for the line so far
        size: usize,
        /// Maximum permitted length
        max: usize,
    },

    /// Bytes that must be text were not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Body was not the JSON document we expected.
    #[error("invalid JSON payload: {0}")]
    Json(String),

    /// A required header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
