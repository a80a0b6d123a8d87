//! STOMP 1.2 frames.
//!
//! The chat transport speaks STOMP over a websocket. Each websocket text
//! message carries one or more frames, or a bare end-of-line heart-beat.
//!
//! ```text
//! COMMAND\n
//! name:value\n
//! ...\n
//! \n
//! body\0
//! ```
//!
//! Header names and values are escaped (`\\`, `\r`, `\n`, `\c`) on every
//! frame except `CONNECT`, `STOMP` and `CONNECTED`. When a `content-length`
//! header is present the body may contain NUL bytes; otherwise it ends at the
//! first NUL.

use std::{borrow::Cow, fmt, time::Duration};

use bytes::{BufMut, Bytes};

use crate::errors::{ProtocolError, Result};

/// Largest frame we accept or produce (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// STOMP protocol versions offered on `CONNECT`.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Frame commands used by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    /// Client opens a session
    Connect,
    /// Alternative spelling of `CONNECT`
    Stomp,
    /// Server accepted the session
    Connected,
    /// Client publishes to a destination
    Send,
    /// Client subscribes to a destination
    Subscribe,
    /// Client cancels a subscription
    Unsubscribe,
    /// Client closes the session
    Disconnect,
    /// Server delivers a message for a subscription
    Message,
    /// Server acknowledges a frame that requested a receipt
    Receipt,
    /// Server reports a fatal error and closes
    Error,
}

impl StompCommand {
    /// Command name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parse a command line.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` for anything outside the supported
    ///   set
    pub fn parse(line: &str) -> Result<Self> {
        Ok(match line {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        })
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heart-beat intervals from a `heart-beat` header, in milliseconds.
///
/// Zero means "cannot send" / "does not want to receive".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Smallest interval at which the sender can emit heart-beats
    pub send_ms: u32,
    /// Desired interval between heart-beats from the peer
    pub recv_ms: u32,
}

impl HeartBeat {
    /// Heart-beating switched off in both directions.
    pub const DISABLED: Self = Self { send_ms: 0, recv_ms: 0 };

    /// Create heart-beat settings.
    pub const fn new(send_ms: u32, recv_ms: u32) -> Self {
        Self { send_ms, recv_ms }
    }

    /// Parse a `cx,cy` header value. `None` if malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let (send, recv) = value.split_once(',')?;
        Some(Self { send_ms: send.trim().parse().ok()?, recv_ms: recv.trim().parse().ok()? })
    }

    /// Negotiate intervals between our settings (`self`) and the server's.
    ///
    /// Returns `(outgoing, incoming)`: how often we must send, and how often
    /// we should hear from the server. `None` disables that direction.
    pub fn negotiate(self, server: Self) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: u32, theirs: u32| {
            (ours != 0 && theirs != 0).then(|| Duration::from_millis(u64::from(ours.max(theirs))))
        };
        (pick(self.send_ms, server.recv_ms), pick(self.recv_ms, server.send_ms))
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.send_ms, self.recv_ms)
    }
}

/// A single STOMP frame.
///
/// # Invariants
///
/// - Header order is preserved; when a name repeats, the first occurrence is
///   the effective value (STOMP 1.2 §"Repeated Header Entries").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command
    pub command: StompCommand,
    /// Headers in wire order, unescaped
    pub headers: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Bytes,
}

impl StompFrame {
    /// Create a frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: StompCommand) -> Self {
        Self { command, headers: Vec::new(), body: Bytes::new() }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// `CONNECT` frame opening a session with `host`.
    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(StompCommand::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", heart_beat.to_string())
    }

    /// `SUBSCRIBE` frame with auto acknowledgement.
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    /// `UNSUBSCRIBE` frame for subscription `id`.
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).with_header("id", id)
    }

    /// `SEND` frame carrying a JSON body.
    pub fn send_json(destination: &str, body: impl Into<Bytes>) -> Self {
        Self::new(StompCommand::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    /// `DISCONNECT` frame asking for a receipt.
    pub fn disconnect(receipt: &str) -> Self {
        Self::new(StompCommand::Disconnect).with_header("receipt", receipt)
    }

    /// Effective value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidUtf8` if the body is not text
    pub fn body_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|_| ProtocolError::InvalidUtf8("body"))
    }

    /// Heart-beat settings advertised by this frame. `None` if absent or
    /// malformed.
    pub fn heart_beat(&self) -> Option<HeartBeat> {
        self.header("heart-beat").and_then(HeartBeat::parse)
    }

    /// Encode the frame.
    ///
    /// A `content-length` header is added when the body is non-empty and the
    /// caller did not set one.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLarge` if the body exceeds [`MAX_FRAME_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.body.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: self.body.len(), max: MAX_FRAME_SIZE });
        }

        let escape_headers = self.command.escapes_headers();

        dst.put_slice(self.command.as_str().as_bytes());
        dst.put_u8(b'\n');

        for (name, value) in &self.headers {
            if escape_headers {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }

        if !self.body.is_empty() && self.header("content-length").is_none() {
            dst.put_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.put_slice(&self.body);
        dst.put_u8(0);

        Ok(())
    }

    /// Encode into a string for a websocket text message.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooLarge` if the body is oversized
    /// - `ProtocolError::InvalidUtf8` if the body is binary
    pub fn to_text(&self) -> Result<String> {
        let mut buf = Vec::with_capacity(64 + self.body.len());
        self.encode(&mut buf)?;
        String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8("body"))
    }

    /// Decode the first frame in `bytes`.
    ///
    /// Leading end-of-line bytes are heart-beats and are skipped. Returns
    /// `None` when the input holds nothing but heart-beats, otherwise the
    /// frame and the number of bytes consumed (including trailing EOLs).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownCommand` for an unsupported command
    /// - `ProtocolError::MalformedHeader` / `InvalidEscape` for bad headers
    /// - `ProtocolError::FrameTruncated` if the NUL terminator is missing or
    ///   the body is shorter than `content-length`
    /// - `ProtocolError::FrameTooLarge` above [`MAX_FRAME_SIZE`]
    pub fn decode(bytes: &[u8]) -> Result<Option<(Self, usize)>> {
        let start = bytes.iter().position(|b| !matches!(b, b'\n' | b'\r'));
        let Some(start) = start else {
            return Ok(None);
        };

        let (command_line, mut pos) = read_line(bytes, start)?;
        let command = StompCommand::parse(command_line)?;
        let escaped = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, next) = read_line(bytes, pos)?;
            pos = next;
            if line.is_empty() {
                break;
            }

            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;

            if escaped {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::MalformedHeader(format!("content-length:{value}")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                if len > MAX_FRAME_SIZE {
                    return Err(ProtocolError::FrameTooLarge { size: len, max: MAX_FRAME_SIZE });
                }
                let end = pos + len;
                if bytes.get(end) != Some(&0) {
                    return Err(ProtocolError::FrameTruncated("body shorter than content-length"));
                }
                end
            },
            None => {
                let rest = bytes.get(pos..).unwrap_or_default();
                let nul = rest
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(ProtocolError::FrameTruncated("missing NUL terminator"))?;
                pos + nul
            },
        };

        if body_end - start > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge { size: body_end - start, max: MAX_FRAME_SIZE });
        }

        let body = Bytes::copy_from_slice(bytes.get(pos..body_end).unwrap_or_default());

        let mut consumed = body_end + 1;
        while matches!(bytes.get(consumed), Some(b'\n' | b'\r')) {
            consumed += 1;
        }

        debug_assert!(consumed <= bytes.len());

        Ok(Some((Self { command, headers, body }, consumed)))
    }

    /// Decode every frame in `bytes`, skipping heart-beats.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed frame; see [`StompFrame::decode`].
    pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<Self>> {
        let mut frames = Vec::new();
        while let Some((frame, consumed)) = Self::decode(bytes)? {
            frames.push(frame);
            bytes = bytes.get(consumed..).unwrap_or_default();
        }
        Ok(frames)
    }
}

/// Read one `\n` or `\r\n` terminated line starting at `pos`.
fn read_line(bytes: &[u8], pos: usize) -> Result<(&str, usize)> {
    let rest = bytes.get(pos..).ok_or(ProtocolError::FrameTruncated("unexpected end of frame"))?;
    let newline = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(ProtocolError::FrameTruncated("unterminated line"))?;

    let mut line = rest.get(..newline).unwrap_or_default();
    if let Some(stripped) = line.strip_suffix(b"\r") {
        line = stripped;
    }

    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("header"))?;
    Ok((line, pos + newline + 1))
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['\\', '\r', '\n', ':']) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}
