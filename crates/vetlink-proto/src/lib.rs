//! Wire formats for the vetlink real-time transports.
//!
//! # Components
//!
//! - [`StompFrame`]: STOMP 1.2 codec used by the chat transport
//! - [`SseDecoder`]: incremental `text/event-stream` decoder used by the
//!   notification stream
//! - [`payloads`]: JSON bodies shared by REST, STOMP and the event stream
//!
//! Everything here is pure data transformation. Nothing performs I/O or keeps
//! time.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
pub mod payloads;
pub mod sse;
pub mod stomp;

pub use errors::{ProtocolError, Result};
pub use payloads::{
    MessageId, NotificationId, RoomId, UserId,
    chat::{ChatMessage, MessagePage, OutgoingChatMessage},
    notification::{Notification, NotificationKind, NotificationList},
    stream::{PushEvent, StreamPayload},
};
pub use sse::{SseDecoder, SseEvent};
pub use stomp::{HeartBeat, StompCommand, StompFrame};
