//! Client
//!
//! Action-based state machines for the clinic's real-time features: the room
//! chat over STOMP and the notification event stream.
//!
//! # Architecture
//!
//! Both sessions follow the Sans-IO pattern of [`vetlink_core`]. They receive
//! events ([`ChatEvent`], [`NotificationEvent`]), run pure state machine
//! logic against the clock of their [`Environment`], and return actions
//! ([`ChatAction`], [`NotificationAction`]) for the caller to execute.
//!
//! # Components
//!
//! - [`ChatSession`]: one room's socket, history and read state
//! - [`NotificationStream`]: the user's event stream, list and unread counter
//! - [`MessageStore`]: ordered, duplicate-free message list
//! - [`Pagination`]: single-flight history backfill
//! - [`Inbox`]: notification snapshot and unread counter
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::Endpoints`]: URLs of the backend
//! - [`transport::RestClient`]: history, notification and read-mark calls
//! - [`transport::StompSocket`]: websocket carrying STOMP frames
//! - [`transport::EventStream`]: `text/event-stream` body as byte chunks
//! - [`transport::SystemEnv`]: wall clock and tokio timers

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chat;
mod error;
mod event;
mod inbox;
mod notifications;
mod pagination;
mod store;

#[cfg(feature = "transport")]
pub mod transport;

pub use chat::{ChatConfig, ChatSession, PUBLISH_DESTINATION, SUBSCRIPTION_ID, room_topic};
pub use error::{FetchError, UserError};
pub use event::{
    ChatAction, ChatEvent, HistoryQuery, NotificationAction, NotificationEvent, StreamSignal,
};
pub use inbox::{Inbox, ReadMark};
pub use notifications::{DEFAULT_PAGE_SIZE, NotificationConfig, NotificationStream};
pub use pagination::{HistoryKind, Pagination, RequestId};
pub use store::MessageStore;
pub use vetlink_core::{ConnectionState, Environment};
