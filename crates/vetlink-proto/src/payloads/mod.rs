//! JSON payloads carried by the REST API, the STOMP bodies and the event
//! stream.
//!
//! Field names follow the backend's camelCase convention. Aliases accept the
//! older spellings (`id`, `read`, `page`) that some endpoints still emit.

pub mod chat;
pub mod notification;
pub mod stream;

/// Server-assigned chat message identity, monotonic within a room.
pub type MessageId = u64;

/// Chat room identity.
pub type RoomId = u64;

/// User (account) identity.
pub type UserId = u64;

/// Notification identity.
pub type NotificationId = u64;
