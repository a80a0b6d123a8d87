//! Read-only snapshot handed to [`crate::Driver::render`].

use vetlink_client::{ConnectionState, UserError};
use vetlink_proto::{ChatMessage, Notification, RoomId};

use crate::session::UserProfile;

/// Everything a frontend needs to draw one frame.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    /// Logged-in user
    pub user: &'a UserProfile,
    /// Open room
    pub room_id: Option<RoomId>,
    /// Chat socket state
    pub chat_state: ConnectionState,
    /// Messages of the open room, oldest first
    pub messages: &'a [ChatMessage],
    /// Older messages can still be loaded
    pub has_older: bool,
    /// A history page is being fetched
    pub loading_history: bool,
    /// Notification stream state
    pub notification_state: ConnectionState,
    /// Notifications, newest first
    pub notifications: &'a [Notification],
    /// Unread notification counter
    pub unread_count: u32,
    /// Last foreground error
    pub status: Option<&'a UserError>,
}
