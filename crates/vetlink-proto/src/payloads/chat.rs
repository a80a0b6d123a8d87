//! Chat messages and history pages.

use serde::{Deserialize, Serialize};

use super::{MessageId, RoomId, UserId};
use crate::errors::Result;

/// A chat message as stored by the backend.
///
/// Immutable once created except for `is_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Server-assigned identity
    #[serde(alias = "id")]
    pub message_id: MessageId,
    /// Owning room
    pub room_id: RoomId,
    /// Sender account
    pub sender_id: UserId,
    /// Sender display name
    #[serde(default)]
    pub sender_name: String,
    /// Text content
    pub content: String,
    /// Read by the local user
    #[serde(default, alias = "read")]
    pub is_read: bool,
    /// Creation time, `YYYY-MM-DDTHH:MM:SS`
    #[serde(default)]
    pub created_at: String,
}

impl ChatMessage {
    /// Parse a message from a STOMP `MESSAGE` body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Json` if the body is not a chat message
    pub fn from_json(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// One page of chat history.
///
/// Messages are ordered oldest first within the page.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Messages in ascending identity order
    #[serde(default)]
    pub content: Vec<ChatMessage>,
    /// Total messages in the room
    #[serde(default)]
    pub total_elements: u64,
    /// Total pages at this page size
    #[serde(default)]
    pub total_pages: u32,
    /// Page index
    #[serde(default, alias = "page")]
    pub number: u32,
    /// More recent messages exist
    #[serde(default)]
    pub has_next: bool,
    /// Older messages exist
    #[serde(default)]
    pub has_previous: bool,
}

/// Body published to `/pub/chat/message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingChatMessage {
    /// Target room
    pub room_id: RoomId,
    /// Sending user
    pub sender_id: UserId,
    /// Text content
    pub content: String,
}

impl OutgoingChatMessage {
    /// Serialize to a JSON body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Json` if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
