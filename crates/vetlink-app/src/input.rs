//! Inputs the driver hands to the runtime.

use bytes::Bytes;
use vetlink_proto::{NotificationId, RoomId, StompFrame};

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a room's chat.
    EnterRoom(RoomId),
    /// Close the open room.
    LeaveRoom,
    /// Publish a chat message.
    Send(String),
    /// Load older messages.
    LoadMore,
    /// Mark the open room read.
    MarkRoomRead,
    /// Mark one notification read.
    MarkNotificationRead(NotificationId),
    /// Mark every notification read.
    MarkAllNotificationsRead,
    /// Log out and exit.
    Quit,
}

impl Command {
    /// Parse one line of text input.
    ///
    /// Lines starting with `/` are commands; anything else is a message.
    /// Returns `None` for an unknown or malformed command.
    pub fn parse(line: &str) -> Option<Self> {
        let Some(command) = line.trim_start().strip_prefix('/') else {
            return Some(Self::Send(line.to_string()));
        };

        let mut words = command.split_whitespace();
        let name = words.next()?;
        let arg = words.next();
        match (name, arg) {
            ("room" | "join", Some(id)) => id.parse().ok().map(Self::EnterRoom),
            ("leave", None) => Some(Self::LeaveRoom),
            ("more", None) => Some(Self::LoadMore),
            ("read", None) => Some(Self::MarkRoomRead),
            ("ack", Some(id)) => id.parse().ok().map(Self::MarkNotificationRead),
            ("ackall", None) => Some(Self::MarkAllNotificationsRead),
            ("quit" | "q", None) => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Input polled from a [`crate::Driver`].
///
/// Socket and stream reports carry the generation they were opened with.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    /// User command.
    Command(Command),
    /// STOMP frame on the chat socket.
    SocketFrame {
        /// Socket generation
        generation: u64,
        /// Decoded frame
        frame: StompFrame,
    },
    /// Heart-beat on the chat socket.
    SocketHeartbeat {
        /// Socket generation
        generation: u64,
    },
    /// Chat socket closed.
    SocketClosed {
        /// Socket generation
        generation: u64,
        /// Human-readable cause
        reason: String,
    },
    /// Bytes on the notification stream.
    StreamChunk {
        /// Stream generation
        generation: u64,
        /// Raw body bytes
        bytes: Bytes,
    },
    /// Notification stream closed.
    StreamClosed {
        /// Stream generation
        generation: u64,
        /// Human-readable cause
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(Command::parse("Bori is ready"), Some(Command::Send("Bori is ready".into())));
        assert_eq!(Command::parse(""), Some(Command::Send(String::new())));
    }

    #[test]
    fn slash_commands() {
        assert_eq!(Command::parse("/room 3"), Some(Command::EnterRoom(3)));
        assert_eq!(Command::parse("/ack 42"), Some(Command::MarkNotificationRead(42)));
        assert_eq!(Command::parse("  /quit"), Some(Command::Quit));
        assert_eq!(Command::parse("/more"), Some(Command::LoadMore));
    }

    #[test]
    fn malformed_commands_rejected() {
        assert_eq!(Command::parse("/room"), None);
        assert_eq!(Command::parse("/room abc"), None);
        assert_eq!(Command::parse("/leave now"), None);
        assert_eq!(Command::parse("/"), None);
        assert_eq!(Command::parse("/dance"), None);
    }
}
