//! Line-oriented rendering.
//!
//! The runtime hands over a full [`View`] on every change; the printer
//! remembers what it already wrote and only emits the difference, so the
//! terminal reads like a chat log.

use std::io::{self, Write};

use vetlink_app::View;
use vetlink_client::ConnectionState;
use vetlink_proto::{ChatMessage, MessageId, RoomId};

/// What has been written so far.
#[derive(Debug, Default)]
pub struct Printer {
    room_id: Option<RoomId>,
    oldest: Option<MessageId>,
    newest: Option<MessageId>,
    chat_state: Option<ConnectionState>,
    notification_state: Option<ConnectionState>,
    unread_count: Option<u32>,
    status: Option<String>,
}

impl Printer {
    /// Printer that has written nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write what changed since the last view to stdout.
    pub fn render(&mut self, view: &View<'_>) -> io::Result<()> {
        let lines = self.diff(view);
        if lines.is_empty() {
            return Ok(());
        }

        let mut out = io::stdout().lock();
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }

    /// Lines describing what changed since the last view.
    pub fn diff(&mut self, view: &View<'_>) -> Vec<String> {
        let mut lines = Vec::new();

        if view.room_id != self.room_id {
            self.room_id = view.room_id;
            self.oldest = None;
            self.newest = None;
            lines.push(match view.room_id {
                Some(room_id) => format!("== room {room_id} =="),
                None => "== left room ==".to_string(),
            });
        }

        if self.chat_state.replace(view.chat_state) != Some(view.chat_state)
            && view.room_id.is_some()
        {
            lines.push(format!("-- chat {}", view.chat_state));
        }
        if self.notification_state.replace(view.notification_state)
            != Some(view.notification_state)
        {
            lines.push(format!("-- notifications {}", view.notification_state));
        }

        lines.extend(self.message_lines(view.messages));

        if self.unread_count.replace(view.unread_count) != Some(view.unread_count) {
            lines.push(format!("-- {} unread notifications", view.unread_count));
        }

        let status = view.status.map(ToString::to_string);
        if status != self.status {
            if let Some(status) = &status {
                lines.push(format!("!! {status}"));
            }
            self.status = status;
        }

        lines
    }

    fn message_lines(&mut self, messages: &[ChatMessage]) -> Vec<String> {
        let (Some(first), Some(last)) = (messages.first(), messages.last()) else {
            self.oldest = None;
            self.newest = None;
            return Vec::new();
        };

        let mut lines = Vec::new();
        let older: Vec<_> =
            messages.iter().filter(|m| self.oldest.is_some_and(|o| m.message_id < o)).collect();
        if !older.is_empty() {
            lines.push(format!("-- {} earlier messages", older.len()));
            lines.extend(older.into_iter().map(format_message));
        }

        let newer = messages.iter().filter(|m| self.newest.is_none_or(|n| m.message_id > n));
        lines.extend(newer.map(format_message));

        self.oldest = Some(first.message_id);
        self.newest = Some(last.message_id);
        lines
    }
}

fn format_message(message: &ChatMessage) -> String {
    let sender = if message.sender_name.is_empty() {
        format!("user {}", message.sender_id)
    } else {
        message.sender_name.clone()
    };
    format!("[{}] {sender}: {}", message.created_at, message.content)
}

#[cfg(test)]
mod tests {
    use vetlink_app::UserProfile;

    use super::*;

    fn message(id: MessageId) -> ChatMessage {
        ChatMessage {
            message_id: id,
            room_id: 3,
            sender_id: 2,
            sender_name: "Dr. Kim".to_string(),
            content: format!("message {id}"),
            is_read: false,
            created_at: "09:00".to_string(),
        }
    }

    fn view<'a>(user: &'a UserProfile, messages: &'a [ChatMessage]) -> View<'a> {
        View {
            user,
            room_id: Some(3),
            chat_state: ConnectionState::Connected,
            messages,
            has_older: false,
            loading_history: false,
            notification_state: ConnectionState::Connected,
            notifications: &[],
            unread_count: 0,
            status: None,
        }
    }

    #[test]
    fn only_new_messages_printed() {
        let user = UserProfile { user_id: 9, display_name: "owner".to_string() };
        let mut printer = Printer::new();

        let first = [message(4), message(5)];
        let lines = printer.diff(&view(&user, &first));
        assert!(lines.contains(&"[09:00] Dr. Kim: message 5".to_string()));

        let second = [message(4), message(5), message(6)];
        let lines = printer.diff(&view(&user, &second));
        assert_eq!(lines, vec!["[09:00] Dr. Kim: message 6".to_string()]);
    }

    #[test]
    fn backfill_announced() {
        let user = UserProfile { user_id: 9, display_name: "owner".to_string() };
        let mut printer = Printer::new();
        printer.diff(&view(&user, &[message(4)]));

        let lines = printer.diff(&view(&user, &[message(2), message(3), message(4)]));
        assert_eq!(lines.first().map(String::as_str), Some("-- 2 earlier messages"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn unchanged_view_prints_nothing() {
        let user = UserProfile { user_id: 9, display_name: "owner".to_string() };
        let mut printer = Printer::new();
        let messages = [message(1)];
        printer.diff(&view(&user, &messages));
        assert!(printer.diff(&view(&user, &messages)).is_empty());
    }
}
