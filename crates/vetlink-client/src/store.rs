//! Ordered, de-duplicated chat message buffer.

use std::collections::HashSet;

use vetlink_proto::{ChatMessage, MessageId};

/// Chat messages of one room, ascending by identity.
///
/// # Invariants
///
/// - Identities are unique.
/// - The sequence is strictly ascending by identity.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether a message with `id` is stored.
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    /// Identity of the oldest message; the backfill cursor.
    pub fn oldest_id(&self) -> Option<MessageId> {
        self.messages.first().map(|m| m.message_id)
    }

    /// Identity of the newest message.
    pub fn newest_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.message_id)
    }

    /// Messages not yet read.
    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_read).count()
    }

    /// Prepend a backfilled page. Only messages strictly older than the
    /// current oldest are kept. Returns how many were added.
    pub fn prepend_older(&mut self, messages: Vec<ChatMessage>) -> usize {
        let floor = self.oldest_id();
        let mut older: Vec<ChatMessage> = messages
            .into_iter()
            .filter(|m| floor.is_none_or(|floor| m.message_id < floor))
            .collect();
        older.sort_by_key(|m| m.message_id);
        older.dedup_by_key(|m| m.message_id);

        let added = older.len();
        self.ids.extend(older.iter().map(|m| m.message_id));
        older.append(&mut self.messages);
        self.messages = older;

        self.debug_check();
        added
    }

    /// Insert one message at its sorted position. Returns `false` if its
    /// identity is already stored.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.message_id) {
            return false;
        }

        // Live messages almost always land at the tail.
        match self.messages.last() {
            Some(last) if last.message_id > message.message_id => {
                let at = self.messages.partition_point(|m| m.message_id < message.message_id);
                self.messages.insert(at, message);
            },
            _ => self.messages.push(message),
        }

        self.debug_check();
        true
    }

    /// Insert every message not already stored. Returns how many were added.
    pub fn merge(&mut self, messages: Vec<ChatMessage>) -> usize {
        let mut added = 0;
        for message in messages {
            if self.insert(message) {
                added += 1;
            }
        }
        added
    }

    /// Flip every unread message to read. Returns the flipped identities so
    /// the change can be reverted.
    pub fn mark_all_read(&mut self) -> Vec<MessageId> {
        self.messages
            .iter_mut()
            .filter(|m| !m.is_read)
            .map(|m| {
                m.is_read = true;
                m.message_id
            })
            .collect()
    }

    /// Undo an optimistic [`mark_all_read`](Self::mark_all_read).
    pub fn revert_read(&mut self, ids: &[MessageId]) {
        let ids: HashSet<_> = ids.iter().copied().collect();
        for message in self.messages.iter_mut().filter(|m| ids.contains(&m.message_id)) {
            message.is_read = false;
        }
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.messages.len(), self.ids.len());
        debug_assert!(self.messages.windows(2).all(|w| w[0].message_id < w[1].message_id));
    }
}
