//! Notification list and unread counter.
//!
//! The counter is not derived from the list: the list holds at most one page
//! while the server counts everything. It is set exactly by the stream's
//! connect frame, nudged by pushes and read-marks, and reconciled from the
//! list after a reconnect when the server did not send a count.

use std::collections::HashSet;

use vetlink_proto::{Notification, NotificationId};

/// An optimistic read-mark, kept until the backend confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMark {
    /// Notification marked read
    pub id: NotificationId,
    /// Whether the unread counter was decremented for it
    pub decremented: bool,
}

/// Notification snapshot plus unread counter.
///
/// # Invariants
///
/// - A read-mark decrements the counter only if the item was unread, so
///   marking the same notification twice decrements once.
/// - The counter never underflows.
#[derive(Debug, Clone, Default)]
pub struct Inbox {
    notifications: Vec<Notification>,
    unread_count: u32,
    count_from_server: bool,
}

impl Inbox {
    /// Empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Current unread counter.
    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    /// Look up a notification.
    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    /// Overwrite the counter with the server's figure.
    pub fn set_unread(&mut self, count: u32) {
        self.unread_count = count;
        self.count_from_server = true;
    }

    /// Replace the list with a fetched snapshot.
    ///
    /// Ids in `pending` have a read-mark the backend has not confirmed yet;
    /// the snapshot may predate it, so they stay read. With `reconcile` set
    /// and no server count received since the stream (re)opened, the counter
    /// is recomputed from the snapshot.
    pub fn replace(
        &mut self,
        mut notifications: Vec<Notification>,
        reconcile: bool,
        pending: &HashSet<NotificationId>,
    ) {
        let mut seen = HashSet::new();
        notifications.retain(|n| seen.insert(n.id));
        for notification in notifications.iter_mut().filter(|n| pending.contains(&n.id)) {
            notification.is_read = true;
        }
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        self.notifications = notifications;

        if reconcile && !self.count_from_server {
            let unread = self.notifications.iter().filter(|n| !n.is_read).count();
            self.unread_count = u32::try_from(unread).unwrap_or(u32::MAX);
        }
    }

    /// The stream (re)opened; the next server count is fresh.
    pub fn stream_opened(&mut self) {
        self.count_from_server = false;
    }

    /// A push announced a notification. Counts it if it is unread and not
    /// already in the list. Returns whether the counter changed.
    pub fn record_arrival(&mut self, id: Option<NotificationId>, unread: bool) -> bool {
        if !unread {
            return false;
        }
        if id.is_some_and(|id| self.get(id).is_some()) {
            return false;
        }
        self.unread_count = self.unread_count.saturating_add(1);
        true
    }

    /// Optimistically mark one notification read.
    ///
    /// Returns `None` if it is already read. An id not in the list is still
    /// marked (the backend knows it) without touching the counter.
    pub fn mark_read(&mut self, id: NotificationId) -> Option<ReadMark> {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) if notification.is_read => None,
            Some(notification) => {
                notification.is_read = true;
                let decremented = self.unread_count > 0;
                self.unread_count = self.unread_count.saturating_sub(1);
                Some(ReadMark { id, decremented })
            },
            None => Some(ReadMark { id, decremented: false }),
        }
    }

    /// Optimistically mark everything read and zero the counter.
    pub fn mark_all_read(&mut self) -> Vec<ReadMark> {
        let marks = self
            .notifications
            .iter_mut()
            .filter(|n| !n.is_read)
            .map(|n| {
                n.is_read = true;
                ReadMark { id: n.id, decremented: true }
            })
            .collect();
        self.unread_count = 0;
        marks
    }

    /// Undo an optimistic read-mark after the backend refused it.
    pub fn revert(&mut self, mark: ReadMark) {
        if let Some(notification) = self.notifications.iter_mut().find(|n| n.id == mark.id) {
            notification.is_read = false;
        }
        if mark.decremented {
            self.unread_count = self.unread_count.saturating_add(1);
        }
    }

    /// Drop everything (logout).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vetlink_proto::NotificationKind;

    use super::*;

    fn notification(id: NotificationId, is_read: bool, created_at: &str) -> Notification {
        Notification {
            id,
            kind: NotificationKind::Reservation,
            payload: serde_json::Value::Null,
            is_read,
            created_at: created_at.to_string(),
        }
    }

    fn none() -> HashSet<NotificationId> {
        HashSet::new()
    }

    #[test]
    fn read_mark_decrements_once() {
        let mut inbox = Inbox::new();
        inbox.replace(vec![notification(42, false, "2024-05-02T09:00:00")], false, &none());
        inbox.set_unread(3);

        let mark = inbox.mark_read(42);
        assert_eq!(mark, Some(ReadMark { id: 42, decremented: true }));
        assert_eq!(inbox.unread_count(), 2);

        assert_eq!(inbox.mark_read(42), None);
        assert_eq!(inbox.unread_count(), 2);
    }

    #[test]
    fn stale_snapshot_keeps_pending_mark() {
        let mut inbox = Inbox::new();
        inbox.replace(vec![notification(42, false, "")], false, &none());
        inbox.set_unread(3);
        let mark = inbox.mark_read(42).unwrap();
        assert_eq!(inbox.unread_count(), 2);

        // Fetched before the backend saw the read-mark.
        let pending = HashSet::from([mark.id]);
        inbox.replace(vec![notification(42, false, "")], true, &pending);

        assert!(inbox.get(42).unwrap().is_read);
        assert_eq!(inbox.mark_read(42), None);
        assert_eq!(inbox.unread_count(), 2);
    }

    #[test]
    fn revert_restores_flag_and_count() {
        let mut inbox = Inbox::new();
        inbox.replace(vec![notification(42, false, "")], false, &none());
        inbox.set_unread(1);

        let mark = inbox.mark_read(42).unwrap();
        inbox.revert(mark);
        assert_eq!(inbox.unread_count(), 1);
        assert!(!inbox.get(42).unwrap().is_read);
    }

    #[test]
    fn unknown_id_marked_without_decrement() {
        let mut inbox = Inbox::new();
        inbox.set_unread(4);
        assert_eq!(inbox.mark_read(9), Some(ReadMark { id: 9, decremented: false }));
        assert_eq!(inbox.unread_count(), 4);
    }

    #[test]
    fn mark_all_zeroes_counter() {
        let mut inbox = Inbox::new();
        inbox.replace(vec![notification(1, false, ""), notification(2, true, "")], false, &none());
        inbox.set_unread(12);

        let marks = inbox.mark_all_read();
        assert_eq!(marks.len(), 1);
        assert_eq!(inbox.unread_count(), 0);
    }

    #[test]
    fn arrivals_counted_once() {
        let mut inbox = Inbox::new();
        inbox.replace(vec![notification(1, false, "")], false, &none());

        assert!(!inbox.record_arrival(Some(1), true), "already listed");
        assert!(!inbox.record_arrival(Some(2), false), "already read");
        assert!(inbox.record_arrival(Some(2), true));
        assert_eq!(inbox.unread_count(), 1);
    }

    #[test]
    fn list_sorted_newest_first() {
        let mut inbox = Inbox::new();
        inbox.replace(
            vec![
                notification(1, false, "2024-05-01T10:00:00"),
                notification(3, false, "2024-05-03T10:00:00"),
                notification(2, false, "2024-05-02T10:00:00"),
            ],
            false,
            &none(),
        );
        let ids: Vec<_> = inbox.notifications().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn reconcile_respects_server_count() {
        let mut inbox = Inbox::new();
        inbox.stream_opened();
        inbox.replace(vec![notification(1, false, ""), notification(2, false, "")], true, &none());
        assert_eq!(inbox.unread_count(), 2);

        inbox.stream_opened();
        inbox.set_unread(7);
        inbox.replace(vec![notification(1, false, "")], true, &none());
        assert_eq!(inbox.unread_count(), 7);
    }
}
