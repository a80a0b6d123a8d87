//! Invariant checking for deterministic simulation testing.
//!
//! Every frame the runtime renders is captured as a [`ViewSnapshot`] and run
//! through the registered [`Invariant`]s. Invariants describe what must hold
//! on every execution path, whatever faults the backend injected.

use vetlink_app::View;
use vetlink_client::ConnectionState;
use vetlink_proto::{MessageId, RoomId};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// Owned copy of a rendered [`View`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    /// Open room
    pub room_id: Option<RoomId>,
    /// `(message, room)` pairs in display order
    pub messages: Vec<(MessageId, RoomId)>,
    /// Older messages can still be loaded
    pub has_older: bool,
    /// A history page is in flight
    pub loading_history: bool,
    /// Chat socket state
    pub chat_state: ConnectionState,
    /// Notification stream state
    pub notification_state: ConnectionState,
    /// Notifications held
    pub notification_count: usize,
    /// Unread counter
    pub unread_count: u32,
    /// A foreground error is displayed
    pub has_status: bool,
}

impl ViewSnapshot {
    /// Capture a view.
    pub fn capture(view: &View<'_>) -> Self {
        Self {
            room_id: view.room_id,
            messages: view.messages.iter().map(|m| (m.message_id, m.room_id)).collect(),
            has_older: view.has_older,
            loading_history: view.loading_history,
            chat_state: view.chat_state,
            notification_state: view.notification_state,
            notification_count: view.notifications.len(),
            unread_count: view.unread_count,
            has_status: view.status.is_some(),
        }
    }

    /// Message identities in display order.
    pub fn message_ids(&self) -> Vec<MessageId> {
        self.messages.iter().map(|(id, _)| *id).collect()
    }
}

/// A property that must hold on every rendered frame.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a frame.
    fn check(&self, view: &ViewSnapshot) -> InvariantResult;
}

/// Messages are shown oldest first, each exactly once.
pub struct MessagesOrdered;

impl Invariant for MessagesOrdered {
    fn name(&self) -> &'static str {
        "messages_ordered"
    }

    fn check(&self, view: &ViewSnapshot) -> InvariantResult {
        for pair in view.messages.windows(2) {
            if let [(earlier, _), (later, _)] = pair
                && earlier >= later
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("message {later} displayed after {earlier}"),
                });
            }
        }
        Ok(())
    }
}

/// Only messages of the open room are shown.
pub struct MessagesBelongToRoom;

impl Invariant for MessagesBelongToRoom {
    fn name(&self) -> &'static str {
        "messages_belong_to_room"
    }

    fn check(&self, view: &ViewSnapshot) -> InvariantResult {
        let stray = view.messages.iter().find(|(_, room)| Some(*room) != view.room_id);
        match stray {
            Some((id, room)) => Err(Violation {
                invariant: self.name(),
                message: format!("message {id} of room {room} shown in {:?}", view.room_id),
            }),
            None => Ok(()),
        }
    }
}

/// Without an open room there is no chat activity.
pub struct IdleWithoutRoom;

impl Invariant for IdleWithoutRoom {
    fn name(&self) -> &'static str {
        "idle_without_room"
    }

    fn check(&self, view: &ViewSnapshot) -> InvariantResult {
        if view.room_id.is_some() {
            return Ok(());
        }
        if view.loading_history || view.chat_state != ConnectionState::Disconnected {
            return Err(Violation {
                invariant: self.name(),
                message: format!(
                    "no room open but chat is {:?} (loading: {})",
                    view.chat_state, view.loading_history
                ),
            });
        }
        Ok(())
    }
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Registry with every invariant in this module.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(MessagesOrdered);
        registry.add(MessagesBelongToRoom);
        registry.add(IdleWithoutRoom);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against a frame.
    ///
    /// Returns every violation found.
    pub fn check_all(&self, view: &ViewSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(view).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
