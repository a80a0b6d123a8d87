//! Typed in-process event bus.
//!
//! Replaces loosely-typed page-wide events: whatever part of the application
//! cares about a reservation change or the unread counter subscribes here
//! and receives [`AppNotification`] values.
//!
//! Subscribers that fall behind lose the oldest events and learn how many
//! they missed through [`Delivery::Missed`].

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use vetlink_client::{ConnectionState, StreamSignal, UserError};

/// Events buffered per subscriber before the oldest are dropped.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Something the rest of the application may react to.
#[derive(Debug, Clone, PartialEq)]
pub enum AppNotification {
    /// A notice was posted.
    NoticeCreated(Value),
    /// The notice board changed; reload it.
    NoticeRefresh,
    /// A reservation changed.
    ReservationChanged(Value),
    /// A vaccination changed.
    VaccinationChanged(Value),
    /// A notification of unstated kind arrived.
    NotificationReceived(Value),
    /// The unread notification counter changed.
    UnreadCountChanged(u32),
    /// The notification list changed.
    NotificationsChanged,
    /// The chat message list changed.
    MessagesChanged,
    /// The chat socket changed state.
    ChatConnectionChanged(ConnectionState),
    /// The notification stream changed state.
    NotificationConnectionChanged(ConnectionState),
    /// A foreground operation failed.
    UserError(UserError),
}

impl AppNotification {
    /// Notification for a stream signal and its body.
    pub fn from_signal(signal: StreamSignal, body: Value) -> Self {
        match signal {
            StreamSignal::Notice => Self::NoticeCreated(body),
            StreamSignal::NoticeRefresh => Self::NoticeRefresh,
            StreamSignal::Reservation => Self::ReservationChanged(body),
            StreamSignal::Vaccination => Self::VaccinationChanged(body),
            StreamSignal::Other => Self::NotificationReceived(body),
        }
    }
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// The next event.
    Event(AppNotification),
    /// The subscriber fell behind and this many events were dropped.
    Missed(u64),
}

/// Broadcast bus for [`AppNotification`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppNotification>,
}

impl EventBus {
    /// Bus buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// New subscriber. Sees events published from now on.
    pub fn subscribe(&self) -> BusReceiver {
        BusReceiver { inner: self.sender.subscribe() }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, notification: AppNotification) -> usize {
        match self.sender.send(notification) {
            Ok(receivers) => receivers,
            Err(unheard) => {
                tracing::trace!(notification = ?unheard.0, "no bus subscribers");
                0
            },
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// Subscription to an [`EventBus`].
#[derive(Debug)]
pub struct BusReceiver {
    inner: broadcast::Receiver<AppNotification>,
}

impl BusReceiver {
    /// Wait for the next delivery. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        match self.inner.recv().await {
            Ok(notification) => Some(Delivery::Event(notification)),
            Err(RecvError::Lagged(missed)) => Some(Delivery::Missed(missed)),
            Err(RecvError::Closed) => None,
        }
    }

    /// Next delivery if one is ready.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        match self.inner.try_recv() {
            Ok(notification) => Some(Delivery::Event(notification)),
            Err(TryRecvError::Lagged(missed)) => Some(Delivery::Missed(missed)),
            Err(TryRecvError::Empty | TryRecvError::Closed) => None,
        }
    }

    /// Everything ready right now, in order.
    pub fn drain(&mut self) -> Vec<Delivery> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}
