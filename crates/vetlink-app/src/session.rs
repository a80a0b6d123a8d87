//! Logged-in user context.
//!
//! [`AppSession`] is created at login and owns everything tied to the user:
//! the event bus, the chat session and the notification stream. It forwards
//! events to the two state machines and publishes their informational
//! actions on the bus; I/O actions are handed back for the runtime to run.

use tracing::info;
use vetlink_client::{
    ChatAction, ChatConfig, ChatEvent, ChatSession, Environment, NotificationAction,
    NotificationConfig, NotificationEvent, NotificationStream, UserError,
};
use vetlink_proto::{RoomId, UserId};

use crate::{
    bus::{AppNotification, BusReceiver, DEFAULT_BUS_CAPACITY, EventBus},
    view::View,
};

/// Who is logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Backend identity
    pub user_id: UserId,
    /// Name shown in the UI
    pub display_name: String,
}

/// Configuration of everything a session owns.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Chat socket settings
    pub chat: ChatConfig,
    /// Notification stream settings
    pub notifications: NotificationConfig,
    /// Events buffered per bus subscriber
    pub bus_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig::default(),
            notifications: NotificationConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

/// State of one logged-in user.
pub struct AppSession<E: Environment> {
    user: UserProfile,
    bus: EventBus,
    chat: ChatSession<E>,
    notifications: NotificationStream<E>,
    status: Option<UserError>,
}

impl<E: Environment> AppSession<E> {
    /// Log `user` in. Nothing connects until [`AppSession::start`].
    pub fn login(env: E, user: UserProfile, config: AppConfig) -> Self {
        info!(user_id = user.user_id, name = %user.display_name, "logged in");
        Self {
            bus: EventBus::new(config.bus_capacity),
            chat: ChatSession::new(env.clone(), config.chat),
            notifications: NotificationStream::new(env, config.notifications),
            status: None,
            user,
        }
    }

    /// Start the notification stream.
    pub fn start(&mut self) -> Vec<NotificationAction> {
        self.notifications(NotificationEvent::Start { user_id: Some(self.user.user_id) })
    }

    /// Open a room's chat, leaving any other room.
    pub fn enter_room(&mut self, room_id: RoomId) -> Vec<ChatAction> {
        self.status = None;
        self.chat(ChatEvent::Connect { room_id: Some(room_id), user_id: Some(self.user.user_id) })
    }

    /// Close the open room.
    pub fn leave_room(&mut self) -> Vec<ChatAction> {
        self.chat(ChatEvent::Disconnect)
    }

    /// Tear down both real-time sessions.
    pub fn logout(&mut self) -> (Vec<ChatAction>, Vec<NotificationAction>) {
        info!(user_id = self.user.user_id, "logging out");
        let chat = self.chat(ChatEvent::Disconnect);
        let notifications = self.notifications(NotificationEvent::Stop);
        self.status = None;
        (chat, notifications)
    }

    /// Feed the chat session and publish what it reports.
    pub fn chat(&mut self, event: ChatEvent) -> Vec<ChatAction> {
        let actions = self.chat.handle(event);
        for action in &actions {
            let notification = match action {
                ChatAction::StateChanged(state) => AppNotification::ChatConnectionChanged(*state),
                ChatAction::MessagesChanged => AppNotification::MessagesChanged,
                ChatAction::Error(error) => {
                    self.status = Some(error.clone());
                    AppNotification::UserError(error.clone())
                },
                _ => continue,
            };
            self.bus.publish(notification);
        }
        actions
    }

    /// Feed the notification stream and publish what it reports.
    pub fn notifications(&mut self, event: NotificationEvent) -> Vec<NotificationAction> {
        let actions = self.notifications.handle(event);
        for action in &actions {
            let notification = match action {
                NotificationAction::StateChanged(state) => {
                    AppNotification::NotificationConnectionChanged(*state)
                },
                NotificationAction::Raise { signal, body } => {
                    AppNotification::from_signal(*signal, body.clone())
                },
                NotificationAction::UnreadChanged(count) => {
                    AppNotification::UnreadCountChanged(*count)
                },
                NotificationAction::ListChanged => AppNotification::NotificationsChanged,
                NotificationAction::Error(error) => {
                    self.status = Some(error.clone());
                    AppNotification::UserError(error.clone())
                },
                _ => continue,
            };
            self.bus.publish(notification);
        }
        actions
    }

    /// Logged-in user.
    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    /// Event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to the event bus.
    pub fn subscribe(&self) -> BusReceiver {
        self.bus.subscribe()
    }

    /// Chat session.
    pub fn chat_session(&self) -> &ChatSession<E> {
        &self.chat
    }

    /// Notification stream.
    pub fn notification_stream(&self) -> &NotificationStream<E> {
        &self.notifications
    }

    /// Last foreground error, cleared on room change.
    pub fn status(&self) -> Option<&UserError> {
        self.status.as_ref()
    }

    /// Snapshot for rendering.
    pub fn view(&self) -> View<'_> {
        View {
            user: &self.user,
            room_id: self.chat.room_id(),
            chat_state: self.chat.state(),
            messages: self.chat.messages(),
            has_older: self.chat.pagination().has_older(),
            loading_history: self.chat.pagination().is_loading(),
            notification_state: self.notifications.state(),
            notifications: self.notifications.notifications(),
            unread_count: self.notifications.unread_count(),
            status: self.status.as_ref(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use vetlink_client::ConnectionState;
    use vetlink_core::env::test_utils::MockEnv;

    use super::*;
    use crate::bus::Delivery;

    fn session() -> AppSession<MockEnv> {
        let user = UserProfile { user_id: 9, display_name: "Dr. Han".into() };
        AppSession::login(MockEnv::new(), user, AppConfig::default())
    }

    #[test]
    fn start_opens_stream_for_user() {
        let mut session = session();
        let actions = session.start();
        assert!(actions.iter().any(|a| matches!(
            a,
            NotificationAction::OpenStream { user_id: 9, .. }
        )));
    }

    #[test]
    fn enter_room_uses_logged_in_user() {
        let mut session = session();
        session.enter_room(3);
        assert_eq!(session.chat_session().room_id(), Some(3));
        assert_eq!(session.chat_session().user_id(), Some(9));
        assert_eq!(session.view().chat_state, ConnectionState::Connecting);
    }

    #[test]
    fn errors_published_and_kept_as_status() {
        let mut session = session();
        let mut rx = session.subscribe();
        session.enter_room(3);

        session.chat(ChatEvent::Send { content: "hello".into() });
        assert_eq!(session.status(), Some(&UserError::NotConnected));
        assert!(rx.drain().contains(&Delivery::Event(AppNotification::UserError(
            UserError::NotConnected
        ))));
    }

    #[test]
    fn logout_tears_everything_down() {
        let mut session = session();
        let mut rx = session.subscribe();
        session.start();
        session.enter_room(3);

        let (chat, notifications) = session.logout();
        assert!(chat.iter().any(|a| matches!(a, ChatAction::CloseSocket { .. })));
        assert!(notifications.iter().any(|a| matches!(a, NotificationAction::CloseStream { .. })));
        assert_eq!(session.chat_session().room_id(), None);
        assert_eq!(session.notification_stream().user_id(), None);

        let deliveries = rx.drain();
        assert!(deliveries.contains(&Delivery::Event(AppNotification::ChatConnectionChanged(
            ConnectionState::Disconnected
        ))));
        assert!(deliveries.contains(&Delivery::Event(
            AppNotification::NotificationConnectionChanged(ConnectionState::Disconnected)
        )));
    }
}
