//! Generic runtime for application orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`AppSession`]: the user's chat session and notification stream
//! - [`Driver`]: platform-specific I/O
//!
//! Every action the state machines return is executed here. Results of
//! driver calls go straight back in as events, so one input can cascade
//! through several round trips before the loop polls again.

use std::collections::VecDeque;

use tracing::{debug, warn};
use vetlink_client::{ChatAction, ChatEvent, Environment, NotificationAction, NotificationEvent};

use crate::{AppSession, Command, Driver, DriverEvent};

/// Generic runtime that executes an [`AppSession`] through a [`Driver`].
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment supplying the clock
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    session: AppSession<E>,
    dirty: bool,
}

impl<D, E> Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    /// Create a runtime for a logged-in session.
    pub fn new(driver: D, session: AppSession<E>) -> Self {
        Self { driver, session, dirty: false }
    }

    /// Run the main event loop until the user quits.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub async fn run(mut self) -> Result<(), D::Error> {
        let result = self.run_until_quit().await;
        self.shutdown().await;
        result
    }

    async fn run_until_quit(&mut self) -> Result<(), D::Error> {
        self.start().await?;
        loop {
            let should_quit = self.process_cycle().await?;
            if should_quit {
                return Ok(());
            }
        }
    }

    /// Start the notification stream and draw the first frame.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub async fn start(&mut self) -> Result<(), D::Error> {
        let actions = self.session.start();
        self.execute_notification_actions(actions).await;
        self.driver.render(&self.session.view())
    }

    /// Process one cycle: poll one input, then tick.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if polling or rendering fails.
    pub async fn process_cycle(&mut self) -> Result<bool, D::Error> {
        if let Some(event) = self.driver.poll_event().await?
            && self.handle_event(event).await?
        {
            return Ok(true);
        }

        self.tick().await?;
        Ok(false)
    }

    /// Feed one input through the state machines.
    ///
    /// Returns `true` if the application should quit.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub async fn handle_event(&mut self, event: DriverEvent) -> Result<bool, D::Error> {
        match event {
            DriverEvent::Command(Command::Quit) => return Ok(true),
            DriverEvent::Command(command) => self.handle_command(command).await,
            DriverEvent::SocketFrame { generation, frame } => {
                let actions = self.session.chat(ChatEvent::FrameReceived { generation, frame });
                self.execute_chat_actions(actions).await;
            },
            DriverEvent::SocketHeartbeat { generation } => {
                let actions = self.session.chat(ChatEvent::HeartbeatReceived { generation });
                self.execute_chat_actions(actions).await;
            },
            DriverEvent::SocketClosed { generation, reason } => {
                let actions = self.session.chat(ChatEvent::SocketClosed { generation, reason });
                self.execute_chat_actions(actions).await;
            },
            DriverEvent::StreamChunk { generation, bytes } => {
                let event = NotificationEvent::StreamChunk { generation, bytes };
                let actions = self.session.notifications(event);
                self.execute_notification_actions(actions).await;
            },
            DriverEvent::StreamClosed { generation, reason } => {
                let event = NotificationEvent::StreamFailed { generation, reason };
                let actions = self.session.notifications(event);
                self.execute_notification_actions(actions).await;
            },
        }

        self.render_if_dirty()?;
        Ok(false)
    }

    /// Advance timers: heart-beats, handshake timeouts, scheduled reconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub async fn tick(&mut self) -> Result<(), D::Error> {
        let actions = self.session.chat(ChatEvent::Tick);
        self.execute_chat_actions(actions).await;

        let actions = self.session.notifications(NotificationEvent::Tick);
        self.execute_notification_actions(actions).await;

        self.render_if_dirty()
    }

    /// Log out and release every handle.
    pub async fn shutdown(&mut self) {
        let (chat, notifications) = self.session.logout();
        self.execute_chat_actions(chat).await;
        self.execute_notification_actions(notifications).await;
        self.driver.stop();
    }

    /// The session being driven.
    pub fn session(&self) -> &AppSession<E> {
        &self.session
    }

    /// The driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// The driver, mutably.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    async fn handle_command(&mut self, command: Command) {
        let chat_event = match command {
            Command::EnterRoom(room_id) => {
                let actions = self.session.enter_room(room_id);
                self.dirty = true;
                return self.execute_chat_actions(actions).await;
            },
            Command::LeaveRoom => ChatEvent::Disconnect,
            Command::Send(content) => ChatEvent::Send { content },
            Command::LoadMore => ChatEvent::LoadMore,
            Command::MarkRoomRead => ChatEvent::MarkRead,
            Command::MarkNotificationRead(id) => {
                let actions = self.session.notifications(NotificationEvent::MarkRead { id });
                return self.execute_notification_actions(actions).await;
            },
            Command::MarkAllNotificationsRead => {
                let actions = self.session.notifications(NotificationEvent::MarkAllRead);
                return self.execute_notification_actions(actions).await;
            },
            Command::Quit => return,
        };

        let actions = self.session.chat(chat_event);
        self.execute_chat_actions(actions).await;
    }

    /// Execute chat actions, feeding every result back until none remain.
    async fn execute_chat_actions(&mut self, actions: Vec<ChatAction>) {
        let mut pending = VecDeque::from(actions);

        while let Some(action) = pending.pop_front() {
            let followup = match action {
                ChatAction::OpenSocket { generation } => {
                    match self.driver.open_socket(generation).await {
                        Ok(()) => ChatEvent::SocketOpened { generation },
                        Err(e) => {
                            warn!(generation, error = %e, "chat socket failed to open");
                            ChatEvent::SocketClosed { generation, reason: e.to_string() }
                        },
                    }
                },
                ChatAction::CloseSocket { generation } => {
                    self.driver.close_socket(generation);
                    continue;
                },
                ChatAction::SendFrame { generation, frame } => {
                    match self.driver.send_frame(generation, frame).await {
                        Ok(()) => continue,
                        Err(e) => ChatEvent::SocketClosed { generation, reason: e.to_string() },
                    }
                },
                ChatAction::SendHeartbeat { generation } => {
                    match self.driver.send_heartbeat(generation).await {
                        Ok(()) => continue,
                        Err(e) => ChatEvent::SocketClosed { generation, reason: e.to_string() },
                    }
                },
                ChatAction::FetchHistory { request, query } => {
                    let result = self.driver.fetch_history(query).await;
                    ChatEvent::HistoryLoaded { request, result }
                },
                ChatAction::MarkRoomRead { request, room_id, user_id } => {
                    let result = self.driver.mark_room_read(room_id, user_id).await;
                    ChatEvent::MarkReadCompleted { request, result }
                },
                ChatAction::ScheduleReconnect { delay } => {
                    debug!(?delay, "chat reconnect scheduled");
                    continue;
                },
                ChatAction::StateChanged(_) | ChatAction::MessagesChanged | ChatAction::Error(_) => {
                    self.dirty = true;
                    continue;
                },
            };

            pending.extend(self.session.chat(followup));
        }
    }

    /// Execute notification actions, feeding every result back until none
    /// remain.
    async fn execute_notification_actions(&mut self, actions: Vec<NotificationAction>) {
        let mut pending = VecDeque::from(actions);

        while let Some(action) = pending.pop_front() {
            let followup = match action {
                NotificationAction::OpenStream { generation, user_id } => {
                    match self.driver.open_stream(generation, user_id).await {
                        Ok(()) => NotificationEvent::StreamOpened { generation },
                        Err(e) => {
                            warn!(generation, error = %e, "notification stream failed to open");
                            NotificationEvent::StreamFailed { generation, reason: e.to_string() }
                        },
                    }
                },
                NotificationAction::CloseStream { generation } => {
                    self.driver.close_stream(generation);
                    continue;
                },
                NotificationAction::FetchList { request, user_id, size } => {
                    let result = self.driver.fetch_notifications(user_id, size).await;
                    NotificationEvent::ListFetched { request, result }
                },
                NotificationAction::PatchRead { request, id } => {
                    let result = self.driver.mark_notification_read(id).await;
                    NotificationEvent::ReadCompleted { request, result }
                },
                NotificationAction::ScheduleReconnect { delay } => {
                    debug!(?delay, "notification reconnect scheduled");
                    continue;
                },
                NotificationAction::StateChanged(_)
                | NotificationAction::Raise { .. }
                | NotificationAction::UnreadChanged(_)
                | NotificationAction::ListChanged
                | NotificationAction::Error(_) => {
                    self.dirty = true;
                    continue;
                },
            };

            pending.extend(self.session.notifications(followup));
        }
    }

    fn render_if_dirty(&mut self) -> Result<(), D::Error> {
        if !std::mem::take(&mut self.dirty) {
            return Ok(());
        }
        self.driver.render(&self.session.view())
    }
}
