//! In-memory model of the clinic backend.
//!
//! Serves chat history pages, notification lists and read-marks, runs a
//! minimal STOMP broker for the chat socket and an event-stream source for
//! notifications. Everything the client would receive is queued as a
//! [`DriverEvent`] and handed out by [`SimBackend::next_event`].
//!
//! Faults come from two places: explicit switches (`set_socket_down`,
//! `drop_stream`, ...) for scripted scenarios, and a seeded RNG applying the
//! probabilities in [`FaultConfig`] for chaos runs. The same seed always
//! produces the same run.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;
use vetlink_app::DriverEvent;
use vetlink_client::{FetchError, HistoryQuery, PUBLISH_DESTINATION};
use vetlink_proto::{
    ChatMessage, MessageId, MessagePage, Notification, NotificationId, NotificationKind,
    OutgoingChatMessage, RoomId, StompCommand, StompFrame, UserId,
};

use crate::SimDriverError;

/// Backend shared between a [`crate::SimDriver`] and the test.
pub type SharedBackend = Arc<Mutex<SimBackend>>;

/// Messages per history page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Sender of seeded room history.
pub const STAFF_SENDER: UserId = 2;

const ROOM_TOPIC_PREFIX: &str = "/sub/chat/room/";

/// Probabilities of random failures, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultConfig {
    /// Websocket upgrade refused
    pub socket_open_failure: f64,
    /// Event stream request refused
    pub stream_open_failure: f64,
    /// REST call answered with 503
    pub fetch_failure: f64,
}

/// Request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Websocket upgrades attempted
    pub socket_opens: usize,
    /// Event stream requests attempted
    pub stream_opens: usize,
    /// History pages requested
    pub history_requests: usize,
    /// Notification lists requested
    pub list_requests: usize,
    /// Room read-marks received
    pub room_read_marks: usize,
    /// Notification read-marks received
    pub notification_read_marks: usize,
    /// Chat messages published over STOMP
    pub published: usize,
}

#[derive(Debug)]
struct SocketConn {
    generation: u64,
    connected: bool,
    subscriptions: HashMap<String, RoomId>,
}

#[derive(Debug, Clone, Copy)]
struct StreamConn {
    generation: u64,
    user_id: UserId,
}

/// In-memory backend.
#[derive(Debug)]
pub struct SimBackend {
    rng: ChaCha8Rng,
    faults: FaultConfig,
    page_size: usize,
    rooms: HashMap<RoomId, Vec<ChatMessage>>,
    next_message_id: MessageId,
    notifications: HashMap<UserId, Vec<Notification>>,
    reported_unread: HashMap<UserId, u32>,
    next_notification_id: NotificationId,
    socket: Option<SocketConn>,
    stream: Option<StreamConn>,
    socket_down: bool,
    stream_down: bool,
    rest_down: bool,
    failing_read_marks: usize,
    outbox: VecDeque<DriverEvent>,
    stats: BackendStats,
}

impl SimBackend {
    /// Healthy backend whose random faults are drawn from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            faults: FaultConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            rooms: HashMap::new(),
            next_message_id: 1,
            notifications: HashMap::new(),
            reported_unread: HashMap::new(),
            next_notification_id: 1,
            socket: None,
            stream: None,
            socket_down: false,
            stream_down: false,
            rest_down: false,
            failing_read_marks: 0,
            outbox: VecDeque::new(),
            stats: BackendStats::default(),
        }
    }

    /// Serve history pages of `page_size` messages.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Inject random faults.
    #[must_use]
    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    /// Change the random fault rates mid-run.
    pub fn set_faults(&mut self, faults: FaultConfig) {
        self.faults = faults;
    }

    /// Wrap for sharing with a driver.
    pub fn shared(self) -> SharedBackend {
        Arc::new(Mutex::new(self))
    }

    /// Append `count` messages to a room's history.
    pub fn seed_room(&mut self, room_id: RoomId, count: usize) {
        for n in 0..count {
            self.append_message(room_id, STAFF_SENDER, format!("history {n}"));
        }
    }

    /// Another participant posts a message; subscribers receive it live.
    pub fn post_message(&mut self, room_id: RoomId, sender_id: UserId, content: &str) -> MessageId {
        self.append_message(room_id, sender_id, content.to_string())
    }

    /// Store a notification without announcing it.
    pub fn add_notification(
        &mut self,
        user_id: UserId,
        kind: NotificationKind,
        is_read: bool,
    ) -> NotificationId {
        self.insert_notification(user_id, kind, is_read).id
    }

    /// Store a notification and announce it on the user's stream.
    pub fn push_notification(&mut self, user_id: UserId, kind: NotificationKind) -> NotificationId {
        let notification = self.insert_notification(user_id, kind, false);
        let event = match kind {
            NotificationKind::Notice => "notice",
            NotificationKind::Reservation => "reservation",
            NotificationKind::Vaccination => "vaccination",
        };
        if let Ok(data) = serde_json::to_string(&notification) {
            self.push_to(user_id, &format!("event: {event}\ndata: {data}\n\n"));
        }
        notification.id
    }

    /// Write raw event-stream text to the open stream, whoever it belongs to.
    pub fn push_raw(&mut self, text: &str) {
        if let Some(stream) = self.stream {
            self.outbox.push_back(DriverEvent::StreamChunk {
                generation: stream.generation,
                bytes: Bytes::copy_from_slice(text.as_bytes()),
            });
        }
    }

    /// Report this unread count in the stream's connect frame instead of
    /// counting the list.
    pub fn set_reported_unread(&mut self, user_id: UserId, count: u32) {
        self.reported_unread.insert(user_id, count);
    }

    /// Kill the open websocket.
    pub fn drop_socket(&mut self, reason: &str) {
        if let Some(socket) = self.socket.take() {
            self.outbox.push_back(DriverEvent::SocketClosed {
                generation: socket.generation,
                reason: reason.to_string(),
            });
        }
    }

    /// Kill the open event stream.
    pub fn drop_stream(&mut self, reason: &str) {
        if let Some(stream) = self.stream.take() {
            self.outbox.push_back(DriverEvent::StreamClosed {
                generation: stream.generation,
                reason: reason.to_string(),
            });
        }
    }

    /// Refuse websocket upgrades.
    pub fn set_socket_down(&mut self, down: bool) {
        self.socket_down = down;
    }

    /// Refuse event stream requests.
    pub fn set_stream_down(&mut self, down: bool) {
        self.stream_down = down;
    }

    /// Answer every REST call with 503.
    pub fn set_rest_down(&mut self, down: bool) {
        self.rest_down = down;
    }

    /// Answer the next `count` read-marks with 500.
    pub fn fail_read_marks(&mut self, count: usize) {
        self.failing_read_marks = count;
    }

    /// Request counters.
    pub fn stats(&self) -> BackendStats {
        self.stats
    }

    /// Stored history of a room.
    pub fn room(&self, room_id: RoomId) -> &[ChatMessage] {
        self.rooms.get(&room_id).map_or(&[], Vec::as_slice)
    }

    /// Stored notifications of a user, newest first.
    pub fn notifications(&self, user_id: UserId) -> &[Notification] {
        self.notifications.get(&user_id).map_or(&[], Vec::as_slice)
    }

    /// Whether the open socket is subscribed to `room_id`.
    pub fn is_subscribed(&self, room_id: RoomId) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|s| s.connected && s.subscriptions.values().any(|r| *r == room_id))
    }

    /// Generation of the open socket.
    pub fn socket_generation(&self) -> Option<u64> {
        self.socket.as_ref().map(|s| s.generation)
    }

    /// Generation of the open event stream.
    pub fn stream_generation(&self) -> Option<u64> {
        self.stream.map(|s| s.generation)
    }

    /// Whether anything is queued for the client.
    pub fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Next thing the client receives.
    pub fn next_event(&mut self) -> Option<DriverEvent> {
        self.outbox.pop_front()
    }

    pub(crate) fn open_socket(&mut self, generation: u64) -> Result<(), SimDriverError> {
        self.stats.socket_opens += 1;
        if self.socket_down || self.roll(self.faults.socket_open_failure) {
            return Err(SimDriverError("websocket upgrade refused".to_string()));
        }

        self.drop_socket("replaced");
        self.socket =
            Some(SocketConn { generation, connected: false, subscriptions: HashMap::new() });
        Ok(())
    }

    pub(crate) fn close_socket(&mut self, generation: u64) {
        if self.socket.as_ref().is_some_and(|s| s.generation == generation) {
            self.socket = None;
        }
    }

    pub(crate) fn heartbeat(&self, generation: u64) -> Result<(), SimDriverError> {
        self.live_socket(generation).map(|_| ())
    }

    pub(crate) fn client_frame(
        &mut self,
        generation: u64,
        frame: &StompFrame,
    ) -> Result<(), SimDriverError> {
        self.live_socket(generation)?;

        match frame.command {
            StompCommand::Connect | StompCommand::Stomp => {
                if let Some(socket) = self.socket.as_mut() {
                    socket.connected = true;
                }
                let connected = StompFrame::new(StompCommand::Connected)
                    .with_header("version", "1.2")
                    .with_header("heart-beat", "0,0");
                self.outbox.push_back(DriverEvent::SocketFrame { generation, frame: connected });
            },
            StompCommand::Subscribe => {
                let room = frame
                    .header("destination")
                    .and_then(|d| d.strip_prefix(ROOM_TOPIC_PREFIX))
                    .and_then(|id| id.parse::<RoomId>().ok());
                if let (Some(id), Some(room), Some(socket)) =
                    (frame.header("id"), room, self.socket.as_mut())
                {
                    socket.subscriptions.insert(id.to_string(), room);
                }
            },
            StompCommand::Unsubscribe => {
                if let (Some(id), Some(socket)) = (frame.header("id"), self.socket.as_mut()) {
                    socket.subscriptions.remove(id);
                }
            },
            StompCommand::Send if frame.header("destination") == Some(PUBLISH_DESTINATION) => {
                match serde_json::from_slice::<OutgoingChatMessage>(&frame.body) {
                    Ok(message) => {
                        self.stats.published += 1;
                        self.append_message(message.room_id, message.sender_id, message.content);
                    },
                    Err(e) => debug!(error = %e, "broker rejected malformed publish"),
                }
            },
            StompCommand::Disconnect => {
                if let Some(receipt) = frame.header("receipt") {
                    let reply =
                        StompFrame::new(StompCommand::Receipt).with_header("receipt-id", receipt);
                    self.outbox.push_back(DriverEvent::SocketFrame { generation, frame: reply });
                }
            },
            _ => debug!(command = %frame.command, "broker ignored frame"),
        }
        Ok(())
    }

    pub(crate) fn open_stream(
        &mut self,
        generation: u64,
        user_id: UserId,
    ) -> Result<(), SimDriverError> {
        self.stats.stream_opens += 1;
        if self.stream_down || self.roll(self.faults.stream_open_failure) {
            return Err(SimDriverError("event stream refused".to_string()));
        }

        self.drop_stream("replaced");
        self.stream = Some(StreamConn { generation, user_id });

        let unread = self.reported_unread.get(&user_id).copied().unwrap_or_else(|| {
            let unread = self.notifications(user_id).iter().filter(|n| !n.is_read).count();
            u32::try_from(unread).unwrap_or(u32::MAX)
        });
        self.push_raw(&format!("data: {{\"type\":\"connect\",\"unreadCount\":{unread}}}\n\n"));
        Ok(())
    }

    pub(crate) fn close_stream(&mut self, generation: u64) {
        if self.stream.is_some_and(|s| s.generation == generation) {
            self.stream = None;
        }
    }

    pub(crate) fn history(&mut self, query: HistoryQuery) -> Result<MessagePage, FetchError> {
        self.stats.history_requests += 1;
        self.check_rest()?;

        let before = match query {
            HistoryQuery::Latest { .. } => None,
            HistoryQuery::Before { last_message_id, .. } => Some(last_message_id),
        };
        let eligible: Vec<&ChatMessage> = self
            .room(query.room_id())
            .iter()
            .filter(|m| before.is_none_or(|b| m.message_id < b))
            .collect();
        let start = eligible.len().saturating_sub(self.page_size);
        let content: Vec<ChatMessage> =
            eligible.get(start..).unwrap_or_default().iter().map(|m| (*m).clone()).collect();

        Ok(MessagePage {
            total_elements: self.room(query.room_id()).len() as u64,
            has_previous: start > 0,
            content,
            ..MessagePage::default()
        })
    }

    pub(crate) fn mark_room_read(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<(), FetchError> {
        self.stats.room_read_marks += 1;
        self.check_rest()?;
        self.check_read_mark()?;

        if let Some(messages) = self.rooms.get_mut(&room_id) {
            for message in messages.iter_mut().filter(|m| m.sender_id != user_id) {
                message.is_read = true;
            }
        }
        Ok(())
    }

    pub(crate) fn list(&mut self, user_id: UserId, size: u32) -> Result<Vec<Notification>, FetchError> {
        self.stats.list_requests += 1;
        self.check_rest()?;
        Ok(self.notifications(user_id).iter().take(size as usize).cloned().collect())
    }

    pub(crate) fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), FetchError> {
        self.stats.notification_read_marks += 1;
        self.check_rest()?;
        self.check_read_mark()?;

        let notification =
            self.notifications.values_mut().flat_map(|list| list.iter_mut()).find(|n| n.id == id);
        match notification {
            Some(notification) => {
                notification.is_read = true;
                Ok(())
            },
            None => Err(FetchError::Status { status: 404 }),
        }
    }

    fn append_message(&mut self, room_id: RoomId, sender_id: UserId, content: String) -> MessageId {
        let message_id = self.next_message_id;
        self.next_message_id += 1;

        let message = ChatMessage {
            message_id,
            room_id,
            sender_id,
            sender_name: format!("user {sender_id}"),
            content,
            is_read: false,
            created_at: timestamp(message_id),
        };
        self.deliver(&message);
        self.rooms.entry(room_id).or_default().push(message);
        message_id
    }

    fn deliver(&mut self, message: &ChatMessage) {
        let Some(socket) = self.socket.as_ref().filter(|s| s.connected) else {
            return;
        };
        let Ok(body) = serde_json::to_vec(message) else {
            return;
        };

        let generation = socket.generation;
        let frames: Vec<StompFrame> = socket
            .subscriptions
            .iter()
            .filter(|(_, room)| **room == message.room_id)
            .map(|(id, room)| {
                StompFrame::new(StompCommand::Message)
                    .with_header("destination", format!("{ROOM_TOPIC_PREFIX}{room}"))
                    .with_header("subscription", id.as_str())
                    .with_header("message-id", message.message_id.to_string())
                    .with_header("content-type", "application/json")
                    .with_body(body.clone())
            })
            .collect();

        self.outbox
            .extend(frames.into_iter().map(|frame| DriverEvent::SocketFrame { generation, frame }));
    }

    fn insert_notification(
        &mut self,
        user_id: UserId,
        kind: NotificationKind,
        is_read: bool,
    ) -> Notification {
        let id = self.next_notification_id;
        self.next_notification_id += 1;

        let notification = Notification {
            id,
            kind,
            payload: serde_json::json!({ "summary": format!("{kind:?} #{id}") }),
            is_read,
            created_at: timestamp(id),
        };
        self.notifications.entry(user_id).or_default().insert(0, notification.clone());
        notification
    }

    fn push_to(&mut self, user_id: UserId, text: &str) {
        if self.stream.is_some_and(|s| s.user_id == user_id) {
            self.push_raw(text);
        }
    }

    fn live_socket(&self, generation: u64) -> Result<&SocketConn, SimDriverError> {
        self.socket
            .as_ref()
            .filter(|s| s.generation == generation)
            .ok_or_else(|| SimDriverError(format!("socket {generation} is closed")))
    }

    fn check_rest(&mut self) -> Result<(), FetchError> {
        if self.rest_down || self.roll(self.faults.fetch_failure) {
            return Err(FetchError::Status { status: 503 });
        }
        Ok(())
    }

    fn check_read_mark(&mut self) -> Result<(), FetchError> {
        if self.failing_read_marks > 0 {
            self.failing_read_marks -= 1;
            return Err(FetchError::Status { status: 500 });
        }
        Ok(())
    }

    fn roll(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen_bool(probability.min(1.0))
    }
}

fn timestamp(seq: u64) -> String {
    format!("2024-05-01T{:02}:{:02}:{:02}", 9 + (seq / 3600) % 12, (seq / 60) % 60, seq % 60)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pages_walk_backwards() {
        let mut backend = SimBackend::new(1).with_page_size(10);
        backend.seed_room(3, 25);

        let latest = backend.history(HistoryQuery::Latest { room_id: 3 }).unwrap();
        let ids: Vec<_> = latest.content.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, (16..=25).collect::<Vec<_>>());
        assert!(latest.has_previous);

        let last = backend
            .history(HistoryQuery::Before { room_id: 3, last_message_id: 6 })
            .unwrap();
        assert_eq!(last.content.len(), 5);
        assert!(!last.has_previous);
    }

    #[test]
    fn broker_echoes_publishes_to_subscribers() {
        let mut backend = SimBackend::new(1);
        backend.open_socket(1).unwrap();
        backend.client_frame(1, &StompFrame::new(StompCommand::Connect)).unwrap();
        backend.client_frame(1, &StompFrame::subscribe("room-0", "/sub/chat/room/3")).unwrap();
        backend.outbox.clear();

        let body = br#"{"roomId":3,"senderId":9,"content":"hi"}"#.to_vec();
        backend.client_frame(1, &StompFrame::send_json(PUBLISH_DESTINATION, body)).unwrap();

        let Some(DriverEvent::SocketFrame { frame, .. }) = backend.next_event() else {
            unreachable!("expected MESSAGE frame");
        };
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.header("subscription"), Some("room-0"));
        assert_eq!(backend.room(3).len(), 1);
    }

    #[test]
    fn stale_socket_rejected() {
        let mut backend = SimBackend::new(1);
        backend.open_socket(1).unwrap();
        backend.open_socket(2).unwrap();

        assert!(backend.heartbeat(1).is_err());
        assert!(backend.heartbeat(2).is_ok());
        assert!(matches!(
            backend.next_event(),
            Some(DriverEvent::SocketClosed { generation: 1, .. })
        ));
    }

    #[test]
    fn same_seed_same_faults() {
        let faults = FaultConfig { fetch_failure: 0.5, ..FaultConfig::default() };
        let run = |seed| {
            let mut backend = SimBackend::new(seed).with_faults(faults);
            (0..32).map(|_| backend.list(9, 10).is_ok()).collect::<Vec<_>>()
        };
        assert_eq!(run(7), run(7));
    }
}
