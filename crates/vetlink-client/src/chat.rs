//! Chat session state machine.
//!
//! One [`ChatSession`] serves one (room, user) pair at a time. It owns the
//! connection [`Link`], the STOMP session of the live socket, the
//! [`MessageStore`] and the [`Pagination`] controller, and turns
//! [`ChatEvent`]s into [`ChatAction`]s.
//!
//! Every socket report carries the generation it was opened with and every
//! REST result carries its request id; anything from an older socket, an
//! older room or a torn-down session is dropped without touching state.

use std::collections::HashMap;

use tracing::{debug, info, warn};
use vetlink_core::{
    ConnectionState, Environment, Link, LinkFailure, ReconnectPolicy, SessionAction,
    SessionConfig, StompSession,
};
use vetlink_proto::{
    ChatMessage, MessageId, MessagePage, OutgoingChatMessage, RoomId, StompCommand, StompFrame,
    UserId,
};

use crate::{
    error::{FetchError, UserError},
    event::{ChatAction, ChatEvent, HistoryQuery},
    pagination::{HistoryKind, Pagination, RequestId},
    store::MessageStore,
};

/// Destination every message is published to.
pub const PUBLISH_DESTINATION: &str = "/pub/chat/message";

/// Subscription id used for the room topic.
pub const SUBSCRIPTION_ID: &str = "room-0";

/// Topic carrying a room's messages.
pub fn room_topic(room_id: RoomId) -> String {
    format!("/sub/chat/room/{room_id}")
}

/// Chat session configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// STOMP handshake and heart-beat settings
    pub session: SessionConfig,
    /// Reconnect policy for the socket
    pub reconnect: ReconnectPolicy,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { session: SessionConfig::default(), reconnect: ReconnectPolicy::chat() }
    }
}

/// The (room, user) pair a session serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoomContext {
    room_id: RoomId,
    user_id: UserId,
}

/// Chat session for one room.
pub struct ChatSession<E: Environment> {
    env: E,
    config: ChatConfig,
    context: Option<RoomContext>,
    link: Link<E::Instant>,
    stomp: Option<StompSession<E::Instant>>,
    /// Whether the socket has been established at least once for this room.
    established_once: bool,
    store: MessageStore,
    pagination: Pagination,
    pending_reads: HashMap<RequestId, Vec<MessageId>>,
    next_request: RequestId,
}

impl<E: Environment> ChatSession<E> {
    /// Create an idle session.
    pub fn new(env: E, config: ChatConfig) -> Self {
        let link = Link::new(config.reconnect);
        Self {
            env,
            config,
            context: None,
            link,
            stomp: None,
            established_once: false,
            store: MessageStore::new(),
            pagination: Pagination::new(),
            pending_reads: HashMap::new(),
            next_request: 0,
        }
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Whether messages can be published right now.
    pub fn is_connected(&self) -> bool {
        self.link.state() == ConnectionState::Connected
            && self.stomp.as_ref().is_some_and(StompSession::is_established)
    }

    /// Room being served.
    pub fn room_id(&self) -> Option<RoomId> {
        self.context.map(|c| c.room_id)
    }

    /// Local user.
    pub fn user_id(&self) -> Option<UserId> {
        self.context.map(|c| c.user_id)
    }

    /// Generation of the live socket.
    pub fn generation(&self) -> u64 {
        self.link.generation()
    }

    /// Messages, oldest first.
    pub fn messages(&self) -> &[ChatMessage] {
        self.store.messages()
    }

    /// Message store.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Pagination state.
    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    /// Process an event.
    pub fn handle(&mut self, event: ChatEvent) -> Vec<ChatAction> {
        match event {
            ChatEvent::Connect { room_id, user_id } => self.handle_connect(room_id, user_id),
            ChatEvent::Disconnect => self.teardown(),
            ChatEvent::SocketOpened { generation } => self.handle_socket_opened(generation),
            ChatEvent::SocketClosed { generation, reason } => {
                self.handle_socket_closed(generation, &reason)
            },
            ChatEvent::FrameReceived { generation, frame } => {
                self.handle_frame(generation, &frame)
            },
            ChatEvent::HeartbeatReceived { generation } => {
                if self.link.is_current(generation)
                    && let Some(stomp) = self.stomp.as_mut()
                {
                    stomp.handle_heartbeat(self.env.now());
                }
                vec![]
            },
            ChatEvent::Send { content } => self.handle_send(&content),
            ChatEvent::LoadInitial => self.load_initial(),
            ChatEvent::LoadMore | ChatEvent::SentinelVisible => self.load_more(),
            ChatEvent::HistoryLoaded { request, result } => {
                self.handle_history(request, result)
            },
            ChatEvent::MarkRead => self.handle_mark_read(),
            ChatEvent::MarkReadCompleted { request, result } => {
                self.handle_mark_read_completed(request, result)
            },
            ChatEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_connect(
        &mut self,
        room_id: Option<RoomId>,
        user_id: Option<UserId>,
    ) -> Vec<ChatAction> {
        let (Some(room_id), Some(user_id)) = (room_id, user_id) else {
            debug!("chat connect without room or user ignored");
            return vec![];
        };
        let context = RoomContext { room_id, user_id };

        let mut actions = Vec::new();
        if self.context == Some(context) {
            if self.link.state() != ConnectionState::Disconnected {
                return actions;
            }
        } else if self.context.is_some() {
            actions.extend(self.teardown());
        }

        self.context = Some(context);
        info!(room_id, user_id, "entering chat room");

        actions.extend(self.open_socket());
        actions.extend(self.load_initial());
        actions
    }

    fn open_socket(&mut self) -> Vec<ChatAction> {
        let Some(generation) = self.link.start() else {
            return vec![];
        };
        self.stomp = Some(StompSession::new(self.env.now(), self.config.session.clone()));

        vec![
            ChatAction::StateChanged(ConnectionState::Connecting),
            ChatAction::OpenSocket { generation },
        ]
    }

    fn handle_socket_opened(&mut self, generation: u64) -> Vec<ChatAction> {
        if !self.link.is_current(generation) {
            debug!(generation, "stale socket open ignored");
            return vec![];
        }

        let now = self.env.now();
        let Some(stomp) = self.stomp.as_mut() else {
            return vec![];
        };

        match stomp.begin(now) {
            Ok(session_actions) => self.map_session_actions(generation, session_actions),
            Err(err) => {
                warn!(%err, "stomp session could not start");
                self.fail(generation, &err.to_string(), true)
            },
        }
    }

    fn handle_socket_closed(&mut self, generation: u64, reason: &str) -> Vec<ChatAction> {
        if !self.link.is_current(generation) {
            debug!(generation, "stale socket close ignored");
            return vec![];
        }
        self.fail(generation, reason, false)
    }

    fn handle_frame(&mut self, generation: u64, frame: &StompFrame) -> Vec<ChatAction> {
        if !self.link.is_current(generation) {
            debug!(generation, command = %frame.command, "frame from stale socket ignored");
            return vec![];
        }

        let now = self.env.now();
        let Some(stomp) = self.stomp.as_mut() else {
            return vec![];
        };

        let session_actions = match stomp.handle_frame(frame, now) {
            Ok(actions) => actions,
            Err(err) => {
                debug!(%err, "frame discarded");
                return vec![];
            },
        };

        let mut actions = self.map_session_actions(generation, session_actions);

        match frame.command {
            StompCommand::Connected => actions.extend(self.handle_established(generation)),
            StompCommand::Message => actions.extend(self.handle_message(frame)),
            _ => {},
        }

        actions
    }

    fn handle_established(&mut self, generation: u64) -> Vec<ChatAction> {
        let Some(context) = self.context else {
            return vec![];
        };
        if !self.link.opened(generation) {
            return vec![];
        }

        let reconnected = self.established_once;
        self.established_once = true;
        info!(room_id = context.room_id, reconnected, "chat connected");

        let subscribe = StompFrame::subscribe(SUBSCRIPTION_ID, &room_topic(context.room_id));
        let mut actions = vec![
            ChatAction::StateChanged(ConnectionState::Connected),
            self.send_frame(generation, subscribe),
        ];

        if reconnected {
            let request = self.next_request_id();
            if self.pagination.begin_catch_up(request) {
                actions.push(ChatAction::FetchHistory {
                    request,
                    query: HistoryQuery::Latest { room_id: context.room_id },
                });
            }
        }

        actions
    }

    fn handle_message(&mut self, frame: &StompFrame) -> Vec<ChatAction> {
        let Some(context) = self.context else {
            return vec![];
        };

        let ours = frame.header("subscription").is_none_or(|id| id == SUBSCRIPTION_ID);
        if !ours {
            debug!(subscription = frame.header("subscription"), "message for unknown subscription");
            return vec![];
        }

        let message = match ChatMessage::from_json(&frame.body) {
            Ok(message) => message,
            Err(err) => {
                debug!(%err, "malformed chat message discarded");
                return vec![];
            },
        };

        if message.room_id != context.room_id {
            debug!(room_id = message.room_id, "message for another room discarded");
            return vec![];
        }

        if self.store.insert(message) { vec![ChatAction::MessagesChanged] } else { vec![] }
    }

    fn handle_send(&mut self, content: &str) -> Vec<ChatAction> {
        if content.trim().is_empty() {
            return vec![];
        }

        let Some(context) = self.context else {
            return vec![ChatAction::Error(UserError::MissingIdentity)];
        };
        if !self.is_connected() {
            return vec![ChatAction::Error(UserError::NotConnected)];
        }

        let body = OutgoingChatMessage {
            room_id: context.room_id,
            sender_id: context.user_id,
            content: content.to_string(),
        };
        match body.to_json() {
            Ok(json) => {
                let frame = StompFrame::send_json(PUBLISH_DESTINATION, json);
                vec![self.send_frame(self.link.generation(), frame)]
            },
            Err(err) => vec![ChatAction::Error(UserError::SendFailed { reason: err.to_string() })],
        }
    }

    fn load_initial(&mut self) -> Vec<ChatAction> {
        let Some(context) = self.context else {
            return vec![];
        };

        let request = self.next_request_id();
        self.pagination.begin_initial(request);
        vec![ChatAction::FetchHistory {
            request,
            query: HistoryQuery::Latest { room_id: context.room_id },
        }]
    }

    fn load_more(&mut self) -> Vec<ChatAction> {
        let Some(context) = self.context else {
            return vec![];
        };

        let request = self.next_request_id();
        match self.pagination.begin_older(request, self.store.oldest_id()) {
            Some(last_message_id) => vec![ChatAction::FetchHistory {
                request,
                query: HistoryQuery::Before { room_id: context.room_id, last_message_id },
            }],
            None => vec![],
        }
    }

    fn handle_history(
        &mut self,
        request: RequestId,
        result: Result<MessagePage, FetchError>,
    ) -> Vec<ChatAction> {
        let Some(kind) = self.pagination.complete(request) else {
            debug!(request, "stale history result ignored");
            return vec![];
        };

        match result {
            Ok(page) => {
                let has_previous = page.has_previous;
                let added = match kind {
                    // Teardown already emptied the store; live messages that
                    // beat the first page must survive it.
                    HistoryKind::Initial | HistoryKind::CatchUp => self.store.merge(page.content),
                    HistoryKind::Older => self.store.prepend_older(page.content),
                };
                self.pagination.finish(kind, has_previous, added);
                debug!(?kind, added, has_older = self.pagination.has_older(), "history merged");

                if kind == HistoryKind::CatchUp && added == 0 {
                    vec![]
                } else {
                    vec![ChatAction::MessagesChanged]
                }
            },
            Err(err) if kind == HistoryKind::CatchUp => {
                warn!(%err, "catch-up fetch failed");
                vec![]
            },
            Err(err) => {
                warn!(%err, ?kind, "history fetch failed");
                vec![ChatAction::Error(UserError::HistoryUnavailable { reason: err.to_string() })]
            },
        }
    }

    fn handle_mark_read(&mut self) -> Vec<ChatAction> {
        let Some(context) = self.context else {
            return vec![ChatAction::Error(UserError::MissingIdentity)];
        };

        let flipped = self.store.mark_all_read();
        let changed = !flipped.is_empty();
        let request = self.next_request_id();
        self.pending_reads.insert(request, flipped);

        let mut actions = Vec::with_capacity(2);
        if changed {
            actions.push(ChatAction::MessagesChanged);
        }
        actions.push(ChatAction::MarkRoomRead {
            request,
            room_id: context.room_id,
            user_id: context.user_id,
        });
        actions
    }

    fn handle_mark_read_completed(
        &mut self,
        request: RequestId,
        result: Result<(), FetchError>,
    ) -> Vec<ChatAction> {
        let Some(flipped) = self.pending_reads.remove(&request) else {
            debug!(request, "stale read-mark result ignored");
            return vec![];
        };

        match result {
            Ok(()) => vec![],
            Err(err) => {
                warn!(%err, reverted = flipped.len(), "read-mark failed");
                self.store.revert_read(&flipped);
                let mut actions = Vec::with_capacity(2);
                if !flipped.is_empty() {
                    actions.push(ChatAction::MessagesChanged);
                }
                actions.push(ChatAction::Error(UserError::ReadMarkFailed {
                    reason: err.to_string(),
                }));
                actions
            },
        }
    }

    fn handle_tick(&mut self) -> Vec<ChatAction> {
        let now = self.env.now();
        let generation = self.link.generation();
        let mut actions = Vec::new();

        if self.link.is_current(generation)
            && let Some(stomp) = self.stomp.as_mut()
        {
            let session_actions = stomp.tick(now);
            actions.extend(self.map_session_actions(generation, session_actions));
        }

        if let Some(generation) = self.link.poll_retry(now) {
            info!(generation, attempt = self.link.attempts(), "reconnecting chat socket");
            self.stomp = Some(StompSession::new(now, self.config.session.clone()));
            actions.push(ChatAction::StateChanged(ConnectionState::Connecting));
            actions.push(ChatAction::OpenSocket { generation });
        }

        actions
    }

    fn map_session_actions(
        &mut self,
        generation: u64,
        session_actions: Vec<SessionAction>,
    ) -> Vec<ChatAction> {
        let mut actions = Vec::with_capacity(session_actions.len());
        for action in session_actions {
            match action {
                SessionAction::SendFrame(frame) => actions.push(self.send_frame(generation, frame)),
                SessionAction::SendHeartbeat => {
                    actions.push(ChatAction::SendHeartbeat { generation });
                },
                SessionAction::Close { reason } => {
                    actions.extend(self.fail(generation, &reason, true));
                    break;
                },
            }
        }
        actions
    }

    fn send_frame(&mut self, generation: u64, frame: StompFrame) -> ChatAction {
        if let Some(stomp) = self.stomp.as_mut() {
            stomp.record_sent(self.env.now());
        }
        ChatAction::SendFrame { generation, frame }
    }

    /// Socket of `generation` is unusable. Schedules a reconnect.
    fn fail(&mut self, generation: u64, reason: &str, close: bool) -> Vec<ChatAction> {
        let now = self.env.now();
        if let Some(stomp) = self.stomp.as_mut() {
            stomp.close();
        }

        let mut actions = Vec::new();
        if close {
            actions.push(ChatAction::CloseSocket { generation });
        }

        match self.link.failed(generation, now, None) {
            LinkFailure::Stale => {},
            LinkFailure::Retry { delay, attempt } => {
                warn!(reason, ?delay, attempt, "chat socket lost, reconnect scheduled");
                actions.push(ChatAction::StateChanged(ConnectionState::Disconnected));
                actions.push(ChatAction::StateChanged(ConnectionState::Reconnecting));
                actions.push(ChatAction::ScheduleReconnect { delay });
            },
            LinkFailure::GaveUp { attempts } => {
                warn!(reason, attempts, "chat socket lost, giving up");
                actions.push(ChatAction::StateChanged(ConnectionState::Disconnected));
                actions.push(ChatAction::Error(UserError::NotConnected));
            },
        }
        actions
    }

    /// Leave the room: DISCONNECT, close the socket, forget everything.
    fn teardown(&mut self) -> Vec<ChatAction> {
        let mut actions = Vec::new();
        let generation = self.link.generation();
        let live = self.link.is_current(generation);

        if let Some(mut stomp) = self.stomp.take()
            && live
        {
            for action in stomp.disconnect() {
                if let SessionAction::SendFrame(frame) = action {
                    actions.push(ChatAction::SendFrame { generation, frame });
                }
            }
        }
        if live {
            actions.push(ChatAction::CloseSocket { generation });
        }

        let was = self.link.state();
        self.link.close();
        if was != ConnectionState::Disconnected {
            actions.push(ChatAction::StateChanged(ConnectionState::Disconnected));
        }

        if let Some(context) = self.context.take() {
            info!(room_id = context.room_id, "left chat room");
        }
        self.established_once = false;
        self.store.clear();
        self.pagination.reset();
        self.pending_reads.clear();
        if !actions.is_empty() {
            actions.push(ChatAction::MessagesChanged);
        }
        actions
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request = self.next_request.wrapping_add(1);
        self.next_request
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use vetlink_core::env::test_utils::MockEnv;

    use super::*;

    fn session() -> ChatSession<MockEnv> {
        ChatSession::new(MockEnv::new(), ChatConfig::default())
    }

    fn opened_socket(actions: &[ChatAction]) -> Option<u64> {
        actions.iter().find_map(|a| match a {
            ChatAction::OpenSocket { generation } => Some(*generation),
            _ => None,
        })
    }

    fn connected(session: &mut ChatSession<MockEnv>) -> u64 {
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let generation = opened_socket(&actions).unwrap();
        session.handle(ChatEvent::SocketOpened { generation });
        session.handle(ChatEvent::FrameReceived {
            generation,
            frame: StompFrame::new(StompCommand::Connected).with_header("version", "1.2"),
        });
        generation
    }

    #[test]
    fn connect_without_identity_is_noop() {
        let mut session = session();
        assert!(session.handle(ChatEvent::Connect { room_id: Some(1), user_id: None }).is_empty());
        assert!(session.handle(ChatEvent::Connect { room_id: None, user_id: Some(1) }).is_empty());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn connect_opens_socket_and_loads_history() {
        let mut session = session();
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });

        assert!(opened_socket(&actions).is_some());
        assert!(actions.iter().any(|a| matches!(
            a,
            ChatAction::FetchHistory { query: HistoryQuery::Latest { room_id: 3 }, .. }
        )));
    }

    #[test]
    fn repeated_connect_is_single_flight() {
        let mut session = session();
        session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let again = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        assert!(again.is_empty());
    }

    #[test]
    fn connected_frame_subscribes() {
        let mut session = session();
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let generation = opened_socket(&actions).unwrap();

        let actions = session.handle(ChatEvent::SocketOpened { generation });
        assert!(matches!(
            &actions[..],
            [ChatAction::SendFrame { frame, .. }] if frame.command == StompCommand::Connect
        ));

        let actions = session.handle(ChatEvent::FrameReceived {
            generation,
            frame: StompFrame::new(StompCommand::Connected),
        });
        assert!(actions.contains(&ChatAction::StateChanged(ConnectionState::Connected)));
        assert!(actions.iter().any(|a| matches!(
            a,
            ChatAction::SendFrame { frame, .. }
                if frame.command == StompCommand::Subscribe
                    && frame.header("destination") == Some("/sub/chat/room/3")
        )));
        assert!(session.is_connected());
    }

    #[test]
    fn blank_messages_never_published() {
        let mut session = session();
        connected(&mut session);

        assert!(session.handle(ChatEvent::Send { content: String::new() }).is_empty());
        assert!(session.handle(ChatEvent::Send { content: "   ".into() }).is_empty());
    }

    #[test]
    fn send_publishes_json_body() {
        let mut session = session();
        connected(&mut session);

        let actions = session.handle(ChatEvent::Send { content: "Bori is ready".into() });
        let [ChatAction::SendFrame { frame, .. }] = &actions[..] else {
            panic!("expected one frame, got {actions:?}");
        };
        assert_eq!(frame.header("destination"), Some(PUBLISH_DESTINATION));
        let body: serde_json::Value = serde_json::from_slice(&frame.body).unwrap();
        assert_eq!(body, serde_json::json!({"roomId": 3, "senderId": 9, "content": "Bori is ready"}));
        assert!(session.messages().is_empty(), "no local echo");
    }

    #[test]
    fn send_while_connecting_is_rejected_visibly() {
        let mut session = session();
        session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });

        let actions = session.handle(ChatEvent::Send { content: "hello".into() });
        assert_eq!(actions, vec![ChatAction::Error(UserError::NotConnected)]);
    }

    #[test]
    fn live_message_appended_once() {
        let mut session = session();
        let generation = connected(&mut session);
        let frame = StompFrame::new(StompCommand::Message)
            .with_header("subscription", SUBSCRIPTION_ID)
            .with_body(r#"{"messageId":5,"roomId":3,"senderId":2,"content":"hi"}"#);

        let first =
            session.handle(ChatEvent::FrameReceived { generation, frame: frame.clone() });
        let second = session.handle(ChatEvent::FrameReceived { generation, frame });

        assert_eq!(first, vec![ChatAction::MessagesChanged]);
        assert!(second.is_empty());
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn live_message_before_first_page_kept() {
        let mut session = session();
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let Some(ChatAction::FetchHistory { request, .. }) =
            actions.iter().find(|a| matches!(a, ChatAction::FetchHistory { .. })).cloned()
        else {
            panic!("expected history fetch");
        };
        let generation = opened_socket(&actions).unwrap();
        session.handle(ChatEvent::SocketOpened { generation });
        session.handle(ChatEvent::FrameReceived {
            generation,
            frame: StompFrame::new(StompCommand::Connected).with_header("version", "1.2"),
        });

        let live = StompFrame::new(StompCommand::Message)
            .with_header("subscription", SUBSCRIPTION_ID)
            .with_body(r#"{"messageId":26,"roomId":3,"senderId":2,"content":"just now"}"#);
        session.handle(ChatEvent::FrameReceived { generation, frame: live });

        let page = MessagePage {
            content: (16..=25)
                .map(|id| ChatMessage {
                    message_id: id,
                    room_id: 3,
                    sender_id: 2,
                    sender_name: String::new(),
                    content: format!("message {id}"),
                    is_read: false,
                    created_at: String::new(),
                })
                .collect(),
            has_previous: true,
            ..MessagePage::default()
        };
        let actions = session.handle(ChatEvent::HistoryLoaded { request, result: Ok(page) });

        assert_eq!(actions, vec![ChatAction::MessagesChanged]);
        let ids: Vec<_> = session.messages().iter().map(|m| m.message_id).collect();
        assert_eq!(ids, (16..=26).collect::<Vec<_>>());
        assert!(session.pagination().has_older());
    }

    #[test]
    fn malformed_message_discarded() {
        let mut session = session();
        let generation = connected(&mut session);
        let frame = StompFrame::new(StompCommand::Message).with_body("<html>502</html>");

        assert!(session.handle(ChatEvent::FrameReceived { generation, frame }).is_empty());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn broker_error_schedules_reconnect() {
        let mut session = session();
        let generation = connected(&mut session);
        let frame = StompFrame::new(StompCommand::Error).with_header("message", "boom");

        let actions = session.handle(ChatEvent::FrameReceived { generation, frame });
        assert!(actions.contains(&ChatAction::CloseSocket { generation }));
        assert!(actions.contains(&ChatAction::ScheduleReconnect { delay: Duration::from_secs(1) }));
        assert_eq!(session.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn stale_socket_reports_ignored() {
        let mut session = session();
        let generation = connected(&mut session);
        session.handle(ChatEvent::Connect { room_id: Some(4), user_id: Some(9) });

        let actions =
            session.handle(ChatEvent::SocketClosed { generation, reason: "late".into() });
        assert!(actions.is_empty());
        assert_eq!(session.room_id(), Some(4));
    }

    #[test]
    fn history_for_previous_room_ignored() {
        let mut session = session();
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let Some(ChatAction::FetchHistory { request, .. }) =
            actions.iter().find(|a| matches!(a, ChatAction::FetchHistory { .. })).cloned()
        else {
            panic!("expected history fetch");
        };
        session.handle(ChatEvent::Connect { room_id: Some(4), user_id: Some(9) });

        let page = MessagePage {
            content: vec![ChatMessage {
                message_id: 1,
                room_id: 3,
                sender_id: 2,
                sender_name: String::new(),
                content: "late".into(),
                is_read: false,
                created_at: String::new(),
            }],
            ..MessagePage::default()
        };
        let actions = session.handle(ChatEvent::HistoryLoaded { request, result: Ok(page) });
        assert!(actions.is_empty());
        assert!(session.messages().is_empty());
        assert!(session.pagination().is_loading_initial());
    }

    #[test]
    fn failed_read_mark_reverts() {
        let mut session = session();
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let Some(ChatAction::FetchHistory { request, .. }) =
            actions.iter().find(|a| matches!(a, ChatAction::FetchHistory { .. })).cloned()
        else {
            panic!("expected history fetch");
        };
        let page = MessagePage {
            content: vec![ChatMessage {
                message_id: 1,
                room_id: 3,
                sender_id: 2,
                sender_name: String::new(),
                content: "hi".into(),
                is_read: false,
                created_at: String::new(),
            }],
            ..MessagePage::default()
        };
        session.handle(ChatEvent::HistoryLoaded { request, result: Ok(page) });

        let actions = session.handle(ChatEvent::MarkRead);
        assert!(session.messages()[0].is_read);
        let Some(ChatAction::MarkRoomRead { request, .. }) = actions.last().cloned() else {
            panic!("expected read-mark call");
        };

        let actions = session.handle(ChatEvent::MarkReadCompleted {
            request,
            result: Err(FetchError::Status { status: 500 }),
        });
        assert!(!session.messages()[0].is_read);
        assert!(matches!(actions.last(), Some(ChatAction::Error(UserError::ReadMarkFailed { .. }))));
    }

    #[test]
    fn reconnect_fires_after_delay_and_resubscribes() {
        let env = MockEnv::new();
        let mut session = ChatSession::new(env.clone(), ChatConfig::default());
        let generation = connected(&mut session);

        session.handle(ChatEvent::SocketClosed { generation, reason: "reset".into() });
        assert!(session.handle(ChatEvent::Tick).is_empty(), "not due yet");

        env.advance(Duration::from_secs(1));
        let actions = session.handle(ChatEvent::Tick);
        let next = opened_socket(&actions).unwrap();
        assert_ne!(next, generation);

        session.handle(ChatEvent::SocketOpened { generation: next });
        let actions = session.handle(ChatEvent::FrameReceived {
            generation: next,
            frame: StompFrame::new(StompCommand::Connected),
        });
        assert!(actions.iter().any(|a| matches!(
            a,
            ChatAction::SendFrame { frame, .. } if frame.command == StompCommand::Subscribe
        )));
    }

    #[test]
    fn handshake_timeout_fails_connection() {
        let env = MockEnv::new();
        let mut session = ChatSession::new(env.clone(), ChatConfig::default());
        let actions = session.handle(ChatEvent::Connect { room_id: Some(3), user_id: Some(9) });
        let generation = opened_socket(&actions).unwrap();
        session.handle(ChatEvent::SocketOpened { generation });

        env.advance(Duration::from_secs(11));
        let actions = session.handle(ChatEvent::Tick);
        assert!(actions.contains(&ChatAction::CloseSocket { generation }));
        assert_eq!(session.state(), ConnectionState::Reconnecting);
    }
}
