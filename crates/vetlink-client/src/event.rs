//! Events fed into the sessions and actions they return.
//!
//! The caller is responsible for:
//! - Opening and closing transports when asked, tagging everything it
//!   reports with the transport generation
//! - Executing REST calls and reporting results with the request id
//! - Driving time forward via ticks
//! - Forwarding user intents (send, scroll, read)

use bytes::Bytes;
use vetlink_core::ConnectionState;
use vetlink_proto::{
    MessageId, MessagePage, Notification, NotificationId, RoomId, StompFrame, UserId,
};

use crate::{
    error::{FetchError, UserError},
    pagination::RequestId,
};

/// Events the caller feeds into a [`crate::ChatSession`].
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Enter a room. No-op unless both ids are present.
    Connect {
        /// Room to join
        room_id: Option<RoomId>,
        /// Local user
        user_id: Option<UserId>,
    },

    /// Leave the room and tear everything down.
    Disconnect,

    /// Websocket of `generation` is open.
    SocketOpened {
        /// Transport generation
        generation: u64,
    },

    /// Websocket of `generation` closed or failed to open.
    SocketClosed {
        /// Transport generation
        generation: u64,
        /// Human-readable cause
        reason: String,
    },

    /// A STOMP frame arrived.
    FrameReceived {
        /// Transport generation
        generation: u64,
        /// Decoded frame
        frame: StompFrame,
    },

    /// A bare end-of-line heart-beat arrived.
    HeartbeatReceived {
        /// Transport generation
        generation: u64,
    },

    /// User typed a message.
    Send {
        /// Text as typed
        content: String,
    },

    /// (Re)load the newest page of history.
    LoadInitial,

    /// Load the page before the oldest stored message.
    LoadMore,

    /// The scroll sentinel above the oldest message became visible.
    SentinelVisible,

    /// A history request finished.
    HistoryLoaded {
        /// Request being answered
        request: RequestId,
        /// Page or failure
        result: Result<MessagePage, FetchError>,
    },

    /// Mark every message in the room read.
    MarkRead,

    /// A read-mark request finished.
    MarkReadCompleted {
        /// Request being answered
        request: RequestId,
        /// Outcome
        result: Result<(), FetchError>,
    },

    /// Time tick for heart-beats, timeouts and scheduled reconnects.
    Tick,
}

/// History query issued by a [`ChatAction::FetchHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryQuery {
    /// Newest page of the room
    Latest {
        /// Room to read
        room_id: RoomId,
    },
    /// Page strictly older than `last_message_id`
    Before {
        /// Room to read
        room_id: RoomId,
        /// Cursor: identity of the oldest message held
        last_message_id: MessageId,
    },
}

impl HistoryQuery {
    /// Room the query reads.
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Latest { room_id } | Self::Before { room_id, .. } => *room_id,
        }
    }
}

/// Actions returned by a [`crate::ChatSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    /// Open a websocket and report back with `generation`.
    OpenSocket {
        /// Transport generation
        generation: u64,
    },

    /// Close the websocket of `generation`.
    CloseSocket {
        /// Transport generation
        generation: u64,
    },

    /// Write a STOMP frame.
    SendFrame {
        /// Transport generation
        generation: u64,
        /// Frame to encode
        frame: StompFrame,
    },

    /// Write an end-of-line heart-beat.
    SendHeartbeat {
        /// Transport generation
        generation: u64,
    },

    /// Fetch a page of history.
    FetchHistory {
        /// Echo this id in [`ChatEvent::HistoryLoaded`]
        request: RequestId,
        /// What to fetch
        query: HistoryQuery,
    },

    /// Persist the room's read state.
    MarkRoomRead {
        /// Echo this id in [`ChatEvent::MarkReadCompleted`]
        request: RequestId,
        /// Room to mark
        room_id: RoomId,
        /// Reader
        user_id: UserId,
    },

    /// A reconnect attempt fires after `delay`; keep ticking.
    ScheduleReconnect {
        /// Wait before the attempt
        delay: std::time::Duration,
    },

    /// Connection state changed.
    StateChanged(ConnectionState),

    /// The message store changed; re-render.
    MessagesChanged,

    /// Show this to the user.
    Error(UserError),
}

/// Events the caller feeds into a [`crate::NotificationStream`].
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// Start streaming for a user. No-op without a user.
    Start {
        /// Local user
        user_id: Option<UserId>,
    },

    /// Stop streaming and forget the user's notifications.
    Stop,

    /// Event stream of `generation` answered 200 with `text/event-stream`.
    StreamOpened {
        /// Transport generation
        generation: u64,
    },

    /// Body bytes arrived on the event stream.
    StreamChunk {
        /// Transport generation
        generation: u64,
        /// Raw bytes, arbitrary chunking
        bytes: Bytes,
    },

    /// Event stream of `generation` failed or ended.
    StreamFailed {
        /// Transport generation
        generation: u64,
        /// Human-readable cause
        reason: String,
    },

    /// A list fetch finished.
    ListFetched {
        /// Request being answered
        request: RequestId,
        /// Notifications or failure
        result: Result<Vec<Notification>, FetchError>,
    },

    /// Mark one notification read.
    MarkRead {
        /// Notification to mark
        id: NotificationId,
    },

    /// Mark every listed notification read.
    MarkAllRead,

    /// A read-mark request finished.
    ReadCompleted {
        /// Request being answered
        request: RequestId,
        /// Outcome
        result: Result<(), FetchError>,
    },

    /// Time tick for scheduled reconnects.
    Tick,
}

/// Typed signal raised when the stream reports something new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSignal {
    /// A notice was posted
    Notice,
    /// The notice board changed; reload it
    NoticeRefresh,
    /// A reservation changed
    Reservation,
    /// A vaccination changed
    Vaccination,
    /// A notification of unstated kind
    Other,
}

impl StreamSignal {
    /// Signal for a named event-stream category. `None` for unknown names.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "notice" => Some(Self::Notice),
            "notice-refresh" => Some(Self::NoticeRefresh),
            "reservation" => Some(Self::Reservation),
            "vaccination" => Some(Self::Vaccination),
            _ => None,
        }
    }
}

/// Actions returned by a [`crate::NotificationStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationAction {
    /// Open the event stream and report back with `generation`.
    OpenStream {
        /// Transport generation
        generation: u64,
        /// Subscribing user
        user_id: UserId,
    },

    /// Close the event stream of `generation`.
    CloseStream {
        /// Transport generation
        generation: u64,
    },

    /// Fetch the notification list.
    FetchList {
        /// Echo this id in [`NotificationEvent::ListFetched`]
        request: RequestId,
        /// Owner of the list
        user_id: UserId,
        /// Page size
        size: u32,
    },

    /// Persist a read-mark.
    PatchRead {
        /// Echo this id in [`NotificationEvent::ReadCompleted`]
        request: RequestId,
        /// Notification to mark
        id: NotificationId,
    },

    /// A reconnect attempt fires after `delay`; keep ticking.
    ScheduleReconnect {
        /// Wait before the attempt
        delay: std::time::Duration,
    },

    /// Connection state changed.
    StateChanged(ConnectionState),

    /// Something new arrived on the stream.
    Raise {
        /// What happened
        signal: StreamSignal,
        /// Event body as received
        body: serde_json::Value,
    },

    /// Unread counter changed.
    UnreadChanged(u32),

    /// Notification list changed; re-render.
    ListChanged,

    /// Show this to the user.
    Error(UserError),
}
