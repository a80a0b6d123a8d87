//! Notification stream state machine.
//!
//! Owns the event-stream [`Link`], the incremental SSE decoder, the
//! [`DedupFilter`] and the [`Inbox`]. Pushes are hints: an accepted push
//! bumps the unread counter, raises a typed signal and triggers a refetch of
//! the list, which is the record of truth. When several refetches overlap,
//! only the most recent one is applied.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use bytes::Bytes;
use tracing::{debug, info, warn};
use vetlink_core::{
    ConnectionState, DedupConfig, DedupFilter, Environment, Link, LinkFailure, ReconnectPolicy,
};
use vetlink_proto::{
    Notification, NotificationId, NotificationKind, PushEvent, SseDecoder, SseEvent,
    StreamPayload, UserId, sse::DEFAULT_EVENT,
};

use crate::{
    error::{FetchError, UserError},
    event::{NotificationAction, NotificationEvent, StreamSignal},
    inbox::{Inbox, ReadMark},
    pagination::RequestId,
};

/// Notifications fetched per list request.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Notification stream configuration.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Reconnect policy for the event stream
    pub reconnect: ReconnectPolicy,
    /// Duplicate suppression timing
    pub dedup: DedupConfig,
    /// List page size
    pub page_size: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::notifications(),
            dedup: DedupConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Live notification stream for one user.
pub struct NotificationStream<E: Environment> {
    env: E,
    config: NotificationConfig,
    user_id: Option<UserId>,
    link: Link<E::Instant>,
    decoder: SseDecoder,
    /// Server-advertised minimum reconnect delay.
    retry_floor: Option<Duration>,
    dedup: DedupFilter<String, E::Instant>,
    inbox: Inbox,
    /// Most recent list request; older answers are ignored.
    latest_fetch: Option<RequestId>,
    /// Whether the latest list request follows a (re)connect.
    reconcile: bool,
    pending_reads: HashMap<RequestId, ReadMark>,
    next_request: RequestId,
}

impl<E: Environment> NotificationStream<E> {
    /// Create an idle stream.
    pub fn new(env: E, config: NotificationConfig) -> Self {
        let link = Link::new(config.reconnect);
        let dedup = DedupFilter::new(config.dedup);
        Self {
            env,
            config,
            user_id: None,
            link,
            decoder: SseDecoder::new(),
            retry_floor: None,
            dedup,
            inbox: Inbox::new(),
            latest_fetch: None,
            reconcile: false,
            pending_reads: HashMap::new(),
            next_request: 0,
        }
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Whether the stream stopped retrying.
    pub fn is_exhausted(&self) -> bool {
        self.link.is_exhausted()
    }

    /// Subscribed user.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Generation of the live stream.
    pub fn generation(&self) -> u64 {
        self.link.generation()
    }

    /// Unread counter.
    pub fn unread_count(&self) -> u32 {
        self.inbox.unread_count()
    }

    /// Notifications, newest first.
    pub fn notifications(&self) -> &[Notification] {
        self.inbox.notifications()
    }

    /// Process an event.
    pub fn handle(&mut self, event: NotificationEvent) -> Vec<NotificationAction> {
        match event {
            NotificationEvent::Start { user_id } => self.handle_start(user_id),
            NotificationEvent::Stop => self.stop(),
            NotificationEvent::StreamOpened { generation } => self.handle_opened(generation),
            NotificationEvent::StreamChunk { generation, bytes } => {
                self.handle_chunk(generation, &bytes)
            },
            NotificationEvent::StreamFailed { generation, reason } => {
                self.handle_failed(generation, &reason)
            },
            NotificationEvent::ListFetched { request, result } => {
                self.handle_list(request, result)
            },
            NotificationEvent::MarkRead { id } => self.handle_mark_read(id),
            NotificationEvent::MarkAllRead => self.handle_mark_all_read(),
            NotificationEvent::ReadCompleted { request, result } => {
                self.handle_read_completed(request, result)
            },
            NotificationEvent::Tick => self.handle_tick(),
        }
    }

    fn handle_start(&mut self, user_id: Option<UserId>) -> Vec<NotificationAction> {
        let Some(user_id) = user_id else {
            debug!("notification stream start without user ignored");
            return vec![];
        };

        let mut actions = Vec::new();
        if self.user_id == Some(user_id) {
            if self.link.state() != ConnectionState::Disconnected {
                return actions;
            }
        } else if self.user_id.is_some() {
            actions.extend(self.stop());
        }

        self.user_id = Some(user_id);
        let Some(generation) = self.link.start() else {
            return actions;
        };
        info!(user_id, generation, "opening notification stream");
        self.decoder = SseDecoder::new();

        actions.push(NotificationAction::StateChanged(ConnectionState::Connecting));
        actions.push(NotificationAction::OpenStream { generation, user_id });
        actions.extend(self.fetch_list(false));
        actions
    }

    fn handle_opened(&mut self, generation: u64) -> Vec<NotificationAction> {
        if !self.link.opened(generation) {
            debug!(generation, "stale stream open ignored");
            return vec![];
        }

        info!(generation, "notification stream connected");
        self.inbox.stream_opened();

        let mut actions = vec![NotificationAction::StateChanged(ConnectionState::Connected)];
        actions.extend(self.fetch_list(true));
        actions
    }

    fn handle_chunk(&mut self, generation: u64, bytes: &Bytes) -> Vec<NotificationAction> {
        if !self.link.is_current(generation) {
            return vec![];
        }

        let events = match self.decoder.feed(bytes) {
            Ok(events) => events,
            Err(err) => {
                let mut actions = vec![NotificationAction::CloseStream { generation }];
                actions.extend(self.handle_failed(generation, &err.to_string()));
                return actions;
            },
        };
        if let Some(retry) = self.decoder.take_retry() {
            debug!(?retry, "server reconnect delay");
            self.retry_floor = Some(retry);
        }

        let mut actions = Vec::new();
        for event in events {
            actions.extend(self.handle_sse_event(event));
        }
        actions
    }

    fn handle_sse_event(&mut self, event: SseEvent) -> Vec<NotificationAction> {
        if event.event == DEFAULT_EVENT {
            return match StreamPayload::parse_generic(&event.data) {
                Ok(StreamPayload::Connect { unread_count }) => {
                    debug!(unread_count, "stream connect frame");
                    self.inbox.set_unread(unread_count);
                    vec![NotificationAction::UnreadChanged(unread_count)]
                },
                Ok(StreamPayload::Heartbeat) => vec![],
                Ok(StreamPayload::Push(push)) => {
                    let signal = match push.kind {
                        Some(NotificationKind::Notice) => StreamSignal::Notice,
                        Some(NotificationKind::Reservation) => StreamSignal::Reservation,
                        Some(NotificationKind::Vaccination) => StreamSignal::Vaccination,
                        None => StreamSignal::Other,
                    };
                    self.accept_push(push, signal, event.id.as_deref(), &event.data)
                },
                Err(err) => {
                    debug!(%err, "malformed stream frame discarded");
                    vec![]
                },
            };
        }

        let (Some(signal), Some(kind)) = (
            StreamSignal::from_event_name(&event.event),
            NotificationKind::from_event_name(&event.event),
        ) else {
            debug!(event = %event.event, "unknown stream event ignored");
            return vec![];
        };

        match StreamPayload::parse_named(kind, &event.data) {
            Ok(push) => self.accept_push(push, signal, event.id.as_deref(), &event.data),
            Err(err) => {
                debug!(%err, event = %event.event, "malformed stream event discarded");
                vec![]
            },
        }
    }

    /// Dedup, count, refetch and raise.
    fn accept_push(
        &mut self,
        push: PushEvent,
        signal: StreamSignal,
        event_id: Option<&str>,
        data: &str,
    ) -> Vec<NotificationAction> {
        let key = push
            .identity
            .clone()
            .or_else(|| event_id.map(str::to_string))
            .unwrap_or_else(|| data.to_string());

        if !self.dedup.check(key, self.env.now()) {
            debug!(identity = ?push.identity, "duplicate stream event suppressed");
            return vec![];
        }

        let mut actions = Vec::new();

        // A refresh tells the board to reload; it does not announce a new item.
        if signal != StreamSignal::NoticeRefresh {
            let id = push.identity.as_deref().and_then(|id| id.parse::<NotificationId>().ok());
            if self.inbox.record_arrival(id, push.unread) {
                actions.push(NotificationAction::UnreadChanged(self.inbox.unread_count()));
            }
        }

        actions.extend(self.fetch_list(false));
        actions.push(NotificationAction::Raise { signal, body: push.body });
        actions
    }

    fn handle_failed(&mut self, generation: u64, reason: &str) -> Vec<NotificationAction> {
        match self.link.failed(generation, self.env.now(), self.retry_floor) {
            LinkFailure::Stale => {
                debug!(generation, "stale stream failure ignored");
                vec![]
            },
            LinkFailure::Retry { delay, attempt } => {
                warn!(reason, ?delay, attempt, "notification stream lost, reconnect scheduled");
                vec![
                    NotificationAction::StateChanged(ConnectionState::Disconnected),
                    NotificationAction::StateChanged(ConnectionState::Reconnecting),
                    NotificationAction::ScheduleReconnect { delay },
                ]
            },
            LinkFailure::GaveUp { attempts } => {
                warn!(reason, attempts, "notification stream lost, giving up");
                vec![
                    NotificationAction::StateChanged(ConnectionState::Disconnected),
                    NotificationAction::Error(UserError::NotificationsUnavailable { attempts }),
                ]
            },
        }
    }

    fn handle_list(
        &mut self,
        request: RequestId,
        result: Result<Vec<Notification>, FetchError>,
    ) -> Vec<NotificationAction> {
        if self.latest_fetch != Some(request) {
            debug!(request, "superseded notification list ignored");
            return vec![];
        }
        self.latest_fetch = None;

        match result {
            Ok(notifications) => {
                let before = self.inbox.unread_count();
                let pending: HashSet<_> = self.pending_reads.values().map(|mark| mark.id).collect();
                self.inbox.replace(notifications, self.reconcile, &pending);
                self.reconcile = false;

                let mut actions = vec![NotificationAction::ListChanged];
                let after = self.inbox.unread_count();
                if after != before {
                    actions.push(NotificationAction::UnreadChanged(after));
                }
                actions
            },
            Err(err) => {
                // Background refresh: the next push or reconnect fetches again.
                warn!(%err, "notification list fetch failed");
                vec![]
            },
        }
    }

    fn handle_mark_read(&mut self, id: NotificationId) -> Vec<NotificationAction> {
        let Some(mark) = self.inbox.mark_read(id) else {
            debug!(id, "notification already read");
            return vec![];
        };

        let mut actions = Vec::with_capacity(3);
        if mark.decremented {
            actions.push(NotificationAction::UnreadChanged(self.inbox.unread_count()));
        }
        actions.push(NotificationAction::ListChanged);
        actions.push(self.patch_read(mark));
        actions
    }

    fn handle_mark_all_read(&mut self) -> Vec<NotificationAction> {
        let marks = self.inbox.mark_all_read();

        let mut actions = vec![
            NotificationAction::UnreadChanged(0),
            NotificationAction::ListChanged,
        ];
        for mark in marks {
            actions.push(self.patch_read(mark));
        }
        actions
    }

    fn patch_read(&mut self, mark: ReadMark) -> NotificationAction {
        let request = self.next_request_id();
        self.pending_reads.insert(request, mark);
        NotificationAction::PatchRead { request, id: mark.id }
    }

    fn handle_read_completed(
        &mut self,
        request: RequestId,
        result: Result<(), FetchError>,
    ) -> Vec<NotificationAction> {
        let Some(mark) = self.pending_reads.remove(&request) else {
            debug!(request, "stale read-mark result ignored");
            return vec![];
        };

        match result {
            Ok(()) => vec![],
            Err(err) => {
                warn!(%err, id = mark.id, "notification read-mark failed, reverting");
                self.inbox.revert(mark);
                vec![
                    NotificationAction::UnreadChanged(self.inbox.unread_count()),
                    NotificationAction::ListChanged,
                    NotificationAction::Error(UserError::ReadMarkFailed {
                        reason: err.to_string(),
                    }),
                ]
            },
        }
    }

    fn handle_tick(&mut self) -> Vec<NotificationAction> {
        let Some(user_id) = self.user_id else {
            return vec![];
        };
        let Some(generation) = self.link.poll_retry(self.env.now()) else {
            return vec![];
        };

        info!(generation, attempt = self.link.attempts(), "reconnecting notification stream");
        self.decoder.reset();
        vec![
            NotificationAction::StateChanged(ConnectionState::Connecting),
            NotificationAction::OpenStream { generation, user_id },
        ]
    }

    fn fetch_list(&mut self, reconcile: bool) -> Vec<NotificationAction> {
        let Some(user_id) = self.user_id else {
            return vec![];
        };

        let request = self.next_request_id();
        self.latest_fetch = Some(request);
        self.reconcile |= reconcile;
        vec![NotificationAction::FetchList { request, user_id, size: self.config.page_size }]
    }

    /// Close the stream and forget the user.
    fn stop(&mut self) -> Vec<NotificationAction> {
        let generation = self.link.generation();
        let mut actions = Vec::new();

        if self.link.is_current(generation) {
            actions.push(NotificationAction::CloseStream { generation });
        }
        if self.link.state() != ConnectionState::Disconnected {
            actions.push(NotificationAction::StateChanged(ConnectionState::Disconnected));
        }
        self.link.close();

        if let Some(user_id) = self.user_id.take() {
            info!(user_id, "notification stream stopped");
        }
        self.decoder = SseDecoder::new();
        self.retry_floor = None;
        self.dedup.clear();
        self.inbox.clear();
        self.latest_fetch = None;
        self.reconcile = false;
        self.pending_reads.clear();
        actions
    }

    fn next_request_id(&mut self) -> RequestId {
        self.next_request = self.next_request.wrapping_add(1);
        self.next_request
    }
}
