//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI's live driver but
//! routes every call to a [`SimBackend`]. The same [`vetlink_app::Runtime`]
//! orchestration code runs in both production and simulation.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    collections::VecDeque,
    sync::{MutexGuard, PoisonError},
};

use vetlink_app::{Command, Driver, DriverEvent, View};
use vetlink_client::{FetchError, HistoryQuery};
use vetlink_proto::{MessagePage, Notification, NotificationId, RoomId, StompFrame, UserId};

use crate::{
    invariants::{InvariantRegistry, ViewSnapshot},
    sim_backend::{SharedBackend, SimBackend},
};

/// Error type for simulation driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimDriverError: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    backend: SharedBackend,
    commands: VecDeque<Command>,
    invariants: InvariantRegistry,
    frames: Vec<ViewSnapshot>,
    stopped: bool,
}

impl SimDriver {
    /// Driver talking to `backend`, checking the standard invariants on
    /// every render.
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            commands: VecDeque::new(),
            invariants: InvariantRegistry::standard(),
            frames: Vec::new(),
            stopped: false,
        }
    }

    /// Replace the invariants checked on render.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = registry;
        self
    }

    /// Queue a user command.
    pub fn inject_command(&mut self, command: Command) {
        self.commands.push_back(command);
    }

    /// Whether commands or backend events are waiting.
    pub fn has_pending(&self) -> bool {
        !self.commands.is_empty() || self.backend().has_pending()
    }

    /// Every frame rendered so far.
    pub fn frames(&self) -> &[ViewSnapshot] {
        &self.frames
    }

    /// Most recent frame.
    pub fn last_frame(&self) -> Option<&ViewSnapshot> {
        self.frames.last()
    }

    /// Whether the runtime shut the driver down.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn backend(&self) -> MutexGuard<'_, SimBackend> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        if let Some(command) = self.commands.pop_front() {
            return Ok(Some(DriverEvent::Command(command)));
        }
        Ok(self.backend().next_event())
    }

    async fn open_socket(&mut self, generation: u64) -> Result<(), Self::Error> {
        self.backend().open_socket(generation)
    }

    async fn send_frame(&mut self, generation: u64, frame: StompFrame) -> Result<(), Self::Error> {
        self.backend().client_frame(generation, &frame)
    }

    async fn send_heartbeat(&mut self, generation: u64) -> Result<(), Self::Error> {
        self.backend().heartbeat(generation)
    }

    fn close_socket(&mut self, generation: u64) {
        self.backend().close_socket(generation);
    }

    async fn open_stream(&mut self, generation: u64, user_id: UserId) -> Result<(), Self::Error> {
        self.backend().open_stream(generation, user_id)
    }

    fn close_stream(&mut self, generation: u64) {
        self.backend().close_stream(generation);
    }

    async fn fetch_history(&mut self, query: HistoryQuery) -> Result<MessagePage, FetchError> {
        self.backend().history(query)
    }

    async fn mark_room_read(&mut self, room_id: RoomId, user_id: UserId) -> Result<(), FetchError> {
        self.backend().mark_room_read(room_id, user_id)
    }

    async fn fetch_notifications(
        &mut self,
        user_id: UserId,
        size: u32,
    ) -> Result<Vec<Notification>, FetchError> {
        self.backend().list(user_id, size)
    }

    async fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), FetchError> {
        self.backend().mark_notification_read(id)
    }

    fn render(&mut self, view: &View<'_>) -> Result<(), Self::Error> {
        let frame = ViewSnapshot::capture(view);
        let checked = self.invariants.check_all(&frame);
        self.frames.push(frame);

        checked.map_err(|violations| {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            SimDriverError(format!("invariant violation: {}", messages.join("; ")))
        })
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
