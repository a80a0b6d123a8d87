//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. Each frontend implements it to provide platform-specific
//! sockets, HTTP and input, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::future::Future;

use vetlink_client::{FetchError, HistoryQuery};
use vetlink_proto::{MessagePage, Notification, NotificationId, RoomId, StompFrame, UserId};

use crate::{DriverEvent, View};

/// Abstracts I/O operations for the application runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. The same
/// orchestration code runs against the live backend and in simulation.
///
/// Socket and stream handles are keyed by generation. A driver keeps at most
/// one of each; opening a new generation replaces the old one, and reports
/// from a replaced handle must carry its old generation.
///
/// # Implementations
///
/// - **CLI**: tokio-tungstenite websocket, reqwest REST and event stream,
///   stdin lines
/// - **Simulation**: in-memory backend with failure injection
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Poll for the next input.
    ///
    /// Returns `None` if nothing is ready. Implementations may wait briefly;
    /// the runtime ticks after every poll.
    fn poll_event(
        &mut self,
    ) -> impl Future<Output = Result<Option<DriverEvent>, Self::Error>> + Send;

    /// Open the chat websocket as `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be opened.
    fn open_socket(&mut self, generation: u64)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write a STOMP frame on socket `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is closed or the write fails.
    fn send_frame(
        &mut self,
        generation: u64,
        frame: StompFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write an end-of-line heart-beat on socket `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is closed or the write fails.
    fn send_heartbeat(&mut self, generation: u64)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close socket `generation` if it is still open.
    fn close_socket(&mut self, generation: u64);

    /// Open the notification stream for `user_id` as `generation`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened or is not an event
    /// stream.
    fn open_stream(
        &mut self,
        generation: u64,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close stream `generation` if it is still open.
    fn close_stream(&mut self, generation: u64);

    /// Fetch a page of chat history.
    fn fetch_history(
        &mut self,
        query: HistoryQuery,
    ) -> impl Future<Output = Result<MessagePage, FetchError>> + Send;

    /// Persist that `user_id` read `room_id`.
    fn mark_room_read(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Fetch the newest `size` notifications of `user_id`.
    fn fetch_notifications(
        &mut self,
        user_id: UserId,
        size: u32,
    ) -> impl Future<Output = Result<Vec<Notification>, FetchError>> + Send;

    /// Persist a notification read-mark.
    fn mark_notification_read(
        &mut self,
        id: NotificationId,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;

    /// Render the application state.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, view: &View<'_>) -> Result<(), Self::Error>;

    /// Release every handle.
    fn stop(&mut self);
}
