//! Live driver for the CLI.
//!
//! Implements the [`Driver`] trait over the production transports: a
//! tokio-tungstenite STOMP socket, a reqwest event stream and REST client,
//! and stdin lines for commands. Output goes through a [`Printer`].

use std::{collections::VecDeque, future::Future, time::Duration};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::debug;
use vetlink_app::{Command, Driver, DriverEvent, View};
use vetlink_client::{
    FetchError, HistoryQuery,
    transport::{EventStream, RestClient, SocketEvent, StompSocket, StreamEvent, TransportError},
};
use vetlink_proto::{MessagePage, Notification, NotificationId, RoomId, StompFrame, UserId};

use crate::printer::Printer;

/// How long one poll waits for input before the runtime ticks.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Longest wait for a socket or stream to open.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live driver errors.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Terminal I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operation on a socket or stream that is no longer open.
    #[error("{0} is not open")]
    NotOpen(&'static str),
}

/// Driver talking to the real backend.
pub struct LiveDriver {
    rest: RestClient,
    socket: Option<(u64, StompSocket)>,
    stream: Option<(u64, EventStream)>,
    stdin: Lines<BufReader<Stdin>>,
    stdin_open: bool,
    queued: VecDeque<Command>,
    printer: Printer,
}

impl LiveDriver {
    /// Create a driver reading commands from stdin.
    pub fn new(rest: RestClient) -> Self {
        Self {
            rest,
            socket: None,
            stream: None,
            stdin: BufReader::new(tokio::io::stdin()).lines(),
            stdin_open: true,
            queued: VecDeque::new(),
            printer: Printer::new(),
        }
    }

    /// Run `command` before reading stdin.
    pub fn queue(&mut self, command: Command) {
        self.queued.push_back(command);
    }

    fn socket(&self, generation: u64) -> Result<&StompSocket, LiveError> {
        match &self.socket {
            Some((current, socket)) if *current == generation => Ok(socket),
            _ => Err(LiveError::NotOpen("socket")),
        }
    }
}

/// Await a connection attempt for at most `limit`.
async fn connect_within<T>(
    limit: Duration,
    connect: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(limit, connect).await {
        Ok(result) => result,
        Err(_elapsed) => Err(TransportError::Timeout(limit)),
    }
}

async fn next_socket_event(socket: &mut Option<(u64, StompSocket)>) -> DriverEvent {
    let Some((generation, handle)) = socket.as_mut() else {
        return std::future::pending().await;
    };
    let generation = *generation;

    match handle.recv().await {
        Some(SocketEvent::Frame(frame)) => DriverEvent::SocketFrame { generation, frame },
        Some(SocketEvent::Heartbeat) => DriverEvent::SocketHeartbeat { generation },
        Some(SocketEvent::Closed(reason)) => {
            *socket = None;
            DriverEvent::SocketClosed { generation, reason }
        },
        None => {
            *socket = None;
            DriverEvent::SocketClosed { generation, reason: "connection task ended".to_string() }
        },
    }
}

async fn next_stream_event(stream: &mut Option<(u64, EventStream)>) -> DriverEvent {
    let Some((generation, handle)) = stream.as_mut() else {
        return std::future::pending().await;
    };
    let generation = *generation;

    match handle.recv().await {
        Some(StreamEvent::Chunk(bytes)) => DriverEvent::StreamChunk { generation, bytes },
        Some(StreamEvent::Closed(reason)) => {
            *stream = None;
            DriverEvent::StreamClosed { generation, reason }
        },
        None => {
            *stream = None;
            DriverEvent::StreamClosed { generation, reason: "stream task ended".to_string() }
        },
    }
}

impl Driver for LiveDriver {
    type Error = LiveError;

    async fn poll_event(&mut self) -> Result<Option<DriverEvent>, Self::Error> {
        if let Some(command) = self.queued.pop_front() {
            return Ok(Some(DriverEvent::Command(command)));
        }

        tokio::select! {
            biased;

            line = self.stdin.next_line(), if self.stdin_open => {
                match line? {
                    Some(line) => {
                        let command = Command::parse(&line);
                        if command.is_none() {
                            debug!("empty input line ignored");
                        }
                        Ok(command.map(DriverEvent::Command))
                    },
                    None => {
                        self.stdin_open = false;
                        Ok(Some(DriverEvent::Command(Command::Quit)))
                    },
                }
            }

            event = next_socket_event(&mut self.socket) => Ok(Some(event)),

            event = next_stream_event(&mut self.stream) => Ok(Some(event)),

            () = tokio::time::sleep(POLL_INTERVAL) => Ok(None),
        }
    }

    async fn open_socket(&mut self, generation: u64) -> Result<(), Self::Error> {
        self.close_socket_any();
        let socket =
            connect_within(CONNECT_TIMEOUT, StompSocket::connect(self.rest.endpoints())).await?;
        self.socket = Some((generation, socket));
        Ok(())
    }

    async fn send_frame(&mut self, generation: u64, frame: StompFrame) -> Result<(), Self::Error> {
        Ok(self.socket(generation)?.send_frame(frame).await?)
    }

    async fn send_heartbeat(&mut self, generation: u64) -> Result<(), Self::Error> {
        Ok(self.socket(generation)?.send_heartbeat().await?)
    }

    fn close_socket(&mut self, generation: u64) {
        if self.socket.as_ref().is_some_and(|(current, _)| *current == generation) {
            self.close_socket_any();
        }
    }

    async fn open_stream(&mut self, generation: u64, user_id: UserId) -> Result<(), Self::Error> {
        self.close_stream_any();
        let stream =
            connect_within(CONNECT_TIMEOUT, EventStream::connect(&self.rest, user_id)).await?;
        self.stream = Some((generation, stream));
        Ok(())
    }

    fn close_stream(&mut self, generation: u64) {
        if self.stream.as_ref().is_some_and(|(current, _)| *current == generation) {
            self.close_stream_any();
        }
    }

    async fn fetch_history(&mut self, query: HistoryQuery) -> Result<MessagePage, FetchError> {
        self.rest.fetch_history(query).await
    }

    async fn mark_room_read(&mut self, room_id: RoomId, user_id: UserId) -> Result<(), FetchError> {
        self.rest.mark_room_read(room_id, user_id).await
    }

    async fn fetch_notifications(
        &mut self,
        user_id: UserId,
        size: u32,
    ) -> Result<Vec<Notification>, FetchError> {
        self.rest.fetch_notifications(user_id, size).await
    }

    async fn mark_notification_read(&mut self, id: NotificationId) -> Result<(), FetchError> {
        self.rest.mark_notification_read(id).await
    }

    fn render(&mut self, view: &View<'_>) -> Result<(), Self::Error> {
        self.printer.render(view)?;
        Ok(())
    }

    fn stop(&mut self) {
        self.close_socket_any();
        self.close_stream_any();
    }
}

impl LiveDriver {
    fn close_socket_any(&mut self) {
        if let Some((_, socket)) = self.socket.take() {
            socket.stop();
        }
    }

    fn close_stream_any(&mut self) {
        if let Some((_, stream)) = self.stream.take() {
            stream.stop();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hung_connect_times_out() {
        let limit = Duration::from_millis(20);
        let hung = std::future::pending::<Result<(), TransportError>>();

        let err = connect_within(limit, hung).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(d) if d == limit));
    }

    #[tokio::test]
    async fn prompt_connect_passes_through() {
        let ready = async { Err::<(), _>(TransportError::Connection("refused".into())) };

        let err = connect_within(CONNECT_TIMEOUT, ready).await.unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)));
    }
}
