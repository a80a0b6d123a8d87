//! Websocket carrying STOMP frames.
//!
//! Provides [`StompSocket`], a handle to a connection task. Frames and
//! heart-beats go out through one channel and come back through another; the
//! task owns the websocket and ends with exactly one [`SocketEvent::Closed`].

use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::AbortHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::COOKIE},
    },
};
use tracing::{debug, warn};
use vetlink_proto::StompFrame;

use super::{Endpoints, TransportError};

const CHANNEL_CAPACITY: usize = 64;

/// Something that happened on the socket.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A STOMP frame arrived.
    Frame(StompFrame),
    /// A bare end-of-line heart-beat arrived.
    Heartbeat,
    /// The connection is gone. Always the last event.
    Closed(String),
}

enum Outbound {
    Frame(StompFrame),
    Heartbeat,
}

/// Handle to an open STOMP websocket.
///
/// Dropping the handle aborts the connection task.
pub struct StompSocket {
    to_server: mpsc::Sender<Outbound>,
    from_server: mpsc::Receiver<SocketEvent>,
    abort_handle: AbortHandle,
}

impl StompSocket {
    /// Open the websocket at the endpoints' socket URL.
    ///
    /// # Errors
    ///
    /// - `TransportError::Connection` if the upgrade fails or the cookie is
    ///   not a valid header value
    pub async fn connect(endpoints: &Endpoints) -> Result<Self, TransportError> {
        let mut request = endpoints
            .socket_url()
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connection(format!("invalid request: {e}")))?;
        if let Some(cookie) = endpoints.cookie() {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| TransportError::Connection(format!("invalid cookie: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connection(format!("websocket upgrade failed: {e}")))?;
        debug!(url = %endpoints.socket_url(), "websocket open");

        let (to_server_tx, to_server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (from_server_tx, from_server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(run_connection(ws, to_server_rx, from_server_tx));

        Ok(Self {
            to_server: to_server_tx,
            from_server: from_server_rx,
            abort_handle: handle.abort_handle(),
        })
    }

    /// Queue a frame for sending.
    ///
    /// # Errors
    ///
    /// - `TransportError::Stream` if the connection task has ended
    pub async fn send_frame(&self, frame: StompFrame) -> Result<(), TransportError> {
        self.to_server
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| TransportError::Stream("socket closed".to_string()))
    }

    /// Queue an end-of-line heart-beat.
    ///
    /// # Errors
    ///
    /// - `TransportError::Stream` if the connection task has ended
    pub async fn send_heartbeat(&self) -> Result<(), TransportError> {
        self.to_server
            .send(Outbound::Heartbeat)
            .await
            .map_err(|_| TransportError::Stream("socket closed".to_string()))
    }

    /// Next event. `None` once [`SocketEvent::Closed`] has been delivered.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.from_server.recv().await
    }

    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for StompSocket {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Bridge between the channels and the websocket.
async fn run_connection(
    ws: Socket,
    mut to_server: mpsc::Receiver<Outbound>,
    from_server: mpsc::Sender<SocketEvent>,
) {
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            outbound = to_server.recv() => {
                let Some(outbound) = outbound else {
                    let _ = sink.close().await;
                    break "closed locally".to_string();
                };
                let text = match outbound {
                    Outbound::Frame(frame) => match frame.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, command = %frame.command, "frame not sent");
                            continue;
                        },
                    },
                    Outbound::Heartbeat => "\n".to_string(),
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    break format!("write failed: {e}");
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !forward(text.as_str().as_bytes(), &from_server).await {
                        return;
                    }
                },
                Some(Ok(Message::Binary(bytes))) => {
                    if !forward(&bytes, &from_server).await {
                        return;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by server".to_string(),
                        |f| format!("closed by server: {} {}", f.code, f.reason.as_str()),
                    );
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break format!("read failed: {e}"),
                None => break "connection ended".to_string(),
            },
        }
    };

    debug!(reason, "websocket closed");
    let _ = from_server.send(SocketEvent::Closed(reason)).await;
}

/// Decode one websocket message and pass its frames on. Returns `false` once
/// nobody is listening.
async fn forward(bytes: &[u8], from_server: &mpsc::Sender<SocketEvent>) -> bool {
    let events = match StompFrame::decode_all(bytes) {
        Ok(frames) if frames.is_empty() => vec![SocketEvent::Heartbeat],
        Ok(frames) => frames.into_iter().map(SocketEvent::Frame).collect(),
        Err(e) => {
            debug!(error = %e, len = bytes.len(), "malformed STOMP frame discarded");
            return true;
        },
    };

    for event in events {
        if from_server.send(event).await.is_err() {
            return false;
        }
    }
    true
}
