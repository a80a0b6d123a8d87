//! `text/event-stream` body as raw byte chunks.
//!
//! Parsing stays in the [`crate::NotificationStream`]; this only checks the
//! response and forwards body chunks as they arrive.

use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::debug;
use vetlink_proto::UserId;

use super::{RestClient, TransportError};

const CHANNEL_CAPACITY: usize = 64;

/// Something that happened on the event stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Body bytes, chunked arbitrarily.
    Chunk(Bytes),
    /// The stream is gone. Always the last event.
    Closed(String),
}

/// Handle to an open event stream.
///
/// Dropping the handle aborts the reader task.
pub struct EventStream {
    from_server: mpsc::Receiver<StreamEvent>,
    abort_handle: AbortHandle,
}

impl EventStream {
    /// Subscribe to `user_id`'s notification stream.
    ///
    /// # Errors
    ///
    /// - `TransportError::Connection` if the request fails or the status is
    ///   not 2xx
    /// - `TransportError::Protocol` if the response is not an event stream
    pub async fn connect(rest: &RestClient, user_id: UserId) -> Result<Self, TransportError> {
        let url = rest.endpoints().stream_url(user_id)?;
        let response = rest
            .http()
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| TransportError::Connection(format!("event stream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Connection(format!("event stream returned {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !is_event_stream(content_type) {
            return Err(TransportError::Protocol(format!(
                "expected text/event-stream, got {content_type:?}"
            )));
        }
        debug!(user_id, "event stream open");

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let reason = loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        if tx.send(StreamEvent::Chunk(chunk)).await.is_err() {
                            return;
                        }
                    },
                    Some(Err(e)) => break format!("read failed: {e}"),
                    None => break "stream ended".to_string(),
                }
            };
            debug!(reason, "event stream closed");
            let _ = tx.send(StreamEvent::Closed(reason)).await;
        });

        Ok(Self { from_server: rx, abort_handle: handle.abort_handle() })
    }

    /// Next event. `None` once [`StreamEvent::Closed`] has been delivered.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.from_server.recv().await
    }

    /// Stop reading.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/event-stream"))
}
