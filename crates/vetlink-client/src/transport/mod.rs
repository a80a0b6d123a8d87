//! Production transports for the client.
//!
//! Thin layers that move bytes and nothing else. Protocol logic stays in the
//! Sans-IO [`crate::ChatSession`] and [`crate::NotificationStream`]; these
//! types only open connections, forward frames or chunks through channels,
//! and perform REST calls.

mod event_stream;
mod rest;
mod socket;
mod system_env;

use std::time::Duration;

use thiserror::Error;
use url::Url;
use vetlink_proto::{NotificationId, RoomId, UserId};

pub use event_stream::{EventStream, StreamEvent};
pub use rest::RestClient;
pub use socket::{SocketEvent, StompSocket};
pub use system_env::SystemEnv;

use crate::event::HistoryQuery;

/// Default websocket path, relative to the server origin.
pub const DEFAULT_SOCKET_PATH: &str = "/ws-stomp";

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection attempt did not finish in time.
    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Backend locations and credentials.
///
/// REST paths resolve against `api_base`, which always ends in `/`. The
/// websocket lives at the server origin with the scheme switched to
/// `ws`/`wss`.
#[derive(Debug, Clone)]
pub struct Endpoints {
    api_base: Url,
    socket_url: Url,
    cookie: Option<String>,
}

impl Endpoints {
    /// Endpoints for the API rooted at `api_base`, e.g.
    /// `https://clinic.example/api`.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if `api_base` does not parse or is not
    ///   http(s)
    pub fn new(api_base: &str) -> Result<Self, TransportError> {
        let mut api_base =
            Url::parse(api_base).map_err(|e| TransportError::InvalidUrl(format!("{api_base}: {e}")))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let socket_url = socket_url(&api_base, DEFAULT_SOCKET_PATH)?;
        Ok(Self { api_base, socket_url, cookie: None })
    }

    /// Serve the websocket from another path on the same origin.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if the path does not resolve
    pub fn with_socket_path(mut self, path: &str) -> Result<Self, TransportError> {
        self.socket_url = socket_url(&self.api_base, path)?;
        Ok(self)
    }

    /// Send `cookie` as the `Cookie` header on every request.
    #[must_use]
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Session cookie, if any.
    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    /// Websocket URL.
    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }

    /// URL answering a history query.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if the path does not resolve
    pub fn history_url(&self, query: &HistoryQuery) -> Result<Url, TransportError> {
        let mut url = match query {
            HistoryQuery::Latest { room_id } => {
                self.api(&format!("chat/rooms/{room_id}/messages/page"))?
            },
            HistoryQuery::Before { room_id, .. } => {
                self.api(&format!("chat/rooms/{room_id}/messages/prev"))?
            },
        };

        {
            let mut pairs = url.query_pairs_mut();
            if let HistoryQuery::Before { last_message_id, .. } = query {
                pairs.append_pair("lastMessageId", &last_message_id.to_string());
            }
            pairs.append_pair("page", "0");
        }
        Ok(url)
    }

    /// URL marking a room read for a user.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if the path does not resolve
    pub fn mark_read_url(&self, room_id: RoomId, user_id: UserId) -> Result<Url, TransportError> {
        let mut url = self.api(&format!("chat/rooms/{room_id}/read"))?;
        url.query_pairs_mut().append_pair("userId", &user_id.to_string());
        Ok(url)
    }

    /// URL listing a user's notifications.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if the path does not resolve
    pub fn notifications_url(&self, user_id: UserId, size: u32) -> Result<Url, TransportError> {
        let mut url = self.api("notifications")?;
        url.query_pairs_mut()
            .append_pair("userId", &user_id.to_string())
            .append_pair("size", &size.to_string());
        Ok(url)
    }

    /// URL marking one notification read.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if the path does not resolve
    pub fn notification_read_url(&self, id: NotificationId) -> Result<Url, TransportError> {
        self.api(&format!("notifications/{id}/read"))
    }

    /// URL of a user's event stream.
    ///
    /// # Errors
    ///
    /// - `TransportError::InvalidUrl` if the path does not resolve
    pub fn stream_url(&self, user_id: UserId) -> Result<Url, TransportError> {
        let mut url = self.api("notifications/connect")?;
        url.query_pairs_mut().append_pair("userId", &user_id.to_string());
        Ok(url)
    }

    fn api(&self, path: &str) -> Result<Url, TransportError> {
        self.api_base.join(path).map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))
    }
}

fn socket_url(api_base: &Url, path: &str) -> Result<Url, TransportError> {
    let mut url =
        api_base.join(path).map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => return Err(TransportError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::InvalidUrl(format!("cannot use scheme {scheme}")))?;
    url.set_query(None);
    Ok(url)
}
