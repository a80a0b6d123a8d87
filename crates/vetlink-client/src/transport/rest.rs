//! REST calls over reqwest.
//!
//! Every response is checked for a 2xx status and, when a body is expected,
//! a JSON content type. A login page or proxy error page served with status
//! 200 is a [`FetchError::ContentType`], never a decode attempt.

use reqwest::{
    Response,
    header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;
use vetlink_proto::{MessagePage, Notification, NotificationId, NotificationList, RoomId, UserId};

use super::{Endpoints, TransportError};
use crate::{error::FetchError, event::HistoryQuery};

/// REST client for history, notification and read-mark calls.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    endpoints: Endpoints,
}

impl RestClient {
    /// Client sending the endpoints' session cookie with every request.
    ///
    /// # Errors
    ///
    /// - `TransportError::Connection` if the cookie is not a valid header
    ///   value or the HTTP client cannot be built
    pub fn new(endpoints: Endpoints) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = endpoints.cookie() {
            let mut value = HeaderValue::from_str(cookie)
                .map_err(|e| TransportError::Connection(format!("invalid cookie: {e}")))?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Connection(format!("http client: {e}")))?;

        Ok(Self { http, endpoints })
    }

    /// Endpoints this client talks to.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Fetch a page of chat history.
    ///
    /// # Errors
    ///
    /// See [`FetchError`].
    pub async fn fetch_history(&self, query: HistoryQuery) -> Result<MessagePage, FetchError> {
        let url = self.endpoints.history_url(&query).map_err(invalid_url)?;
        self.get_json(url).await
    }

    /// Persist that `user_id` read everything in `room_id`.
    ///
    /// # Errors
    ///
    /// See [`FetchError`].
    pub async fn mark_room_read(&self, room_id: RoomId, user_id: UserId) -> Result<(), FetchError> {
        let url = self.endpoints.mark_read_url(room_id, user_id).map_err(invalid_url)?;
        let response = self.http.post(url).send().await.map_err(network)?;
        check_status(&response)?;
        Ok(())
    }

    /// Fetch the newest `size` notifications of `user_id`.
    ///
    /// # Errors
    ///
    /// See [`FetchError`].
    pub async fn fetch_notifications(
        &self,
        user_id: UserId,
        size: u32,
    ) -> Result<Vec<Notification>, FetchError> {
        let url = self.endpoints.notifications_url(user_id, size).map_err(invalid_url)?;
        let list: NotificationList = self.get_json(url).await?;
        Ok(list.content)
    }

    /// Mark one notification read.
    ///
    /// # Errors
    ///
    /// See [`FetchError`].
    pub async fn mark_notification_read(&self, id: NotificationId) -> Result<(), FetchError> {
        let url = self.endpoints.notification_read_url(id).map_err(invalid_url)?;
        let response = self.http.patch(url).send().await.map_err(network)?;
        check_status(&response)?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await.map_err(network)?;
        check_status(&response)?;
        check_json(&response)?;

        let body = response.bytes().await.map_err(network)?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn check_status(response: &Response) -> Result<(), FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::Status { status: status.as_u16() })
    }
}

fn check_json(response: &Response) -> Result<(), FetchError> {
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if is_json(content_type) {
        Ok(())
    } else {
        Err(FetchError::ContentType { content_type: content_type.to_string() })
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("application/json")
        || essence.get(essence.len().saturating_sub(5)..).is_some_and(|s| s.eq_ignore_ascii_case("+json"))
}

fn network(err: reqwest::Error) -> FetchError {
    FetchError::Network(err.to_string())
}

fn invalid_url(err: TransportError) -> FetchError {
    FetchError::Network(err.to_string())
}
