//! Client error types.
//!
//! [`FetchError`] describes a failed REST call and travels back into the
//! state machines inside result events. [`UserError`] is what a person sees:
//! the state machines emit it as an action when a foreground operation
//! (send, history load, read-mark) cannot be honoured.

use thiserror::Error;

/// REST call failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Backend answered with a non-2xx status
    #[error("server returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Backend answered with something other than JSON (login page, proxy
    /// error page)
    #[error("unexpected content type {content_type:?}")]
    ContentType {
        /// Received `Content-Type`
        content_type: String,
    },

    /// Request did not complete
    #[error("network error: {0}")]
    Network(String),

    /// Body was JSON but not the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Foreground failure shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UserError {
    /// Chat socket is not connected
    #[error("Not connected to the chat server. Your message was not sent.")]
    NotConnected,

    /// Room or user is unknown
    #[error("No chat room is open.")]
    MissingIdentity,

    /// Message could not be encoded
    #[error("Message could not be sent: {reason}")]
    SendFailed {
        /// Underlying cause
        reason: String,
    },

    /// Chat history could not be loaded
    #[error("Could not load chat history: {reason}")]
    HistoryUnavailable {
        /// Underlying cause
        reason: String,
    },

    /// Read state could not be saved and was restored
    #[error("Could not mark as read: {reason}")]
    ReadMarkFailed {
        /// Underlying cause
        reason: String,
    },

    /// Notification stream stopped retrying
    #[error("Live notifications are unavailable after {attempts} attempts.")]
    NotificationsUnavailable {
        /// Failed attempts before giving up
        attempts: u32,
    },
}
