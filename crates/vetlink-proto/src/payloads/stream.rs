//! Event-stream bodies.
//!
//! Every `data:` body on the notification stream is a JSON object. Generic
//! (`message`) events carry a `type` label; the `connect` and `heartbeat`
//! types are control frames, anything else describes a notification. Named
//! events (`notice`, `reservation`, ...) always describe a notification.

use serde_json::{Map, Value};

use super::notification::NotificationKind;
use crate::errors::{ProtocolError, Result};

/// Classified event-stream body.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPayload {
    /// Sent once after the stream opens; authoritative unread count.
    Connect {
        /// Unread notifications for the user
        unread_count: u32,
    },
    /// Keep-alive, carries nothing.
    Heartbeat,
    /// Something happened that the notification list should reflect.
    Push(PushEvent),
}

/// A notification signal.
///
/// The push is a hint to refetch, not the record of truth; only the fields
/// needed for de-duplication and unread tracking are extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    /// Stable identity for de-duplication. `None` if the body has no id.
    pub identity: Option<String>,
    /// Kind, when the body names one
    pub kind: Option<NotificationKind>,
    /// Whether the described notification is unread
    pub unread: bool,
    /// Full body
    pub body: Value,
}

impl StreamPayload {
    /// Classify a generic `message` event body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Json` if the body is not a JSON object
    pub fn parse_generic(data: &str) -> Result<Self> {
        let object = parse_object(data)?;

        match object.get("type").and_then(Value::as_str) {
            Some(label) if label.eq_ignore_ascii_case("connect") => {
                let unread_count = object
                    .get("unreadCount")
                    .and_then(Value::as_u64)
                    .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));
                Ok(Self::Connect { unread_count })
            },
            Some(label) if label.eq_ignore_ascii_case("heartbeat") => Ok(Self::Heartbeat),
            _ => Ok(Self::Push(PushEvent::from_object(object, None))),
        }
    }

    /// Parse the body of a named event such as `notice` or `vaccination`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Json` if the body is not a JSON object
    pub fn parse_named(kind: NotificationKind, data: &str) -> Result<PushEvent> {
        let object = parse_object(data)?;
        Ok(PushEvent::from_object(object, Some(kind)))
    }
}

impl PushEvent {
    fn from_object(object: Map<String, Value>, kind: Option<NotificationKind>) -> Self {
        let identity = ["notificationId", "id"]
            .iter()
            .find_map(|key| object.get(*key))
            .and_then(|value| match value {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            });

        let kind = kind.or_else(|| {
            object.get("type").and_then(Value::as_str).and_then(NotificationKind::from_label)
        });

        let unread = !["isRead", "read"]
            .iter()
            .find_map(|key| object.get(*key))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Self { identity, kind, unread, body: Value::Object(object) }
    }
}

fn parse_object(data: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(data)? {
        Value::Object(object) => Ok(object),
        other => Err(ProtocolError::Json(format!("expected object, got {other}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn connect_frame_carries_unread_count() {
        let payload = StreamPayload::parse_generic(r#"{"type":"connect","unreadCount":7}"#).unwrap();
        assert_eq!(payload, StreamPayload::Connect { unread_count: 7 });
    }

    #[test]
    fn connect_without_count_is_zero() {
        let payload = StreamPayload::parse_generic(r#"{"type":"CONNECT"}"#).unwrap();
        assert_eq!(payload, StreamPayload::Connect { unread_count: 0 });
    }

    #[test]
    fn heartbeat_recognised() {
        let payload = StreamPayload::parse_generic(r#"{"type":"heartbeat"}"#).unwrap();
        assert_eq!(payload, StreamPayload::Heartbeat);
    }

    #[test]
    fn other_generic_frames_are_pushes() {
        let payload =
            StreamPayload::parse_generic(r#"{"type":"VACCINATION","id":12,"isRead":false}"#).unwrap();
        let StreamPayload::Push(push) = payload else {
            panic!("expected push");
        };
        assert_eq!(push.identity.as_deref(), Some("12"));
        assert_eq!(push.kind, Some(NotificationKind::Vaccination));
        assert!(push.unread);
    }

    #[test]
    fn named_event_identity_prefers_notification_id() {
        let push = StreamPayload::parse_named(
            NotificationKind::Notice,
            r#"{"notificationId":"n-5","id":99,"read":true}"#,
        )
        .unwrap();
        assert_eq!(push.identity.as_deref(), Some("n-5"));
        assert_eq!(push.kind, Some(NotificationKind::Notice));
        assert!(!push.unread);
    }

    #[test]
    fn malformed_bodies_are_errors() {
        assert!(StreamPayload::parse_generic("<!DOCTYPE html><html>").is_err());
        assert!(StreamPayload::parse_generic("[1,2]").is_err());
        assert!(StreamPayload::parse_named(NotificationKind::Notice, "").is_err());
    }
}
