//! Notifications delivered to clinic staff.

use serde::{Deserialize, Serialize};

use super::NotificationId;

/// What a notification is about.
///
/// The set is closed; an unknown kind fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Clinic notice board post
    #[serde(alias = "notice")]
    Notice,
    /// Reservation created, changed or cancelled
    #[serde(alias = "reservation")]
    Reservation,
    /// Vaccination due or recorded
    #[serde(alias = "vaccination")]
    Vaccination,
}

impl NotificationKind {
    /// Map a named event-stream category to its kind.
    ///
    /// `notice-refresh` is a notice-board refresh signal and maps to
    /// [`NotificationKind::Notice`].
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "notice" | "notice-refresh" => Some(Self::Notice),
            "reservation" => Some(Self::Reservation),
            "vaccination" => Some(Self::Vaccination),
            _ => None,
        }
    }

    /// Parse a `type` label in either case.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "notice" => Some(Self::Notice),
            "reservation" => Some(Self::Reservation),
            "vaccination" => Some(Self::Vaccination),
            _ => None,
        }
    }
}

/// A notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Server-assigned identity
    pub id: NotificationId,
    /// Discriminated kind
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Kind-specific payload, opaque to this crate
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Read by the recipient
    #[serde(default, alias = "read")]
    pub is_read: bool,
    /// Creation time
    #[serde(default)]
    pub created_at: String,
}

/// Response of `GET /notifications`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationList {
    /// Notifications, newest first
    #[serde(default)]
    pub content: Vec<Notification>,
}
