//! User accounts, feed subscriptions and notification preferences.
//!
//! These mirror the persisted `users/{userId}` document layout. Every field
//! that can be absent in a stored document is an explicit `Option`; resolution
//! logic branches on them rather than assuming presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account with optional partner link and feed subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    /// Display name, shown in partner notification titles.
    #[serde(default)]
    pub name: String,
    /// Linked partner account. Pairing is assumed symmetric, not enforced here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_settings: Option<NotificationSettings>,
    /// Opaque push-channel delivery token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    /// Calendar feeds this user has linked, in subscription order.
    #[serde(default)]
    pub feeds: Vec<FeedSubscription>,
}

/// Notification preferences embedded in a user document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// Whether this user wants to hear about their partner's shift changes.
    #[serde(default)]
    pub partner_changes: bool,
    #[serde(default)]
    pub quiet_hours_enabled: bool,
    /// "HH:MM" wall-clock boundary, e.g. "22:00".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours_end: Option<String>,
}

/// One linked calendar feed, identified within a user by its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSubscription {
    pub url: String,
    /// Time of the last successful reconciliation for this feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}
