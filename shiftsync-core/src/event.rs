//! Shift events and the transient change records derived from their mutations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display color assigned to feed-imported events.
pub const IMPORTED_EVENT_COLOR: &str = "#4285F4";

/// A shift event in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_id: String,
    pub user_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    pub color: String,
    pub source: EventSource,
    /// Stable identity assigned by the source feed. Unique per user for
    /// imported events, but not across feeds or users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ical_uid: Option<String>,
    /// Monotonic revision counter, incremented on every accepted update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// Created by hand in a client.
    Manual,
    /// Imported from a linked calendar feed.
    Ical,
}

/// A committed store mutation, reported to the change notifier.
///
/// Ephemeral: produced per mutation, consumed immediately, never persisted.
#[derive(Debug, Clone)]
pub enum EventChange {
    Created { event: Event },
    Updated { before: Event, after: Event },
    Deleted { event: Event },
}

impl EventChange {
    pub fn kind(&self) -> ChangeKind {
        match self {
            EventChange::Created { .. } => ChangeKind::Created,
            EventChange::Updated { .. } => ChangeKind::Updated,
            EventChange::Deleted { .. } => ChangeKind::Deleted,
        }
    }

    /// The event snapshot this change is about (after-image for updates).
    pub fn event(&self) -> &Event {
        match self {
            EventChange::Created { event } => event,
            EventChange::Updated { after, .. } => after,
            EventChange::Deleted { event } => event,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}
