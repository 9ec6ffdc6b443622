//! Feed reconciliation.
//!
//! Diffs the occurrences parsed from one feed against a user's stored
//! imported events and produces the minimal mutation batch: a create for
//! every unseen UID, an update when the feed's LAST-MODIFIED is newer than
//! the stored event, and nothing otherwise. Re-running with unchanged feed
//! content produces an empty batch, which is what makes at-least-once
//! scheduling safe.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::event::{Event, EventSource, IMPORTED_EVENT_COLOR};
use crate::feed::FeedEvent;

/// One store write produced by reconciliation. The event carried is the full
/// post-image; updates already have `version` bumped and `updated_at` set.
#[derive(Debug, Clone)]
pub enum EventMutation {
    Create(Event),
    Update(Event),
}

impl EventMutation {
    pub fn event(&self) -> &Event {
        match self {
            EventMutation::Create(event) | EventMutation::Update(event) => event,
        }
    }
}

/// Result of reconciling one feed for one user.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Mutations to apply as one atomic batch. At most one per UID.
    pub mutations: Vec<EventMutation>,
    pub new_count: usize,
    pub updated_count: usize,
}

/// Reconcile parsed feed occurrences against the user's existing imported
/// events, keyed by feed UID.
///
/// A UID appearing more than once in the same feed still produces at most one
/// mutation: a later occurrence replaces the pending fields when its
/// LAST-MODIFIED is strictly newer than that of the occurrence currently
/// standing, so the newest occurrence in feed order wins while `version`
/// rises by at most 1.
pub fn reconcile(
    user_id: &str,
    feed_events: &[FeedEvent],
    existing: &HashMap<String, Event>,
    now: DateTime<Utc>,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut slots: HashMap<&str, PendingSlot> = HashMap::new();

    for occurrence in feed_events {
        if let Some(slot) = slots.get_mut(occurrence.uid.as_str()) {
            // None compares below any Some, so a dated duplicate beats an
            // undated pending occurrence.
            if occurrence.last_modified > slot.last_modified {
                match &mut outcome.mutations[slot.index] {
                    EventMutation::Create(event) | EventMutation::Update(event) => {
                        apply_fields(event, occurrence);
                    }
                }
                slot.last_modified = occurrence.last_modified;
            }
            continue;
        }

        match existing.get(&occurrence.uid) {
            None => {
                let event = import_event(user_id, occurrence, now);
                slots.insert(
                    occurrence.uid.as_str(),
                    PendingSlot {
                        index: outcome.mutations.len(),
                        last_modified: occurrence.last_modified,
                    },
                );
                outcome.mutations.push(EventMutation::Create(event));
                outcome.new_count += 1;
            }
            Some(stored) => {
                let newer = occurrence
                    .last_modified
                    .is_some_and(|modified| modified > stored.updated_at);
                if !newer {
                    continue;
                }
                let mut updated = stored.clone();
                apply_fields(&mut updated, occurrence);
                updated.version += 1;
                updated.updated_at = now;

                slots.insert(
                    occurrence.uid.as_str(),
                    PendingSlot {
                        index: outcome.mutations.len(),
                        last_modified: occurrence.last_modified,
                    },
                );
                outcome.mutations.push(EventMutation::Update(updated));
                outcome.updated_count += 1;
            }
        }
    }

    outcome
}

/// Mutation already emitted for a UID in this batch, with the LAST-MODIFIED
/// of the occurrence whose fields currently stand.
struct PendingSlot {
    index: usize,
    last_modified: Option<DateTime<Utc>>,
}

fn apply_fields(event: &mut Event, occurrence: &FeedEvent) {
    event.title = occurrence.title.clone();
    event.start_time = occurrence.start;
    event.end_time = occurrence.end;
    event.notes = occurrence.notes.clone();
}

fn import_event(user_id: &str, occurrence: &FeedEvent, now: DateTime<Utc>) -> Event {
    Event {
        event_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        title: occurrence.title.clone(),
        start_time: occurrence.start,
        end_time: occurrence.end,
        notes: occurrence.notes.clone(),
        color: IMPORTED_EVENT_COLOR.to_string(),
        source: EventSource::Ical,
        ical_uid: Some(occurrence.uid.clone()),
        version: 1,
        created_at: now,
        updated_at: now,
    }
}
