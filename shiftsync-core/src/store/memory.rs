//! In-memory event store with optional JSON file persistence.
//!
//! Backs the daemon in single-process deployments and every test in this
//! crate. All operations take the one lock, which trivially gives each
//! mutation batch all-or-nothing semantics.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventStore;
use crate::error::StoreError;
use crate::event::{Event, EventChange, EventSource};
use crate::reconcile::EventMutation;
use crate::user::User;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    users: BTreeMap<String, User>,
    events: BTreeMap<String, Event>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StoreError(format!("failed to read store at {}: {e}", path.display())))?;
        let data: StoreData = serde_json::from_str(&contents)
            .map_err(|e| StoreError(format!("failed to parse store at {}: {e}", path.display())))?;
        Ok(MemoryStore {
            inner: RwLock::new(data),
        })
    }

    /// Persist to a JSON file (temp file + rename, so readers never see a
    /// partially-written store).
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let contents = {
            let data = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*data)
                .map_err(|e| StoreError(format!("failed to serialize store: {e}")))?
        };

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents).map_err(|e| {
            StoreError(format!(
                "failed to write store at {}: {e}",
                temp_path.display()
            ))
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            StoreError(format!("failed to rename store to {}: {e}", path.display()))
        })?;
        Ok(())
    }

    pub fn insert_user(&self, user: User) {
        let mut data = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        data.users.insert(user.id.clone(), user);
    }

    pub fn insert_event(&self, event: Event) {
        let mut data = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        data.events.insert(event.event_id.clone(), event);
    }

    pub fn event(&self, event_id: &str) -> Option<Event> {
        let data = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        data.events.get(event_id).cloned()
    }

    pub fn events_for_user(&self, user_id: &str) -> Vec<Event> {
        let data = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        data.events
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn users_with_feeds(&self) -> Result<Vec<User>, StoreError> {
        let data = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .users
            .values()
            .filter(|u| !u.feeds.is_empty())
            .cloned()
            .collect())
    }

    async fn user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let data = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.users.get(user_id).cloned())
    }

    async fn ical_events(&self, user_id: &str) -> Result<Vec<Event>, StoreError> {
        let data = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data
            .events
            .values()
            .filter(|e| e.user_id == user_id && e.source == EventSource::Ical)
            .cloned()
            .collect())
    }

    async fn commit(
        &self,
        mutations: Vec<EventMutation>,
    ) -> Result<Vec<EventChange>, StoreError> {
        let mut data = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        // Validate the whole batch before touching anything.
        for mutation in &mutations {
            if let EventMutation::Update(event) = mutation {
                if !data.events.contains_key(&event.event_id) {
                    return Err(StoreError(format!(
                        "update targets unknown event {}",
                        event.event_id
                    )));
                }
            }
        }

        let mut changes = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            match mutation {
                EventMutation::Create(event) => {
                    data.events.insert(event.event_id.clone(), event.clone());
                    changes.push(EventChange::Created { event });
                }
                EventMutation::Update(event) => {
                    let before = data
                        .events
                        .insert(event.event_id.clone(), event.clone())
                        .expect("update target validated above");
                    changes.push(EventChange::Updated {
                        before,
                        after: event,
                    });
                }
            }
        }
        Ok(changes)
    }

    async fn set_feed_last_sync(
        &self,
        user_id: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut data = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let user = data
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError(format!("unknown user {user_id}")))?;

        match user.feeds.iter_mut().find(|f| f.url == url) {
            Some(feed) => {
                feed.last_sync = Some(at);
                Ok(())
            }
            None => Err(StoreError(format!(
                "user {user_id} has no feed with url {url}"
            ))),
        }
    }
}
