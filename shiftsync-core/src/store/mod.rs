//! Store abstraction over the durable user/event collections.
//!
//! The engine only needs a handful of operations from the underlying
//! document store; they are expressed as a trait so tests and the bundled
//! file-backed store share the same seam a production backend would plug
//! into.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::event::{Event, EventChange};
use crate::reconcile::EventMutation;
use crate::user::User;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// All users that have at least one feed subscription.
    async fn users_with_feeds(&self) -> Result<Vec<User>, StoreError>;

    async fn user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// All feed-imported events owned by a user, for reconciliation lookup.
    async fn ical_events(&self, user_id: &str) -> Result<Vec<Event>, StoreError>;

    /// Apply a mutation batch atomically and report the resulting changes.
    /// Either every mutation applies or none do.
    async fn commit(
        &self,
        mutations: Vec<EventMutation>,
    ) -> Result<Vec<EventChange>, StoreError>;

    /// Record a feed's last successful sync time by replacing the one feed
    /// entry matching `url` in place. Never remove-then-add: a concurrent
    /// edit to the subscription list must not be able to lose the entry.
    async fn set_feed_last_sync(
        &self,
        user_id: &str,
        url: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
