//! Reconciliation-and-notification engine for shiftsync.
//!
//! Synchronizes externally-hosted calendar feeds into a per-user event store
//! and notifies a linked partner account when shift events change:
//! - `feed` fetches and parses a subscription URL into normalized occurrences
//! - `reconcile` diffs those against stored events and emits idempotent
//!   create/update batches
//! - `orchestrator` runs every (user, feed) pair concurrently per tick
//! - `notify` turns committed changes into partner push messages, subject to
//!   preferences and quiet hours

pub mod error;
pub mod event;
pub mod feed;
pub mod notify;
pub mod orchestrator;
pub mod quiet_hours;
pub mod reconcile;
pub mod store;
pub mod user;

// Re-export the model types at crate root for convenience
pub use error::{SyncError, SyncResult};
pub use event::*;
pub use user::*;
