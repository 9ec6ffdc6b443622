//! Error types for the shiftsync engine.
//!
//! Fetch, parse and store failures are recovered at the per-feed level and
//! surface only as failed-feed counts in the sync report. Delivery failures
//! are logged and dropped. Only `Fatal` is allowed to abort a sync tick.

use thiserror::Error;

/// A feed could not be retrieved (network failure, timeout, or non-2xx status).
#[derive(Error, Debug)]
#[error("{message}")]
pub struct FetchError {
    /// HTTP status, when the request got far enough to receive one.
    pub status: Option<u16>,
    pub message: String,
}

/// A feed was retrieved but its content could not be understood.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ParseError(pub String);

/// A store query or commit failed.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct StoreError(pub String);

/// A push message could not be delivered.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DeliveryError(pub String);

/// Errors that can occur in shiftsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("feed fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("feed parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("store operation failed: {0}")]
    Store(#[from] StoreError),

    #[error("notification delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("fatal: {0}")]
    Fatal(String),
}

/// Result type alias for shiftsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
