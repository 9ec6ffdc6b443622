//! Calendar feed retrieval and parsing.

mod fetch;
mod parse;

pub use fetch::{FETCH_TIMEOUT, FeedFetcher};
pub use parse::{FeedEvent, UNTITLED_EVENT, parse_feed};
