//! Per-tick synchronization across every (user, feed) pair.
//!
//! One tokio task per feed; outcomes are joined without short-circuiting so
//! a failing feed never aborts its siblings. Committed changes are forwarded
//! to an optional sink, which the daemon drains into the change notifier.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::event::{Event, EventChange};
use crate::feed::{FeedFetcher, parse_feed};
use crate::reconcile::reconcile;
use crate::store::EventStore;
use crate::user::FeedSubscription;

/// Aggregate outcome of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub successful: usize,
    pub failed: usize,
}

/// What one feed's reconciliation produced.
#[derive(Debug, Default)]
struct FeedOutcome {
    new_count: usize,
    updated_count: usize,
    changes: Vec<EventChange>,
}

pub struct SyncOrchestrator {
    store: Arc<dyn EventStore>,
    fetcher: FeedFetcher,
    changes: Option<UnboundedSender<EventChange>>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn EventStore>, fetcher: FeedFetcher) -> Self {
        SyncOrchestrator {
            store,
            fetcher,
            changes: None,
        }
    }

    /// Forward every committed change to `sink` (the notifier side).
    pub fn with_change_sink(mut self, sink: UnboundedSender<EventChange>) -> Self {
        self.changes = Some(sink);
        self
    }

    /// Run one tick: reconcile every feed of every subscribed user,
    /// concurrently and independently.
    ///
    /// Only a failure to enumerate users is fatal; everything else is
    /// absorbed into the failed count.
    pub async fn run(&self, now: DateTime<Utc>) -> SyncResult<SyncReport> {
        let users = self
            .store
            .users_with_feeds()
            .await
            .map_err(|e| SyncError::Fatal(format!("cannot enumerate users: {e}")))?;

        let mut tasks = JoinSet::new();
        for user in users {
            for feed in user.feeds {
                let store = Arc::clone(&self.store);
                let fetcher = self.fetcher.clone();
                let user_id = user.id.clone();
                tasks.spawn(async move {
                    let outcome = sync_feed(store, fetcher, &user_id, &feed, now).await;
                    (user_id, feed.url, outcome)
                });
            }
        }

        let mut report = SyncReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((user_id, url, Ok(outcome))) => {
                    info!(
                        user_id = %user_id,
                        url = %url,
                        new = outcome.new_count,
                        updated = outcome.updated_count,
                        "feed imported"
                    );
                    if let Some(sink) = &self.changes {
                        for change in outcome.changes {
                            // A closed receiver just means nobody is listening.
                            let _ = sink.send(change);
                        }
                    }
                    report.successful += 1;
                }
                Ok((user_id, url, Err(e))) => {
                    warn!(user_id = %user_id, url = %url, "feed import failed: {e}");
                    report.failed += 1;
                }
                Err(e) => {
                    error!("feed import task panicked: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            successful = report.successful,
            failed = report.failed,
            "sync tick completed"
        );
        Ok(report)
    }
}

/// Fetch, parse, reconcile and commit a single feed.
async fn sync_feed(
    store: Arc<dyn EventStore>,
    fetcher: FeedFetcher,
    user_id: &str,
    feed: &FeedSubscription,
    now: DateTime<Utc>,
) -> SyncResult<FeedOutcome> {
    let raw = fetcher.fetch(&feed.url).await?;
    let feed_events = parse_feed(&raw)?;

    let existing: HashMap<String, Event> = store
        .ical_events(user_id)
        .await?
        .into_iter()
        .filter_map(|event| event.ical_uid.clone().map(|uid| (uid, event)))
        .collect();

    let outcome = reconcile(user_id, &feed_events, &existing, now);
    let (new_count, updated_count) = (outcome.new_count, outcome.updated_count);

    let changes = store.commit(outcome.mutations).await?;
    store.set_feed_last_sync(user_id, &feed.url, now).await?;

    Ok(FeedOutcome {
        new_count,
        updated_count,
        changes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use crate::store::MemoryStore;
    use crate::user::User;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MORNING_SHIFT_ICS: &str = "BEGIN:VCALENDAR\r\n\
        VERSION:2.0\r\n\
        PRODID:TEST\r\n\
        BEGIN:VEVENT\r\n\
        UID:abc123\r\n\
        SUMMARY:Morning Shift\r\n\
        DTSTART:20240115T080000Z\r\n\
        DTEND:20240115T160000Z\r\n\
        END:VEVENT\r\n\
        END:VCALENDAR\r\n";

    fn subscribed_user(id: &str, url: &str) -> User {
        User {
            id: id.to_string(),
            name: format!("User {id}"),
            partner_id: None,
            notification_settings: None,
            push_token: None,
            feeds: vec![FeedSubscription {
                url: url.to_string(),
                last_sync: None,
            }],
        }
    }

    fn tick() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 10, 0, 0).unwrap()
    }

    async fn serve(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn imports_one_feed_end_to_end() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, MORNING_SHIFT_ICS).await;

        let store = Arc::new(MemoryStore::new());
        let url = format!("{}/u1.ics", server.uri());
        store.insert_user(subscribed_user("u1", &url));

        let orchestrator =
            SyncOrchestrator::new(store.clone(), FeedFetcher::new().unwrap());
        let report = orchestrator.run(tick()).await.unwrap();
        assert_eq!(report, SyncReport { successful: 1, failed: 0 });

        let events = store.events_for_user("u1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ical_uid.as_deref(), Some("abc123"));
        assert_eq!(events[0].title, "Morning Shift");
        assert_eq!(events[0].version, 1);

        let feeds = store.user("u1").await.unwrap().unwrap().feeds;
        assert_eq!(feeds[0].last_sync, Some(tick()));
    }

    #[tokio::test]
    async fn rerunning_with_unchanged_feed_is_idempotent() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, MORNING_SHIFT_ICS).await;

        let store = Arc::new(MemoryStore::new());
        let url = format!("{}/u1.ics", server.uri());
        store.insert_user(subscribed_user("u1", &url));

        let orchestrator =
            SyncOrchestrator::new(store.clone(), FeedFetcher::new().unwrap());
        orchestrator.run(tick()).await.unwrap();

        let first_pass = store.events_for_user("u1");
        let later = tick() + chrono::Duration::minutes(15);
        let report = orchestrator.run(later).await.unwrap();
        assert_eq!(report, SyncReport { successful: 1, failed: 0 });

        let second_pass = store.events_for_user("u1");
        assert_eq!(second_pass, first_pass, "no mutation should have applied");
        assert_eq!(second_pass[0].version, 1);
        assert_eq!(second_pass[0].updated_at, first_pass[0].updated_at);

        // lastSync still advances on a successful no-op run.
        let feeds = store.user("u1").await.unwrap().unwrap().feeds;
        assert_eq!(feeds[0].last_sync, Some(later));
    }

    #[tokio::test]
    async fn one_bad_feed_does_not_abort_the_others() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, MORNING_SHIFT_ICS).await;
        serve(&server, "/u2.ics", 500, "").await;
        serve(&server, "/u3.ics", 200, MORNING_SHIFT_ICS).await;

        let store = Arc::new(MemoryStore::new());
        for id in ["u1", "u2", "u3"] {
            let url = format!("{}/{id}.ics", server.uri());
            store.insert_user(subscribed_user(id, &url));
        }

        let orchestrator =
            SyncOrchestrator::new(store.clone(), FeedFetcher::new().unwrap());
        let report = orchestrator.run(tick()).await.unwrap();
        assert_eq!(report, SyncReport { successful: 2, failed: 1 });

        assert_eq!(store.events_for_user("u1").len(), 1);
        assert_eq!(store.events_for_user("u2").len(), 0);
        assert_eq!(store.events_for_user("u3").len(), 1);

        // The failed feed keeps its old lastSync.
        let feeds = store.user("u2").await.unwrap().unwrap().feeds;
        assert_eq!(feeds[0].last_sync, None);
    }

    #[tokio::test]
    async fn timed_out_feed_counts_as_failed_without_aborting_siblings() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, MORNING_SHIFT_ICS).await;
        Mock::given(method("GET"))
            .and(path("/u2.ics"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(MORNING_SHIFT_ICS)
                    .set_delay(std::time::Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        for id in ["u1", "u2"] {
            let url = format!("{}/{id}.ics", server.uri());
            store.insert_user(subscribed_user(id, &url));
        }

        let fetcher =
            FeedFetcher::with_timeout(std::time::Duration::from_millis(100)).unwrap();
        let orchestrator = SyncOrchestrator::new(store.clone(), fetcher);
        let report = orchestrator.run(tick()).await.unwrap();
        assert_eq!(report, SyncReport { successful: 1, failed: 1 });

        assert_eq!(store.events_for_user("u1").len(), 1);
        assert!(store.events_for_user("u2").is_empty());
    }

    #[tokio::test]
    async fn malformed_feed_counts_as_failed() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, "definitely not a calendar").await;

        let store = Arc::new(MemoryStore::new());
        let url = format!("{}/u1.ics", server.uri());
        store.insert_user(subscribed_user("u1", &url));

        let orchestrator =
            SyncOrchestrator::new(store.clone(), FeedFetcher::new().unwrap());
        let report = orchestrator.run(tick()).await.unwrap();
        assert_eq!(report, SyncReport { successful: 0, failed: 1 });
        assert!(store.events_for_user("u1").is_empty());
    }

    #[tokio::test]
    async fn empty_feed_is_a_successful_noop() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/u1.ics",
            200,
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nEND:VCALENDAR\r\n",
        )
        .await;

        let store = Arc::new(MemoryStore::new());
        let url = format!("{}/u1.ics", server.uri());
        store.insert_user(subscribed_user("u1", &url));

        let orchestrator =
            SyncOrchestrator::new(store.clone(), FeedFetcher::new().unwrap());
        let report = orchestrator.run(tick()).await.unwrap();
        assert_eq!(report, SyncReport { successful: 1, failed: 0 });
        assert!(store.events_for_user("u1").is_empty());

        let feeds = store.user("u1").await.unwrap().unwrap().feeds;
        assert_eq!(feeds[0].last_sync, Some(tick()));
    }

    #[tokio::test]
    async fn committed_changes_reach_the_sink() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, MORNING_SHIFT_ICS).await;

        let store = Arc::new(MemoryStore::new());
        let url = format!("{}/u1.ics", server.uri());
        store.insert_user(subscribed_user("u1", &url));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let orchestrator = SyncOrchestrator::new(store.clone(), FeedFetcher::new().unwrap())
            .with_change_sink(tx);
        orchestrator.run(tick()).await.unwrap();

        let change = rx.recv().await.expect("one change expected");
        assert_eq!(change.kind(), ChangeKind::Created);
        assert_eq!(change.event().title, "Morning Shift");
        assert!(rx.try_recv().is_err(), "exactly one change expected");
    }

    #[tokio::test]
    async fn dropping_the_orchestrator_closes_the_change_sink() {
        let server = MockServer::start().await;
        serve(&server, "/u1.ics", 200, MORNING_SHIFT_ICS).await;

        let store = Arc::new(MemoryStore::new());
        let url = format!("{}/u1.ics", server.uri());
        store.insert_user(subscribed_user("u1", &url));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let orchestrator = SyncOrchestrator::new(store, FeedFetcher::new().unwrap())
            .with_change_sink(tx);
        orchestrator.run(tick()).await.unwrap();
        drop(orchestrator);

        // A drain loop sees every committed change, then channel closure.
        let mut drained = Vec::new();
        while let Some(change) = rx.recv().await {
            drained.push(change);
        }
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind(), ChangeKind::Created);
    }

    #[tokio::test]
    async fn no_subscribed_users_is_an_empty_successful_run() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = SyncOrchestrator::new(store, FeedFetcher::new().unwrap());
        let report = orchestrator.run(tick()).await.unwrap();
        assert_eq!(report, SyncReport::default());
    }
}
