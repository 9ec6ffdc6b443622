//! Partner change notifications.
//!
//! Runs once per committed event change. Every step of the decision pipeline
//! is an explicit branch that logs why it stopped; a store failure during
//! resolution is treated the same as an absent record. Nothing here can fail
//! the mutation that triggered it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::error::DeliveryError;
use crate::event::{Event, EventChange};
use crate::quiet_hours;
use crate::store::EventStore;
use crate::user::User;

/// Outbound push message, transport-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: HashMap<String, String>,
}

/// Delivery capability for push messages.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(&self, message: PushMessage) -> Result<(), DeliveryError>;
}

/// Push channel that only logs. Stands in for a real transport in
/// single-process deployments.
pub struct LogPushChannel;

#[async_trait]
impl PushChannel for LogPushChannel {
    async fn send(&self, message: PushMessage) -> Result<(), DeliveryError> {
        info!(
            token = %message.token,
            title = %message.title,
            body = %message.body,
            "push message (log only)"
        );
        Ok(())
    }
}

/// Decides, per committed change, whether the owner's partner should be told,
/// and sends the message when every check passes.
pub struct ChangeNotifier {
    store: Arc<dyn EventStore>,
    channel: Arc<dyn PushChannel>,
    /// Time zone used for quiet-hours evaluation and payload formatting.
    timezone: Tz,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn EventStore>, channel: Arc<dyn PushChannel>, timezone: Tz) -> Self {
        ChangeNotifier {
            store,
            channel,
            timezone,
        }
    }

    /// Best-effort notification for one committed change. Never returns an
    /// error: the triggering mutation has already committed and a failed or
    /// suppressed notification must not surface past this point.
    pub async fn notify(&self, change: &EventChange, now: DateTime<Utc>) {
        if let EventChange::Updated { before, after } = change {
            // Instant comparison, not formatted strings; a version bump with
            // no field delta is bookkeeping, not news.
            let material = before.title != after.title
                || before.start_time != after.start_time
                || before.end_time != after.end_time;
            if !material {
                debug!(event_id = %after.event_id, "no material change, skipping notification");
                return;
            }
        }

        let event = change.event();

        let Some(owner) = self.resolve_user(&event.user_id).await else {
            debug!(user_id = %event.user_id, "event owner not found, skipping notification");
            return;
        };

        let Some(partner_id) = owner.partner_id.as_deref() else {
            debug!(user_id = %owner.id, "owner has no partner, skipping notification");
            return;
        };

        let Some(partner) = self.resolve_user(partner_id).await else {
            debug!(partner_id, "partner not found, skipping notification");
            return;
        };

        let settings = partner.notification_settings.as_ref();
        if !settings.is_some_and(|s| s.partner_changes) {
            debug!(partner_id = %partner.id, "partner change notifications disabled, skipping");
            return;
        }

        let local = now.with_timezone(&self.timezone).time();
        if quiet_hours::is_suppressed(settings, local) {
            debug!(partner_id = %partner.id, "partner is in quiet hours, suppressing notification");
            return;
        }

        let Some(token) = partner.push_token.clone() else {
            debug!(partner_id = %partner.id, "partner has no push token, skipping notification");
            return;
        };

        let message = self.build_message(change, &owner, token);
        match self.channel.send(message).await {
            Ok(()) => {
                info!(
                    event_id = %event.event_id,
                    partner_id = %partner.id,
                    kind = %change.kind(),
                    "partner notified"
                );
            }
            Err(e) => {
                // Logged only; delivery is best-effort and never retried.
                warn!(event_id = %event.event_id, partner_id = %partner.id, "push delivery failed: {e}");
            }
        }
    }

    /// A store failure here is indistinguishable from an absent record:
    /// either way there is nobody to notify.
    async fn resolve_user(&self, user_id: &str) -> Option<User> {
        match self.store.user(user_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(user_id, "user lookup failed, skipping notification: {e}");
                None
            }
        }
    }

    fn build_message(&self, change: &EventChange, owner: &User, token: String) -> PushMessage {
        let event = change.event();
        let (verb, body) = match change {
            EventChange::Created { event } => (
                "added",
                format!("{} on {}", event.title, self.format_when(event)),
            ),
            EventChange::Updated { after, .. } => {
                ("updated", format!("{} was modified", after.title))
            }
            EventChange::Deleted { event } => ("deleted", format!("{} was removed", event.title)),
        };

        PushMessage {
            token,
            title: format!("{} {verb} a shift", owner.name),
            body,
            data: HashMap::from([
                ("type".to_string(), format!("event_{}", change.kind())),
                ("eventId".to_string(), event.event_id.clone()),
                ("userId".to_string(), event.user_id.clone()),
            ]),
        }
    }

    /// "Jan 15, 2024 (8:00 AM - 4:00 PM)" in the configured time zone.
    fn format_when(&self, event: &Event) -> String {
        let start = event.start_time.with_timezone(&self.timezone);
        let end = event.end_time.with_timezone(&self.timezone);
        format!(
            "{} ({} - {})",
            start.format("%b %-d, %Y"),
            start.format("%-I:%M %p"),
            end.format("%-I:%M %p")
        )
    }
}
