//! Quiet-hours evaluation.
//!
//! Decides whether partner notifications are currently suppressed for a user.
//! The wall-clock time is an explicit argument so the caller chooses which
//! time zone it is derived from.

use chrono::{NaiveTime, Timelike};

use crate::user::NotificationSettings;

/// Whether notifications are suppressed at `now` under the given settings.
///
/// Returns false when settings are absent, quiet hours are disabled, or
/// either boundary is missing or unparseable. A window whose start is later
/// than its end wraps past midnight. Equal boundaries form an empty window
/// and never suppress.
pub fn is_suppressed(settings: Option<&NotificationSettings>, now: NaiveTime) -> bool {
    let Some(settings) = settings else {
        return false;
    };
    if !settings.quiet_hours_enabled {
        return false;
    }
    let (Some(start), Some(end)) = (
        settings.quiet_hours_start.as_deref(),
        settings.quiet_hours_end.as_deref(),
    ) else {
        return false;
    };
    let (Some(start), Some(end)) = (parse_minute_of_day(start), parse_minute_of_day(end)) else {
        return false;
    };

    let now = now.hour() * 60 + now.minute();
    if start <= end {
        start <= now && now < end
    } else {
        // Window spans midnight, e.g. 22:00 - 07:00.
        now >= start || now < end
    }
}

/// Parse an "HH:MM" string into a minute-of-day value in [0, 1440).
fn parse_minute_of_day(s: &str) -> Option<u32> {
    let (hours, minutes) = s.split_once(':')?;
    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours >= 24 || minutes >= 60 {
        return None;
    }
    Some(hours * 60 + minutes)
}
