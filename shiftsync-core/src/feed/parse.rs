//! Feed parsing using the icalendar crate's parser.
//!
//! Each VEVENT maps to exactly one occurrence; recurrence rules are not
//! expanded. A feed that cannot be understood fails as a whole so that a
//! half-read feed never produces a partial import.

use chrono::{DateTime, TimeZone, Utc};
use icalendar::parser::{Component, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};

use crate::error::ParseError;

/// Title given to occurrences whose SUMMARY is absent.
pub const UNTITLED_EVENT: &str = "Untitled Event";

/// One occurrence extracted from a feed, normalized to absolute instants.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub uid: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub notes: String,
    /// LAST-MODIFIED, when the feed sets it. Feeds that never do still import
    /// but can only create, never update.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Parse raw feed text into normalized occurrences, in feed order.
pub fn parse_feed(raw: &str) -> Result<Vec<FeedEvent>, ParseError> {
    let unfolded = unfold(raw);
    let calendar =
        read_calendar(&unfolded).map_err(|e| ParseError(format!("invalid calendar: {e}")))?;

    calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .map(parse_vevent)
        .collect()
}

fn parse_vevent(vevent: &Component) -> Result<FeedEvent, ParseError> {
    let uid = vevent
        .find_prop("UID")
        .map(|p| p.val.to_string())
        .ok_or_else(|| ParseError("VEVENT missing UID".to_string()))?;

    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| UNTITLED_EVENT.to_string());

    let start = instant_prop(vevent, "DTSTART")?
        .ok_or_else(|| ParseError(format!("event '{uid}' missing DTSTART")))?;
    let end = instant_prop(vevent, "DTEND")?
        .ok_or_else(|| ParseError(format!("event '{uid}' missing DTEND")))?;

    let notes = vevent
        .find_prop("DESCRIPTION")
        .map(|p| p.val.to_string())
        .unwrap_or_default();

    // Optional; an unparseable value is treated as absent.
    let last_modified = vevent
        .find_prop("LAST-MODIFIED")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .and_then(to_utc);

    Ok(FeedEvent {
        uid,
        title,
        start,
        end,
        notes,
        last_modified,
    })
}

fn instant_prop(vevent: &Component, name: &str) -> Result<Option<DateTime<Utc>>, ParseError> {
    let Some(prop) = vevent.find_prop(name) else {
        return Ok(None);
    };
    let dpt = DatePerhapsTime::try_from(prop)
        .map_err(|_| ParseError(format!("invalid {name} value '{}'", prop.val.as_ref())))?;
    to_utc(dpt)
        .map(Some)
        .ok_or_else(|| ParseError(format!("unresolvable time in {name}")))
}

/// Resolve any ICS time shape to a UTC instant. All-day dates become midnight
/// UTC; floating times are taken as UTC; zoned times resolve via chrono-tz.
fn to_utc(dpt: DatePerhapsTime) -> Option<DateTime<Utc>> {
    match dpt {
        DatePerhapsTime::Date(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Some(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => Some(naive.and_utc()),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            let tz: chrono_tz::Tz = tzid.parse().ok()?;
            tz.from_local_datetime(&date_time)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}
