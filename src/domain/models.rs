use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::recurrence::RecurrenceRule;

// Sort sentinel for templates without an end date: they order ahead of every
// bounded template under end-date-descending order.
pub const OPEN_ENDED_SENTINEL: &str = "9999-12-31";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Confirmed,
}

impl EventStatus {
    pub fn is_draft(self) -> bool {
        self == EventStatus::Draft
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub label_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub status: EventStatus,
    pub recurring_event_id: Option<Uuid>,
    pub occurrence_date: Option<NaiveDate>,
}

impl Event {
    pub fn validate(&self) -> Result<(), String> {
        if self.status.is_draft() {
            return Ok(());
        }
        if self.name.trim().is_empty() {
            return Err("event.name must not be empty".to_string());
        }
        let (Some(start_at), Some(end_at)) = (self.start_at, self.end_at) else {
            return Err("confirmed event must have start_at and end_at".to_string());
        };
        if end_at <= start_at {
            return Err("event.end_at must be after event.start_at".to_string());
        }
        Ok(())
    }

    pub fn interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_at, self.end_at) {
            (Some(start_at), Some(end_at)) => Some((start_at, end_at)),
            _ => None,
        }
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.interval()
            .map(|(start_at, end_at)| (end_at - start_at).num_minutes())
    }

    pub fn cursor(&self) -> Option<EventCursor> {
        self.interval().map(|(start_at, end_at)| EventCursor {
            end_at,
            start_at,
            id: self.id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringEvent {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub label_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub rule: String,
    pub skip_days: BTreeSet<NaiveDate>,
    pub status: EventStatus,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl RecurringEvent {
    pub fn validate(&self) -> Result<(), String> {
        if self.status.is_draft() {
            return Ok(());
        }
        if self.name.trim().is_empty() {
            return Err("recurring_event.name must not be empty".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("recurring_event.end_time must be after start_time".to_string());
        }
        if let Some(valid_to) = self.valid_to {
            if valid_to < self.valid_from {
                return Err("recurring_event.valid_to must not precede valid_from".to_string());
            }
        }
        RecurrenceRule::parse(&self.rule)?;
        Ok(())
    }

    pub fn effective_end_date(&self) -> NaiveDate {
        self.valid_to.unwrap_or_else(open_ended_sentinel)
    }

    pub fn cursor(&self) -> RecurringEventCursor {
        RecurringEventCursor {
            end_date: self.effective_end_date(),
            id: self.id,
        }
    }

    /// Concrete UTC interval of one occurrence, computed from the template's
    /// wall-clock times under the owner's zone rules at that date.
    pub fn occurrence_interval(&self, date: NaiveDate, zone: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let start_at = resolve_local(zone, date, self.start_time);
        let end_at = resolve_local(zone, date, self.end_time);
        // A DST gap can swallow the wall-clock gap between the two times.
        if end_at <= start_at {
            let span = (self.end_time - self.start_time).max(Duration::minutes(1));
            (start_at, start_at + span)
        } else {
            (start_at, end_at)
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time).num_minutes()
    }
}

fn open_ended_sentinel() -> NaiveDate {
    NaiveDate::parse_from_str(OPEN_ENDED_SENTINEL, "%Y-%m-%d").expect("valid sentinel date")
}

/// Maps a local wall-clock datetime to an instant. Ambiguous times (fall-back)
/// take the earlier offset; nonexistent times (spring-forward gap) resolve
/// forward to the first valid instant.
pub fn resolve_local(zone: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let mut local = date.and_time(time);
    for _ in 0..8 {
        match zone.from_local_datetime(&local) {
            LocalResult::Single(resolved) => return resolved.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => local = local + Duration::minutes(15),
        }
    }
    // No real zone has gaps this wide; fall back to reading the time as UTC.
    Utc.from_utc_datetime(&date.and_time(time))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualEvent {
    pub recurring_event_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub owner_id: Uuid,
    pub label_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl VirtualEvent {
    pub fn project(template: &RecurringEvent, date: NaiveDate, zone: Tz) -> Self {
        let (start_at, end_at) = template.occurrence_interval(date, zone);
        Self {
            recurring_event_id: template.id,
            occurrence_date: date,
            owner_id: template.owner_id,
            label_id: template.label_id,
            name: template.name.clone(),
            description: template.description.clone(),
            start_at,
            end_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub owner_id: Uuid,
    pub label_id: Option<Uuid>,
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelTimeBucket {
    pub owner_id: Uuid,
    pub label_id: Option<Uuid>,
    pub year: i32,
    pub month: u32,
    pub minutes: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventCursor {
    pub end_at: DateTime<Utc>,
    pub start_at: DateTime<Utc>,
    pub id: Uuid,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurringEventCursor {
    pub end_date: NaiveDate,
    pub id: Uuid,
}
