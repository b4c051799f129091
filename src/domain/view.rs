use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{Event, VirtualEvent};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CalendarEntry {
    Persisted(Event),
    Virtual(VirtualEvent),
}

impl CalendarEntry {
    pub fn start_at(&self) -> DateTime<Utc> {
        match self {
            CalendarEntry::Persisted(event) => event.start_at.expect("timed entry"),
            CalendarEntry::Virtual(event) => event.start_at,
        }
    }

    pub fn end_at(&self) -> DateTime<Utc> {
        match self {
            CalendarEntry::Persisted(event) => event.end_at.expect("timed entry"),
            CalendarEntry::Virtual(event) => event.end_at,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CalendarEntry::Persisted(event) => &event.name,
            CalendarEntry::Virtual(event) => &event.name,
        }
    }

    pub fn label_id(&self) -> Option<Uuid> {
        match self {
            CalendarEntry::Persisted(event) => event.label_id,
            CalendarEntry::Virtual(event) => event.label_id,
        }
    }

    fn sort_id(&self) -> Uuid {
        match self {
            CalendarEntry::Persisted(event) => event.id,
            CalendarEntry::Virtual(event) => event.recurring_event_id,
        }
    }

    /// Inclusive range of local calendar days the `[start, end)` interval
    /// touches under `zone`.
    fn local_day_span(&self, zone: Tz) -> (NaiveDate, NaiveDate) {
        let start_local = self.start_at().with_timezone(&zone);
        let end_at = self.end_at();
        let first = start_local.date_naive();
        if end_at <= self.start_at() {
            return (first, first);
        }
        // The end instant is exclusive, so step back before taking its date.
        let last = (end_at - Duration::seconds(1))
            .with_timezone(&zone)
            .date_naive();
        (first, last.max(first))
    }

    fn touches(&self, date: NaiveDate, zone: Tz) -> bool {
        let (first, last) = self.local_day_span(zone);
        first <= date && date <= last
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub entries: Vec<CalendarEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekView {
    pub week_start: NaiveDate,
    pub days: Vec<DayBucket>,
}

fn collect_entries(confirmed: Vec<Event>, virtuals: Vec<VirtualEvent>) -> Vec<CalendarEntry> {
    let mut entries: Vec<CalendarEntry> = confirmed
        .into_iter()
        .filter(|event| event.interval().is_some())
        .map(CalendarEntry::Persisted)
        .collect();
    entries.extend(virtuals.into_iter().map(CalendarEntry::Virtual));
    entries
}

fn sort_entries(entries: &mut [CalendarEntry]) {
    entries.sort_by(|a, b| {
        a.start_at()
            .cmp(&b.start_at())
            .then_with(|| a.name().cmp(b.name()))
            .then_with(|| a.sort_id().cmp(&b.sort_id()))
    });
}

/// Entries touching one local calendar day, sorted by UTC start time.
pub fn day_view(
    date: NaiveDate,
    zone: Tz,
    confirmed: Vec<Event>,
    virtuals: Vec<VirtualEvent>,
) -> Vec<CalendarEntry> {
    let mut entries: Vec<CalendarEntry> = collect_entries(confirmed, virtuals)
        .into_iter()
        .filter(|entry| entry.touches(date, zone))
        .collect();
    sort_entries(&mut entries);
    entries
}

pub fn iso_week_start(anchor: NaiveDate) -> NaiveDate {
    anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()))
}

/// Exactly seven Monday-first day buckets for the ISO week containing the
/// anchor; a multi-day entry appears in every bucket it touches and empty
/// days keep an empty bucket.
pub fn week_view(
    anchor: NaiveDate,
    zone: Tz,
    confirmed: Vec<Event>,
    virtuals: Vec<VirtualEvent>,
) -> WeekView {
    let week_start = iso_week_start(anchor);
    let entries = collect_entries(confirmed, virtuals);

    let days = (0..7)
        .map(|offset| {
            let date = week_start + Duration::days(offset);
            let mut bucket: Vec<CalendarEntry> = entries
                .iter()
                .filter(|entry| entry.touches(date, zone))
                .cloned()
                .collect();
            sort_entries(&mut bucket);
            DayBucket {
                date,
                entries: bucket,
            }
        })
        .collect();

    WeekView { week_start, days }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventStatus;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn utc() -> Tz {
        "UTC".parse().expect("valid zone")
    }

    fn timed_event(name: &str, start: &str, end: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            label_id: None,
            name: name.to_string(),
            description: None,
            start_at: Some(fixed_time(start)),
            end_at: Some(fixed_time(end)),
            completed: false,
            status: EventStatus::Confirmed,
            recurring_event_id: None,
            occurrence_date: None,
        }
    }

    #[test]
    fn week_view_always_has_seven_monday_first_buckets() {
        let view = week_view(date("2026-03-05"), utc(), Vec::new(), Vec::new());
        assert_eq!(view.week_start, date("2026-03-02"));
        assert_eq!(view.days.len(), 7);
        assert_eq!(view.days[0].date, date("2026-03-02"));
        assert_eq!(view.days[6].date, date("2026-03-08"));
        assert!(view.days.iter().all(|day| day.entries.is_empty()));
    }

    #[test]
    fn midnight_crossing_event_lands_in_both_days_only() {
        let event = timed_event("Night shift", "2026-03-03T23:30:00Z", "2026-03-04T01:00:00Z");
        let view = week_view(date("2026-03-03"), utc(), vec![event.clone()], Vec::new());

        for day in &view.days {
            let expected = day.date == date("2026-03-03") || day.date == date("2026-03-04");
            assert_eq!(day.entries.len(), usize::from(expected), "day {}", day.date);
        }

        let day_entries = day_view(date("2026-03-04"), utc(), vec![event], Vec::new());
        assert_eq!(day_entries.len(), 1);
    }

    #[test]
    fn multi_day_conference_appears_in_every_day_it_spans() {
        let event = timed_event("Conference", "2026-03-03T09:00:00Z", "2026-03-05T17:00:00Z");
        let view = week_view(date("2026-03-03"), utc(), vec![event], Vec::new());
        let populated: Vec<NaiveDate> = view
            .days
            .iter()
            .filter(|day| !day.entries.is_empty())
            .map(|day| day.date)
            .collect();
        assert_eq!(
            populated,
            vec![date("2026-03-03"), date("2026-03-04"), date("2026-03-05")]
        );
    }

    #[test]
    fn event_ending_exactly_at_midnight_stays_in_first_day() {
        let event = timed_event("Late", "2026-03-03T22:00:00Z", "2026-03-04T00:00:00Z");
        assert!(day_view(date("2026-03-04"), utc(), vec![event.clone()], Vec::new()).is_empty());
        assert_eq!(day_view(date("2026-03-03"), utc(), vec![event], Vec::new()).len(), 1);
    }

    #[test]
    fn day_attribution_follows_local_zone_not_utc() {
        let zone: Tz = "America/New_York".parse().expect("valid zone");
        // 01:00 UTC on March 4th is 20:00 local on March 3rd.
        let event = timed_event("Call", "2026-03-04T01:00:00Z", "2026-03-04T02:00:00Z");
        assert_eq!(day_view(date("2026-03-03"), zone, vec![event.clone()], Vec::new()).len(), 1);
        assert!(day_view(date("2026-03-04"), zone, vec![event], Vec::new()).is_empty());
    }

    #[test]
    fn entries_are_sorted_by_utc_start() {
        let late = timed_event("B", "2026-03-03T15:00:00Z", "2026-03-03T16:00:00Z");
        let early = timed_event("A", "2026-03-03T09:00:00Z", "2026-03-03T10:00:00Z");
        let virtual_event = VirtualEvent {
            recurring_event_id: Uuid::new_v4(),
            occurrence_date: date("2026-03-03"),
            owner_id: Uuid::new_v4(),
            label_id: None,
            name: "Run".to_string(),
            description: None,
            start_at: fixed_time("2026-03-03T12:00:00Z"),
            end_at: fixed_time("2026-03-03T13:00:00Z"),
        };

        let entries = day_view(
            date("2026-03-03"),
            utc(),
            vec![late, early],
            vec![virtual_event],
        );
        let names: Vec<&str> = entries.iter().map(CalendarEntry::name).collect();
        assert_eq!(names, vec!["A", "Run", "B"]);
    }

    proptest! {
        #[test]
        fn week_view_shape_is_stable(anchor_offset in 0i64..3650) {
            let anchor = date("2020-01-01") + Duration::days(anchor_offset);
            let view = week_view(anchor, utc(), Vec::new(), Vec::new());
            prop_assert_eq!(view.days.len(), 7);
            prop_assert_eq!(view.week_start.weekday().num_days_from_monday(), 0);
            prop_assert!(view.week_start <= anchor);
            prop_assert!(anchor < view.week_start + Duration::days(7));
            for (offset, day) in view.days.iter().enumerate() {
                prop_assert_eq!(day.date, view.week_start + Duration::days(offset as i64));
            }
        }
    }
}
