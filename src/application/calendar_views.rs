use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::application::virtual_events::VirtualEventGenerator;
use crate::domain::models::{resolve_local, Event, VirtualEvent};
use crate::domain::view::{self, CalendarEntry, WeekView};
use crate::infrastructure::clock::Clock;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::event_store::EventStore;
use crate::infrastructure::recurring_store::RecurringEventStore;

/// Read-side composition: confirmed events merged with virtual occurrences,
/// bucketed into local calendar days.
pub struct CalendarViewService<E, R, C>
where
    E: EventStore,
    R: RecurringEventStore,
    C: Clock,
{
    events: Arc<E>,
    virtuals: VirtualEventGenerator<R, C>,
    clock: Arc<C>,
}

impl<E, R, C> CalendarViewService<E, R, C>
where
    E: EventStore,
    R: RecurringEventStore,
    C: Clock,
{
    pub fn new(events: Arc<E>, templates: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            events,
            virtuals: VirtualEventGenerator::new(templates, Arc::clone(&clock)),
            clock,
        }
    }

    pub fn day_view(
        &self,
        owner_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<CalendarEntry>, CoreError> {
        let zone = self.clock.zone_for(owner_id);
        // One extra day on each side so entries spilling over local midnight
        // still reach the bucketing filter.
        let (window_start, window_end) =
            self.local_window(owner_id, date - Duration::days(1), date + Duration::days(2));
        let confirmed = self
            .events
            .find_confirmed_for_owner_between(owner_id, window_start, window_end)?;
        let virtuals = self.virtuals.generate(owner_id, window_start, window_end)?;
        let virtuals = drop_materialized(&confirmed, virtuals);
        Ok(view::day_view(date, zone, confirmed, virtuals))
    }

    pub fn week_view(&self, owner_id: Uuid, anchor: NaiveDate) -> Result<WeekView, CoreError> {
        let zone = self.clock.zone_for(owner_id);
        let week_start = view::iso_week_start(anchor);
        let (window_start, window_end) = self.local_window(
            owner_id,
            week_start - Duration::days(1),
            week_start + Duration::days(8),
        );
        let confirmed = self
            .events
            .find_confirmed_for_owner_between(owner_id, window_start, window_end)?;
        let virtuals = self.virtuals.generate(owner_id, window_start, window_end)?;
        let virtuals = drop_materialized(&confirmed, virtuals);
        Ok(view::week_view(anchor, zone, confirmed, virtuals))
    }

    fn local_window(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> (DateTime<Utc>, DateTime<Utc>) {
        let zone = self.clock.zone_for(owner_id);
        (
            resolve_local(zone, from, NaiveTime::MIN),
            resolve_local(zone, to, NaiveTime::MIN),
        )
    }
}

// A solidified occurrence arrives through the persisted stream; its virtual
// twin would render the same entry twice.
fn drop_materialized(confirmed: &[Event], virtuals: Vec<VirtualEvent>) -> Vec<VirtualEvent> {
    let materialized: HashSet<(Uuid, NaiveDate)> = confirmed
        .iter()
        .filter_map(|event| Some((event.recurring_event_id?, event.occurrence_date?)))
        .collect();
    virtuals
        .into_iter()
        .filter(|virtual_event| {
            !materialized.contains(&(
                virtual_event.recurring_event_id,
                virtual_event.occurrence_date,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Event, EventStatus, RecurringEvent};
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::event_store::InMemoryEventStore;
    use crate::infrastructure::recurring_store::InMemoryRecurringEventStore;
    use std::collections::BTreeSet;

    struct Fixture {
        service: CalendarViewService<InMemoryEventStore, InMemoryRecurringEventStore, FixedClock>,
        events: Arc<InMemoryEventStore>,
        templates: Arc<InMemoryRecurringEventStore>,
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn time(value: &str) -> NaiveTime {
        NaiveTime::parse_from_str(value, "%H:%M").expect("valid time")
    }

    fn fixture(now: &str, zone: &str) -> Fixture {
        let events = Arc::new(InMemoryEventStore::default());
        let templates = Arc::new(InMemoryRecurringEventStore::default());
        let clock = Arc::new(FixedClock::new(
            fixed_time(now),
            zone.parse().expect("valid zone"),
        ));
        Fixture {
            service: CalendarViewService::new(
                Arc::clone(&events),
                Arc::clone(&templates),
                clock,
            ),
            events,
            templates,
        }
    }

    fn confirmed_event(owner_id: Uuid, name: &str, start: &str, end: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            owner_id,
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

    fn daily_template(owner_id: Uuid, name: &str, start: &str, end: &str) -> RecurringEvent {
        RecurringEvent {
            id: Uuid::new_v4(),
            owner_id,
            label_id: None,
            name: name.to_string(),
            description: None,
            start_time: time(start),
            end_time: time(end),
            rule: "FREQ=DAILY".to_string(),
            skip_days: BTreeSet::new(),
            status: EventStatus::Confirmed,
            valid_from: date("2026-03-01"),
            valid_to: None,
        }
    }

    #[test]
    fn day_view_merges_events_and_virtuals_in_start_order() {
        let fixture = fixture("2026-03-01T00:00:00Z", "UTC");
        let owner = Uuid::new_v4();
        fixture
            .events
            .save(&confirmed_event(
                owner,
                "Dentist",
                "2026-03-04T14:00:00Z",
                "2026-03-04T15:00:00Z",
            ))
            .expect("seed event");
        fixture
            .templates
            .save(&daily_template(owner, "Lunch", "12:00", "13:00"))
            .expect("seed template");

        let entries = fixture.service.day_view(owner, date("2026-03-04")).expect("view");
        let names: Vec<&str> = entries.iter().map(CalendarEntry::name).collect();
        assert_eq!(names, vec!["Lunch", "Dentist"]);
        assert!(matches!(entries[0], CalendarEntry::Virtual(_)));
        assert!(matches!(entries[1], CalendarEntry::Persisted(_)));
    }

    #[test]
    fn week_view_spreads_daily_template_over_all_seven_days() {
        let fixture = fixture("2026-03-01T00:00:00Z", "UTC");
        let owner = Uuid::new_v4();
        fixture
            .templates
            .save(&daily_template(owner, "Lunch", "12:00", "13:00"))
            .expect("seed template");

        let view = fixture.service.week_view(owner, date("2026-03-04")).expect("view");
        assert_eq!(view.week_start, date("2026-03-02"));
        assert!(view.days.iter().all(|day| day.entries.len() == 1));
    }

    #[test]
    fn midnight_spill_reaches_the_neighbouring_day() {
        let fixture = fixture("2026-03-01T00:00:00Z", "UTC");
        let owner = Uuid::new_v4();
        fixture
            .events
            .save(&confirmed_event(
                owner,
                "Night shift",
                "2026-03-03T23:00:00Z",
                "2026-03-04T02:00:00Z",
            ))
            .expect("seed event");

        assert_eq!(
            fixture.service.day_view(owner, date("2026-03-03")).expect("view").len(),
            1
        );
        assert_eq!(
            fixture.service.day_view(owner, date("2026-03-04")).expect("view").len(),
            1
        );
        assert!(fixture
            .service
            .day_view(owner, date("2026-03-05"))
            .expect("view")
            .is_empty());
    }

    #[test]
    fn local_day_boundaries_follow_the_owner_zone() {
        let fixture = fixture("2026-03-01T00:00:00Z", "Asia/Tokyo");
        let owner = Uuid::new_v4();
        // 20:00 UTC on the 3rd is 05:00 on the 4th in Tokyo.
        fixture
            .events
            .save(&confirmed_event(
                owner,
                "Early call",
                "2026-03-03T20:00:00Z",
                "2026-03-03T21:00:00Z",
            ))
            .expect("seed event");

        assert!(fixture
            .service
            .day_view(owner, date("2026-03-03"))
            .expect("view")
            .is_empty());
        assert_eq!(
            fixture.service.day_view(owner, date("2026-03-04")).expect("view").len(),
            1
        );
    }

    #[test]
    fn solidified_occurrence_appears_once_not_as_a_virtual_twin() {
        // 12:30 on the 4th: the lunch occurrence is in flight, so the
        // generator would still emit it.
        let fixture = fixture("2026-03-04T12:30:00Z", "UTC");
        let owner = Uuid::new_v4();
        let template = daily_template(owner, "Lunch", "12:00", "13:00");
        fixture.templates.save(&template).expect("seed template");

        let mut solidified =
            confirmed_event(owner, "Lunch", "2026-03-04T12:00:00Z", "2026-03-04T13:00:00Z");
        solidified.recurring_event_id = Some(template.id);
        solidified.occurrence_date = Some(date("2026-03-04"));
        fixture.events.save(&solidified).expect("seed event");

        let entries = fixture.service.day_view(owner, date("2026-03-04")).expect("view");
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], CalendarEntry::Persisted(_)));

        let view = fixture.service.week_view(owner, date("2026-03-04")).expect("week");
        let wednesday = view
            .days
            .iter()
            .find(|day| day.date == date("2026-03-04"))
            .expect("bucket");
        assert_eq!(wednesday.entries.len(), 1);
        assert!(matches!(wednesday.entries[0], CalendarEntry::Persisted(_)));
    }

    #[test]
    fn past_virtuals_are_absent_but_persisted_events_remain() {
        let fixture = fixture("2026-03-04T18:00:00Z", "UTC");
        let owner = Uuid::new_v4();
        fixture
            .templates
            .save(&daily_template(owner, "Lunch", "12:00", "13:00"))
            .expect("seed template");
        fixture
            .events
            .save(&confirmed_event(
                owner,
                "Morning sync",
                "2026-03-04T09:00:00Z",
                "2026-03-04T10:00:00Z",
            ))
            .expect("seed event");

        let entries = fixture.service.day_view(owner, date("2026-03-04")).expect("view");
        let names: Vec<&str> = entries.iter().map(CalendarEntry::name).collect();
        // Lunch already ended at 13:00 and stays virtual-only history.
        assert_eq!(names, vec!["Morning sync"]);
    }
}
