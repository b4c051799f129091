use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::Event;

/// Half-open interval overlap: `[a_start, a_end)` against `[b_start, b_end)`.
/// Touching endpoints do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Ids of every confirmed timed event in `others` whose interval overlaps the
/// candidate interval. The candidate itself and drafts are never obstacles.
pub fn colliding_event_ids(
    candidate_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    others: &[Event],
) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = others
        .iter()
        .filter(|other| other.id != candidate_id && !other.status.is_draft())
        .filter_map(|other| {
            let (other_start, other_end) = other.interval()?;
            overlaps(start_at, end_at, other_start, other_end).then_some(other.id)
        })
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::EventStatus;
    use chrono::Duration;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn timed_event(owner_id: Uuid, start: &str, end: &str) -> Event {
        Event {
            id: Uuid::new_v4(),
            owner_id,
            label_id: None,
            name: "Busy".to_string(),
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
    fn touching_intervals_do_not_overlap() {
        let ten = fixed_time("2026-03-02T10:00:00Z");
        let eleven = fixed_time("2026-03-02T11:00:00Z");
        let noon = fixed_time("2026-03-02T12:00:00Z");
        assert!(!overlaps(ten, eleven, eleven, noon));
        assert!(!overlaps(eleven, noon, ten, eleven));
    }

    #[test]
    fn partial_overlap_is_detected() {
        let owner = Uuid::new_v4();
        let existing = timed_event(owner, "2026-03-02T10:00:00Z", "2026-03-02T11:30:00Z");
        let ids = colliding_event_ids(
            Uuid::new_v4(),
            fixed_time("2026-03-02T11:00:00Z"),
            fixed_time("2026-03-02T12:00:00Z"),
            std::slice::from_ref(&existing),
        );
        assert_eq!(ids, vec![existing.id]);
    }

    #[test]
    fn drafts_untimed_and_self_are_ignored() {
        let owner = Uuid::new_v4();
        let mut draft = timed_event(owner, "2026-03-02T10:00:00Z", "2026-03-02T12:00:00Z");
        draft.status = EventStatus::Draft;
        let mut untimed = timed_event(owner, "2026-03-02T10:00:00Z", "2026-03-02T12:00:00Z");
        untimed.status = EventStatus::Draft;
        untimed.start_at = None;
        untimed.end_at = None;
        let same = timed_event(owner, "2026-03-02T10:00:00Z", "2026-03-02T12:00:00Z");

        let ids = colliding_event_ids(
            same.id,
            fixed_time("2026-03-02T10:30:00Z"),
            fixed_time("2026-03-02T11:00:00Z"),
            &[draft, untimed, same.clone()],
        );
        assert!(ids.is_empty());
    }

    #[test]
    fn containment_counts_as_overlap() {
        let owner = Uuid::new_v4();
        let outer = timed_event(owner, "2026-03-02T09:00:00Z", "2026-03-02T17:00:00Z");
        let start = outer.start_at.expect("timed") + Duration::hours(2);
        let ids = colliding_event_ids(Uuid::new_v4(), start, start + Duration::hours(1), &[outer.clone()]);
        assert_eq!(ids, vec![outer.id]);
    }
}
