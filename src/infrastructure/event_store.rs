use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{Event, EventCursor, EventStatus};
use crate::infrastructure::error::CoreError;

pub trait EventStore: Send + Sync {
    fn find_by_id(&self, event_id: Uuid) -> Result<Option<Event>, CoreError>;
    fn save(&self, event: &Event) -> Result<(), CoreError>;
    fn delete_by_id(&self, event_id: Uuid) -> Result<bool, CoreError>;
    /// Confirmed timed events of `owner_id` whose `[start, end)` interval
    /// overlaps `[from, to)`, ascending by start.
    fn find_confirmed_for_owner_between(
        &self,
        owner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError>;
    fn find_by_template_and_date(
        &self,
        recurring_event_id: Uuid,
        occurrence_date: NaiveDate,
    ) -> Result<Option<Event>, CoreError>;
    /// Seek-paged confirmed events: end descending, start descending, id
    /// descending, strictly after the cursor tuple.
    fn page_confirmed(
        &self,
        owner_id: Uuid,
        cursor: Option<&EventCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, CoreError>;
    fn delete_drafts_for_owner(&self, owner_id: Uuid) -> Result<usize, CoreError>;
}

const EVENT_COLUMNS: &str = "id, owner_id, label_id, name, description, start_at, end_at, \
     completed, status, recurring_event_id, occurrence_date";

#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    db_path: PathBuf,
}

impl SqliteEventStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

fn status_text(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Draft => "draft",
        EventStatus::Confirmed => "confirmed",
    }
}

fn parse_status(value: &str) -> Result<EventStatus, CoreError> {
    match value {
        "draft" => Ok(EventStatus::Draft),
        "confirmed" => Ok(EventStatus::Confirmed),
        other => Err(CoreError::Storage(format!("unknown event status '{other}'"))),
    }
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(value)
        .map_err(|error| CoreError::Storage(format!("invalid {field} '{value}': {error}")))
}

fn parse_instant(value: i64, field: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp(value, 0)
        .ok_or_else(|| CoreError::Storage(format!("invalid {field} timestamp {value}")))
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| CoreError::Storage(format!("invalid {field} '{value}': {error}")))
}

type EventRow = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<i64>,
    Option<i64>,
    bool,
    String,
    Option<String>,
    Option<String>,
);

fn read_event_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn event_from_row(row: EventRow) -> Result<Event, CoreError> {
    let (id, owner_id, label_id, name, description, start_at, end_at, completed, status, recurring_event_id, occurrence_date) =
        row;
    Ok(Event {
        id: parse_uuid(&id, "event.id")?,
        owner_id: parse_uuid(&owner_id, "event.owner_id")?,
        label_id: label_id
            .as_deref()
            .map(|value| parse_uuid(value, "event.label_id"))
            .transpose()?,
        name,
        description,
        start_at: start_at
            .map(|value| parse_instant(value, "event.start_at"))
            .transpose()?,
        end_at: end_at
            .map(|value| parse_instant(value, "event.end_at"))
            .transpose()?,
        completed,
        status: parse_status(&status)?,
        recurring_event_id: recurring_event_id
            .as_deref()
            .map(|value| parse_uuid(value, "event.recurring_event_id"))
            .transpose()?,
        occurrence_date: occurrence_date
            .as_deref()
            .map(|value| parse_date(value, "event.occurrence_date"))
            .transpose()?,
    })
}

impl EventStore for SqliteEventStore {
    fn find_by_id(&self, event_id: Uuid) -> Result<Option<Event>, CoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![event_id.to_string()],
                read_event_row,
            )
            .optional()?;
        row.map(event_from_row).transpose()
    }

    fn save(&self, event: &Event) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO events (id, owner_id, label_id, name, description, start_at, end_at,
                                 completed, status, recurring_event_id, occurrence_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
               owner_id = excluded.owner_id,
               label_id = excluded.label_id,
               name = excluded.name,
               description = excluded.description,
               start_at = excluded.start_at,
               end_at = excluded.end_at,
               completed = excluded.completed,
               status = excluded.status,
               recurring_event_id = excluded.recurring_event_id,
               occurrence_date = excluded.occurrence_date",
            params![
                event.id.to_string(),
                event.owner_id.to_string(),
                event.label_id.map(|id| id.to_string()),
                event.name,
                event.description,
                event.start_at.map(|at| at.timestamp()),
                event.end_at.map(|at| at.timestamp()),
                event.completed,
                status_text(event.status),
                event.recurring_event_id.map(|id| id.to_string()),
                event.occurrence_date.map(|date| date.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }

    fn delete_by_id(&self, event_id: Uuid) -> Result<bool, CoreError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM events WHERE id = ?1",
            params![event_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn find_confirmed_for_owner_between(
        &self,
        owner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE owner_id = ?1 AND status = 'confirmed'
               AND start_at IS NOT NULL AND end_at IS NOT NULL
               AND start_at < ?3 AND end_at > ?2
             ORDER BY start_at ASC, id ASC"
        ))?;
        let rows = statement.query_map(
            params![owner_id.to_string(), from.timestamp(), to.timestamp()],
            read_event_row,
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(event_from_row(row?)?);
        }
        Ok(events)
    }

    fn find_by_template_and_date(
        &self,
        recurring_event_id: Uuid,
        occurrence_date: NaiveDate,
    ) -> Result<Option<Event>, CoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE recurring_event_id = ?1 AND occurrence_date = ?2"
                ),
                params![
                    recurring_event_id.to_string(),
                    occurrence_date.format("%Y-%m-%d").to_string()
                ],
                read_event_row,
            )
            .optional()?;
        row.map(event_from_row).transpose()
    }

    fn page_confirmed(
        &self,
        owner_id: Uuid,
        cursor: Option<&EventCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE owner_id = ?1 AND status = 'confirmed'
               AND start_at IS NOT NULL AND end_at IS NOT NULL
               AND (?2 IS NULL OR (end_at, start_at, id) < (?2, ?3, ?4))
             ORDER BY end_at DESC, start_at DESC, id DESC
             LIMIT ?5"
        ))?;
        let rows = statement.query_map(
            params![
                owner_id.to_string(),
                cursor.map(|cursor| cursor.end_at.timestamp()),
                cursor.map(|cursor| cursor.start_at.timestamp()),
                cursor.map(|cursor| cursor.id.to_string()),
                i64::from(limit),
            ],
            read_event_row,
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(event_from_row(row?)?);
        }
        Ok(events)
    }

    fn delete_drafts_for_owner(&self, owner_id: Uuid) -> Result<usize, CoreError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM events WHERE owner_id = ?1 AND status = 'draft'",
            params![owner_id.to_string()],
        )?;
        Ok(deleted)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: Mutex<HashMap<Uuid, Event>>,
}

impl InMemoryEventStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Event>>, CoreError> {
        self.events
            .lock()
            .map_err(|error| CoreError::Storage(format!("event store lock poisoned: {error}")))
    }
}

impl EventStore for InMemoryEventStore {
    fn find_by_id(&self, event_id: Uuid) -> Result<Option<Event>, CoreError> {
        Ok(self.lock()?.get(&event_id).cloned())
    }

    fn save(&self, event: &Event) -> Result<(), CoreError> {
        let mut events = self.lock()?;
        if let (Some(recurring_event_id), Some(occurrence_date)) =
            (event.recurring_event_id, event.occurrence_date)
        {
            let duplicate = events.values().any(|existing| {
                existing.id != event.id
                    && existing.recurring_event_id == Some(recurring_event_id)
                    && existing.occurrence_date == Some(occurrence_date)
            });
            if duplicate {
                return Err(CoreError::Storage(
                    "UNIQUE constraint failed: events.recurring_event_id, events.occurrence_date"
                        .to_string(),
                ));
            }
        }
        events.insert(event.id, event.clone());
        Ok(())
    }

    fn delete_by_id(&self, event_id: Uuid) -> Result<bool, CoreError> {
        Ok(self.lock()?.remove(&event_id).is_some())
    }

    fn find_confirmed_for_owner_between(
        &self,
        owner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoreError> {
        let events = self.lock()?;
        let mut matching: Vec<Event> = events
            .values()
            .filter(|event| event.owner_id == owner_id && !event.status.is_draft())
            .filter(|event| {
                event
                    .interval()
                    .is_some_and(|(start_at, end_at)| start_at < to && end_at > from)
            })
            .cloned()
            .collect();
        matching.sort_by_key(|event| (event.start_at, event.id));
        Ok(matching)
    }

    fn find_by_template_and_date(
        &self,
        recurring_event_id: Uuid,
        occurrence_date: NaiveDate,
    ) -> Result<Option<Event>, CoreError> {
        let events = self.lock()?;
        Ok(events
            .values()
            .find(|event| {
                event.recurring_event_id == Some(recurring_event_id)
                    && event.occurrence_date == Some(occurrence_date)
            })
            .cloned())
    }

    fn page_confirmed(
        &self,
        owner_id: Uuid,
        cursor: Option<&EventCursor>,
        limit: u32,
    ) -> Result<Vec<Event>, CoreError> {
        let events = self.lock()?;
        let mut confirmed: Vec<Event> = events
            .values()
            .filter(|event| {
                event.owner_id == owner_id
                    && !event.status.is_draft()
                    && event.interval().is_some()
            })
            .filter(|event| match cursor {
                None => true,
                Some(cursor) => {
                    let (start_at, end_at) = event.interval().expect("timed event");
                    (end_at, start_at, event.id) < (cursor.end_at, cursor.start_at, cursor.id)
                }
            })
            .cloned()
            .collect();
        confirmed.sort_by(|a, b| {
            let a_key = (a.end_at, a.start_at, a.id);
            let b_key = (b.end_at, b.start_at, b.id);
            b_key.cmp(&a_key)
        });
        confirmed.truncate(limit as usize);
        Ok(confirmed)
    }

    fn delete_drafts_for_owner(&self, owner_id: Uuid) -> Result<usize, CoreError> {
        let mut events = self.lock()?;
        let draft_ids: Vec<Uuid> = events
            .values()
            .filter(|event| event.owner_id == owner_id && event.status.is_draft())
            .map(|event| event.id)
            .collect();
        for id in &draft_ids {
            events.remove(id);
        }
        Ok(draft_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::initialize_database;
    use chrono::Duration;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn timed_event(owner_id: Uuid, start: &str, minutes: i64) -> Event {
        let start_at = fixed_time(start);
        Event {
            id: Uuid::new_v4(),
            owner_id,
            label_id: None,
            name: "Entry".to_string(),
            description: None,
            start_at: Some(start_at),
            end_at: Some(start_at + Duration::minutes(minutes)),
            completed: false,
            status: EventStatus::Confirmed,
            recurring_event_id: None,
            occurrence_date: None,
        }
    }

    fn stores() -> (SqliteEventStore, InMemoryEventStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("planner.db");
        initialize_database(&path).expect("schema");
        (SqliteEventStore::new(&path), InMemoryEventStore::default(), dir)
    }

    fn exercise_roundtrip(store: &dyn EventStore) {
        let owner = Uuid::new_v4();
        let mut event = timed_event(owner, "2026-03-02T09:00:00Z", 60);
        event.occurrence_date = Some(
            NaiveDate::parse_from_str("2026-03-02", "%Y-%m-%d").expect("valid date"),
        );
        event.recurring_event_id = Some(Uuid::new_v4());
        store.save(&event).expect("save");

        let loaded = store
            .find_by_id(event.id)
            .expect("find")
            .expect("event exists");
        assert_eq!(loaded, event);

        let by_occurrence = store
            .find_by_template_and_date(
                event.recurring_event_id.expect("template id"),
                event.occurrence_date.expect("occurrence date"),
            )
            .expect("find by template")
            .expect("event exists");
        assert_eq!(by_occurrence.id, event.id);

        assert!(store.delete_by_id(event.id).expect("delete"));
        assert!(store.find_by_id(event.id).expect("find").is_none());
    }

    #[test]
    fn save_and_load_roundtrip_both_backends() {
        let (sqlite, memory, _dir) = stores();
        exercise_roundtrip(&sqlite);
        exercise_roundtrip(&memory);
    }

    fn exercise_duplicate_occurrence(store: &dyn EventStore) {
        let owner = Uuid::new_v4();
        let template_id = Uuid::new_v4();
        let date = NaiveDate::parse_from_str("2026-03-02", "%Y-%m-%d").expect("valid date");

        let mut first = timed_event(owner, "2026-03-02T09:00:00Z", 60);
        first.recurring_event_id = Some(template_id);
        first.occurrence_date = Some(date);
        store.save(&first).expect("save first");

        let mut second = timed_event(owner, "2026-03-02T12:00:00Z", 60);
        second.recurring_event_id = Some(template_id);
        second.occurrence_date = Some(date);
        assert!(store.save(&second).is_err());

        // Re-saving the same row is not a duplicate.
        first.completed = true;
        store.save(&first).expect("update first");
    }

    #[test]
    fn duplicate_template_occurrence_is_rejected_both_backends() {
        let (sqlite, memory, _dir) = stores();
        exercise_duplicate_occurrence(&sqlite);
        exercise_duplicate_occurrence(&memory);
    }

    fn exercise_overlap_query(store: &dyn EventStore) {
        let owner = Uuid::new_v4();
        let inside = timed_event(owner, "2026-03-02T10:00:00Z", 60);
        let touching_before = timed_event(owner, "2026-03-02T09:00:00Z", 60);
        let after = timed_event(owner, "2026-03-02T12:00:00Z", 60);
        let mut draft = timed_event(owner, "2026-03-02T10:15:00Z", 30);
        draft.status = EventStatus::Draft;
        let other_owner = timed_event(Uuid::new_v4(), "2026-03-02T10:00:00Z", 60);

        for event in [&inside, &touching_before, &after, &draft, &other_owner] {
            store.save(event).expect("save");
        }

        let found = store
            .find_confirmed_for_owner_between(
                owner,
                fixed_time("2026-03-02T10:00:00Z"),
                fixed_time("2026-03-02T11:00:00Z"),
            )
            .expect("query");
        let ids: Vec<Uuid> = found.iter().map(|event| event.id).collect();
        assert_eq!(ids, vec![inside.id]);
    }

    #[test]
    fn overlap_query_uses_half_open_semantics_both_backends() {
        let (sqlite, memory, _dir) = stores();
        exercise_overlap_query(&sqlite);
        exercise_overlap_query(&memory);
    }

    fn exercise_paging(store: &dyn EventStore) {
        let owner = Uuid::new_v4();
        let mut saved = Vec::new();
        for offset in 0..5 {
            let event = timed_event(
                owner,
                &format!("2026-03-0{}T09:00:00Z", offset + 1),
                60,
            );
            store.save(&event).expect("save");
            saved.push(event);
        }

        let first_page = store.page_confirmed(owner, None, 2).expect("page 1");
        assert_eq!(first_page.len(), 2);
        // Latest end time first.
        assert_eq!(first_page[0].id, saved[4].id);
        assert_eq!(first_page[1].id, saved[3].id);

        let cursor = first_page[1].cursor().expect("cursor");
        let second_page = store
            .page_confirmed(owner, Some(&cursor), 2)
            .expect("page 2");
        assert_eq!(second_page[0].id, saved[2].id);
        assert_eq!(second_page[1].id, saved[1].id);

        let cursor = second_page[1].cursor().expect("cursor");
        let last_page = store
            .page_confirmed(owner, Some(&cursor), 2)
            .expect("page 3");
        assert_eq!(last_page.len(), 1);
        assert_eq!(last_page[0].id, saved[0].id);
    }

    #[test]
    fn seek_pagination_walks_full_set_both_backends() {
        let (sqlite, memory, _dir) = stores();
        exercise_paging(&sqlite);
        exercise_paging(&memory);
    }

    fn exercise_draft_cleanup(store: &dyn EventStore) {
        let owner = Uuid::new_v4();
        let mut draft = timed_event(owner, "2026-03-02T09:00:00Z", 30);
        draft.status = EventStatus::Draft;
        let confirmed = timed_event(owner, "2026-03-02T11:00:00Z", 30);
        store.save(&draft).expect("save draft");
        store.save(&confirmed).expect("save confirmed");

        assert_eq!(store.delete_drafts_for_owner(owner).expect("cleanup"), 1);
        assert!(store.find_by_id(draft.id).expect("find").is_none());
        assert!(store.find_by_id(confirmed.id).expect("find").is_some());
    }

    #[test]
    fn draft_cleanup_leaves_confirmed_events_both_backends() {
        let (sqlite, memory, _dir) = stores();
        exercise_draft_cleanup(&sqlite);
        exercise_draft_cleanup(&memory);
    }
}
