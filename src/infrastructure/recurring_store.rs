use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{EventStatus, RecurringEvent, RecurringEventCursor, OPEN_ENDED_SENTINEL};
use crate::infrastructure::error::CoreError;

pub trait RecurringEventStore: Send + Sync {
    fn find_by_id(&self, recurring_event_id: Uuid) -> Result<Option<RecurringEvent>, CoreError>;
    fn save(&self, template: &RecurringEvent) -> Result<(), CoreError>;
    fn delete_by_id(&self, recurring_event_id: Uuid) -> Result<bool, CoreError>;
    /// Confirmed templates of `owner_id` whose validity range intersects
    /// `[from, to]` (inclusive dates), ascending by valid_from.
    fn find_confirmed_for_owner_between(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RecurringEvent>, CoreError>;
    /// Seek-paged confirmed templates: effective end date descending, id
    /// descending; open-ended templates sort first.
    fn page_confirmed(
        &self,
        owner_id: Uuid,
        cursor: Option<&RecurringEventCursor>,
        limit: u32,
    ) -> Result<Vec<RecurringEvent>, CoreError>;
    fn delete_drafts_for_owner(&self, owner_id: Uuid) -> Result<usize, CoreError>;
}

const TEMPLATE_COLUMNS: &str = "id, owner_id, label_id, name, description, start_time, end_time, \
     rule, skip_days, status, valid_from, valid_to";

#[derive(Debug, Clone)]
pub struct SqliteRecurringEventStore {
    db_path: PathBuf,
}

impl SqliteRecurringEventStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

type TemplateRow = (
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
);

fn read_template_row(row: &Row<'_>) -> rusqlite::Result<TemplateRow> {
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
        row.get(11)?,
    ))
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(value)
        .map_err(|error| CoreError::Storage(format!("invalid {field} '{value}': {error}")))
}

fn parse_date(value: &str, field: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| CoreError::Storage(format!("invalid {field} '{value}': {error}")))
}

fn parse_time(value: &str, field: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .map_err(|error| CoreError::Storage(format!("invalid {field} '{value}': {error}")))
}

fn parse_status(value: &str) -> Result<EventStatus, CoreError> {
    match value {
        "draft" => Ok(EventStatus::Draft),
        "confirmed" => Ok(EventStatus::Confirmed),
        other => Err(CoreError::Storage(format!(
            "unknown recurring event status '{other}'"
        ))),
    }
}

fn template_from_row(row: TemplateRow) -> Result<RecurringEvent, CoreError> {
    let (id, owner_id, label_id, name, description, start_time, end_time, rule, skip_days, status, valid_from, valid_to) =
        row;
    let skip_days: Vec<String> = serde_json::from_str(&skip_days)?;
    let skip_days: BTreeSet<NaiveDate> = skip_days
        .iter()
        .map(|value| parse_date(value, "recurring_event.skip_days[]"))
        .collect::<Result<_, _>>()?;

    Ok(RecurringEvent {
        id: parse_uuid(&id, "recurring_event.id")?,
        owner_id: parse_uuid(&owner_id, "recurring_event.owner_id")?,
        label_id: label_id
            .as_deref()
            .map(|value| parse_uuid(value, "recurring_event.label_id"))
            .transpose()?,
        name,
        description,
        start_time: parse_time(&start_time, "recurring_event.start_time")?,
        end_time: parse_time(&end_time, "recurring_event.end_time")?,
        rule,
        skip_days,
        status: parse_status(&status)?,
        valid_from: parse_date(&valid_from, "recurring_event.valid_from")?,
        valid_to: valid_to
            .as_deref()
            .map(|value| parse_date(value, "recurring_event.valid_to"))
            .transpose()?,
    })
}

fn skip_days_json(template: &RecurringEvent) -> Result<String, CoreError> {
    let days: Vec<String> = template
        .skip_days
        .iter()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .collect();
    Ok(serde_json::to_string(&days)?)
}

fn status_text(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Draft => "draft",
        EventStatus::Confirmed => "confirmed",
    }
}

impl RecurringEventStore for SqliteRecurringEventStore {
    fn find_by_id(&self, recurring_event_id: Uuid) -> Result<Option<RecurringEvent>, CoreError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {TEMPLATE_COLUMNS} FROM recurring_events WHERE id = ?1"),
                params![recurring_event_id.to_string()],
                read_template_row,
            )
            .optional()?;
        row.map(template_from_row).transpose()
    }

    fn save(&self, template: &RecurringEvent) -> Result<(), CoreError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO recurring_events (id, owner_id, label_id, name, description, start_time,
                                           end_time, rule, skip_days, status, valid_from, valid_to)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
               owner_id = excluded.owner_id,
               label_id = excluded.label_id,
               name = excluded.name,
               description = excluded.description,
               start_time = excluded.start_time,
               end_time = excluded.end_time,
               rule = excluded.rule,
               skip_days = excluded.skip_days,
               status = excluded.status,
               valid_from = excluded.valid_from,
               valid_to = excluded.valid_to",
            params![
                template.id.to_string(),
                template.owner_id.to_string(),
                template.label_id.map(|id| id.to_string()),
                template.name,
                template.description,
                template.start_time.format("%H:%M:%S").to_string(),
                template.end_time.format("%H:%M:%S").to_string(),
                template.rule,
                skip_days_json(template)?,
                status_text(template.status),
                template.valid_from.format("%Y-%m-%d").to_string(),
                template.valid_to.map(|date| date.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }

    fn delete_by_id(&self, recurring_event_id: Uuid) -> Result<bool, CoreError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM recurring_events WHERE id = ?1",
            params![recurring_event_id.to_string()],
        )?;
        Ok(deleted > 0)
    }

    fn find_confirmed_for_owner_between(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RecurringEvent>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_events
             WHERE owner_id = ?1 AND status = 'confirmed'
               AND valid_from <= ?3
               AND COALESCE(valid_to, '{OPEN_ENDED_SENTINEL}') >= ?2
             ORDER BY valid_from ASC, id ASC"
        ))?;
        let rows = statement.query_map(
            params![
                owner_id.to_string(),
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string()
            ],
            read_template_row,
        )?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(template_from_row(row?)?);
        }
        Ok(templates)
    }

    fn page_confirmed(
        &self,
        owner_id: Uuid,
        cursor: Option<&RecurringEventCursor>,
        limit: u32,
    ) -> Result<Vec<RecurringEvent>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM recurring_events
             WHERE owner_id = ?1 AND status = 'confirmed'
               AND (?2 IS NULL OR (COALESCE(valid_to, '{OPEN_ENDED_SENTINEL}'), id) < (?2, ?3))
             ORDER BY COALESCE(valid_to, '{OPEN_ENDED_SENTINEL}') DESC, id DESC
             LIMIT ?4"
        ))?;
        let rows = statement.query_map(
            params![
                owner_id.to_string(),
                cursor.map(|cursor| cursor.end_date.format("%Y-%m-%d").to_string()),
                cursor.map(|cursor| cursor.id.to_string()),
                i64::from(limit),
            ],
            read_template_row,
        )?;

        let mut templates = Vec::new();
        for row in rows {
            templates.push(template_from_row(row?)?);
        }
        Ok(templates)
    }

    fn delete_drafts_for_owner(&self, owner_id: Uuid) -> Result<usize, CoreError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM recurring_events WHERE owner_id = ?1 AND status = 'draft'",
            params![owner_id.to_string()],
        )?;
        Ok(deleted)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRecurringEventStore {
    templates: Mutex<HashMap<Uuid, RecurringEvent>>,
}

impl InMemoryRecurringEventStore {
    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, RecurringEvent>>, CoreError> {
        self.templates
            .lock()
            .map_err(|error| CoreError::Storage(format!("recurring store lock poisoned: {error}")))
    }
}

impl RecurringEventStore for InMemoryRecurringEventStore {
    fn find_by_id(&self, recurring_event_id: Uuid) -> Result<Option<RecurringEvent>, CoreError> {
        Ok(self.lock()?.get(&recurring_event_id).cloned())
    }

    fn save(&self, template: &RecurringEvent) -> Result<(), CoreError> {
        self.lock()?.insert(template.id, template.clone());
        Ok(())
    }

    fn delete_by_id(&self, recurring_event_id: Uuid) -> Result<bool, CoreError> {
        Ok(self.lock()?.remove(&recurring_event_id).is_some())
    }

    fn find_confirmed_for_owner_between(
        &self,
        owner_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RecurringEvent>, CoreError> {
        let templates = self.lock()?;
        let mut matching: Vec<RecurringEvent> = templates
            .values()
            .filter(|template| template.owner_id == owner_id && !template.status.is_draft())
            .filter(|template| {
                template.valid_from <= to && template.effective_end_date() >= from
            })
            .cloned()
            .collect();
        matching.sort_by_key(|template| (template.valid_from, template.id));
        Ok(matching)
    }

    fn page_confirmed(
        &self,
        owner_id: Uuid,
        cursor: Option<&RecurringEventCursor>,
        limit: u32,
    ) -> Result<Vec<RecurringEvent>, CoreError> {
        let templates = self.lock()?;
        let mut confirmed: Vec<RecurringEvent> = templates
            .values()
            .filter(|template| template.owner_id == owner_id && !template.status.is_draft())
            .filter(|template| match cursor {
                None => true,
                Some(cursor) => {
                    (template.effective_end_date(), template.id) < (cursor.end_date, cursor.id)
                }
            })
            .cloned()
            .collect();
        confirmed.sort_by(|a, b| {
            let a_key = (a.effective_end_date(), a.id);
            let b_key = (b.effective_end_date(), b.id);
            b_key.cmp(&a_key)
        });
        confirmed.truncate(limit as usize);
        Ok(confirmed)
    }

    fn delete_drafts_for_owner(&self, owner_id: Uuid) -> Result<usize, CoreError> {
        let mut templates = self.lock()?;
        let draft_ids: Vec<Uuid> = templates
            .values()
            .filter(|template| template.owner_id == owner_id && template.status.is_draft())
            .map(|template| template.id)
            .collect();
        for id in &draft_ids {
            templates.remove(id);
        }
        Ok(draft_ids.len())
    }
}
