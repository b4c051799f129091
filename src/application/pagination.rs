use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{Event, EventCursor, RecurringEvent, RecurringEventCursor};
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::event_store::EventStore;
use crate::infrastructure::recurring_store::RecurringEventStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPage {
    pub items: Vec<Event>,
    pub next_cursor: Option<EventCursor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurringEventPage {
    pub items: Vec<RecurringEvent>,
    pub next_cursor: Option<RecurringEventCursor>,
}

/// Seek-based listing over confirmed events and templates. Cursors are the
/// sort key of the last row, so pages stay stable under concurrent inserts:
/// rows added before the cursor position never shift later pages.
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    default_page_size: u32,
    max_page_size: u32,
}

impl CursorPaginator {
    pub fn new(max_page_size: u32) -> Self {
        let max_page_size = max_page_size.max(1);
        Self {
            default_page_size: max_page_size,
            max_page_size,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_page_size: config.default_page_size.clamp(1, config.max_page_size.max(1)),
            max_page_size: config.max_page_size.max(1),
        }
    }

    /// Limit used when the caller does not pick one.
    pub fn default_limit(&self) -> u32 {
        self.default_page_size
    }

    fn check_limit(&self, limit: u32) -> Result<(), CoreError> {
        if limit == 0 {
            return Err(CoreError::Validation("page limit must be > 0".to_string()));
        }
        if limit > self.max_page_size {
            return Err(CoreError::Validation(format!(
                "page limit {limit} exceeds the maximum of {}",
                self.max_page_size
            )));
        }
        Ok(())
    }

    pub fn page_events<E: EventStore>(
        &self,
        events: &Arc<E>,
        owner_id: Uuid,
        cursor: Option<&EventCursor>,
        limit: u32,
    ) -> Result<EventPage, CoreError> {
        self.check_limit(limit)?;
        let items = events.page_confirmed(owner_id, cursor, limit)?;
        let next_cursor = if items.len() == limit as usize {
            items.last().and_then(Event::cursor)
        } else {
            None
        };
        Ok(EventPage { items, next_cursor })
    }

    pub fn page_recurring_events<R: RecurringEventStore>(
        &self,
        templates: &Arc<R>,
        owner_id: Uuid,
        cursor: Option<&RecurringEventCursor>,
        limit: u32,
    ) -> Result<RecurringEventPage, CoreError> {
        self.check_limit(limit)?;
        let items = templates.page_confirmed(owner_id, cursor, limit)?;
        let next_cursor = if items.len() == limit as usize {
            items.last().map(RecurringEvent::cursor)
        } else {
            None
        };
        Ok(RecurringEventPage { items, next_cursor })
    }
}
