use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::conflict::overlaps;
use crate::domain::models::{EventStatus, RecurringEvent};
use crate::domain::recurrence::RecurrenceRule;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::event_store::EventStore;
use crate::infrastructure::recurring_store::RecurringEventStore;

const DEFAULT_VALIDATION_HORIZON_DAYS: i64 = 370;

/// Mutations for recurring templates. Confirming a template checks its
/// upcoming occurrences against confirmed events and against the occurrences
/// of every other confirmed template, over a bounded horizon.
pub struct RecurringEventService<R, E, C>
where
    R: RecurringEventStore,
    E: EventStore,
    C: Clock,
{
    templates: Arc<R>,
    events: Arc<E>,
    clock: Arc<C>,
    validation_horizon_days: i64,
}

impl<R, E, C> RecurringEventService<R, E, C>
where
    R: RecurringEventStore,
    E: EventStore,
    C: Clock,
{
    pub fn new(templates: Arc<R>, events: Arc<E>, clock: Arc<C>) -> Self {
        Self {
            templates,
            events,
            clock,
            validation_horizon_days: DEFAULT_VALIDATION_HORIZON_DAYS,
        }
    }

    pub fn from_config(
        templates: Arc<R>,
        events: Arc<E>,
        clock: Arc<C>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(templates, events, clock)
            .with_validation_horizon(config.max_expansion_window_days)
    }

    pub fn with_validation_horizon(mut self, days: i64) -> Self {
        self.validation_horizon_days = days.max(1);
        self
    }

    pub fn get(&self, recurring_event_id: Uuid) -> Result<RecurringEvent, CoreError> {
        self.templates
            .find_by_id(recurring_event_id)?
            .ok_or_else(|| CoreError::not_found("recurring event", recurring_event_id))
    }

    pub fn create(&self, template: RecurringEvent) -> Result<RecurringEvent, CoreError> {
        template.validate().map_err(CoreError::Validation)?;
        self.ensure_occurrences_free(&template, None)?;
        self.templates.save(&template)?;
        Ok(template)
    }

    pub fn update(&self, template: RecurringEvent) -> Result<RecurringEvent, CoreError> {
        let existing = self.get(template.id)?;
        if existing.owner_id != template.owner_id {
            return Err(CoreError::Validation(
                "recurring_event.owner_id cannot change".to_string(),
            ));
        }
        template.validate().map_err(CoreError::Validation)?;
        self.ensure_occurrences_free(&template, None)?;
        self.templates.save(&template)?;
        Ok(template)
    }

    pub fn confirm(&self, recurring_event_id: Uuid) -> Result<RecurringEvent, CoreError> {
        let existing = self.get(recurring_event_id)?;
        if existing.status == EventStatus::Confirmed {
            return Ok(existing);
        }
        let mut confirmed = existing;
        confirmed.status = EventStatus::Confirmed;
        confirmed.validate().map_err(CoreError::Validation)?;
        self.ensure_occurrences_free(&confirmed, None)?;
        self.templates.save(&confirmed)?;
        Ok(confirmed)
    }

    pub fn delete(&self, recurring_event_id: Uuid) -> Result<(), CoreError> {
        if !self.templates.delete_by_id(recurring_event_id)? {
            return Err(CoreError::not_found("recurring event", recurring_event_id));
        }
        Ok(())
    }

    pub fn delete_drafts(&self, owner_id: Uuid) -> Result<usize, CoreError> {
        self.templates.delete_drafts_for_owner(owner_id)
    }

    /// Removing an occurrence can never create a conflict, so skip days are
    /// added without any validation pass.
    pub fn add_skip_day(
        &self,
        recurring_event_id: Uuid,
        date: NaiveDate,
    ) -> Result<RecurringEvent, CoreError> {
        let mut template = self.get(recurring_event_id)?;
        if template.skip_days.insert(date) {
            self.templates.save(&template)?;
        }
        Ok(template)
    }

    /// Restores previously skipped dates. Each restored occurrence re-enters
    /// the calendar, so the freed dates are conflict-checked first.
    pub fn remove_skip_days(
        &self,
        recurring_event_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<RecurringEvent, CoreError> {
        let mut template = self.get(recurring_event_id)?;
        let restored: BTreeSet<NaiveDate> = dates
            .iter()
            .copied()
            .filter(|date| template.skip_days.contains(date))
            .collect();
        if restored.is_empty() {
            return Ok(template);
        }

        if template.status == EventStatus::Confirmed {
            let mut candidate = template.clone();
            for date in &restored {
                candidate.skip_days.remove(date);
            }
            self.ensure_occurrences_free(&candidate, Some(&restored))?;
        }

        for date in &restored {
            template.skip_days.remove(date);
        }
        self.templates.save(&template)?;
        Ok(template)
    }

    /// Checks occurrences of `template` against confirmed events and the
    /// occurrences of other confirmed templates. Without `only_dates` the
    /// scan covers the validation window; with `only_dates` (restored skip
    /// days) exactly those dates are checked, wherever they fall in the
    /// validity range. Occurrences already solidified from this same template
    /// are not counted against it.
    fn ensure_occurrences_free(
        &self,
        template: &RecurringEvent,
        only_dates: Option<&BTreeSet<NaiveDate>>,
    ) -> Result<(), CoreError> {
        if template.status.is_draft() {
            return Ok(());
        }
        let rule = RecurrenceRule::parse(&template.rule).map_err(CoreError::Validation)?;
        let zone = self.clock.zone_for(template.owner_id);
        let today = self.clock.now().with_timezone(&zone).date_naive();

        let dates: Vec<NaiveDate> = match only_dates {
            Some(only) => only
                .iter()
                .copied()
                .filter(|date| {
                    rule.occurs_on(template.valid_from, template.valid_to, *date)
                        && !template.skip_days.contains(date)
                })
                .collect(),
            None => {
                let window_start = template.valid_from.max(today);
                let mut window_end = window_start + Duration::days(self.validation_horizon_days);
                if let Some(valid_to) = template.valid_to {
                    window_end = window_end.min(valid_to);
                }
                if window_end < window_start {
                    return Ok(());
                }
                rule.expand(
                    template.valid_from,
                    template.valid_to,
                    window_start,
                    window_end,
                    &template.skip_days,
                )
            }
        };
        let (Some(scan_from), Some(scan_to)) = (dates.first().copied(), dates.last().copied())
        else {
            return Ok(());
        };

        let intervals: Vec<_> = dates
            .iter()
            .map(|date| (*date, template.occurrence_interval(*date, zone)))
            .collect();
        let fetch_from = intervals
            .iter()
            .map(|(_, (start_at, _))| *start_at)
            .min()
            .unwrap_or_else(|| self.clock.now());
        let fetch_to = intervals
            .iter()
            .map(|(_, (_, end_at))| *end_at)
            .max()
            .unwrap_or_else(|| self.clock.now());

        let mut conflicting = Vec::new();

        let events = self
            .events
            .find_confirmed_for_owner_between(template.owner_id, fetch_from, fetch_to)?;
        for event in &events {
            if event.recurring_event_id == Some(template.id) || event.status.is_draft() {
                continue;
            }
            let Some((event_start, event_end)) = event.interval() else {
                continue;
            };
            if intervals
                .iter()
                .any(|(_, (start_at, end_at))| overlaps(*start_at, *end_at, event_start, event_end))
            {
                conflicting.push(event.id);
            }
        }

        // Template occurrences never cross a local midnight, so two templates
        // can only collide on the same occurrence date.
        let others = self
            .templates
            .find_confirmed_for_owner_between(template.owner_id, scan_from, scan_to)?;
        for other in &others {
            if other.id == template.id {
                continue;
            }
            let Ok(other_rule) = RecurrenceRule::parse(&other.rule) else {
                continue;
            };
            let collides = intervals.iter().any(|(date, (start_at, end_at))| {
                if !other_rule.occurs_on(other.valid_from, other.valid_to, *date)
                    || other.skip_days.contains(date)
                {
                    return false;
                }
                let (other_start, other_end) = other.occurrence_interval(*date, zone);
                overlaps(*start_at, *end_at, other_start, other_end)
            });
            if collides {
                conflicting.push(other.id);
            }
        }

        if conflicting.is_empty() {
            Ok(())
        } else {
            Err(CoreError::conflict(conflicting))
        }
    }
}
