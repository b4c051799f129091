use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::conflict::colliding_event_ids;
use crate::domain::models::{Event, EventStatus, RecurringEvent};
use crate::domain::recurrence::RecurrenceRule;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::event_store::EventStore;
use crate::infrastructure::recurring_store::RecurringEventStore;

const DEFAULT_LOOKBACK_DAYS: i64 = 35;

/// Report of one solidification sweep. Failures are collected per occurrence
/// so a single bad slot never aborts the rest of the sweep.
#[derive(Debug, Default)]
pub struct SolidifyOutcome {
    pub created: usize,
    pub skipped_existing: usize,
    pub failures: Vec<SolidifyFailure>,
}

#[derive(Debug)]
pub struct SolidifyFailure {
    pub recurring_event_id: Uuid,
    pub occurrence_date: NaiveDate,
    pub error: CoreError,
}

/// Materializes due template occurrences into persisted events. An occurrence
/// is due once its start instant has passed; future occurrences stay virtual.
/// Sweeps are idempotent: the per-(template, date) existence check plus the
/// storage-level uniqueness backstop keep reruns from duplicating events.
pub struct SolidificationEngine<R, E, C>
where
    R: RecurringEventStore,
    E: EventStore,
    C: Clock,
{
    templates: Arc<R>,
    events: Arc<E>,
    clock: Arc<C>,
    lookback_days: i64,
}

impl<R, E, C> SolidificationEngine<R, E, C>
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
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn from_config(
        templates: Arc<R>,
        events: Arc<E>,
        clock: Arc<C>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(templates, events, clock).with_lookback_days(config.solidify_lookback_days)
    }

    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days.max(1);
        self
    }

    /// Sweeps the configured lookback window ending at the owner's local
    /// today.
    pub fn solidify_due(&self, owner_id: Uuid) -> Result<SolidifyOutcome, CoreError> {
        let zone = self.clock.zone_for(owner_id);
        let today = self.clock.now().with_timezone(&zone).date_naive();
        self.solidify_window(owner_id, today - Duration::days(self.lookback_days), today)
    }

    pub fn solidify_window(
        &self,
        owner_id: Uuid,
        window_start: NaiveDate,
        window_end: NaiveDate,
    ) -> Result<SolidifyOutcome, CoreError> {
        let mut outcome = SolidifyOutcome::default();
        if window_end < window_start {
            return Ok(outcome);
        }
        let now = self.clock.now();
        let zone = self.clock.zone_for(owner_id);

        let templates = self
            .templates
            .find_confirmed_for_owner_between(owner_id, window_start, window_end)?;
        for template in &templates {
            let rule = match RecurrenceRule::parse(&template.rule) {
                Ok(rule) => rule,
                Err(message) => {
                    log::error!(
                        "template {} has an unparseable rule, skipping sweep: {message}",
                        template.id
                    );
                    outcome.failures.push(SolidifyFailure {
                        recurring_event_id: template.id,
                        occurrence_date: template.valid_from,
                        error: CoreError::Validation(message),
                    });
                    continue;
                }
            };

            for date in rule.expand(
                template.valid_from,
                template.valid_to,
                window_start,
                window_end,
                &template.skip_days,
            ) {
                let (start_at, end_at) = template.occurrence_interval(date, zone);
                if start_at > now {
                    continue;
                }
                if self
                    .events
                    .find_by_template_and_date(template.id, date)?
                    .is_some()
                {
                    outcome.skipped_existing += 1;
                    continue;
                }

                let event = materialize(template, date, start_at, end_at);

                // Safety net: conflicts should have been caught when the
                // template was confirmed, but one-off events created since
                // then may occupy the slot.
                let others = self
                    .events
                    .find_confirmed_for_owner_between(owner_id, start_at, end_at)?;
                let conflicting = colliding_event_ids(event.id, start_at, end_at, &others);
                if !conflicting.is_empty() {
                    log::warn!(
                        "occurrence {date} of template {} collides with existing events",
                        template.id
                    );
                    outcome.failures.push(SolidifyFailure {
                        recurring_event_id: template.id,
                        occurrence_date: date,
                        error: CoreError::conflict(conflicting),
                    });
                    continue;
                }

                match self.events.save(&event) {
                    Ok(()) => outcome.created += 1,
                    Err(error) => {
                        log::error!(
                            "failed to solidify occurrence {date} of template {}: {error}",
                            template.id
                        );
                        outcome.failures.push(SolidifyFailure {
                            recurring_event_id: template.id,
                            occurrence_date: date,
                            error,
                        });
                    }
                }
            }
        }
        Ok(outcome)
    }
}

fn materialize(
    template: &RecurringEvent,
    date: NaiveDate,
    start_at: chrono::DateTime<chrono::Utc>,
    end_at: chrono::DateTime<chrono::Utc>,
) -> Event {
    Event {
        id: Uuid::new_v4(),
        owner_id: template.owner_id,
        label_id: template.label_id,
        name: template.name.clone(),
        description: template.description.clone(),
        start_at: Some(start_at),
        end_at: Some(end_at),
        completed: false,
        status: EventStatus::Confirmed,
        recurring_event_id: Some(template.id),
        occurrence_date: Some(date),
    }
}
