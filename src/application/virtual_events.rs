use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::VirtualEvent;
use crate::domain::recurrence::RecurrenceRule;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::recurring_store::RecurringEventStore;

/// Projects confirmed templates into virtual occurrences for a query window.
/// Virtual events are never persisted; occurrences that already ended before
/// "now" are left to solidification and omitted here.
pub struct VirtualEventGenerator<R, C>
where
    R: RecurringEventStore,
    C: Clock,
{
    templates: Arc<R>,
    clock: Arc<C>,
}

impl<R, C> VirtualEventGenerator<R, C>
where
    R: RecurringEventStore,
    C: Clock,
{
    pub fn new(templates: Arc<R>, clock: Arc<C>) -> Self {
        Self { templates, clock }
    }

    pub fn generate(
        &self,
        owner_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<VirtualEvent>, CoreError> {
        if window_end <= window_start {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let zone = self.clock.zone_for(owner_id);

        // Occurrence dates are local calendar dates, so the instant window is
        // widened to the local dates it touches before expansion; the precise
        // instant filter comes after projection.
        let local_from = window_start.with_timezone(&zone).date_naive();
        let local_to = window_end.with_timezone(&zone).date_naive();

        let templates = self
            .templates
            .find_confirmed_for_owner_between(owner_id, local_from, local_to)?;

        let mut virtuals = Vec::new();
        for template in &templates {
            let rule = RecurrenceRule::parse(&template.rule).map_err(CoreError::Validation)?;
            for date in rule.expand(
                template.valid_from,
                template.valid_to,
                local_from,
                local_to,
                &template.skip_days,
            ) {
                let projected = VirtualEvent::project(template, date, zone);
                if projected.end_at < now {
                    continue;
                }
                if projected.start_at < window_end && projected.end_at > window_start {
                    virtuals.push(projected);
                }
            }
        }

        virtuals.sort_by(|a, b| {
            (a.start_at, a.recurring_event_id, a.occurrence_date)
                .cmp(&(b.start_at, b.recurring_event_id, b.occurrence_date))
        });
        Ok(virtuals)
    }
}
