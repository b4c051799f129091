use std::sync::Arc;
use uuid::Uuid;

use crate::application::time_buckets::{EventChangeContext, EventSnapshot, LabelTimeBucketTracker};
use crate::domain::conflict::colliding_event_ids;
use crate::domain::models::{Event, EventStatus, LabelTimeBucket};
use crate::infrastructure::bucket_store::LabelTimeBucketStore;
use crate::infrastructure::clock::Clock;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::event_store::EventStore;

/// Conflict-checked mutations for single events. Every committing mutation
/// routes its before/after snapshots through the bucket tracker; a failed
/// bucket delta rolls the event row back so the mutation is all-or-nothing.
pub struct EventService<E, B, C>
where
    E: EventStore,
    B: LabelTimeBucketStore,
    C: Clock,
{
    events: Arc<E>,
    tracker: LabelTimeBucketTracker<B>,
    clock: Arc<C>,
}

impl<E, B, C> EventService<E, B, C>
where
    E: EventStore,
    B: LabelTimeBucketStore,
    C: Clock,
{
    pub fn new(events: Arc<E>, buckets: Arc<B>, clock: Arc<C>) -> Self {
        Self {
            events,
            tracker: LabelTimeBucketTracker::new(buckets),
            clock,
        }
    }

    pub fn get(&self, event_id: Uuid) -> Result<Event, CoreError> {
        self.events
            .find_by_id(event_id)?
            .ok_or_else(|| CoreError::not_found("event", event_id))
    }

    pub fn create(&self, event: Event) -> Result<Event, CoreError> {
        event.validate().map_err(CoreError::Validation)?;
        self.ensure_no_conflicts(&event)?;
        self.commit(None, Some(event.clone()))?;
        Ok(event)
    }

    pub fn update(&self, event: Event) -> Result<Event, CoreError> {
        let existing = self.get(event.id)?;
        if existing.owner_id != event.owner_id {
            return Err(CoreError::Validation(
                "event.owner_id cannot change".to_string(),
            ));
        }
        event.validate().map_err(CoreError::Validation)?;
        self.ensure_no_conflicts(&event)?;
        self.commit(Some(existing), Some(event.clone()))?;
        Ok(event)
    }

    pub fn confirm(&self, event_id: Uuid) -> Result<Event, CoreError> {
        let existing = self.get(event_id)?;
        if existing.status == EventStatus::Confirmed {
            return Ok(existing);
        }
        let mut confirmed = existing.clone();
        confirmed.status = EventStatus::Confirmed;
        confirmed.validate().map_err(CoreError::Validation)?;
        self.ensure_no_conflicts(&confirmed)?;
        self.commit(Some(existing), Some(confirmed.clone()))?;
        Ok(confirmed)
    }

    pub fn set_completed(&self, event_id: Uuid, completed: bool) -> Result<Event, CoreError> {
        let existing = self.get(event_id)?;
        if existing.completed == completed {
            return Ok(existing);
        }
        let mut updated = existing.clone();
        updated.completed = completed;
        self.commit(Some(existing), Some(updated.clone()))?;
        Ok(updated)
    }

    pub fn relabel(&self, event_id: Uuid, label_id: Option<Uuid>) -> Result<Event, CoreError> {
        let existing = self.get(event_id)?;
        if existing.label_id == label_id {
            return Ok(existing);
        }
        let mut updated = existing.clone();
        updated.label_id = label_id;
        self.commit(Some(existing), Some(updated.clone()))?;
        Ok(updated)
    }

    pub fn delete(&self, event_id: Uuid) -> Result<(), CoreError> {
        let existing = self.get(event_id)?;
        self.commit(Some(existing), None)
    }

    /// Bulk removal of unconfirmed drafts. Drafts never contribute to the
    /// accounting, so no bucket work is involved.
    pub fn delete_drafts(&self, owner_id: Uuid) -> Result<usize, CoreError> {
        self.events.delete_drafts_for_owner(owner_id)
    }

    pub fn label_totals(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<LabelTimeBucket>, CoreError> {
        self.tracker.totals_for_owner(owner_id, year, month)
    }

    fn ensure_no_conflicts(&self, candidate: &Event) -> Result<(), CoreError> {
        if candidate.status.is_draft() {
            return Ok(());
        }
        let Some((start_at, end_at)) = candidate.interval() else {
            return Ok(());
        };
        let others = self
            .events
            .find_confirmed_for_owner_between(candidate.owner_id, start_at, end_at)?;
        let conflicting = colliding_event_ids(candidate.id, start_at, end_at, &others);
        if conflicting.is_empty() {
            Ok(())
        } else {
            Err(CoreError::conflict(conflicting))
        }
    }

    /// Persists the transition and applies the accounting delta. On a bucket
    /// failure the previous stored state is restored before the error
    /// propagates.
    fn commit(&self, before: Option<Event>, after: Option<Event>) -> Result<(), CoreError> {
        let owner_id = match (&before, &after) {
            (_, Some(event)) => event.owner_id,
            (Some(event), None) => event.owner_id,
            (None, None) => return Ok(()),
        };

        match (&before, &after) {
            (_, Some(event)) => self.events.save(event)?,
            (Some(event), None) => {
                if !self.events.delete_by_id(event.id)? {
                    return Err(CoreError::not_found("event", event.id));
                }
            }
            (None, None) => unreachable!(),
        }

        let context = EventChangeContext {
            owner_id,
            zone: self.clock.zone_for(owner_id),
            before: before.as_ref().and_then(EventSnapshot::of),
            after: after.as_ref().and_then(EventSnapshot::of),
        };
        if let Err(error) = self.tracker.handle_event_change(&context) {
            log::warn!("bucket delta failed for owner {owner_id}, rolling back event write: {error}");
            let restore = match &before {
                Some(event) => self.events.save(event),
                None => after
                    .as_ref()
                    .map(|event| self.events.delete_by_id(event.id).map(|_| ()))
                    .unwrap_or(Ok(())),
            };
            if let Err(restore_error) = restore {
                log::error!("rollback failed for owner {owner_id}: {restore_error}");
            }
            return Err(error);
        }
        Ok(())
    }
}
