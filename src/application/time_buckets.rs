use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{BucketKey, Event, LabelTimeBucket};
use crate::infrastructure::bucket_store::LabelTimeBucketStore;
use crate::infrastructure::error::CoreError;

/// What one event contributed to the accounting before or after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSnapshot {
    pub label_id: Option<Uuid>,
    pub start_at: DateTime<Utc>,
    pub duration_minutes: i64,
    pub completed: bool,
    pub draft: bool,
}

impl EventSnapshot {
    pub fn of(event: &Event) -> Option<Self> {
        let (start_at, end_at) = event.interval()?;
        Some(Self {
            label_id: event.label_id,
            start_at,
            duration_minutes: (end_at - start_at).num_minutes(),
            completed: event.completed,
            draft: event.status.is_draft(),
        })
    }

    fn counted(&self) -> bool {
        self.completed && !self.draft
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EventChangeContext {
    pub owner_id: Uuid,
    pub zone: Tz,
    pub before: Option<EventSnapshot>,
    pub after: Option<EventSnapshot>,
}

fn contribution(
    owner_id: Uuid,
    zone: Tz,
    snapshot: Option<&EventSnapshot>,
) -> Option<(BucketKey, i64)> {
    let snapshot = snapshot?;
    if !snapshot.counted() {
        return None;
    }
    let local_start = snapshot.start_at.with_timezone(&zone);
    let key = BucketKey {
        owner_id,
        label_id: snapshot.label_id,
        year: local_start.year(),
        month: local_start.month(),
    };
    Some((key, snapshot.duration_minutes))
}

pub struct LabelTimeBucketTracker<B: LabelTimeBucketStore> {
    buckets: Arc<B>,
}

impl<B: LabelTimeBucketStore> LabelTimeBucketTracker<B> {
    pub fn new(buckets: Arc<B>) -> Self {
        Self { buckets }
    }

    /// Applies the accounting delta for one event mutation. Subtract-old and
    /// add-new are two independent operations because label and period may
    /// both change at once. If the add fails after the subtract succeeded,
    /// the subtract is reverted before the error propagates.
    pub fn handle_event_change(&self, context: &EventChangeContext) -> Result<(), CoreError> {
        let old = contribution(context.owner_id, context.zone, context.before.as_ref());
        let new = contribution(context.owner_id, context.zone, context.after.as_ref());
        if old == new {
            return Ok(());
        }

        if let Some((key, minutes)) = &old {
            self.buckets.apply_delta(key, -minutes)?;
        }
        if let Some((key, minutes)) = &new {
            if let Err(error) = self.buckets.apply_delta(key, *minutes) {
                if let Some((old_key, old_minutes)) = &old {
                    if let Err(revert_error) = self.buckets.apply_delta(old_key, *old_minutes) {
                        log::error!(
                            "failed to revert bucket delta for owner {}: {revert_error}",
                            context.owner_id
                        );
                    }
                }
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn totals_for_owner(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<LabelTimeBucket>, CoreError> {
        self.buckets.totals_for_owner(owner_id, year, month)
    }
}
