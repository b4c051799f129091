use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{BucketKey, LabelTimeBucket};
use crate::infrastructure::error::CoreError;

/// Per-(owner, label, month) minute totals. Deltas must be applied atomically
/// at the storage layer; a decrement below zero violates the accounting
/// invariant and fails with `CoreError::Accounting`.
pub trait LabelTimeBucketStore: Send + Sync {
    fn apply_delta(&self, key: &BucketKey, delta_minutes: i64) -> Result<(), CoreError>;
    fn total(&self, key: &BucketKey) -> Result<i64, CoreError>;
    fn totals_for_owner(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<LabelTimeBucket>, CoreError>;
}

// SQLite UNIQUE treats NULLs as distinct, so the unlabeled bucket is keyed by
// an empty string instead of NULL.
fn label_column(label_id: Option<Uuid>) -> String {
    label_id.map(|id| id.to_string()).unwrap_or_default()
}

fn label_from_column(value: &str) -> Result<Option<Uuid>, CoreError> {
    if value.is_empty() {
        return Ok(None);
    }
    Uuid::parse_str(value)
        .map(Some)
        .map_err(|error| CoreError::Storage(format!("invalid bucket label_id '{value}': {error}")))
}

#[derive(Debug, Clone)]
pub struct SqliteLabelTimeBucketStore {
    db_path: PathBuf,
}

impl SqliteLabelTimeBucketStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

impl LabelTimeBucketStore for SqliteLabelTimeBucketStore {
    fn apply_delta(&self, key: &BucketKey, delta_minutes: i64) -> Result<(), CoreError> {
        if delta_minutes == 0 {
            return Ok(());
        }
        let connection = self.connect()?;
        let result = connection.execute(
            "INSERT INTO label_time_buckets (owner_id, label_id, year, month, minutes)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(owner_id, label_id, year, month) DO UPDATE SET
               minutes = minutes + excluded.minutes",
            params![
                key.owner_id.to_string(),
                label_column(key.label_id),
                key.year,
                key.month,
                delta_minutes,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            // The CHECK (minutes >= 0) constraint is the negativity guard.
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::Accounting(format!(
                    "bucket (owner {}, label {:?}, {}-{:02}) would go below zero with delta {delta_minutes}",
                    key.owner_id, key.label_id, key.year, key.month
                )))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn total(&self, key: &BucketKey) -> Result<i64, CoreError> {
        let connection = self.connect()?;
        let minutes: Option<i64> = connection
            .query_row(
                "SELECT minutes FROM label_time_buckets
                 WHERE owner_id = ?1 AND label_id = ?2 AND year = ?3 AND month = ?4",
                params![
                    key.owner_id.to_string(),
                    label_column(key.label_id),
                    key.year,
                    key.month
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(minutes.unwrap_or(0))
    }

    fn totals_for_owner(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<LabelTimeBucket>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(
            "SELECT label_id, minutes FROM label_time_buckets
             WHERE owner_id = ?1 AND year = ?2 AND month = ?3
             ORDER BY label_id ASC",
        )?;
        let rows = statement.query_map(params![owner_id.to_string(), year, month], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut buckets = Vec::new();
        for row in rows {
            let (label, minutes) = row?;
            buckets.push(LabelTimeBucket {
                owner_id,
                label_id: label_from_column(&label)?,
                year,
                month,
                minutes,
            });
        }
        Ok(buckets)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLabelTimeBucketStore {
    buckets: Mutex<HashMap<BucketKey, i64>>,
}

impl InMemoryLabelTimeBucketStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<BucketKey, i64>>, CoreError> {
        self.buckets
            .lock()
            .map_err(|error| CoreError::Storage(format!("bucket store lock poisoned: {error}")))
    }
}

impl LabelTimeBucketStore for InMemoryLabelTimeBucketStore {
    fn apply_delta(&self, key: &BucketKey, delta_minutes: i64) -> Result<(), CoreError> {
        if delta_minutes == 0 {
            return Ok(());
        }
        let mut buckets = self.lock()?;
        let current = buckets.get(key).copied().unwrap_or(0);
        let updated = current + delta_minutes;
        if updated < 0 {
            return Err(CoreError::Accounting(format!(
                "bucket (owner {}, label {:?}, {}-{:02}) would go below zero with delta {delta_minutes}",
                key.owner_id, key.label_id, key.year, key.month
            )));
        }
        buckets.insert(key.clone(), updated);
        Ok(())
    }

    fn total(&self, key: &BucketKey) -> Result<i64, CoreError> {
        Ok(self.lock()?.get(key).copied().unwrap_or(0))
    }

    fn totals_for_owner(
        &self,
        owner_id: Uuid,
        year: i32,
        month: u32,
    ) -> Result<Vec<LabelTimeBucket>, CoreError> {
        let buckets = self.lock()?;
        let mut totals: Vec<LabelTimeBucket> = buckets
            .iter()
            .filter(|(key, _)| key.owner_id == owner_id && key.year == year && key.month == month)
            .map(|(key, minutes)| LabelTimeBucket {
                owner_id,
                label_id: key.label_id,
                year,
                month,
                minutes: *minutes,
            })
            .collect();
        totals.sort_by_key(|bucket| bucket.label_id.map(|id| id.to_string()).unwrap_or_default());
        Ok(totals)
    }
}
