use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict with existing entries: {}", format_ids(conflicting_ids))]
    Conflict { conflicting_ids: Vec<Uuid> },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Accounting invariant violated: {0}")]
    Accounting(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn conflict(mut conflicting_ids: Vec<Uuid>) -> Self {
        conflicting_ids.sort();
        conflicting_ids.dedup();
        Self::Conflict { conflicting_ids }
    }

    pub fn not_found(kind: &str, id: Uuid) -> Self {
        Self::NotFound(format!("{kind} {id} does not exist"))
    }
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
