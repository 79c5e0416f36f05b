//! Error types for listing synchronization

use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Listing state unavailable for ref {reference}: {reason}")]
    StateUnavailable { reference: i64, reason: String },

    #[error("Concurrent write detected for ref {0}")]
    StorageConflict(i64),

    #[error("Listing not found: {0}")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Reason code reported back to the caller for a failed record
    pub fn reason(&self) -> FailureReason {
        match self {
            SyncError::Validation(_) | SyncError::Serialization(_) => FailureReason::Validation,
            SyncError::StateUnavailable { .. } => FailureReason::StateUnavailable,
            SyncError::StorageConflict(_) => FailureReason::StorageConflict,
            _ => FailureReason::Storage,
        }
    }

    /// Re-tag a lock contention error from SQLite as a conflict on `reference`.
    pub fn into_conflict(self, reference: i64) -> Self {
        match &self {
            SyncError::Database(err) if is_contention(err) => SyncError::StorageConflict(reference),
            _ => self,
        }
    }

    /// Wrap a side-table failure for `reference`.
    pub fn state_unavailable(reference: i64, err: impl std::fmt::Display) -> Self {
        SyncError::StateUnavailable {
            reference,
            reason: err.to_string(),
        }
    }
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

/// Why a record was excluded from a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Validation,
    StateUnavailable,
    StorageConflict,
    Storage,
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(
            SyncError::Validation("missing ref".into()).reason(),
            FailureReason::Validation
        );
        assert_eq!(
            SyncError::state_unavailable(7, "no such table").reason(),
            FailureReason::StateUnavailable
        );
        assert_eq!(SyncError::StorageConflict(7).reason(), FailureReason::StorageConflict);
        assert_eq!(SyncError::NotFound(7).reason(), FailureReason::Storage);
    }

    #[test]
    fn test_busy_becomes_conflict() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = SyncError::Database(busy).into_conflict(42);
        assert!(matches!(err, SyncError::StorageConflict(42)));

        let other = SyncError::Validation("x".into()).into_conflict(42);
        assert!(matches!(other, SyncError::Validation(_)));
    }
}
