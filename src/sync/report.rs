use serde::Serialize;

use super::images::ImageReport;
use crate::errors::{FailureReason, SyncError};

/// A foreign value the reference tables could not resolve. Non-fatal:
/// the foreign key is left unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceResolutionWarning {
    pub reference: i64,
    pub field: String,
    pub value: String,
}

/// A record excluded from this run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub reference: Option<i64>,
    /// Position in the incoming batch
    pub position: usize,
    pub reason: FailureReason,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Inserted,
    Updated,
    Unchanged,
}

/// What happened to one successfully reconciled record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordOutcome {
    pub kind: OutcomeKind,
    pub images: ImageReport,
    pub warnings: Vec<ReferenceResolutionWarning>,
}

impl RecordOutcome {
    pub fn unchanged() -> Self {
        Self {
            kind: OutcomeKind::Unchanged,
            images: ImageReport::default(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub failures: Vec<RecordFailure>,
    /// References that appeared more than once in the batch
    pub conflicts: Vec<i64>,
    pub warnings: Vec<ReferenceResolutionWarning>,
    pub images: ImageReport,
}

impl UpsertReport {
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    pub fn record_success(&mut self, outcome: RecordOutcome) {
        match outcome.kind {
            OutcomeKind::Inserted => self.inserted += 1,
            OutcomeKind::Updated => self.updated += 1,
            OutcomeKind::Unchanged => self.unchanged += 1,
        }
        self.images.merge(outcome.images);
        self.warnings.extend(outcome.warnings);
    }

    pub fn record_failure(&mut self, position: usize, reference: Option<i64>, error: &SyncError) {
        self.failed += 1;
        self.failures.push(RecordFailure {
            reference,
            position,
            reason: error.reason(),
            message: error.to_string(),
        });
    }

    pub fn record_conflict(&mut self, reference: i64) {
        if !self.conflicts.contains(&reference) {
            self.conflicts.push(reference);
        }
    }

    /// Failures in batch order, for stable output
    pub fn sort(&mut self) {
        self.failures.sort_by_key(|f| f.position);
        self.conflicts.sort_unstable();
    }
}
