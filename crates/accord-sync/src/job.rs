//! Synchronization jobs and their results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accord_connector::ids::{DataSourceId, JobId};

use crate::types::{JobStatus, SyncErrorKind, SyncType};

/// Per-run record counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Records examined, advanced per completed batch.
    pub processed: u64,
    /// Records created locally.
    pub created: u64,
    /// Records updated locally.
    pub updated: u64,
    /// Records soft-deleted locally.
    pub deleted: u64,
    /// Records already in sync.
    pub skipped: u64,
    /// Conflicts detected this run.
    pub conflicts: u64,
}

impl SyncCounters {
    /// Sum of all write-side outcomes. Useful in progress displays.
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        self.created + self.updated + self.deleted
    }
}

/// An error recorded against a job without aborting the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Error entry id.
    pub id: Uuid,
    /// Coarse classification.
    pub kind: SyncErrorKind,
    /// Human-readable message.
    pub message: String,
    /// When the error occurred.
    pub timestamp: DateTime<Utc>,
    /// Whether an operator has marked this entry as handled.
    pub resolved: bool,
}

impl JobError {
    /// Record a new error entry.
    #[must_use]
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
            resolved: false,
        }
    }
}

/// One synchronization run for one data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job identifier.
    pub id: JobId,
    /// Data source this run belongs to.
    pub data_source_id: DataSourceId,
    /// How this run acquires remote data.
    pub sync_type: SyncType,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Accumulated counters.
    pub counters: SyncCounters,
    /// Errors recorded without aborting the run.
    pub errors: Vec<JobError>,
    /// Free-form annotations (trigger, operator, batch notes).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Create a pending job.
    #[must_use]
    pub fn new(data_source_id: DataSourceId, sync_type: SyncType) -> Self {
        Self {
            id: JobId::new(),
            data_source_id,
            sync_type,
            status: JobStatus::Pending,
            counters: SyncCounters::default(),
            errors: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Move to `running` and stamp the start time.
    pub fn mark_running(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move to `completed`. No-op once terminal.
    pub fn mark_completed(&mut self) {
        self.finish(JobStatus::Completed);
    }

    /// Move to `failed`. No-op once terminal.
    pub fn mark_failed(&mut self) {
        self.finish(JobStatus::Failed);
    }

    /// Move to `cancelled`. No-op once terminal.
    pub fn mark_cancelled(&mut self) {
        self.finish(JobStatus::Cancelled);
    }

    fn finish(&mut self, status: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Append an error entry without changing the job status.
    pub fn record_error(&mut self, kind: SyncErrorKind, message: impl Into<String>) {
        self.errors.push(JobError::new(kind, message));
    }

    /// Wall-clock duration, once started.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at.unwrap_or_else(Utc::now);
        u64::try_from((finished - started).num_milliseconds()).ok()
    }

    /// Snapshot this job as a caller-facing result.
    #[must_use]
    pub fn result(&self) -> SyncResult {
        SyncResult {
            job_id: self.id,
            status: self.status,
            records_processed: self.counters.processed,
            records_created: self.counters.created,
            records_updated: self.counters.updated,
            records_deleted: self.counters.deleted,
            records_skipped: self.counters.skipped,
            conflicts: self.counters.conflicts,
            errors: self.errors.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration_ms: self.duration_ms().unwrap_or(0),
        }
    }
}

/// Outcome of one run, returned to the caller even on partial failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Job identifier.
    pub job_id: JobId,
    /// Final (or current) job status.
    pub status: JobStatus,
    /// Records examined.
    pub records_processed: u64,
    /// Records created locally.
    pub records_created: u64,
    /// Records updated locally.
    pub records_updated: u64,
    /// Records soft-deleted locally.
    pub records_deleted: u64,
    /// Records already in sync.
    pub records_skipped: u64,
    /// Conflicts detected this run.
    pub conflicts: u64,
    /// Errors recorded during the run.
    pub errors: Vec<JobError>,
    /// When execution started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl SyncResult {
    /// True when the run finished without a run-level failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_pending() {
        let job = SyncJob::new(DataSourceId::new(), SyncType::Full);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert_eq!(job.counters, SyncCounters::default());
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut job = SyncJob::new(DataSourceId::new(), SyncType::Full);
        job.mark_running();
        job.mark_cancelled();
        assert_eq!(job.status, JobStatus::Cancelled);

        job.mark_completed();
        assert_eq!(job.status, JobStatus::Cancelled);
        job.mark_running();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_record_error_keeps_status() {
        let mut job = SyncJob::new(DataSourceId::new(), SyncType::Incremental);
        job.mark_running();
        job.record_error(SyncErrorKind::Validation, "email is required");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.errors.len(), 1);
        assert!(!job.errors[0].resolved);
    }

    #[test]
    fn test_result_snapshot() {
        let mut job = SyncJob::new(DataSourceId::new(), SyncType::Full);
        job.mark_running();
        job.counters.processed = 10;
        job.counters.created = 4;
        job.counters.skipped = 6;
        job.mark_completed();

        let result = job.result();
        assert!(result.is_success());
        assert_eq!(result.records_processed, 10);
        assert_eq!(result.records_created, 4);
        assert_eq!(result.records_skipped, 6);
        assert_eq!(result.conflicts, 0);
        assert!(result.finished_at.is_some());
    }
}
