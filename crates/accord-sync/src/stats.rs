//! Live counters for a running job.
//!
//! Batch workers update these concurrently; the run loop snapshots them
//! into the job after every batch and once more at the end, so a timeout
//! or cancellation still reports everything that landed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::job::{JobError, SyncCounters};
use crate::types::SyncErrorKind;

#[derive(Debug, Default)]
pub(crate) struct RunStats {
    processed: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    skipped: AtomicU64,
    conflicts: AtomicU64,
    errors: Mutex<Vec<JobError>>,
}

impl RunStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_processed(&self, count: u64) {
        self.processed.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_updated(&self) {
        self.updated.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_error(&self, kind: SyncErrorKind, message: impl Into<String>) {
        let entry = JobError::new(kind, message);
        match self.errors.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    pub(crate) fn counters(&self) -> SyncCounters {
        SyncCounters {
            processed: self.processed.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            updated: self.updated.load(Ordering::SeqCst),
            deleted: self.deleted.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            conflicts: self.conflicts.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn errors(&self) -> Vec<JobError> {
        match self.errors.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
