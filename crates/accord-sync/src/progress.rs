//! Progress reporting.
//!
//! The engine publishes these on a `tokio::sync::broadcast` channel.
//! Sends are best-effort: a lagging or dropped receiver never blocks or
//! fails the run. Polling `sync_status` remains available for callers
//! that do not want a subscription.

use serde::{Deserialize, Serialize};

use accord_connector::ids::{ConflictId, DataSourceId, JobId};

use crate::job::SyncCounters;
use crate::types::SyncType;

/// A progress notification from a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncProgressEvent {
    /// The run started executing.
    Started {
        /// Job identifier.
        job_id: JobId,
        /// Data source being synchronized.
        data_source_id: DataSourceId,
        /// How the run acquires remote data.
        sync_type: SyncType,
    },
    /// A batch finished; counters are cumulative.
    BatchCompleted {
        /// Job identifier.
        job_id: JobId,
        /// 1-based batch number.
        batch: u32,
        /// Counters accumulated so far.
        counters: SyncCounters,
    },
    /// A conflict was detected and stored.
    ConflictDetected {
        /// Job identifier.
        job_id: JobId,
        /// Stored conflict.
        conflict_id: ConflictId,
        /// Remote identifier of the conflicted record.
        external_id: String,
    },
    /// The run finished without a run-level failure.
    Completed {
        /// Job identifier.
        job_id: JobId,
        /// Final counters.
        counters: SyncCounters,
    },
    /// The run stopped on a run-level failure.
    Failed {
        /// Job identifier.
        job_id: JobId,
        /// Failure description.
        message: String,
    },
    /// The run was cancelled.
    Cancelled {
        /// Job identifier.
        job_id: JobId,
    },
}

impl SyncProgressEvent {
    /// The job this event belongs to.
    #[must_use]
    pub fn job_id(&self) -> JobId {
        match self {
            SyncProgressEvent::Started { job_id, .. }
            | SyncProgressEvent::BatchCompleted { job_id, .. }
            | SyncProgressEvent::ConflictDetected { job_id, .. }
            | SyncProgressEvent::Completed { job_id, .. }
            | SyncProgressEvent::Failed { job_id, .. }
            | SyncProgressEvent::Cancelled { job_id } => *job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_serialization() {
        let event = SyncProgressEvent::Cancelled { job_id: JobId::new() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "cancelled");

        let event = SyncProgressEvent::BatchCompleted {
            job_id: JobId::new(),
            batch: 2,
            counters: SyncCounters::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "batch_completed");
        assert_eq!(json["batch"], 2);
    }

    #[test]
    fn test_job_id_accessor() {
        let job_id = JobId::new();
        let event = SyncProgressEvent::Failed {
            job_id,
            message: "fetch failed".into(),
        };
        assert_eq!(event.job_id(), job_id);
    }
}
