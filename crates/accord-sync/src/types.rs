//! Common types for synchronization runs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a synchronization run acquires remote data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Fetch every remote record and reconcile the whole set.
    Full,
    /// Fetch records changed since the last successful run.
    Incremental,
    /// Apply change events as they arrive.
    RealTime,
    /// Apply change events delivered by remote push.
    Webhook,
}

impl SyncType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Incremental => "incremental",
            SyncType::RealTime => "real_time",
            SyncType::Webhook => "webhook",
        }
    }

    /// True for run types that fetch pages from the connector.
    #[must_use]
    pub fn is_pull(&self) -> bool {
        matches!(self, SyncType::Full | SyncType::Incremental)
    }

    /// True for run types fed by change events.
    #[must_use]
    pub fn is_event_driven(&self) -> bool {
        matches!(self, SyncType::RealTime | SyncType::Webhook)
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncType::Full),
            "incremental" => Ok(SyncType::Incremental),
            "real_time" => Ok(SyncType::RealTime),
            "webhook" => Ok(SyncType::Webhook),
            _ => Err(format!("Unknown sync type: {s}")),
        }
    }
}

/// Lifecycle state of a synchronization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet started.
    Pending,
    /// Currently executing.
    Running,
    /// Finished without a run-level failure.
    Completed,
    /// Stopped by a run-level failure.
    Failed,
    /// Stopped by an explicit cancel.
    Cancelled,
    /// Suspended; may be resumed later.
    Paused,
}

impl JobStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Paused => "paused",
        }
    }

    /// Check if this is a terminal status. Terminal jobs never change
    /// status again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Check if the job can still be cancelled.
    #[must_use]
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Running | JobStatus::Paused
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "paused" => Ok(JobStatus::Paused),
            _ => Err(format!("Unknown job status: {s}")),
        }
    }
}

/// Type of change pushed by an external system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// New remote record.
    Create,
    /// Existing remote record modified.
    Update,
    /// Remote record removed.
    Delete,
}

impl ChangeKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ChangeKind::Create),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            _ => Err(format!("Unknown change kind: {s}")),
        }
    }
}

/// How two sides came to disagree about a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides created the same external id independently.
    Create,
    /// Both sides modified the record since the last sync.
    Update,
    /// One side deleted while the other modified.
    Delete,
}

impl ConflictKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Create => "create",
            ConflictKind::Update => "update",
            ConflictKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConflictKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ConflictKind::Create),
            "update" => Ok(ConflictKind::Update),
            "delete" => Ok(ConflictKind::Delete),
            _ => Err(format!("Unknown conflict kind: {s}")),
        }
    }
}

/// How a conflict is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the local record; discard the remote change.
    UseLocal,
    /// Overwrite local with the remote change.
    UseRemote,
    /// Field union, local value wins on overlap.
    Merge,
    /// Queue for an operator decision.
    Manual,
}

impl ResolutionStrategy {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::UseLocal => "use_local",
            ResolutionStrategy::UseRemote => "use_remote",
            ResolutionStrategy::Merge => "merge",
            ResolutionStrategy::Manual => "manual",
        }
    }

    /// True when the engine can resolve without operator input.
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        !matches!(self, ResolutionStrategy::Manual)
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "use_local" => Ok(ResolutionStrategy::UseLocal),
            "use_remote" => Ok(ResolutionStrategy::UseRemote),
            "merge" => Ok(ResolutionStrategy::Merge),
            "manual" => Ok(ResolutionStrategy::Manual),
            _ => Err(format!("Unknown resolution strategy: {s}")),
        }
    }
}

/// Coarse classification for errors recorded on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Remote connectivity or protocol failure.
    Connection,
    /// Local store failure.
    Store,
    /// Pipeline execution failure.
    Transform,
    /// Record rejected by validation.
    Validation,
    /// Conflict handling failure.
    Conflict,
    /// Run exceeded its configured timeout.
    Timeout,
    /// Anything else.
    Internal,
}

impl SyncErrorKind {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorKind::Connection => "connection",
            SyncErrorKind::Store => "store",
            SyncErrorKind::Transform => "transform",
            SyncErrorKind::Validation => "validation",
            SyncErrorKind::Conflict => "conflict",
            SyncErrorKind::Timeout => "timeout",
            SyncErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connection" => Ok(SyncErrorKind::Connection),
            "store" => Ok(SyncErrorKind::Store),
            "transform" => Ok(SyncErrorKind::Transform),
            "validation" => Ok(SyncErrorKind::Validation),
            "conflict" => Ok(SyncErrorKind::Conflict),
            "timeout" => Ok(SyncErrorKind::Timeout),
            "internal" => Ok(SyncErrorKind::Internal),
            _ => Err(format!("Unknown error kind: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_type_roundtrip() {
        for st in [
            SyncType::Full,
            SyncType::Incremental,
            SyncType::RealTime,
            SyncType::Webhook,
        ] {
            let s = st.as_str();
            let parsed: SyncType = s.parse().unwrap();
            assert_eq!(st, parsed);
        }
    }

    #[test]
    fn test_sync_type_properties() {
        assert!(SyncType::Full.is_pull());
        assert!(SyncType::Incremental.is_pull());
        assert!(!SyncType::RealTime.is_pull());

        assert!(SyncType::Webhook.is_event_driven());
        assert!(!SyncType::Full.is_event_driven());
    }

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::Paused,
        ] {
            let s = status.as_str();
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_job_status_properties() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Paused.is_terminal());

        assert!(JobStatus::Running.can_cancel());
        assert!(JobStatus::Paused.can_cancel());
        assert!(!JobStatus::Completed.can_cancel());
    }

    #[test]
    fn test_change_kind_roundtrip() {
        for kind in [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete] {
            let s = kind.as_str();
            let parsed: ChangeKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_conflict_kind_roundtrip() {
        for kind in [ConflictKind::Create, ConflictKind::Update, ConflictKind::Delete] {
            let s = kind.as_str();
            let parsed: ConflictKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_resolution_strategy_roundtrip() {
        for strategy in [
            ResolutionStrategy::UseLocal,
            ResolutionStrategy::UseRemote,
            ResolutionStrategy::Merge,
            ResolutionStrategy::Manual,
        ] {
            let s = strategy.as_str();
            let parsed: ResolutionStrategy = s.parse().unwrap();
            assert_eq!(strategy, parsed);
        }
        assert!(ResolutionStrategy::Merge.is_automatic());
        assert!(!ResolutionStrategy::Manual.is_automatic());
    }

    #[test]
    fn test_error_kind_roundtrip() {
        for kind in [
            SyncErrorKind::Connection,
            SyncErrorKind::Store,
            SyncErrorKind::Transform,
            SyncErrorKind::Validation,
            SyncErrorKind::Conflict,
            SyncErrorKind::Timeout,
            SyncErrorKind::Internal,
        ] {
            let s = kind.as_str();
            let parsed: SyncErrorKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&SyncType::RealTime).unwrap(),
            "\"real_time\""
        );
        assert_eq!(
            serde_json::to_string(&ResolutionStrategy::UseRemote).unwrap(),
            "\"use_remote\""
        );
    }
}
