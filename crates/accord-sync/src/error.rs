//! Run-level error types.
//!
//! Per-record failures never surface here: the engine converts them to
//! [`JobError`](crate::job::JobError) entries on the job. `SyncError` is
//! reserved for failures of a whole run or of a control operation.

use thiserror::Error;

use accord_connector::error::{ConnectorError, StoreError};
use accord_connector::ids::{ConflictId, DataSourceId, JobId};
use accord_transform::error::TransformError;

use crate::types::{JobStatus, SyncErrorKind};

/// Error raised by the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote system failure.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Pipeline assembly or validation failure.
    #[error("pipeline error: {0}")]
    Transform(#[from] TransformError),

    /// A run for this data source is already in progress.
    #[error("a sync is already running for data source {data_source_id}")]
    AlreadyRunning { data_source_id: DataSourceId },

    /// No job with this id is known to the engine.
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: JobId },

    /// The job is in a status that cannot be cancelled.
    #[error("job {job_id} cannot be cancelled from status '{status}'")]
    NotCancellable { job_id: JobId, status: JobStatus },

    /// No conflict with this id is known to the engine.
    #[error("conflict not found: {conflict_id}")]
    ConflictNotFound { conflict_id: ConflictId },

    /// The conflict was already resolved; resolution is terminal.
    #[error("conflict {conflict_id} is already resolved")]
    ConflictAlreadyResolved { conflict_id: ConflictId },

    /// The requested resolution cannot be applied.
    #[error("invalid resolution: {message}")]
    InvalidResolution { message: String },

    /// The run options or configuration are unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The run exceeded its configured timeout.
    #[error("sync run timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Unexpected internal failure.
    #[error("internal sync error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create an invalid-configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        SyncError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid-resolution error.
    pub fn invalid_resolution(message: impl Into<String>) -> Self {
        SyncError::InvalidResolution {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal {
            message: message.into(),
        }
    }

    /// Coarse classification, used when recording the error on a job.
    #[must_use]
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Connector(ConnectorError::InvalidData { .. }) => SyncErrorKind::Validation,
            SyncError::Connector(_) => SyncErrorKind::Connection,
            SyncError::Store(_) => SyncErrorKind::Store,
            SyncError::Transform(_) => SyncErrorKind::Transform,
            SyncError::InvalidConfig { .. } => SyncErrorKind::Validation,
            SyncError::ConflictNotFound { .. }
            | SyncError::ConflictAlreadyResolved { .. }
            | SyncError::InvalidResolution { .. } => SyncErrorKind::Conflict,
            SyncError::Timeout { .. } => SyncErrorKind::Timeout,
            SyncError::AlreadyRunning { .. }
            | SyncError::JobNotFound { .. }
            | SyncError::NotCancellable { .. }
            | SyncError::Internal { .. } => SyncErrorKind::Internal,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;
