//! # Synchronization Engine
//!
//! Reconciles records between a remote system (behind a
//! [`Connector`](accord_connector::traits::Connector)) and a local store,
//! with conflict detection, configurable resolution strategies, and an
//! optional transformation pipeline applied before writes.
//!
//! A run paginates the connector, routes every remote record through a
//! create/update/skip/conflict decision, soft-deletes local records the
//! remote side no longer has, and reports progress over a broadcast
//! channel. Real-time and webhook runs feed pushed [`ChangeEvent`]s
//! through the same per-record path.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use accord_sync::prelude::*;
//!
//! let engine = Arc::new(SyncEngine::new(connector, store, SyncConfig::default()));
//! let options = engine.options("user").with_resolution(ResolutionStrategy::Merge);
//! let result = engine.start_sync(source, SyncType::Full, options).await?;
//! println!(
//!     "created {} updated {} skipped {}",
//!     result.records_created, result.records_updated, result.records_skipped
//! );
//! for conflict in engine.conflicts(Some(source)).await {
//!     engine
//!         .resolve_conflict(conflict.id, ResolutionStrategy::UseRemote, None)
//!         .await?;
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`engine`] - The [`SyncEngine`](engine::SyncEngine) orchestrator
//! - [`job`] - Jobs, counters, recorded errors, and results
//! - [`config`] - Run configuration and per-run options
//! - [`conflict`] - Detection, resolution, and the manual-review registry
//! - [`change`] - Externally pushed change events
//! - [`progress`] - Broadcast progress events
//! - [`types`] - Status and strategy enums
//! - [`memory`] - In-memory store and connector for tests and embedding
//! - [`rate_limiter`] - Token bucket for fetch-call budgeting
//! - [`error`] - Run-level errors

pub mod change;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod job;
pub mod memory;
pub mod progress;
pub mod rate_limiter;
pub(crate) mod stats;
pub mod types;

pub use change::ChangeEvent;

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::change::ChangeEvent;
    pub use crate::config::{RetryBackoff, SyncConfig, SyncOptions};
    pub use crate::conflict::{Conflict, ConflictDetector, ConflictResolver, merge_fields};
    pub use crate::engine::SyncEngine;
    pub use crate::error::{EngineResult, SyncError};
    pub use crate::job::{JobError, SyncCounters, SyncJob, SyncResult};
    pub use crate::memory::{MemoryConnector, MemoryStore};
    pub use crate::progress::SyncProgressEvent;
    pub use crate::types::{
        ChangeKind, ConflictKind, JobStatus, ResolutionStrategy, SyncErrorKind, SyncType,
    };

    pub use accord_connector::prelude::*;
    pub use accord_transform::prelude::*;
}
