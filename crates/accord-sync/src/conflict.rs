//! Conflict detection, resolution, and the manual-review registry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use accord_connector::ids::{ConflictId, DataSourceId, JobId};
use accord_connector::record::DataRecord;
use accord_connector::value::FieldMap;

use crate::error::{EngineResult, SyncError};
use crate::types::{ConflictKind, ResolutionStrategy};

/// A disagreement between the local record and a remote change.
///
/// Snapshots are taken at detection time: manual resolution operates on
/// what the run saw, not on whatever the record looks like later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    /// Conflict identifier.
    pub id: ConflictId,
    /// Data source the record belongs to.
    pub data_source_id: DataSourceId,
    /// Run that detected the conflict.
    pub job_id: JobId,
    /// How the two sides disagree.
    pub kind: ConflictKind,
    /// Logical record type.
    pub data_type: String,
    /// Remote identifier of the record.
    pub external_id: String,
    /// Local record at detection time.
    pub local: DataRecord,
    /// Raw remote fields at detection time.
    pub remote: FieldMap,
    /// Remote fields after the run's pipeline. Equal to `remote` when the
    /// run had no pipeline.
    pub transformed: FieldMap,
    /// Why this was classified as a conflict.
    pub reason: String,
    /// When the conflict was detected.
    pub detected_at: DateTime<Utc>,
    /// Whether a resolution has been applied. Terminal once true.
    pub resolved: bool,
    /// The strategy that settled the conflict.
    pub resolution: Option<ResolutionStrategy>,
    /// The merged field map, when the resolution was a merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<FieldMap>,
    /// When the resolution was applied.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Conflict {
    /// Record a new unresolved conflict.
    #[must_use]
    pub fn new(
        job_id: JobId,
        kind: ConflictKind,
        local: DataRecord,
        remote: FieldMap,
        transformed: FieldMap,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: ConflictId::new(),
            data_source_id: local.data_source_id,
            job_id,
            kind,
            data_type: local.data_type.clone(),
            external_id: local.external_id.clone(),
            local,
            remote,
            transformed,
            reason: reason.into(),
            detected_at: Utc::now(),
            resolved: false,
            resolution: None,
            merged: None,
            resolved_at: None,
        }
    }

    /// Check if this conflict has been settled.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Check if this conflict is waiting for an operator.
    #[must_use]
    pub fn needs_manual_resolution(&self) -> bool {
        !self.resolved
    }
}

/// Applies the asymmetric modified-since-last-sync rule.
///
/// A remote change alone is never a conflict: that is the normal update
/// path. Only when the local side also changed after `synced_at` do the
/// two sides genuinely disagree.
#[derive(Debug, Clone, Copy)]
pub struct ConflictDetector {
    skew: chrono::Duration,
}

impl ConflictDetector {
    /// Create a detector with the given clock-skew tolerance.
    #[must_use]
    pub fn new(skew: chrono::Duration) -> Self {
        Self { skew }
    }

    /// Classify a remote update against the local record.
    ///
    /// Call only when the field maps differ; equal maps are a skip, not a
    /// conflict. Returns the conflict kind, or `None` when the remote
    /// change should be applied as a normal update.
    #[must_use]
    pub fn check_update(
        &self,
        local: &DataRecord,
        remote_updated_at: DateTime<Utc>,
    ) -> Option<ConflictKind> {
        match local.synced_at {
            // Never synced: both sides created this record independently.
            None => Some(ConflictKind::Create),
            Some(synced_at) => {
                let threshold = synced_at + self.skew;
                if local.updated_at > threshold && remote_updated_at > threshold {
                    Some(ConflictKind::Update)
                } else {
                    None
                }
            }
        }
    }

    /// Classify a remote delete against the local record.
    ///
    /// A pushed delete conflicts when the local side changed after
    /// `synced_at`; otherwise the delete is applied.
    #[must_use]
    pub fn check_delete(&self, local: &DataRecord) -> Option<ConflictKind> {
        let locally_modified = match local.synced_at {
            None => true,
            Some(synced_at) => local.updated_at > synced_at + self.skew,
        };
        locally_modified.then_some(ConflictKind::Delete)
    }
}

/// Field union of the two sides. The local value wins on overlap;
/// remote-only fields are added; nothing is dropped.
#[must_use]
pub fn merge_fields(local: &FieldMap, remote: &FieldMap) -> FieldMap {
    let mut merged = remote.clone();
    merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// What the engine should do about a detected conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionAction {
    /// Keep the local record; no write.
    KeepLocal,
    /// Write the transformed remote fields.
    WriteRemote(FieldMap),
    /// Write the merged fields and store them on the conflict.
    WriteMerged(FieldMap),
    /// Store the conflict unresolved for an operator.
    Queue,
}

/// Maps a strategy to a concrete action for one conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    /// Decide the action for the given strategy and field maps.
    ///
    /// `use_remote` writes the transformed fields (what the run would have
    /// written as a plain update); `merge` unions the raw maps, so no
    /// remote field is lost to a rename or filter step.
    #[must_use]
    pub fn decide(
        strategy: ResolutionStrategy,
        local: &FieldMap,
        remote: &FieldMap,
        transformed: &FieldMap,
    ) -> ResolutionAction {
        match strategy {
            ResolutionStrategy::UseLocal => ResolutionAction::KeepLocal,
            ResolutionStrategy::UseRemote => ResolutionAction::WriteRemote(transformed.clone()),
            ResolutionStrategy::Merge => {
                ResolutionAction::WriteMerged(merge_fields(local, remote))
            }
            ResolutionStrategy::Manual => ResolutionAction::Queue,
        }
    }
}

/// Append-only, concurrently readable store of detected conflicts.
///
/// Conflicts are retained after resolution; resolution is terminal.
#[derive(Debug, Default)]
pub struct ConflictRegistry {
    conflicts: RwLock<HashMap<ConflictId, Conflict>>,
}

impl ConflictRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a conflict.
    pub async fn insert(&self, conflict: Conflict) {
        self.conflicts.write().await.insert(conflict.id, conflict);
    }

    /// Look up a conflict by id.
    pub async fn get(&self, id: ConflictId) -> Option<Conflict> {
        self.conflicts.read().await.get(&id).cloned()
    }

    /// Unresolved conflicts, oldest first. `None` spans all data sources.
    pub async fn unresolved(&self, source: Option<DataSourceId>) -> Vec<Conflict> {
        let guard = self.conflicts.read().await;
        let mut found: Vec<Conflict> = guard
            .values()
            .filter(|c| !c.resolved)
            .filter(|c| source.is_none_or(|s| c.data_source_id == s))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.detected_at);
        found
    }

    /// Number of stored conflicts, resolved ones included.
    pub async fn len(&self) -> usize {
        self.conflicts.read().await.len()
    }

    /// Check if the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.conflicts.read().await.is_empty()
    }

    /// Apply a terminal resolution and return the updated conflict.
    pub async fn mark_resolved(
        &self,
        id: ConflictId,
        resolution: ResolutionStrategy,
        merged: Option<FieldMap>,
    ) -> EngineResult<Conflict> {
        let mut guard = self.conflicts.write().await;
        let conflict = guard
            .get_mut(&id)
            .ok_or(SyncError::ConflictNotFound { conflict_id: id })?;
        if conflict.resolved {
            return Err(SyncError::ConflictAlreadyResolved { conflict_id: id });
        }
        conflict.resolved = true;
        conflict.resolution = Some(resolution);
        conflict.merged = merged;
        conflict.resolved_at = Some(Utc::now());
        Ok(conflict.clone())
    }
}
