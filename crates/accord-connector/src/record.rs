//! The record shape shared by remote systems and the local store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DataSourceId, RecordId};
use crate::value::{checksum, FieldMap};

/// A single synchronized record.
///
/// `external_id` is the identity the remote system knows; `id` is the local
/// one. The pair `(data_source_id, data_type, external_id)` is unique in the
/// local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataRecord {
    /// Local identifier.
    pub id: RecordId,
    /// Identifier in the remote system.
    pub external_id: String,
    /// Source this record belongs to.
    pub data_source_id: DataSourceId,
    /// Logical type, e.g. `"user"` or `"order"`.
    pub data_type: String,
    /// The record payload.
    pub fields: FieldMap,
    /// When the record was first seen.
    pub created_at: DateTime<Utc>,
    /// When the record last changed, locally or remotely.
    pub updated_at: DateTime<Utc>,
    /// When the record was last written by a sync run. `None` before the
    /// first successful sync.
    pub synced_at: Option<DateTime<Utc>>,
    /// Monotonic version, bumped on every content change.
    pub version: u64,
    /// Soft-delete marker. Deleted records stay in the store.
    pub deleted: bool,
    /// Bookkeeping that is not part of the payload.
    pub metadata: RecordMetadata,
}

/// Bookkeeping attached to a record, excluded from field comparison.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Human-readable origin, e.g. a connector name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// SHA-256 of the canonical field payload.
    #[serde(default)]
    pub checksum: String,
    /// Serialized payload size in bytes.
    #[serde(default)]
    pub size_bytes: usize,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Links to other records, role name to external id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, String>,
}

impl DataRecord {
    /// Create a new record at version 1 with fresh metadata.
    #[must_use]
    pub fn new(
        data_source_id: DataSourceId,
        data_type: impl Into<String>,
        external_id: impl Into<String>,
        fields: FieldMap,
    ) -> Self {
        let now = Utc::now();
        let metadata = RecordMetadata {
            checksum: checksum(&fields),
            size_bytes: payload_size(&fields),
            ..RecordMetadata::default()
        };
        Self {
            id: RecordId::new(),
            external_id: external_id.into(),
            data_source_id,
            data_type: data_type.into(),
            fields,
            created_at: now,
            updated_at: now,
            synced_at: None,
            version: 1,
            deleted: false,
            metadata,
        }
    }

    /// Mark the record as written by a sync run at `at`. Chainable.
    #[must_use]
    pub fn synced(mut self, at: DateTime<Utc>) -> Self {
        self.synced_at = Some(at);
        self
    }

    /// Tag the record with its connector of origin. Chainable.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.metadata.origin = Some(origin.into());
        self
    }

    /// Replace the payload with `fields`, bumping the version.
    ///
    /// Clears the soft-delete marker, so an update resurrects a deleted
    /// record.
    pub fn apply_update(&mut self, fields: FieldMap, at: DateTime<Utc>) {
        self.fields = fields;
        self.updated_at = at;
        self.synced_at = Some(at);
        self.deleted = false;
        self.version += 1;
        self.refresh_metadata();
    }

    /// Soft-delete the record, bumping the version.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.deleted = true;
        self.updated_at = at;
        self.synced_at = Some(at);
        self.version += 1;
    }

    /// Record that a sync run saw this record without changing it.
    ///
    /// Does not bump the version: the payload is untouched.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.synced_at = Some(at);
    }

    /// Recompute checksum and size from the current payload.
    pub fn refresh_metadata(&mut self) {
        self.metadata.checksum = checksum(&self.fields);
        self.metadata.size_bytes = payload_size(&self.fields);
    }

    /// True when the payload matches `other` field for field.
    #[must_use]
    pub fn same_fields(&self, other: &FieldMap) -> bool {
        self.fields == *other
    }
}

fn payload_size(fields: &FieldMap) -> usize {
    serde_json::to_vec(fields).map(|v| v.len()).unwrap_or(0)
}
