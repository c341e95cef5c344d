//! Externally pushed change events.
//!
//! Real-time and webhook runs consume these instead of fetching pages.
//! Each event goes through the same reconciliation path as a fetched
//! record; the remote-absence delete pass never runs for events, since a
//! batch of events says nothing about records it does not mention.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accord_connector::record::DataRecord;

use crate::types::ChangeKind;

/// One change reported by an external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event id, assigned at construction.
    pub id: Uuid,
    /// What happened remotely.
    pub kind: ChangeKind,
    /// Logical record type.
    pub data_type: String,
    /// Remote identifier of the affected record.
    pub external_id: String,
    /// Remote record snapshot. `None` for deletes.
    pub record: Option<DataRecord>,
    /// When the change happened remotely.
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Event for a record created remotely.
    #[must_use]
    pub fn created(record: DataRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ChangeKind::Create,
            data_type: record.data_type.clone(),
            external_id: record.external_id.clone(),
            occurred_at: record.updated_at,
            record: Some(record),
        }
    }

    /// Event for a record updated remotely.
    #[must_use]
    pub fn updated(record: DataRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ChangeKind::Update,
            data_type: record.data_type.clone(),
            external_id: record.external_id.clone(),
            occurred_at: record.updated_at,
            record: Some(record),
        }
    }

    /// Event for a record deleted remotely.
    #[must_use]
    pub fn deleted(data_type: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ChangeKind::Delete,
            data_type: data_type.into(),
            external_id: external_id.into(),
            record: None,
            occurred_at: Utc::now(),
        }
    }
}
