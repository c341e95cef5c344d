//! In-memory backends for development and tests.
//!
//! [`MemoryStore`] implements [`LocalStore`] on a map guarded by an async
//! lock. [`MemoryConnector`] implements [`Connector`] over a seeded record
//! set and adds failure injection knobs, so engine tests can script
//! transient errors, slow fetches, and unhealthy connections without a
//! real remote system.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use accord_connector::error::{ConnectorError, ConnectorResult, StoreError, StoreResult};
use accord_connector::filter::FetchQuery;
use accord_connector::ids::{DataSourceId, RecordId};
use accord_connector::record::DataRecord;
use accord_connector::traits::{Connector, LocalStore};
use accord_connector::value::FieldMap;

/// Local record store backed by an in-memory map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<RecordId, DataRecord>>,
    watermarks: RwLock<HashMap<DataSourceId, DateTime<Utc>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a record by its external identity. Test helper.
    pub async fn lookup(
        &self,
        source: DataSourceId,
        data_type: &str,
        external_id: &str,
    ) -> Option<DataRecord> {
        let records = self.records.read().await;
        records
            .values()
            .find(|r| {
                r.data_source_id == source && r.data_type == data_type && r.external_id == external_id
            })
            .cloned()
    }

    /// Number of records across all sources, deleted ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn records(&self, source: DataSourceId) -> StoreResult<Vec<DataRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<DataRecord> = records
            .values()
            .filter(|r| r.data_source_id == source)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (a.data_type.as_str(), a.external_id.as_str())
                .cmp(&(b.data_type.as_str(), b.external_id.as_str()))
        });
        Ok(matching)
    }

    async fn create_record(&self, record: DataRecord) -> StoreResult<DataRecord> {
        let mut records = self.records.write().await;
        let duplicate = records.values().any(|r| {
            r.data_source_id == record.data_source_id
                && r.data_type == record.data_type
                && r.external_id == record.external_id
        });
        if duplicate {
            return Err(StoreError::DuplicateRecord {
                data_type: record.data_type,
                external_id: record.external_id,
            });
        }
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_record(&self, record: DataRecord) -> StoreResult<DataRecord> {
        let mut records = self.records.write().await;
        let Some(stored) = records.get_mut(&record.id) else {
            return Err(StoreError::record_not_found(record.id.to_string()));
        };
        *stored = record.clone();
        Ok(record)
    }

    async fn delete_record(&self, id: RecordId) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let Some(stored) = records.get_mut(&id) else {
            return Err(StoreError::record_not_found(id.to_string()));
        };
        if stored.deleted {
            return Ok(false);
        }
        stored.mark_deleted(Utc::now());
        Ok(true)
    }

    async fn last_sync_time(&self, source: DataSourceId) -> StoreResult<Option<DateTime<Utc>>> {
        let watermarks = self.watermarks.read().await;
        Ok(watermarks.get(&source).copied())
    }

    async fn update_last_sync_time(
        &self,
        source: DataSourceId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut watermarks = self.watermarks.write().await;
        watermarks.insert(source, at);
        Ok(())
    }
}

/// Connector over a seeded in-memory record set.
///
/// The remote set keeps insertion order, so pagination is stable across
/// fetches as long as the set is not mutated mid-run.
#[derive(Debug)]
pub struct MemoryConnector {
    name: String,
    records: RwLock<Vec<DataRecord>>,
    fetch_calls: AtomicU64,
    fail_fetches: AtomicU32,
    fetch_delay_ms: AtomicU64,
    healthy: AtomicBool,
}

impl MemoryConnector {
    /// Create an empty connector with the given display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(Vec::new()),
            fetch_calls: AtomicU64::new(0),
            fail_fetches: AtomicU32::new(0),
            fetch_delay_ms: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    /// Add a record to the remote set.
    pub async fn push_record(&self, record: DataRecord) {
        self.records.write().await.push(record);
    }

    /// Replace the whole remote set.
    pub async fn set_records(&self, records: Vec<DataRecord>) {
        *self.records.write().await = records;
    }

    /// Snapshot of the remote set.
    pub async fn remote_records(&self) -> Vec<DataRecord> {
        self.records.read().await.clone()
    }

    /// How many times `fetch_page` was called.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Fail the next `count` fetches with a transient network error.
    pub fn fail_next_fetches(&self, count: u32) {
        self.fail_fetches.store(count, Ordering::SeqCst);
    }

    /// Delay every fetch by `delay` before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.fetch_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Toggle the health flag read by `is_healthy` and `test_connection`.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Option<ConnectorError> {
        let remaining = self.fail_fetches.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.fail_fetches.store(remaining - 1, Ordering::SeqCst);
        Some(ConnectorError::network("injected fetch failure"))
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConnectorError::unavailable("connector marked unhealthy"))
        }
    }

    async fn fetch_page(&self, query: &FetchQuery) -> ConnectorResult<Vec<DataRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.take_injected_failure() {
            return Err(err);
        }
        let delay = self.fetch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let records = self.records.read().await;
        let page = records
            .iter()
            .filter(|r| r.data_type == query.data_type)
            .filter(|r| query.filters.iter().all(|f| f.matches_record(r)))
            .skip(query.page.offset())
            .take(query.page.size as usize)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn create(&self, record: &DataRecord) -> ConnectorResult<DataRecord> {
        let mut records = self.records.write().await;
        let exists = records
            .iter()
            .any(|r| r.data_type == record.data_type && r.external_id == record.external_id);
        if exists {
            return Err(ConnectorError::ObjectAlreadyExists {
                identifier: record.external_id.clone(),
            });
        }
        records.push(record.clone());
        Ok(record.clone())
    }

    async fn update(
        &self,
        data_type: &str,
        external_id: &str,
        changes: &FieldMap,
    ) -> ConnectorResult<DataRecord> {
        let mut records = self.records.write().await;
        let Some(stored) = records
            .iter_mut()
            .find(|r| r.data_type == data_type && r.external_id == external_id)
        else {
            return Err(ConnectorError::ObjectNotFound {
                identifier: external_id.to_string(),
            });
        };
        for (key, value) in changes {
            stored.fields.insert(key.clone(), value.clone());
        }
        stored.updated_at = Utc::now();
        stored.refresh_metadata();
        Ok(stored.clone())
    }

    async fn delete(&self, data_type: &str, external_id: &str) -> ConnectorResult<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !(r.data_type == data_type && r.external_id == external_id));
        Ok(records.len() < before)
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_connector::filter::{DataFilter, PageRequest};
    use accord_connector::value::field_map_from_json;

    fn record(source: DataSourceId, external_id: &str, age: i64) -> DataRecord {
        DataRecord::new(
            source,
            "user",
            external_id,
            field_map_from_json(serde_json::json!({"name": external_id, "age": age})),
        )
    }

    #[tokio::test]
    async fn test_store_rejects_duplicate_identity() {
        let store = MemoryStore::new();
        let source = DataSourceId::new();
        store.create_record(record(source, "u-1", 30)).await.unwrap();

        let err = store
            .create_record(record(source, "u-1", 31))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord { .. }));

        // Same identity under another source is fine.
        store
            .create_record(record(DataSourceId::new(), "u-1", 30))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_update_replaces_by_id() {
        let store = MemoryStore::new();
        let source = DataSourceId::new();
        let mut stored = store.create_record(record(source, "u-1", 30)).await.unwrap();

        stored.apply_update(
            field_map_from_json(serde_json::json!({"name": "u-1", "age": 31})),
            Utc::now(),
        );
        store.update_record(stored.clone()).await.unwrap();

        let found = store.lookup(source, "user", "u-1").await.unwrap();
        assert_eq!(found.version, 2);
        assert_eq!(found.fields.get("age"), Some(&31i64.into()));

        let missing = record(source, "u-9", 1);
        let err = store.update_record(missing).await.unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_soft_delete() {
        let store = MemoryStore::new();
        let source = DataSourceId::new();
        let stored = store.create_record(record(source, "u-1", 30)).await.unwrap();

        assert!(store.delete_record(stored.id).await.unwrap());
        assert!(!store.delete_record(stored.id).await.unwrap());

        // Soft-deleted records remain visible.
        let records = store.records(source).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].deleted);

        let err = store.delete_record(RecordId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_watermark_roundtrip() {
        let store = MemoryStore::new();
        let source = DataSourceId::new();
        assert_eq!(store.last_sync_time(source).await.unwrap(), None);

        let at = Utc::now();
        store.update_last_sync_time(source, at).await.unwrap();
        assert_eq!(store.last_sync_time(source).await.unwrap(), Some(at));
    }

    #[tokio::test]
    async fn test_connector_paginates_in_insertion_order() {
        let connector = MemoryConnector::new("memory");
        let source = DataSourceId::new();
        for i in 0..5 {
            connector.push_record(record(source, &format!("u-{i}"), i)).await;
        }

        let page1 = connector
            .fetch_page(&FetchQuery::new("user", PageRequest::first(2)))
            .await
            .unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].external_id, "u-0");

        let page3 = connector
            .fetch_page(&FetchQuery::new("user", PageRequest::new(3, 2)))
            .await
            .unwrap();
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].external_id, "u-4");
        assert_eq!(connector.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_connector_applies_filters_and_type() {
        let connector = MemoryConnector::new("memory");
        let source = DataSourceId::new();
        connector.push_record(record(source, "u-1", 25)).await;
        connector.push_record(record(source, "u-2", 40)).await;
        connector
            .push_record(DataRecord::new(
                source,
                "order",
                "o-1",
                field_map_from_json(serde_json::json!({"total": 9})),
            ))
            .await;

        let query = FetchQuery::new("user", PageRequest::first(10))
            .with_filter(DataFilter::greater_than("age", 30i64));
        let page = connector.fetch_page(&query).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].external_id, "u-2");
    }

    #[tokio::test]
    async fn test_connector_write_operations() {
        let connector = MemoryConnector::new("memory");
        let source = DataSourceId::new();
        connector.create(&record(source, "u-1", 30)).await.unwrap();

        let err = connector.create(&record(source, "u-1", 30)).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ObjectAlreadyExists { .. }));

        let changes = field_map_from_json(serde_json::json!({"age": 31}));
        let updated = connector.update("user", "u-1", &changes).await.unwrap();
        assert_eq!(updated.fields.get("age"), Some(&31i64.into()));
        assert_eq!(updated.fields.get("name"), Some(&"u-1".into()));

        let err = connector.update("user", "u-9", &changes).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ObjectNotFound { .. }));

        assert!(connector.delete("user", "u-1").await.unwrap());
        assert!(!connector.delete("user", "u-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_connector_failure_injection() {
        let connector = MemoryConnector::new("memory");
        connector.fail_next_fetches(2);

        let query = FetchQuery::new("user", PageRequest::first(10));
        assert!(connector.fetch_page(&query).await.unwrap_err().is_transient());
        assert!(connector.fetch_page(&query).await.is_err());
        assert!(connector.fetch_page(&query).await.is_ok());
        assert_eq!(connector.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_connector_health_flag() {
        let connector = MemoryConnector::new("memory");
        assert!(connector.is_healthy());
        connector.test_connection().await.unwrap();

        connector.set_healthy(false);
        assert!(!connector.is_healthy());
        assert!(connector.test_connection().await.is_err());
    }
}
