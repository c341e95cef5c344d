//! Test doubles shared by the engine integration tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;

use accord_sync::prelude::*;

/// Connector wrapper that blocks fetches from a given page onward until
/// the test releases permits. Lets a test hold a run between batches at a
/// known point instead of racing against sleeps.
pub struct GatedConnector {
    inner: Arc<MemoryConnector>,
    gate: Semaphore,
    gate_from_page: u32,
}

impl GatedConnector {
    pub fn new(inner: Arc<MemoryConnector>, gate_from_page: u32) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            gate_from_page,
        }
    }

    /// Allow `count` gated fetches to proceed.
    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn inner(&self) -> &MemoryConnector {
        &self.inner
    }
}

#[async_trait]
impl Connector for GatedConnector {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        self.inner.test_connection().await
    }

    async fn fetch_page(&self, query: &FetchQuery) -> ConnectorResult<Vec<DataRecord>> {
        if query.page.number >= self.gate_from_page {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| ConnectorError::internal("gate closed"))?;
            permit.forget();
        }
        self.inner.fetch_page(query).await
    }

    async fn create(&self, record: &DataRecord) -> ConnectorResult<DataRecord> {
        self.inner.create(record).await
    }

    async fn update(
        &self,
        data_type: &str,
        external_id: &str,
        changes: &FieldMap,
    ) -> ConnectorResult<DataRecord> {
        self.inner.update(data_type, external_id, changes).await
    }

    async fn delete(&self, data_type: &str, external_id: &str) -> ConnectorResult<bool> {
        self.inner.delete(data_type, external_id).await
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }
}

/// Store wrapper that fails a scripted number of writes before behaving.
///
/// Transient failures exercise the per-record retry path; permanent ones
/// exercise error recording without aborting the batch.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_writes: AtomicU32,
    fail_transient: AtomicBool,
    create_calls: AtomicU64,
    update_calls: AtomicU64,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_writes: AtomicU32::new(0),
            fail_transient: AtomicBool::new(true),
            create_calls: AtomicU64::new(0),
            update_calls: AtomicU64::new(0),
        }
    }

    /// Fail the next `count` create/update calls.
    pub fn fail_next_writes(&self, count: u32, transient: bool) {
        self.fail_writes.store(count, Ordering::SeqCst);
        self.fail_transient.store(transient, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Option<StoreError> {
        // Writes run concurrently; claim a scripted failure atomically.
        let mut remaining = self.fail_writes.load(Ordering::SeqCst);
        loop {
            if remaining == 0 {
                return None;
            }
            match self.fail_writes.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => remaining = actual,
            }
        }
        if self.fail_transient.load(Ordering::SeqCst) {
            Some(StoreError::unavailable("injected transient write failure"))
        } else {
            Some(StoreError::internal("injected permanent write failure"))
        }
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn records(&self, source: DataSourceId) -> StoreResult<Vec<DataRecord>> {
        self.inner.records(source).await
    }

    async fn create_record(&self, record: DataRecord) -> StoreResult<DataRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.inner.create_record(record).await
    }

    async fn update_record(&self, record: DataRecord) -> StoreResult<DataRecord> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }
        self.inner.update_record(record).await
    }

    async fn delete_record(&self, id: RecordId) -> StoreResult<bool> {
        self.inner.delete_record(id).await
    }

    async fn last_sync_time(&self, source: DataSourceId) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.last_sync_time(source).await
    }

    async fn update_last_sync_time(
        &self,
        source: DataSourceId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.update_last_sync_time(source, at).await
    }
}

/// A remote user record for seeding connectors.
pub fn user_record(source: DataSourceId, external_id: &str, json: serde_json::Value) -> DataRecord {
    DataRecord::new(source, "user", external_id, field_map_from_json(json))
}
