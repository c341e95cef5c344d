//! Connector and local store traits
//!
//! The two seams the sync engine is generic over: a [`Connector`] that
//! speaks to a remote system, and a [`LocalStore`] that owns the local
//! record set. Engines receive implementations by injection, so tests run
//! against in-memory fakes and production wires real backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ConnectorResult, StoreResult};
use crate::filter::FetchQuery;
use crate::ids::{DataSourceId, RecordId};
use crate::record::DataRecord;
use crate::value::FieldMap;

/// A client for one remote system.
///
/// Fetching is page-based: the engine calls [`Connector::fetch_page`] with
/// an incrementing page number and stops as soon as a page comes back
/// shorter than the requested size. An empty first page means no data.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Display name for this connector instance.
    fn name(&self) -> &str;

    /// Test the connection to the remote system.
    ///
    /// Returns `Ok(())` if the connection is usable, or an error describing
    /// what went wrong.
    async fn test_connection(&self) -> ConnectorResult<()>;

    /// Fetch one page of records matching the query.
    ///
    /// # Arguments
    /// * `query` - Record type, filters, and the page to return
    ///
    /// # Returns
    /// The records of that page. A page shorter than `query.page.size`
    /// signals the end of the data set.
    async fn fetch_page(&self, query: &FetchQuery) -> ConnectorResult<Vec<DataRecord>>;

    /// Create a record in the remote system.
    ///
    /// # Returns
    /// The created record as the remote system sees it, including any
    /// server-assigned fields.
    async fn create(&self, record: &DataRecord) -> ConnectorResult<DataRecord>;

    /// Update a remote record by its external identifier.
    ///
    /// # Arguments
    /// * `data_type` - The record type
    /// * `external_id` - The identifier in the remote system
    /// * `changes` - Fields to write; unmentioned fields are untouched
    async fn update(
        &self,
        data_type: &str,
        external_id: &str,
        changes: &FieldMap,
    ) -> ConnectorResult<DataRecord>;

    /// Delete a remote record by its external identifier.
    ///
    /// # Returns
    /// `Ok(true)` if a record was deleted, `Ok(false)` if it did not exist.
    async fn delete(&self, data_type: &str, external_id: &str) -> ConnectorResult<bool>;

    /// Lightweight health check, cheaper than `test_connection`.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// The local record set a sync run reconciles against.
///
/// Soft deletes: [`LocalStore::delete_record`] marks records deleted rather
/// than removing them, and [`LocalStore::records`] returns deleted records
/// too. The engine needs them to tell "deleted locally" from "never seen".
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All records for a source, including soft-deleted ones.
    async fn records(&self, source: DataSourceId) -> StoreResult<Vec<DataRecord>>;

    /// Insert a new record.
    ///
    /// Fails with `StoreError::DuplicateRecord` when a record with the same
    /// `(data_type, external_id)` already exists for the source.
    async fn create_record(&self, record: DataRecord) -> StoreResult<DataRecord>;

    /// Replace an existing record, matched by its local id.
    async fn update_record(&self, record: DataRecord) -> StoreResult<DataRecord>;

    /// Soft-delete a record by its local id.
    ///
    /// # Returns
    /// `Ok(true)` if the record was deleted, `Ok(false)` if it was already
    /// deleted.
    async fn delete_record(&self, id: RecordId) -> StoreResult<bool>;

    /// Watermark of the last successful sync for a source, if any.
    async fn last_sync_time(&self, source: DataSourceId) -> StoreResult<Option<DateTime<Utc>>>;

    /// Advance the watermark for a source.
    async fn update_last_sync_time(&self, source: DataSourceId, at: DateTime<Utc>)
        -> StoreResult<()>;
}
