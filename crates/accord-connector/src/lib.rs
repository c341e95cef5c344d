//! # Connector Framework
//!
//! Core abstractions for synchronizing records between remote systems and a
//! local store.
//!
//! This crate defines the data model shared by every sync run and the two
//! seams the engine is generic over: the [`Connector`](traits::Connector)
//! that speaks to a remote system and the [`LocalStore`](traits::LocalStore)
//! that owns the local record set.
//!
//! ## Example
//!
//! ```ignore
//! use accord_connector::prelude::*;
//!
//! // Fetch one page of users modified since the watermark
//! let query = FetchQuery::new("user", PageRequest::first(100))
//!     .with_filter(DataFilter::greater_than("updated_at", watermark));
//! let page = connector.fetch_page(&query).await?;
//!
//! // Apply a write with retry protection
//! let retry = RetryExecutor::with_defaults();
//! retry.execute(|| store.create_record(record.clone())).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe identifiers (`DataSourceId`, `RecordId`, etc.)
//! - [`value`] - Typed field values and field maps
//! - [`record`] - The `DataRecord` shape and its lifecycle
//! - [`filter`] - Filters, pagination, and fetch queries
//! - [`traits`] - The `Connector` and `LocalStore` seams
//! - [`error`] - Error types with transient/permanent classification
//! - [`resilience`] - Retry, circuit breaker, resilient wrapper

pub mod error;
pub mod filter;
pub mod ids;
pub mod record;
pub mod resilience;
pub mod traits;
pub mod value;

/// Prelude module for convenient imports.
///
/// ```
/// use accord_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::{ConflictId, DataSourceId, JobId, PipelineId, RecordId, StepId};

    // Values and records
    pub use crate::record::{DataRecord, RecordMetadata};
    pub use crate::value::{
        checksum, field_map_from_json, field_map_to_json, get_path, FieldMap, FieldValue,
    };

    // Filters and queries
    pub use crate::filter::{DataFilter, FetchQuery, FilterOp, PageRequest};

    // Traits
    pub use crate::traits::{Connector, LocalStore};

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult, StoreError, StoreResult};

    // Resilience
    pub use crate::resilience::{
        BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilientConnector,
        RetryExecutor, RetryPolicy, Transient,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        // Verify all prelude types are accessible
        let _id = DataSourceId::new();
        let _record_id = RecordId::new();
        let _filter = DataFilter::equals("email", "test@example.com");
        let _page = PageRequest::first(100);
        let _value = FieldValue::from("test");
        let _state = CircuitState::Closed;
    }
}
