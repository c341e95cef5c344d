//! Connector and store error types
//!
//! Error definitions with transient/permanent classification for retry logic.

use thiserror::Error;

use crate::ids::DataSourceId;

/// Error that can occur while talking to a remote system.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Connection errors (usually transient)
    /// Failed to establish connection to the remote system.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection timed out.
    #[error("connection timeout after {timeout_ms} ms")]
    ConnectionTimeout { timeout_ms: u64 },

    /// Remote system is temporarily unavailable.
    #[error("remote system unavailable: {message}")]
    RemoteUnavailable { message: String },

    /// Network error during communication.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Remote side is throttling us.
    #[error("rate limited by remote system")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Circuit breaker is open for this connector.
    #[error("circuit breaker open for connector '{connector}'")]
    CircuitOpen { connector: String },

    // Authentication errors (permanent)
    /// Invalid credentials provided.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Request errors (permanent)
    /// The fetch query cannot be served by this connector.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    /// Object already exists in the remote system (create conflict).
    #[error("object already exists: {identifier}")]
    ObjectAlreadyExists { identifier: String },

    /// Object not found in the remote system (update/delete target missing).
    #[error("object not found: {identifier}")]
    ObjectNotFound { identifier: String },

    /// Payload was rejected by the remote system.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Response could not be decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    // Internal errors
    /// Internal error.
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ConnectorError {
    /// Check if this error is transient and the operation should be retried.
    ///
    /// Transient errors are those caused by temporary conditions that may
    /// resolve themselves, such as network issues or throttling.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::RemoteUnavailable { .. }
                | ConnectorError::NetworkError { .. }
                | ConnectorError::RateLimited { .. }
                | ConnectorError::CircuitOpen { .. }
        )
    }

    /// Check if this error is permanent and retry won't help.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::RemoteUnavailable { .. } => "REMOTE_UNAVAILABLE",
            ConnectorError::NetworkError { .. } => "NETWORK_ERROR",
            ConnectorError::RateLimited { .. } => "RATE_LIMITED",
            ConnectorError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidQuery { .. } => "INVALID_QUERY",
            ConnectorError::ObjectAlreadyExists { .. } => "OBJECT_EXISTS",
            ConnectorError::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            ConnectorError::InvalidData { .. } => "INVALID_DATA",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
            ConnectorError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    // Convenience constructors

    /// Create a connection failed error.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a remote unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        ConnectorError::RemoteUnavailable {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        ConnectorError::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        ConnectorError::InvalidData {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with source.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Error that can occur in the local record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found.
    #[error("record not found: {identifier}")]
    RecordNotFound { identifier: String },

    /// A record with the same external identity already exists.
    #[error("duplicate record: {data_type}/{external_id}")]
    DuplicateRecord {
        data_type: String,
        external_id: String,
    },

    /// Data source not known to the store.
    #[error("data source not found: {source_id}")]
    SourceNotFound { source_id: DataSourceId },

    /// Store is temporarily unavailable.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// Internal error.
    #[error("internal store error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Check if this error is transient and the write should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            StoreError::DuplicateRecord { .. } => "DUPLICATE_RECORD",
            StoreError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            StoreError::Unavailable { .. } => "STORE_UNAVAILABLE",
            StoreError::Internal { .. } => "STORE_INTERNAL",
        }
    }

    /// Create a record not found error.
    pub fn record_not_found(identifier: impl Into<String>) -> Self {
        StoreError::RecordNotFound {
            identifier: identifier.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        StoreError::Internal {
            message: message.into(),
            source: None,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
