//! Error types for fedcat core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern:
//! startup problems surface as [`Error`], every catalog operation fails with
//! exactly one canonical [`CatalogError`] kind, and notification problems stay
//! inside the notification pipeline as [`NotificationError`].

use crate::model::PartitionsSaveResponse;
use crate::name::QualifiedName;
use thiserror::Error;

/// Result type alias for fedcat operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for dispatched catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Boxed source error kept for diagnostics.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for fedcat.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No plugin is registered for a configured connector type
    #[error("Unknown connector type '{connector_type}' for catalog '{catalog}'")]
    UnknownPlugin {
        catalog: String,
        connector_type: String,
    },

    /// A catalog name or plugin type was registered twice
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// Catalog operation error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Notification pipeline error
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Canonical error kinds surfaced by the dispatch facade.
///
/// Backend-native failures are mapped into exactly one of these before they
/// leave a connector.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog segment of a name does not resolve to a registered connector
    #[error("Catalog not found: {catalog}")]
    CatalogNotFound { catalog: String },

    /// Database, table or partition does not exist
    #[error("Not found: {name}")]
    EntityNotFound { name: QualifiedName },

    /// Create on a name that already exists
    #[error("Already exists: {name}")]
    EntityAlreadyExists { name: QualifiedName },

    /// Operation disabled by policy or not offered by the connector
    #[error("Operation '{operation}' is not supported by catalog '{catalog}'")]
    UnsupportedOperation { catalog: String, operation: String },

    /// Connectivity, timeout or unexpected backend failure
    #[error("Backend unavailable: {message}")]
    BackendUnavailable {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Backend-side integrity or validation failure
    #[error("Backend constraint violation: {message}")]
    BackendConstraintViolation { message: String },

    /// Malformed name or a name of the wrong depth for the operation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A partition batch failed after part of it had been committed.
    ///
    /// `saved` and `deleted` list what the backend did apply; `source` is
    /// the failure that stopped the batch.
    #[error("Partition batch partially applied: {source}")]
    PartiallyApplied {
        saved: PartitionsSaveResponse,
        deleted: Vec<String>,
        source: Box<CatalogError>,
    },
}

impl CatalogError {
    /// Build a [`CatalogError::EntityNotFound`].
    pub fn not_found(name: &QualifiedName) -> Self {
        CatalogError::EntityNotFound { name: name.clone() }
    }

    /// Build a [`CatalogError::EntityAlreadyExists`].
    pub fn already_exists(name: &QualifiedName) -> Self {
        CatalogError::EntityAlreadyExists { name: name.clone() }
    }

    /// Build a [`CatalogError::UnsupportedOperation`].
    pub fn unsupported(catalog: impl Into<String>, operation: impl Into<String>) -> Self {
        CatalogError::UnsupportedOperation {
            catalog: catalog.into(),
            operation: operation.into(),
        }
    }

    /// Backend failure without an underlying error value.
    pub fn unavailable(message: impl Into<String>) -> Self {
        CatalogError::BackendUnavailable {
            message: message.into(),
            source: None,
        }
    }

    /// Backend failure preserving the original cause.
    pub fn unavailable_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CatalogError::BackendUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build a [`CatalogError::BackendConstraintViolation`].
    pub fn constraint(message: impl Into<String>) -> Self {
        CatalogError::BackendConstraintViolation {
            message: message.into(),
        }
    }

    /// A save batch that stopped after committing `saved`.
    pub fn partially_saved(saved: PartitionsSaveResponse, source: CatalogError) -> Self {
        CatalogError::PartiallyApplied {
            saved,
            deleted: Vec::new(),
            source: Box::new(source),
        }
    }

    /// A delete batch that stopped after dropping `deleted`.
    pub fn partially_deleted(deleted: Vec<String>, source: CatalogError) -> Self {
        CatalogError::PartiallyApplied {
            saved: PartitionsSaveResponse::default(),
            deleted,
            source: Box::new(source),
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::BackendUnavailable { .. })
    }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::CatalogNotFound { .. } => "catalog_not_found",
            CatalogError::EntityNotFound { .. } => "entity_not_found",
            CatalogError::EntityAlreadyExists { .. } => "entity_already_exists",
            CatalogError::UnsupportedOperation { .. } => "unsupported_operation",
            CatalogError::BackendUnavailable { .. } => "backend_unavailable",
            CatalogError::BackendConstraintViolation { .. } => "backend_constraint_violation",
            CatalogError::InvalidRequest(_) => "invalid_request",
            // Labelled by the failure that stopped the batch
            CatalogError::PartiallyApplied { source, .. } => source.kind(),
        }
    }
}

/// Notification pipeline errors.
///
/// These never reach the caller of a catalog mutation.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Event could not be serialized into a message
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Transport rejected or failed to deliver a message
    #[error("Publish to {destination} failed: {message}")]
    Transport {
        destination: String,
        message: String,
    },

    /// The bounded event queue is full
    #[error("Event queue is full")]
    QueueFull,

    /// The event bus has been shut down
    #[error("Event bus is closed")]
    Closed,
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Serialization(err.to_string())
    }
}
