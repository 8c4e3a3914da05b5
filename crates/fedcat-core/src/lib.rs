//! fedcat core - federated metadata catalog
//!
//! This library puts many independent metadata stores behind one addressing
//! scheme and one request surface:
//!
//! - Hierarchical [`QualifiedName`]s (`catalog/database/table/partition`)
//! - Pluggable connectors per backend, registered by type tag
//! - A dispatch facade that routes each call to the connector owning the catalog
//! - Change events for every successful mutation, published off the request path

pub mod auxiliary;
pub mod circuit_breaker;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod model;
pub mod name;
pub mod notifications;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use connector::{ConnectorManager, PluginRegistry};
pub use dispatch::CatalogDispatcher;
pub use error::{CatalogError, CatalogResult, NotificationError};
pub use error::{Error, Result};
pub use name::QualifiedName;
