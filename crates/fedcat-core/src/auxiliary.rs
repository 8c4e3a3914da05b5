//! Auxiliary RPC interfaces bound to a catalog and a port.
//!
//! The interfaces themselves live outside this crate; the service here only
//! creates, starts and stops one per catalog that asked for it.

use crate::connector::ConnectorManager;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[async_trait]
pub trait AuxiliaryInterface: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Builds the auxiliary interface for one catalog.
pub trait AuxiliaryInterfaceFactory: Send + Sync {
    fn create(&self, catalog: &str, port: u16) -> Result<Box<dyn AuxiliaryInterface>>;
}

struct Entry {
    catalog: String,
    port: u16,
    interface: Box<dyn AuxiliaryInterface>,
    running: AtomicBool,
}

pub struct AuxiliaryInterfaceService {
    entries: Vec<Entry>,
}

impl AuxiliaryInterfaceService {
    /// Create one interface per catalog in `manager` that requested a port.
    pub fn new(manager: &ConnectorManager, factory: Arc<dyn AuxiliaryInterfaceFactory>) -> Result<Self> {
        let entries = manager
            .catalogs_needing_aux_interface()
            .into_iter()
            .map(|(catalog, port)| -> Result<Entry> {
                let interface = factory.create(&catalog, port)?;
                Ok(Entry {
                    catalog,
                    port,
                    interface,
                    running: AtomicBool::new(false),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start every interface. If one fails, those already started are stopped.
    pub async fn start(&self) -> Result<()> {
        for entry in &self.entries {
            if let Err(e) = entry.interface.start().await {
                error!(catalog = %entry.catalog, port = entry.port, error = %e, "Failed to start auxiliary interface");
                self.stop().await;
                return Err(e);
            }
            entry.running.store(true, Ordering::SeqCst);
            info!(catalog = %entry.catalog, port = entry.port, "Auxiliary interface started");
        }
        Ok(())
    }

    /// Stop every running interface, logging failures.
    pub async fn stop(&self) {
        for entry in self.entries.iter().rev() {
            if !entry.running.swap(false, Ordering::SeqCst) {
                continue;
            }
            match entry.interface.stop().await {
                Ok(()) => info!(catalog = %entry.catalog, port = entry.port, "Auxiliary interface stopped"),
                Err(e) => warn!(catalog = %entry.catalog, port = entry.port, error = %e, "Failed to stop auxiliary interface"),
            }
        }
    }
}
