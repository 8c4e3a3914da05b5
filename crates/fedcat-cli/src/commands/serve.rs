//! Serve command implementation.

use crate::server::{start_server, ServerState};
use anyhow::Result;
use fedcat_core::auxiliary::{AuxiliaryInterfaceFactory, AuxiliaryInterfaceService};
use fedcat_core::events::{DiscardEmitter, EventBus, EventEmitter};
use fedcat_core::health::{catalog_component, HealthCheck, NOTIFICATIONS_COMPONENT};
use fedcat_core::metrics::CatalogMetrics;
use fedcat_core::notifications::{KafkaTransport, NotificationPublisher};
use fedcat_core::{CatalogDispatcher, Config, ConnectorManager, PluginRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Interval between connector health probes.
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on draining queued notifications at shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Queue fill ratio above which the notification pipeline reports degraded.
const QUEUE_DEGRADED_RATIO: f64 = 0.9;

/// Notification pipeline pieces that need an orderly shutdown.
struct Notifications {
    bus: Arc<EventBus>,
    publisher: Arc<NotificationPublisher>,
    capacity: usize,
}

/// Run the catalog service until SIGINT or SIGTERM.
pub async fn run(config: Config, aux_factory: Option<Arc<dyn AuxiliaryInterfaceFactory>>) -> Result<()> {
    info!(catalogs = config.catalogs.len(), "Starting catalog service");

    let metrics = Arc::new(CatalogMetrics::new()?);
    let health = Arc::new(HealthCheck::new());
    for catalog in &config.catalogs {
        health.register_component(&catalog_component(&catalog.name));
    }
    health.register_component(NOTIFICATIONS_COMPONENT);

    let state = Arc::new(ServerState {
        health: Arc::clone(&health),
        metrics: Arc::clone(&metrics),
        dispatcher: OnceCell::new(),
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let server = tokio::spawn(start_server(
        Arc::clone(&state),
        config.monitoring.health_port,
        config.monitoring.metrics_port,
        shutdown_tx.subscribe(),
    ));

    let manager = Arc::new(
        ConnectorManager::from_config(
            PluginRegistry::with_defaults(),
            Arc::clone(&metrics),
            &config.catalogs,
        )
        .await?,
    );

    let notifications = match start_notifications(&config, &metrics) {
        Ok(notifications) => notifications,
        Err(e) => {
            manager.shutdown().await;
            return Err(e);
        }
    };
    let emitter: Arc<dyn EventEmitter> = match &notifications {
        Some(n) => n.bus.clone() as Arc<dyn EventEmitter>,
        None => Arc::new(DiscardEmitter),
    };
    health.mark_healthy(NOTIFICATIONS_COMPONENT);

    let aux = match aux_factory {
        Some(factory) => {
            let started = match AuxiliaryInterfaceService::new(&manager, factory) {
                Ok(service) => service.start().await.map(|()| service),
                Err(e) => Err(e),
            };
            match started {
                Ok(service) => Some(service),
                Err(e) => {
                    manager.shutdown().await;
                    return Err(e.into());
                }
            }
        }
        None => {
            for (catalog, port) in manager.catalogs_needing_aux_interface() {
                warn!(catalog = %catalog, port, "No auxiliary interface available, port not bound");
            }
            None
        }
    };

    probe(&manager, &health).await;
    let dispatcher = Arc::new(CatalogDispatcher::new(Arc::clone(&manager), emitter));
    if state.dispatcher.set(dispatcher).is_err() {
        warn!("Catalog dispatcher was already initialized");
    }
    health.set_ready(true);
    info!(catalogs = ?manager.catalog_names(), "Catalog service ready");

    let probes = tokio::spawn(probe_loop(
        Arc::clone(&manager),
        Arc::clone(&health),
        notifications.as_ref().map(|n| (Arc::clone(&n.bus), n.capacity)),
        shutdown_tx.subscribe(),
    ));

    wait_for_signal().await;

    health.set_ready(false);
    let _ = shutdown_tx.send(());
    if let Some(aux) = &aux {
        aux.stop().await;
    }
    if let Some(n) = &notifications {
        n.bus.shutdown(DRAIN_TIMEOUT).await;
        n.publisher.close().await;
    }
    manager.shutdown().await;
    let _ = probes.await;
    let _ = server.await;

    info!("Catalog service stopped");
    Ok(())
}

fn start_notifications(config: &Config, metrics: &Arc<CatalogMetrics>) -> Result<Option<Notifications>> {
    let settings = &config.notifications;
    if !settings.enabled {
        info!("Notifications disabled");
        return Ok(None);
    }
    let transport = Arc::new(KafkaTransport::new(settings)?);
    let publisher = Arc::new(NotificationPublisher::new(
        transport,
        Arc::clone(metrics),
        Duration::from_millis(settings.publish_timeout_ms),
    ));
    let bus = Arc::new(EventBus::start(
        publisher.clone(),
        settings.worker_count,
        settings.queue_capacity,
        Arc::clone(metrics),
    ));
    Ok(Some(Notifications {
        bus,
        publisher,
        capacity: settings.queue_capacity,
    }))
}

async fn probe(manager: &ConnectorManager, health: &HealthCheck) {
    for (catalog, result) in manager.health_check().await {
        if let Err(e) = &result {
            warn!(catalog = %catalog, error = %e, "Catalog health probe failed");
        }
        health.record_probe(&catalog_component(&catalog), &result);
    }
}

async fn probe_loop(
    manager: Arc<ConnectorManager>,
    health: Arc<HealthCheck>,
    bus: Option<(Arc<EventBus>, usize)>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(PROBE_INTERVAL);
    // First tick completes immediately; startup already probed
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                probe(&manager, &health).await;
                if let Some((bus, capacity)) = &bus {
                    let queued = bus.queued();
                    if queued as f64 >= *capacity as f64 * QUEUE_DEGRADED_RATIO {
                        health.mark_degraded(NOTIFICATIONS_COMPONENT, &format!("{} events queued", queued));
                    } else {
                        health.mark_healthy(NOTIFICATIONS_COMPONENT);
                    }
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, initiating graceful shutdown");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C, initiating graceful shutdown");
}
