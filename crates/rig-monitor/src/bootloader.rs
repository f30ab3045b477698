//! Bootloader-mode poller.
//!
//! Lists bootloader-reachable serials on a fixed interval, but only
//! while at least one listener is registered: polling the bootloader
//! channel indiscriminately can wedge other commands against it.
//! Listener notification happens off the critical section, from a
//! defensive copy of the listener set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use rig_core::{
    AllocationEvent, ConnectivityState, EndpointDescriptor, EndpointKind, EndpointSelector,
    StubTransport, TransportResult,
};
use rig_registry::FleetRegistry;

/// Lists serials currently reachable in bootloader mode.
#[async_trait]
pub trait BootloaderLister: Send + Sync {
    async fn list_serials(&self) -> TransportResult<HashSet<String>>;
}

/// Notified after each successful bootloader poll.
pub trait BootloaderListener: Send + Sync {
    fn state_updated(&self);
}

/// Periodic bootloader-mode discovery daemon.
pub struct BootloaderMonitor {
    registry: FleetRegistry,
    lister: Arc<dyn BootloaderLister>,
    filter: Arc<dyn EndpointSelector>,
    listeners: Arc<Mutex<Vec<Arc<dyn BootloaderListener>>>>,
    interval: Duration,
}

impl BootloaderMonitor {
    pub fn new(
        registry: FleetRegistry,
        lister: Arc<dyn BootloaderLister>,
        filter: Arc<dyn EndpointSelector>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            lister,
            filter,
            listeners: Arc::new(Mutex::new(Vec::new())),
            interval,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn BootloaderListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn BootloaderListener>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Register every bootloader-reachable serial that passes the
    /// global filter, force-available. Used once at startup and by each
    /// poll tick.
    pub async fn register_current(&self) {
        match self.lister.list_serials().await {
            Ok(serials) => self.apply_listing(serials),
            Err(e) => warn!(error = %e, "bootloader listing failed"),
        }
    }

    fn apply_listing(&self, serials: HashSet<String>) {
        for serial in serials {
            match self.registry.find(&serial) {
                Some(_) => {
                    // Known serial: refresh its likely connectivity kind.
                    self.registry
                        .update_connectivity(&serial, ConnectivityState::Bootloader);
                }
                None => {
                    let descriptor = EndpointDescriptor::new(
                        &serial,
                        EndpointKind::Bootloader,
                        ConnectivityState::Bootloader,
                    );
                    if !self.filter.matches(&descriptor) {
                        debug!(%serial, "bootloader endpoint does not match global filter");
                        continue;
                    }
                    debug!(%serial, "registering bootloader endpoint");
                    self.registry
                        .find_or_create(descriptor, Arc::new(StubTransport::new(&serial)));
                    self.registry
                        .apply_event(&serial, AllocationEvent::ForceAvailable);
                }
            }
        }
    }

    /// Run the poll loop until stopped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "bootloader monitor started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let interested: Vec<_> = self.listeners.lock().unwrap().clone();
                    if interested.is_empty() {
                        continue;
                    }
                    match self.lister.list_serials().await {
                        Ok(serials) => {
                            self.apply_listing(serials);
                            for listener in interested {
                                listener.state_updated();
                            }
                        }
                        Err(e) => warn!(error = %e, "bootloader listing failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("bootloader monitor shutting down");
                    break;
                }
            }
        }
    }
}
