//! Connectivity notice daemon.
//!
//! The transport layer pushes raw connectivity notifications onto a
//! channel; this daemon drains it and turns notices into allocation
//! events. The responsiveness check for a freshly-online endpoint is
//! spawned onto its own task, never run inline, so a slow probe cannot
//! head-of-line block further notifications.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use rig_core::{
    AllocationEvent, AllocationState, ConnectivityState, EndpointDescriptor, EndpointTransport,
};
use rig_registry::FleetRegistry;

use crate::responsiveness::ResponsivenessChecker;

/// Raw connectivity notification for one serial.
pub enum ConnectivityNotice {
    /// A (re)connected endpoint, with its fresh transport handle.
    Connected {
        descriptor: EndpointDescriptor,
        transport: Arc<dyn EndpointTransport>,
    },
    /// A connectivity-state change on a known endpoint.
    StateChanged {
        serial: String,
        connectivity: ConnectivityState,
    },
    /// The endpoint went away.
    Disconnected { serial: String },
}

/// Drains connectivity notices into the registry.
pub struct ConnectivityDaemon {
    registry: FleetRegistry,
    checker: Arc<ResponsivenessChecker>,
}

impl ConnectivityDaemon {
    pub fn new(registry: FleetRegistry, checker: Arc<ResponsivenessChecker>) -> Self {
        Self { registry, checker }
    }

    /// Run until the notice channel closes or a stop is signalled.
    pub async fn run(
        self,
        mut notices: mpsc::Receiver<ConnectivityNotice>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("connectivity daemon started");
        loop {
            tokio::select! {
                notice = notices.recv() => {
                    match notice {
                        Some(notice) => self.handle(notice),
                        None => {
                            debug!("connectivity feed closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("connectivity daemon shutting down");
                    break;
                }
            }
        }
    }

    /// Apply one notice. Synchronous: all blocking work is spawned.
    pub fn handle(&self, notice: ConnectivityNotice) {
        match notice {
            ConnectivityNotice::Connected {
                descriptor,
                transport,
            } => {
                debug!(serial = %descriptor.serial, "endpoint connected");
                let online = descriptor.connectivity == ConnectivityState::Online;
                let record = self.registry.find_or_create(descriptor, transport);
                if online {
                    self.apply_online_event(record.serial(), AllocationEvent::ConnectedOnline);
                }
            }
            ConnectivityNotice::StateChanged {
                serial,
                connectivity,
            } => {
                if !self.registry.update_connectivity(&serial, connectivity) {
                    debug!(%serial, "state change for unknown endpoint, ignoring");
                    return;
                }
                if connectivity == ConnectivityState::Online {
                    self.apply_online_event(&serial, AllocationEvent::StateChangeOnline);
                }
            }
            ConnectivityNotice::Disconnected { serial } => {
                if self.registry.find(&serial).is_some() {
                    debug!(%serial, "endpoint disconnected");
                    self.registry
                        .apply_event(&serial, AllocationEvent::Disconnected);
                    self.registry
                        .update_connectivity(&serial, ConnectivityState::NotAvailable);
                }
            }
        }
    }

    /// Apply an online event; when the record lands in
    /// `CheckingAvailability`, kick off the responsiveness check on its
    /// own task.
    fn apply_online_event(&self, serial: &str, event: AllocationEvent) {
        let response = self.registry.apply_event(serial, event);
        if response.is_some_and(|r| r.changed && r.state == AllocationState::CheckingAvailability)
            && let Some(record) = self.registry.find(serial)
        {
            let checker = Arc::clone(&self.checker);
            tokio::spawn(async move {
                checker.check(record).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rig_core::{AnyEndpoint, EndpointKind, TransportError, TransportResult};
    use std::time::Duration;

    struct ScriptedTransport {
        serial: String,
        responsive: bool,
    }

    #[async_trait]
    impl EndpointTransport for ScriptedTransport {
        fn serial(&self) -> &str {
            &self.serial
        }
        async fn execute_shell(&self, _c: &str, _t: Duration) -> TransportResult<String> {
            Ok(String::new())
        }
        async fn get_property(&self, _n: &str) -> TransportResult<Option<String>> {
            Ok(None)
        }
        async fn reboot(&self) -> TransportResult<()> {
            Ok(())
        }
        async fn wait_for_responsive(&self, _t: Duration) -> bool {
            self.responsive
        }
        async fn wait_for_available(&self, _t: Duration) -> TransportResult<()> {
            if self.responsive {
                Ok(())
            } else {
                Err(TransportError::Unreachable(self.serial.clone()))
            }
        }
        async fn wait_for_gone(&self, _t: Duration) -> TransportResult<()> {
            Ok(())
        }
    }

    fn daemon(registry: &FleetRegistry) -> ConnectivityDaemon {
        let checker = Arc::new(ResponsivenessChecker::new(
            registry.clone(),
            Arc::new(AnyEndpoint),
            Duration::from_secs(1),
        ));
        ConnectivityDaemon::new(registry.clone(), checker)
    }

    fn connected_notice(serial: &str, responsive: bool) -> ConnectivityNotice {
        ConnectivityNotice::Connected {
            descriptor: EndpointDescriptor::new(
                serial,
                EndpointKind::Physical,
                ConnectivityState::Online,
            ),
            transport: Arc::new(ScriptedTransport {
                serial: serial.to_string(),
                responsive,
            }),
        }
    }

    /// Poll the registry until the record reaches `expected` or the
    /// deadline passes.
    async fn wait_for_state(registry: &FleetRegistry, serial: &str, expected: AllocationState) {
        for _ in 0..100 {
            if registry.find(serial).map(|r| r.state) == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "endpoint {serial} never reached {expected:?}, got {:?}",
            registry.find(serial).map(|r| r.state)
        );
    }

    #[tokio::test]
    async fn connected_responsive_endpoint_becomes_available() {
        let registry = FleetRegistry::new();
        daemon(&registry).handle(connected_notice("SERIAL1", true));
        wait_for_state(&registry, "SERIAL1", AllocationState::Available).await;
    }

    #[tokio::test]
    async fn connected_unresponsive_endpoint_becomes_unavailable() {
        let registry = FleetRegistry::new();
        daemon(&registry).handle(connected_notice("SERIAL1", false));
        wait_for_state(&registry, "SERIAL1", AllocationState::Unavailable).await;
    }

    #[tokio::test]
    async fn reconnect_swaps_transport_handle() {
        let registry = FleetRegistry::new();
        let d = daemon(&registry);
        d.handle(connected_notice("SERIAL1", true));
        wait_for_state(&registry, "SERIAL1", AllocationState::Available).await;

        // Reconnect with a fresh handle: record survives, handle swapped.
        d.handle(connected_notice("SERIAL1", true));
        let record = registry.find("SERIAL1").unwrap();
        assert!(record.transport.wait_for_responsive(Duration::from_secs(1)).await);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn disconnect_marks_unavailable() {
        let registry = FleetRegistry::new();
        let d = daemon(&registry);
        d.handle(connected_notice("SERIAL1", true));
        wait_for_state(&registry, "SERIAL1", AllocationState::Available).await;

        d.handle(ConnectivityNotice::Disconnected {
            serial: "SERIAL1".to_string(),
        });
        let record = registry.find("SERIAL1").unwrap();
        assert_eq!(record.state, AllocationState::Unavailable);
        assert_eq!(
            record.descriptor.connectivity,
            ConnectivityState::NotAvailable
        );
    }

    #[tokio::test]
    async fn disconnect_of_unknown_serial_is_ignored() {
        let registry = FleetRegistry::new();
        daemon(&registry).handle(ConnectivityNotice::Disconnected {
            serial: "ghost".to_string(),
        });
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn state_change_online_triggers_check() {
        let registry = FleetRegistry::new();
        let d = daemon(&registry);
        // Known but offline endpoint.
        registry.find_or_create(
            EndpointDescriptor::new("SERIAL1", EndpointKind::Physical, ConnectivityState::Offline),
            Arc::new(ScriptedTransport {
                serial: "SERIAL1".to_string(),
                responsive: true,
            }),
        );

        d.handle(ConnectivityNotice::StateChanged {
            serial: "SERIAL1".to_string(),
            connectivity: ConnectivityState::Online,
        });
        wait_for_state(&registry, "SERIAL1", AllocationState::Available).await;
    }

    #[tokio::test]
    async fn daemon_run_stops_on_shutdown() {
        let registry = FleetRegistry::new();
        let (_notice_tx, notice_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(daemon(&registry).run(notice_rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("daemon did not stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn daemon_run_processes_notices() {
        let registry = FleetRegistry::new();
        let (notice_tx, notice_rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(daemon(&registry).run(notice_rx, shutdown_rx));
        notice_tx.send(connected_notice("SERIAL1", true)).await.unwrap();
        wait_for_state(&registry, "SERIAL1", AllocationState::Available).await;
    }
}
