//! Periodic endpoint recovery.
//!
//! The daemon does not interpret outcomes; it exists to guarantee the
//! strategy is invoked at a steady cadence regardless of allocation
//! traffic. A failing tick is logged and the loop proceeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};

use rig_registry::{EndpointRecord, FleetRegistry};

/// Pluggable multi-endpoint recovery logic.
///
/// Invoked once per daemon tick with a snapshot of the whole fleet;
/// may attempt reboots, reconnections, or anything else. The daemon
/// observes nothing but success/failure of the tick as a whole.
#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    async fn recover_endpoints(&self, fleet: Vec<EndpointRecord>) -> anyhow::Result<()>;
}

/// Invokes the recovery strategy on a fixed, minutes-scale interval.
pub struct RecoveryDaemon {
    registry: FleetRegistry,
    strategy: Arc<dyn RecoveryStrategy>,
    interval: Duration,
}

impl RecoveryDaemon {
    pub fn new(
        registry: FleetRegistry,
        strategy: Arc<dyn RecoveryStrategy>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            strategy,
            interval,
        }
    }

    /// Run until stopped. The stop interrupts a pending sleep.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "recovery daemon started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let fleet = self.registry.snapshot();
                    if let Err(e) = self.strategy.recover_endpoints(fleet).await {
                        error!(error = %e, "recovery tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("recovery daemon shutting down");
                    break;
                }
            }
        }
    }
}

/// Default strategy: reboot every unavailable endpoint that is still
/// addressable. Endpoints whose transport is gone entirely are left
/// for the connectivity feed to bring back.
pub struct RebootUnavailable {
    reboot_timeout: Duration,
}

impl RebootUnavailable {
    pub fn new(reboot_timeout: Duration) -> Self {
        Self { reboot_timeout }
    }
}

#[async_trait]
impl RecoveryStrategy for RebootUnavailable {
    async fn recover_endpoints(&self, fleet: Vec<EndpointRecord>) -> anyhow::Result<()> {
        for record in fleet {
            if record.state != rig_core::AllocationState::Unavailable
                || record.descriptor.connectivity == rig_core::ConnectivityState::NotAvailable
            {
                continue;
            }
            let serial = record.serial().to_string();
            match tokio::time::timeout(self.reboot_timeout, record.transport.reboot()).await {
                Ok(Ok(())) => info!(%serial, "rebooted unavailable endpoint"),
                Ok(Err(e)) => warn!(%serial, error = %e, "reboot of unavailable endpoint failed"),
                Err(_) => warn!(%serial, "reboot of unavailable endpoint timed out"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_core::{
        AllocationEvent, ConnectivityState, EndpointDescriptor, EndpointKind, EndpointTransport,
        StubTransport, TransportResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingStrategy {
        ticks: AtomicUsize,
        seen_serials: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl RecordingStrategy {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                ticks: AtomicUsize::new(0),
                seen_serials: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl RecoveryStrategy for RecordingStrategy {
        async fn recover_endpoints(&self, fleet: Vec<EndpointRecord>) -> anyhow::Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            self.seen_serials
                .lock()
                .unwrap()
                .push(fleet.iter().map(|r| r.serial().to_string()).collect());
            if self.fail {
                anyhow::bail!("strategy exploded");
            }
            Ok(())
        }
    }

    fn registry_with_endpoint(serial: &str) -> FleetRegistry {
        let registry = FleetRegistry::new();
        registry.find_or_create(
            EndpointDescriptor::new(serial, EndpointKind::Physical, ConnectivityState::Offline),
            Arc::new(StubTransport::new(serial)),
        );
        registry
    }

    #[tokio::test]
    async fn strategy_receives_fleet_snapshot_each_tick() {
        let registry = registry_with_endpoint("SERIAL1");
        let strategy = RecordingStrategy::new(false);
        let daemon = RecoveryDaemon::new(
            registry,
            strategy.clone(),
            Duration::from_millis(10),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { daemon.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(strategy.ticks.load(Ordering::SeqCst) >= 2);
        let seen = strategy.seen_serials.lock().unwrap();
        assert!(seen.iter().all(|s| s == &["SERIAL1".to_string()]));
    }

    #[tokio::test]
    async fn failing_tick_does_not_kill_the_daemon() {
        let registry = registry_with_endpoint("SERIAL1");
        let strategy = RecordingStrategy::new(true);
        let daemon = RecoveryDaemon::new(
            registry,
            strategy.clone(),
            Duration::from_millis(10),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { daemon.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // Several failing ticks, still ran to the stop signal.
        assert!(strategy.ticks.load(Ordering::SeqCst) >= 2);
    }

    struct CountingRebootTransport {
        serial: String,
        reboots: AtomicUsize,
    }

    #[async_trait]
    impl EndpointTransport for CountingRebootTransport {
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
            self.reboots.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn wait_for_responsive(&self, _t: Duration) -> bool {
            true
        }
        async fn wait_for_available(&self, _t: Duration) -> TransportResult<()> {
            Ok(())
        }
        async fn wait_for_gone(&self, _t: Duration) -> TransportResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reboot_strategy_targets_unavailable_addressable_endpoints() {
        let registry = FleetRegistry::new();

        // Unavailable but still addressable: gets rebooted.
        let transport = Arc::new(CountingRebootTransport {
            serial: "broken".to_string(),
            reboots: AtomicUsize::new(0),
        });
        registry.find_or_create(
            EndpointDescriptor::new("broken", EndpointKind::Physical, ConnectivityState::Offline),
            transport.clone(),
        );

        // Available endpoint: left alone.
        registry.find_or_create(
            EndpointDescriptor::new("healthy", EndpointKind::Physical, ConnectivityState::Online),
            Arc::new(StubTransport::new("healthy")),
        );
        registry.apply_event("healthy", AllocationEvent::ForceAvailable);

        // Unavailable and gone: left for the connectivity feed.
        registry.find_or_create(
            EndpointDescriptor::new(
                "gone",
                EndpointKind::Physical,
                ConnectivityState::NotAvailable,
            ),
            Arc::new(StubTransport::new("gone")),
        );

        let strategy = RebootUnavailable::new(Duration::from_secs(1));
        strategy
            .recover_endpoints(registry.snapshot())
            .await
            .unwrap();

        assert_eq!(transport.reboots.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_interrupts_a_pending_sleep() {
        let registry = FleetRegistry::new();
        let strategy = RecordingStrategy::new(false);
        // Hour-long interval: the daemon is parked in its sleep.
        let daemon = RecoveryDaemon::new(registry, strategy, Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { daemon.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stop did not interrupt the sleep")
            .unwrap();
    }
}
