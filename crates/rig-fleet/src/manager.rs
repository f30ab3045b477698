//! Fleet manager — assembles the registry and daemons behind one
//! process-lifetime facade.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rig_core::{
    sort_listing, AllocationEvent, AnyEndpoint, ConnectivityBridge, ConnectivityState,
    EndpointDescriptor, EndpointKind, EndpointListing, EndpointSelector, EndpointTransport,
    FleetConfig, FreeOutcome, StubTransport,
};
use rig_monitor::{
    BootloaderLister, BootloaderListener, BootloaderMonitor, ConnectivityDaemon,
    ConnectivityNotice, RecoveryDaemon, RecoveryStrategy, ResponsivenessChecker,
};
use rig_registry::{EndpointRecord, FleetRegistry};

use crate::emulator;
use crate::error::{FleetError, FleetResult};

/// First emulator console port; slots step by two, matching the
/// console/bridge port pairing convention.
const FIRST_EMULATOR_PORT: u16 = 5554;

/// How many times a network-attached connect is attempted.
const TCP_CONNECT_ATTEMPTS: u32 = 3;

/// Bound on waiting for a killed emulator's endpoint to disappear.
const EMULATOR_GONE_TIMEOUT: Duration = Duration::from_secs(20);

/// Attribute names fetched for fleet listings.
const LISTING_ATTRIBUTES: [&str; 4] = ["product", "variant", "os.build", "battery"];

struct Running {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

enum Lifecycle {
    New,
    Running(Running),
    Terminated,
}

/// The fleet control-plane facade.
///
/// Construct with [`FleetManager::new`], inject collaborators with the
/// `with_*` builders, then call [`FleetManager::init`] exactly once to
/// synthesize placeholder endpoints and start the background daemons.
pub struct FleetManager {
    registry: FleetRegistry,
    config: FleetConfig,
    filter: Arc<dyn EndpointSelector>,
    recovery_strategy: Option<Arc<dyn RecoveryStrategy>>,
    bootloader_lister: Option<Arc<dyn BootloaderLister>>,
    bridge: Option<Arc<dyn ConnectivityBridge>>,
    bootloader_monitor: Mutex<Option<Arc<BootloaderMonitor>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl FleetManager {
    pub fn new(registry: FleetRegistry, config: FleetConfig) -> Self {
        Self {
            registry,
            config,
            filter: Arc::new(AnyEndpoint),
            recovery_strategy: None,
            bootloader_lister: None,
            bridge: None,
            bootloader_monitor: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::New),
        }
    }

    /// Set the global capability filter applied to discovered endpoints.
    pub fn with_filter(mut self, filter: Arc<dyn EndpointSelector>) -> Self {
        self.filter = filter;
        self
    }

    /// Set the recovery strategy invoked by the recovery daemon.
    pub fn with_recovery_strategy(mut self, strategy: Arc<dyn RecoveryStrategy>) -> Self {
        self.recovery_strategy = Some(strategy);
        self
    }

    /// Enable bootloader-mode discovery.
    pub fn with_bootloader_lister(mut self, lister: Arc<dyn BootloaderLister>) -> Self {
        self.bootloader_lister = Some(lister);
        self
    }

    /// Enable network-attached endpoint support.
    pub fn with_bridge(mut self, bridge: Arc<dyn ConnectivityBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn registry(&self) -> &FleetRegistry {
        &self.registry
    }

    /// Initialize the fleet: synthesize placeholder endpoints and start
    /// the background daemons. Must be called exactly once.
    pub async fn init(&self, notices: mpsc::Receiver<ConnectivityNotice>) -> FleetResult<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if !matches!(*lifecycle, Lifecycle::New) {
                return Err(FleetError::AlreadyInitialized);
            }
            *lifecycle = Lifecycle::Running(Running {
                shutdown_tx,
                tasks: Vec::new(),
            });
        }

        self.add_placeholders();

        let mut tasks = Vec::new();

        let checker = Arc::new(ResponsivenessChecker::new(
            self.registry.clone(),
            Arc::clone(&self.filter),
            self.config.availability_check_timeout(),
        ));
        let connectivity = ConnectivityDaemon::new(self.registry.clone(), checker);
        tasks.push(tokio::spawn(
            connectivity.run(notices, shutdown_rx.clone()),
        ));

        if let Some(lister) = &self.bootloader_lister {
            let monitor = Arc::new(BootloaderMonitor::new(
                self.registry.clone(),
                Arc::clone(lister),
                Arc::clone(&self.filter),
                self.config.bootloader_poll_interval(),
            ));
            // Pick up units already sitting in bootloader mode.
            monitor.register_current().await;
            *self.bootloader_monitor.lock().unwrap() = Some(Arc::clone(&monitor));
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { monitor.run(rx).await }));
        } else {
            debug!("bootloader discovery not configured");
        }

        if let Some(strategy) = &self.recovery_strategy {
            let daemon = RecoveryDaemon::new(
                self.registry.clone(),
                Arc::clone(strategy),
                self.config.recovery_interval(),
            );
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { daemon.run(rx).await }));
        }

        if let Lifecycle::Running(running) = &mut *self.lifecycle.lock().unwrap() {
            running.tasks.extend(tasks);
        }
        info!("fleet manager initialized");
        Ok(())
    }

    /// Synthesize null slots and emulator slots, force-available.
    fn add_placeholders(&self) {
        for index in 0..self.config.max_null_endpoints {
            self.add_available(EndpointDescriptor::null_slot(index));
        }
        let mut port = FIRST_EMULATOR_PORT;
        for _ in 0..self.config.max_emulators {
            self.add_available(EndpointDescriptor::emulator_slot(port));
            port += 2;
        }
    }

    fn add_available(&self, descriptor: EndpointDescriptor) {
        let serial = descriptor.serial.clone();
        self.registry
            .find_or_create(descriptor, Arc::new(StubTransport::new(&serial)));
        self.registry
            .apply_event(&serial, AllocationEvent::ForceAvailable);
    }

    fn ensure_initialized(&self) -> FleetResult<()> {
        match *self.lifecycle.lock().unwrap() {
            Lifecycle::New => Err(FleetError::NotInitialized),
            _ => Ok(()),
        }
    }

    // ── Allocation ─────────────────────────────────────────────────

    /// Allocate any available endpoint.
    pub fn allocate_any(&self) -> FleetResult<Option<EndpointRecord>> {
        self.allocate(&AnyEndpoint)
    }

    /// Allocate the first available endpoint matching the selector.
    /// Never blocks.
    pub fn allocate(&self, selector: &dyn EndpointSelector) -> FleetResult<Option<EndpointRecord>> {
        self.ensure_initialized()?;
        Ok(self.registry.allocate(selector))
    }

    /// Force-allocate a specific serial.
    pub fn force_allocate(&self, serial: &str) -> FleetResult<Option<EndpointRecord>> {
        self.ensure_initialized()?;
        Ok(self.registry.force_allocate(serial))
    }

    /// Return an endpoint with a coarse outcome.
    ///
    /// An emulator this system launched is torn down first: a clean
    /// kill frees it available with its stub handle restored, a failed
    /// kill frees it unavailable.
    pub async fn free(&self, serial: &str, outcome: FreeOutcome) -> FleetResult<()> {
        self.ensure_initialized()?;
        let record = self
            .registry
            .find(serial)
            .ok_or_else(|| FleetError::UnknownEndpoint(serial.to_string()))?;

        let mut outcome = outcome;
        if record.descriptor.kind == EndpointKind::Emulator
            && self.registry.has_emulator_process(serial)
        {
            outcome = match self.kill_emulator(serial).await {
                Ok(()) => FreeOutcome::Available,
                Err(e) => {
                    error!(%serial, error = %e, "failed to kill emulator while freeing");
                    FreeOutcome::Unavailable
                }
            };
        }

        self.registry.free(serial, outcome);
        Ok(())
    }

    // ── Emulator lifecycle ─────────────────────────────────────────

    /// Launch an emulator process for an allocated emulator slot and
    /// wait for its endpoint to come online.
    pub async fn launch_emulator(
        &self,
        serial: &str,
        args: &[String],
        boot_timeout: Duration,
    ) -> FleetResult<()> {
        self.ensure_initialized()?;
        let record = self
            .registry
            .find(serial)
            .ok_or_else(|| FleetError::UnknownEndpoint(serial.to_string()))?;
        if record.descriptor.kind != EndpointKind::Emulator {
            return Err(FleetError::Precondition(format!(
                "endpoint {serial} is not an emulator"
            )));
        }
        if record.descriptor.connectivity != ConnectivityState::NotAvailable {
            return Err(FleetError::Precondition(format!(
                "emulator {serial} is in state {:?}, expected not_available",
                record.descriptor.connectivity
            )));
        }

        let child = emulator::launch(args).await?;
        self.registry.set_emulator_process(serial, child);
        self.wait_until_online(serial, boot_timeout).await
    }

    /// Poll until the endpoint's connectivity reaches `Online`, bounded
    /// by `timeout`. The connectivity daemon flips the flag once the
    /// transport layer reports the endpoint up.
    async fn wait_until_online(&self, serial: &str, timeout: Duration) -> FleetResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(record) = self.registry.find(serial)
                && record.descriptor.connectivity == ConnectivityState::Online
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FleetError::Launch(format!(
                    "emulator {serial} did not come online within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Tear down a launched emulator: kill the process, confirm the
    /// endpoint went away, restore the slot's stub handle.
    pub async fn kill_emulator(&self, serial: &str) -> FleetResult<()> {
        self.ensure_initialized()?;
        let child = self
            .registry
            .take_emulator_process(serial)
            .ok_or_else(|| {
                FleetError::Precondition(format!("no launched process for emulator {serial}"))
            })?;

        emulator::kill(child).await?;

        if let Some(record) = self.registry.find(serial) {
            record
                .transport
                .wait_for_gone(EMULATOR_GONE_TIMEOUT)
                .await?;
        }
        // The slot goes back to being a placeholder.
        self.registry.find_or_create(
            EndpointDescriptor::new(serial, EndpointKind::Emulator, ConnectivityState::NotAvailable),
            Arc::new(StubTransport::new(serial)),
        );
        Ok(())
    }

    // ── Network-attached endpoints ─────────────────────────────────

    /// Connect a network-attached endpoint and allocate it.
    ///
    /// Returns `None` if the serial is already allocated, or if the
    /// endpoint could not be brought online (in which case it is freed
    /// with `Ignore`).
    pub async fn connect_tcp_endpoint(
        &self,
        address: &str,
    ) -> FleetResult<Option<EndpointRecord>> {
        self.ensure_initialized()?;
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| FleetError::Precondition("no connectivity bridge configured".into()))?;

        if self.registry.force_allocate(address).is_none() {
            return Ok(None);
        }

        for attempt in 1..=TCP_CONNECT_ATTEMPTS {
            match bridge.connect(address).await {
                Ok(transport) => {
                    let descriptor = EndpointDescriptor::new(
                        address,
                        EndpointKind::NetworkAttached,
                        ConnectivityState::Online,
                    );
                    let record = self.registry.find_or_create(descriptor, transport);
                    match record
                        .transport
                        .wait_for_available(self.config.availability_check_timeout())
                        .await
                    {
                        Ok(()) => {
                            info!(%address, "network-attached endpoint connected");
                            return Ok(Some(record));
                        }
                        Err(e) => {
                            warn!(%address, error = %e, "endpoint did not come online");
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        %address,
                        attempt,
                        total = TCP_CONNECT_ATTEMPTS,
                        error = %e,
                        "failed to connect to endpoint"
                    );
                    if attempt < TCP_CONNECT_ATTEMPTS {
                        tokio::time::sleep(self.config.tcp_connect_retry_delay()).await;
                    }
                }
            }
        }

        self.registry.free(address, FreeOutcome::Ignore);
        Ok(None)
    }

    /// Disconnect and free a network-attached endpoint.
    pub async fn disconnect_tcp_endpoint(&self, address: &str) -> FleetResult<()> {
        self.ensure_initialized()?;
        let bridge = self
            .bridge
            .as_ref()
            .ok_or_else(|| FleetError::Precondition("no connectivity bridge configured".into()))?;

        info!(%address, "disconnecting network-attached endpoint");
        if let Err(e) = bridge.disconnect(address).await {
            warn!(%address, error = %e, "failed to disconnect endpoint");
        }
        self.registry.free(address, FreeOutcome::Ignore);
        Ok(())
    }

    // ── Listing ────────────────────────────────────────────────────

    /// Read-only snapshot of the fleet with best-effort attributes.
    ///
    /// The registry lock is held only for the snapshot; attribute
    /// fetches run against the copied handles with a short timeout,
    /// each independently unknown on failure.
    pub async fn describe_fleet(&self) -> FleetResult<Vec<EndpointListing>> {
        self.ensure_initialized()?;
        let timeout = self.config.attribute_fetch_timeout();
        let mut rows = Vec::new();
        for record in self.registry.snapshot() {
            let [product, variant, build_id, battery] = {
                let mut values = [None, None, None, None];
                for (slot, name) in values.iter_mut().zip(LISTING_ATTRIBUTES) {
                    *slot = fetch_attribute(record.transport.as_ref(), name, timeout).await;
                }
                values
            };
            rows.push(EndpointListing {
                serial: record.descriptor.serial.clone(),
                kind: record.descriptor.kind,
                connectivity: record.descriptor.connectivity,
                state: record.state,
                is_placeholder: record.descriptor.is_placeholder(),
                product,
                variant,
                build_id,
                battery,
            });
        }
        sort_listing(&mut rows);
        Ok(rows)
    }

    // ── Bootloader listeners ───────────────────────────────────────

    /// Register a bootloader listener; polling only happens while at
    /// least one is registered.
    pub fn add_bootloader_listener(
        &self,
        listener: Arc<dyn BootloaderListener>,
    ) -> FleetResult<()> {
        self.ensure_initialized()?;
        match &*self.bootloader_monitor.lock().unwrap() {
            Some(monitor) => {
                monitor.add_listener(listener);
                Ok(())
            }
            None => Err(FleetError::Precondition(
                "bootloader discovery is not configured".into(),
            )),
        }
    }

    pub fn remove_bootloader_listener(
        &self,
        listener: &Arc<dyn BootloaderListener>,
    ) -> FleetResult<()> {
        self.ensure_initialized()?;
        if let Some(monitor) = &*self.bootloader_monitor.lock().unwrap() {
            monitor.remove_listener(listener);
        }
        Ok(())
    }

    // ── Shutdown ───────────────────────────────────────────────────

    /// Stop all daemons. Idempotent; the stop interrupts pending
    /// sleeps, so shutdown latency is bounded.
    pub async fn terminate(&self) -> FleetResult<()> {
        let running = {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Terminated) {
                Lifecycle::Running(running) => Some(running),
                Lifecycle::Terminated => None,
                Lifecycle::New => {
                    *lifecycle = Lifecycle::New;
                    return Err(FleetError::NotInitialized);
                }
            }
        };

        if let Some(running) = running {
            let _ = running.shutdown_tx.send(true);
            for task in running.tasks {
                let _ = task.await;
            }
            info!("fleet manager terminated");
        }
        Ok(())
    }
}

/// Fetch one attribute with a bounded wait; unknown on any failure.
async fn fetch_attribute(
    transport: &dyn EndpointTransport,
    name: &str,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, transport.get_property(name)).await {
        Ok(Ok(value)) => value,
        _ => None,
    }
}
