//! Endpoint record set and allocation operations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use rig_core::{
    transition, AllocationEvent, AllocationState, ConnectivityState, EndpointDescriptor,
    EndpointKind, EndpointSelector, EndpointTransport, EventResponse, FreeOutcome, StubTransport,
};

/// Observer of allocation-state changes.
///
/// Notified outside the registry lock, from a defensive copy of the
/// observer list, so an observer may call back into the registry.
pub trait FleetObserver: Send + Sync {
    fn state_changed(&self, serial: &str, previous: AllocationState, current: AllocationState);
}

/// Consistent snapshot of one endpoint record.
#[derive(Clone)]
pub struct EndpointRecord {
    pub descriptor: EndpointDescriptor,
    pub state: AllocationState,
    pub transport: Arc<dyn EndpointTransport>,
}

impl EndpointRecord {
    pub fn serial(&self) -> &str {
        &self.descriptor.serial
    }
}

/// Per-endpoint slot owned exclusively by the registry.
struct EndpointSlot {
    descriptor: EndpointDescriptor,
    state: AllocationState,
    transport: Arc<dyn EndpointTransport>,
    /// Background log-capture task, aborted when the endpoint is freed.
    log_capture: Option<JoinHandle<()>>,
    /// Process handle if this is an emulator the system itself launched.
    emulator_process: Option<Child>,
}

impl EndpointSlot {
    fn record(&self) -> EndpointRecord {
        EndpointRecord {
            descriptor: self.descriptor.clone(),
            state: self.state,
            transport: Arc::clone(&self.transport),
        }
    }
}

/// Tracks every known endpoint and its allocation state.
///
/// Records are created when an endpoint is first observed or
/// synthesized and never removed; unplugged endpoints transition to
/// `Unavailable` so allocation accounting stays stable across
/// reconnects.
#[derive(Clone)]
pub struct FleetRegistry {
    records: Arc<Mutex<BTreeMap<String, EndpointSlot>>>,
    observers: Arc<Mutex<Vec<Arc<dyn FleetObserver>>>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register an observer for allocation-state changes.
    pub fn add_observer(&self, observer: Arc<dyn FleetObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Idempotent upsert by serial.
    ///
    /// An existing record gets its descriptor refreshed and its
    /// transport handle swapped (reconnect semantics); a new record
    /// starts `Unavailable`.
    pub fn find_or_create(
        &self,
        descriptor: EndpointDescriptor,
        transport: Arc<dyn EndpointTransport>,
    ) -> EndpointRecord {
        let mut records = self.records.lock().unwrap();
        let slot = records
            .entry(descriptor.serial.clone())
            .and_modify(|slot| {
                debug!(serial = %descriptor.serial, "refreshing endpoint record");
                slot.descriptor = descriptor.clone();
                slot.transport = Arc::clone(&transport);
            })
            .or_insert_with(|| {
                debug!(serial = %descriptor.serial, kind = ?descriptor.kind, "new endpoint record");
                EndpointSlot {
                    descriptor,
                    state: AllocationState::Unavailable,
                    transport,
                    log_capture: None,
                    emulator_process: None,
                }
            });
        slot.record()
    }

    /// Look up a record by serial.
    pub fn find(&self, serial: &str) -> Option<EndpointRecord> {
        self.records.lock().unwrap().get(serial).map(|s| s.record())
    }

    /// Consistent snapshot of every record.
    pub fn snapshot(&self) -> Vec<EndpointRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .map(|s| s.record())
            .collect()
    }

    /// Apply an allocation event to a record.
    ///
    /// Returns `None` if the serial is unknown. Transitions for one
    /// record are strictly ordered through the registry lock.
    pub fn apply_event(&self, serial: &str, event: AllocationEvent) -> Option<EventResponse> {
        let (response, notification) = {
            let mut records = self.records.lock().unwrap();
            let slot = records.get_mut(serial)?;
            let previous = slot.state;
            let response = transition(previous, event);
            slot.state = response.state;
            let notification = response
                .changed
                .then(|| (serial.to_string(), previous, response.state));
            (response, notification)
        };
        self.notify(notification);
        Some(response)
    }

    /// Allocate the first `Available` record matching the selector.
    ///
    /// Atomic with respect to every other mutation: no two callers can
    /// receive the same record. Never blocks; returns `None`
    /// immediately when nothing matches.
    pub fn allocate(&self, selector: &dyn EndpointSelector) -> Option<EndpointRecord> {
        let (record, notification) = {
            let mut records = self.records.lock().unwrap();
            let slot = records.values_mut().find(|slot| {
                slot.state == AllocationState::Available && selector.matches(&slot.descriptor)
            })?;
            let previous = slot.state;
            let response = transition(previous, AllocationEvent::ForceAllocateRequest);
            debug_assert!(response.changed);
            slot.state = response.state;
            (
                slot.record(),
                Some((slot.descriptor.serial.clone(), previous, response.state)),
            )
        };
        debug!(serial = %record.serial(), "endpoint allocated");
        self.notify(notification);
        Some(record)
    }

    /// Force-allocate a specific serial, creating a stub record if the
    /// serial has never been observed.
    ///
    /// A freshly created record starts `Unavailable`; it is lifted to
    /// `Available` first so the allocation request can take it. Returns
    /// `None` if the record is already `Allocated`.
    pub fn force_allocate(&self, serial: &str) -> Option<EndpointRecord> {
        let (record, notifications) = {
            let mut records = self.records.lock().unwrap();
            let slot = records
                .entry(serial.to_string())
                .or_insert_with(|| stub_slot(serial));

            let mut notifications = Vec::new();
            if slot.state == AllocationState::Unavailable {
                let response = transition(slot.state, AllocationEvent::ForceAvailable);
                notifications.push((serial.to_string(), slot.state, response.state));
                slot.state = response.state;
            }
            let previous = slot.state;
            let response = transition(previous, AllocationEvent::ForceAllocateRequest);
            if !response.changed {
                return None;
            }
            slot.state = response.state;
            notifications.push((serial.to_string(), previous, response.state));
            (slot.record(), notifications)
        };
        info!(serial, "endpoint force-allocated");
        for notification in notifications {
            self.notify(Some(notification));
        }
        Some(record)
    }

    /// Free an allocated endpoint with a coarse outcome.
    ///
    /// Any attached log capture is stopped unconditionally. A free that
    /// does not change state (the `FreeUnknown` ambiguity) is reported
    /// back like any other response; callers must tolerate it.
    pub fn free(&self, serial: &str, outcome: FreeOutcome) -> Option<EventResponse> {
        if let Some(handle) = self.take_log_capture(serial) {
            handle.abort();
        }
        let connectivity = {
            let records = self.records.lock().unwrap();
            records.get(serial)?.descriptor.connectivity
        };
        let response = self.apply_event(serial, outcome.into_event(connectivity))?;
        if !response.changed {
            error!(
                serial,
                state = ?response.state,
                "endpoint was in unexpected state when freed"
            );
        }
        Some(response)
    }

    /// Update a record's connectivity without an allocation event.
    pub fn update_connectivity(&self, serial: &str, connectivity: ConnectivityState) -> bool {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(serial) {
            Some(slot) => {
                slot.descriptor.connectivity = connectivity;
                true
            }
            None => false,
        }
    }

    /// Attach a background log-capture task to a record, replacing (and
    /// aborting) any previous one.
    pub fn attach_log_capture(&self, serial: &str, handle: JoinHandle<()>) {
        let previous = {
            let mut records = self.records.lock().unwrap();
            match records.get_mut(serial) {
                Some(slot) => slot.log_capture.replace(handle),
                None => {
                    handle.abort();
                    None
                }
            }
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn take_log_capture(&self, serial: &str) -> Option<JoinHandle<()>> {
        let mut records = self.records.lock().unwrap();
        records.get_mut(serial)?.log_capture.take()
    }

    /// Store the process handle of a launched emulator.
    pub fn set_emulator_process(&self, serial: &str, child: Child) {
        let mut records = self.records.lock().unwrap();
        if let Some(slot) = records.get_mut(serial) {
            slot.emulator_process = Some(child);
        }
    }

    /// Take the process handle of a launched emulator, if any.
    pub fn take_emulator_process(&self, serial: &str) -> Option<Child> {
        let mut records = self.records.lock().unwrap();
        records.get_mut(serial)?.emulator_process.take()
    }

    /// Whether a record carries a live launched-emulator handle.
    pub fn has_emulator_process(&self, serial: &str) -> bool {
        let records = self.records.lock().unwrap();
        records
            .get(serial)
            .is_some_and(|slot| slot.emulator_process.is_some())
    }

    /// Notify observers of a state change, outside the registry lock.
    fn notify(&self, notification: Option<(String, AllocationState, AllocationState)>) {
        let Some((serial, previous, current)) = notification else {
            return;
        };
        let observers: Vec<_> = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer.state_changed(&serial, previous, current);
        }
    }
}

impl Default for FleetRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the slot for a serial that was never observed by discovery.
fn stub_slot(serial: &str) -> EndpointSlot {
    let kind = if serial.contains(':') {
        EndpointKind::NetworkAttached
    } else {
        EndpointKind::Physical
    };
    EndpointSlot {
        descriptor: EndpointDescriptor::new(serial, kind, ConnectivityState::NotAvailable),
        state: AllocationState::Unavailable,
        transport: Arc::new(StubTransport::new(serial)),
        log_capture: None,
        emulator_process: None,
    }
}
