//! Responsiveness check for freshly-online endpoints.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use rig_core::{AllocationEvent, AllocationState, EndpointSelector};
use rig_registry::{EndpointRecord, FleetRegistry};

/// One-shot-per-new-endpoint responsiveness check.
///
/// Runs a bounded round-trip probe against an endpoint that just
/// entered `CheckingAvailability` and feeds the verdict back into the
/// registry. Endpoints rejected by the global capability filter are
/// marked ignored without probing.
pub struct ResponsivenessChecker {
    registry: FleetRegistry,
    filter: Arc<dyn EndpointSelector>,
    timeout: Duration,
}

impl ResponsivenessChecker {
    pub fn new(
        registry: FleetRegistry,
        filter: Arc<dyn EndpointSelector>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            filter,
            timeout,
        }
    }

    /// Probe one endpoint and apply the resulting allocation event.
    pub async fn check(&self, record: EndpointRecord) {
        let serial = record.serial().to_string();

        if !self.filter.matches(&record.descriptor) {
            debug!(%serial, "endpoint does not match global filter, ignoring");
            self.registry
                .apply_event(&serial, AllocationEvent::AvailableCheckIgnored);
            return;
        }

        debug!(%serial, "checking new endpoint responsiveness");
        if record.transport.wait_for_responsive(self.timeout).await {
            let response = self
                .registry
                .apply_event(&serial, AllocationEvent::AvailableCheckPassed);
            if response.is_some_and(|r| r.changed && r.state == AllocationState::Available) {
                info!(%serial, "detected new endpoint");
            } else {
                debug!(%serial, "endpoint failed or ignored responsiveness check");
            }
        } else {
            let response = self
                .registry
                .apply_event(&serial, AllocationEvent::AvailableCheckFailed);
            if response.is_some_and(|r| r.changed && r.state == AllocationState::Unavailable) {
                warn!(%serial, "endpoint is unresponsive, will not be available for testing");
            }
        }
    }
}
