//! Pool worker — runs units from the shared pool against one endpoint.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use rig_core::EndpointTransport;

use crate::pool::WorkPool;
use crate::tracker::LivenessTracker;
use crate::unit::{ReportingSink, TestUnit, UnitError, UnitResult};

/// Default bound on how long a worker waits for its endpoint to come
/// back before giving up.
const DEFAULT_RECOVERY_WAIT: Duration = Duration::from_secs(5 * 60);

/// Distinguished diagnostic events emitted by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// A worker is terminating before the pool is drained.
    PollerEarlyTermination,
}

/// Sink for distinguished diagnostic events, separate from ordinary
/// logging so test campaigns can track early terminations.
pub trait EventLog: Send + Sync {
    fn log_event(&self, event: DiagnosticEvent, serial: &str, detail: &str);
}

/// Default event log: forwards to `tracing`.
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn log_event(&self, event: DiagnosticEvent, serial: &str, detail: &str) {
        debug!(?event, %serial, detail, "worker diagnostic event");
    }
}

/// One concurrent consumer of a shared [`WorkPool`], bound to one
/// endpoint.
///
/// Runs units until the pool is exhausted. An ordinary unit failure is
/// absorbed; losing the endpoint triggers the recovery-or-propagate
/// protocol: if peers are still draining the pool, wait (bounded) for
/// the endpoint to come back and continue, otherwise fail loudly so
/// the campaign does not hang retrying forever.
pub struct PoolWorker {
    pool: WorkPool,
    tracker: LivenessTracker,
    endpoint: Arc<dyn EndpointTransport>,
    recovery_wait: Duration,
    reboot_on_recovery: bool,
    event_log: Arc<dyn EventLog>,
    retired: bool,
}

impl PoolWorker {
    pub fn new(pool: WorkPool, tracker: LivenessTracker, endpoint: Arc<dyn EndpointTransport>) -> Self {
        Self {
            pool,
            tracker,
            endpoint,
            recovery_wait: DEFAULT_RECOVERY_WAIT,
            reboot_on_recovery: true,
            event_log: Arc::new(TracingEventLog),
            retired: false,
        }
    }

    /// Bound the wait for a lost endpoint to come back.
    pub fn with_recovery_wait(mut self, wait: Duration) -> Self {
        self.recovery_wait = wait;
        self
    }

    /// Whether a recovered endpoint is power-cycled before reuse.
    pub fn with_reboot_on_recovery(mut self, reboot: bool) -> Self {
        self.reboot_on_recovery = reboot;
        self
    }

    /// Replace the diagnostic event sink.
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    /// Drain the pool, forwarding each unit's callbacks to `sink`.
    ///
    /// Returns `Err` only through the unreachable-endpoint cascade. On
    /// every exit path the liveness tracker has been decremented
    /// exactly once for this worker.
    pub async fn run(&mut self, sink: &mut dyn ReportingSink) -> UnitResult<()> {
        let result = self.drain(sink).await;
        self.retire();
        result
    }

    async fn drain(&mut self, sink: &mut dyn ReportingSink) -> UnitResult<()> {
        while let Some(mut unit) = self.pool.poll() {
            debug!(unit = %unit.name(), serial = %self.endpoint.serial(), "running unit");
            match unit.run(sink).await {
                Ok(()) => {}
                Err(error @ UnitError::Unreachable { .. }) => {
                    self.handle_unreachable(error, unit.as_ref(), sink).await?;
                }
                Err(error) => {
                    // Ordinary failure: surfaced by the unit's own
                    // callbacks; declare its uncovered work and move on.
                    warn!(unit = %unit.name(), error = %error, "unit failed, continuing");
                    unit.report_not_executed(sink);
                }
            }
        }
        Ok(())
    }

    /// Endpoint lost mid-unit: take this worker out of the round, then
    /// recover or propagate depending on whether peers remain.
    async fn handle_unreachable(
        &mut self,
        original: UnitError,
        failed_unit: &dyn TestUnit,
        sink: &mut dyn ReportingSink,
    ) -> UnitResult<()> {
        let serial = self.endpoint.serial().to_string();
        let peers_remaining = self.retire();

        if peers_remaining == 0 {
            // Last worker standing: nothing is left to make progress,
            // so propagate instead of hanging in recovery.
            failed_unit.report_not_executed(sink);
            while let Some(unit) = self.pool.poll() {
                unit.report_not_executed(sink);
            }
            error!(
                unit = %failed_unit.name(),
                %serial,
                "endpoint lost and no peers remain, worker terminating"
            );
            self.event_log.log_event(
                DiagnosticEvent::PollerEarlyTermination,
                &serial,
                &original.to_string(),
            );
            return Err(original);
        }

        debug!(%serial, wait_secs = self.recovery_wait.as_secs(), "waiting for endpoint to come back");
        match self.endpoint.wait_for_available(self.recovery_wait).await {
            Ok(()) => {
                if self.reboot_on_recovery
                    && let Err(e) = self.endpoint.reboot().await
                {
                    warn!(%serial, error = %e, "reboot after recovery failed");
                    self.event_log.log_event(
                        DiagnosticEvent::PollerEarlyTermination,
                        &serial,
                        &original.to_string(),
                    );
                    return Err(original);
                }
                debug!(%serial, "endpoint recovered, resuming polling");
                Ok(())
            }
            Err(e) => {
                warn!(%serial, error = %e, "endpoint did not come back, worker terminating");
                self.event_log.log_event(
                    DiagnosticEvent::PollerEarlyTermination,
                    &serial,
                    &original.to_string(),
                );
                Err(original)
            }
        }
    }

    /// Take this worker out of the round, at most once per lifetime.
    /// Returns the number of peers still in it.
    fn retire(&mut self) -> usize {
        if self.retired {
            return self.tracker.remaining();
        }
        self.retired = true;
        self.tracker.decrement()
    }
}
