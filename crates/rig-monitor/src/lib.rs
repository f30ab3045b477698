//! rig-monitor — background daemons feeding the fleet registry.
//!
//! Three long-lived loops keep the registry honest without blocking
//! foreground allocation:
//!
//! - [`ConnectivityDaemon`] drains transport-layer connectivity notices
//!   and turns them into allocation events; freshly-online endpoints
//!   get an asynchronous responsiveness check.
//! - [`BootloaderMonitor`] periodically lists bootloader-reachable
//!   serials, registering unknown ones, while any listeners are
//!   interested.
//! - [`RecoveryDaemon`] invokes a pluggable [`RecoveryStrategy`]
//!   against the fleet snapshot at a steady cadence.
//!
//! Every daemon stops through a `watch` channel: the stop both flags
//! the loop and interrupts a pending sleep, so shutdown latency is
//! bounded by the in-flight operation, not the poll period.

pub mod bootloader;
pub mod connectivity;
pub mod recovery;
pub mod responsiveness;

pub use bootloader::{BootloaderLister, BootloaderListener, BootloaderMonitor};
pub use connectivity::{ConnectivityDaemon, ConnectivityNotice};
pub use recovery::{RebootUnavailable, RecoveryDaemon, RecoveryStrategy};
pub use responsiveness::ResponsivenessChecker;
