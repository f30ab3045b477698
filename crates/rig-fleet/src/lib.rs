//! rig-fleet — the fleet manager facade.
//!
//! Wires the registry and the background daemons together behind one
//! process-lifetime object:
//!
//! - explicit one-shot initialization (double-init fails loudly)
//! - placeholder synthesis (null slots, emulator slots)
//! - foreground allocate / free / force-allocate
//! - emulator process lifecycle
//! - network-attached endpoint connect / disconnect
//! - best-effort fleet description
//!
//! Configuration, the global capability filter, the recovery strategy,
//! and the transport collaborators are all injected at construction;
//! there is no process-wide singleton.

pub mod emulator;
pub mod error;
pub mod manager;

pub use error::{FleetError, FleetResult};
pub use manager::FleetManager;
