//! rig-core — core types for the riglab control plane.
//!
//! Provides the leaf vocabulary shared by every riglab crate:
//!
//! - Endpoint identity and capability snapshots ([`EndpointDescriptor`])
//! - The pure allocation state machine ([`transition`])
//! - Selection predicates over descriptors ([`EndpointSelector`])
//! - The transport boundary to talk to an endpoint ([`EndpointTransport`])
//! - Fleet-wide configuration ([`FleetConfig`])
//!
//! Nothing in this crate owns shared state or spawns tasks; the
//! registry and daemons build on top of these types.

pub mod allocation;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod selector;
pub mod transport;

pub use allocation::{transition, AllocationEvent, AllocationState, EventResponse, FreeOutcome};
pub use config::FleetConfig;
pub use endpoint::{
    sort_listing, ConnectivityState, EndpointDescriptor, EndpointKind, EndpointListing,
    EMULATOR_SERIAL_PREFIX, NULL_SERIAL_PREFIX,
};
pub use error::ConfigError;
pub use selector::{AnyEndpoint, CapabilitySelector, EndpointSelector};
pub use transport::{
    ConnectivityBridge, EndpointTransport, StubTransport, TransportError, TransportResult,
};
