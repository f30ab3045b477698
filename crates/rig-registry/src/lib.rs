//! rig-registry — the fleet registry.
//!
//! Owns every known endpoint record and serializes allocation-state
//! mutation behind a single mutual-exclusion domain. Discovery
//! daemons, the recovery daemon, and foreground allocation calls all
//! race on the same records; funneling every read-modify-write through
//! one lock is what prevents lost updates.
//!
//! # Architecture
//!
//! ```text
//! FleetRegistry
//!   ├── Mutex<BTreeMap<serial, slot>>   (the single mutation domain)
//!   │   └── slot: descriptor + allocation state + bookkeeping
//!   ├── FleetObserver list              (copy-on-notify dispatch)
//!   └── snapshot reads (EndpointRecord clones, no lock held after)
//! ```

pub mod registry;

pub use registry::{EndpointRecord, FleetObserver, FleetRegistry};
