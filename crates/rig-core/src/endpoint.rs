//! Endpoint identity and capability snapshots.
//!
//! An endpoint is anything a test unit can run against: a physical
//! unit, an emulator slot, a bootloader-mode unit, a null (no-device)
//! slot, or a network-attached unit. Identity is the serial; the same
//! serial observed across reconnects refers to the same endpoint even
//! when its transport handle is swapped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::allocation::AllocationState;

/// Serial prefix for synthesized null (no-device) slots.
pub const NULL_SERIAL_PREFIX: &str = "null-endpoint";

/// Serial prefix for synthesized emulator slots.
pub const EMULATOR_SERIAL_PREFIX: &str = "emulator";

/// What flavor of fleet member an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Physical,
    Emulator,
    Bootloader,
    Null,
    NetworkAttached,
}

/// Connectivity as reported by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
    Bootloader,
    Unauthorized,
    NotAvailable,
}

/// Identity + capability snapshot of one fleet member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Stable identifier. Two descriptors with the same serial refer to
    /// the same endpoint across reconnects.
    pub serial: String,
    pub kind: EndpointKind,
    pub connectivity: ConnectivityState,
    /// Capability properties (product type, variant, ...) refreshed by
    /// discovery. Selectors match against these.
    pub properties: HashMap<String, String>,
}

impl EndpointDescriptor {
    /// Create a descriptor with no known properties.
    pub fn new(serial: impl Into<String>, kind: EndpointKind, connectivity: ConnectivityState) -> Self {
        Self {
            serial: serial.into(),
            kind,
            connectivity,
            properties: HashMap::new(),
        }
    }

    /// A synthesized null (no-device) slot descriptor.
    pub fn null_slot(index: u32) -> Self {
        Self::new(
            format!("{NULL_SERIAL_PREFIX}-{index}"),
            EndpointKind::Null,
            ConnectivityState::NotAvailable,
        )
    }

    /// A synthesized emulator slot descriptor for the given console port.
    pub fn emulator_slot(port: u16) -> Self {
        Self::new(
            format!("{EMULATOR_SERIAL_PREFIX}-{port}"),
            EndpointKind::Emulator,
            ConnectivityState::NotAvailable,
        )
    }

    /// Whether this endpoint was synthesized rather than observed.
    ///
    /// Placeholder rows are hidden from fleet listings unless allocated.
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.kind,
            EndpointKind::Emulator | EndpointKind::Bootloader | EndpointKind::Null
        )
    }
}

/// One row of the read-only fleet status listing.
///
/// Attributes are best-effort: each is independently `None` when the
/// endpoint could not answer, rendered as `"unknown"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointListing {
    pub serial: String,
    pub kind: EndpointKind,
    pub connectivity: ConnectivityState,
    pub state: AllocationState,
    pub is_placeholder: bool,
    pub product: Option<String>,
    pub variant: Option<String>,
    pub build_id: Option<String>,
    pub battery: Option<String>,
}

impl EndpointListing {
    /// Render an optional attribute for display.
    pub fn display(attribute: &Option<String>) -> &str {
        attribute.as_deref().unwrap_or("unknown")
    }
}

/// Sort listing rows by allocation state, then serial.
pub fn sort_listing(rows: &mut [EndpointListing]) {
    rows.sort_by(|a, b| {
        format!("{:?}", a.state)
            .cmp(&format!("{:?}", b.state))
            .then_with(|| a.serial.cmp(&b.serial))
    });
}
