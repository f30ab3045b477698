//! Selection predicates over endpoint descriptors.
//!
//! The registry is agnostic to selection criteria; callers supply a
//! predicate and the registry only enforces the Available/Allocated
//! boundary. [`CapabilitySelector`] covers the common cases (serial
//! allow/deny lists, kind, capability properties); deployments with
//! richer needs implement [`EndpointSelector`] directly.

use std::collections::HashMap;

use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::ConfigError;

/// Predicate deciding whether an endpoint satisfies a caller's needs.
pub trait EndpointSelector: Send + Sync {
    fn matches(&self, descriptor: &EndpointDescriptor) -> bool;
}

/// Matches any endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyEndpoint;

impl EndpointSelector for AnyEndpoint {
    fn matches(&self, _descriptor: &EndpointDescriptor) -> bool {
        true
    }
}

/// Capability matching over descriptor attributes.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySelector {
    serials: Vec<String>,
    exclude_serials: Vec<String>,
    kind: Option<EndpointKind>,
    properties: HashMap<String, String>,
}

impl CapabilitySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to an explicit serial.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serials.push(serial.into());
        self
    }

    /// Reject a specific serial.
    pub fn without_serial(mut self, serial: impl Into<String>) -> Self {
        self.exclude_serials.push(serial.into());
        self
    }

    /// Restrict to one endpoint kind.
    pub fn with_kind(mut self, kind: EndpointKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Require a capability property to have an exact value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Validate the selector.
    ///
    /// A serial listed in both the allow and deny lists is a caller
    /// bug and is rejected immediately rather than silently matching
    /// nothing.
    pub fn build(self) -> Result<Self, ConfigError> {
        for serial in &self.serials {
            if self.exclude_serials.contains(serial) {
                return Err(ConfigError::ConflictingSelection(format!(
                    "serial {serial} is both requested and excluded"
                )));
            }
        }
        Ok(self)
    }
}

impl EndpointSelector for CapabilitySelector {
    fn matches(&self, descriptor: &EndpointDescriptor) -> bool {
        if self.exclude_serials.contains(&descriptor.serial) {
            return false;
        }
        if !self.serials.is_empty() && !self.serials.contains(&descriptor.serial) {
            return false;
        }
        if let Some(kind) = self.kind
            && descriptor.kind != kind
        {
            return false;
        }
        self.properties
            .iter()
            .all(|(name, value)| descriptor.properties.get(name) == Some(value))
    }
}
