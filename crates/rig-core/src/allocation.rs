//! The allocation state machine.
//!
//! Every endpoint record is in exactly one [`AllocationState`] at a
//! time, and the only legal way to change it is to feed an
//! [`AllocationEvent`] through [`transition`]. Centralizing the table
//! keeps every caller's side effect a reaction to `changed` instead of
//! a re-derivation from scattered booleans.

use serde::{Deserialize, Serialize};

use crate::endpoint::ConnectivityState;

/// Allocation state of one endpoint record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Available,
    Allocated,
    CheckingAvailability,
    Unavailable,
}

/// The tagged signals accepted by [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationEvent {
    ForceAvailable,
    ForceAllocateRequest,
    AvailableCheckPassed,
    AvailableCheckFailed,
    AvailableCheckIgnored,
    ConnectedOnline,
    StateChangeOnline,
    Disconnected,
    FreeAvailable,
    FreeUnavailable,
    FreeUnresponsive,
    FreeUnknown,
}

/// Outcome of applying an event to a record.
///
/// `changed == false` covers both unmatched (state, event) pairs and
/// the `FreeUnknown` case, which deliberately reports through the same
/// structure as a real transition. Callers must tolerate "freed but
/// state unchanged" as a valid, non-error outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventResponse {
    pub state: AllocationState,
    pub changed: bool,
}

/// Apply one event to one state. Pure; unmatched pairs are no-ops.
pub fn transition(state: AllocationState, event: AllocationEvent) -> EventResponse {
    use AllocationEvent::*;
    use AllocationState::*;

    let new_state = match (state, event) {
        (_, Disconnected) => Unavailable,
        (Unavailable, ForceAvailable) => Available,
        (Unavailable, ConnectedOnline | StateChangeOnline) => CheckingAvailability,
        (Available, ForceAllocateRequest) => Allocated,
        (CheckingAvailability, AvailableCheckPassed) => Available,
        (CheckingAvailability, AvailableCheckFailed | AvailableCheckIgnored) => Unavailable,
        (Allocated, FreeAvailable) => Available,
        (Allocated, FreeUnavailable | FreeUnresponsive) => Unavailable,
        (current, _) => current,
    };

    EventResponse {
        state: new_state,
        changed: new_state != state,
    }
}

/// Coarse outcome a caller hands back when freeing an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    /// The endpoint is fine and can be handed out again.
    Available,
    /// The endpoint is known broken.
    Unavailable,
    /// The endpoint stopped answering mid-use.
    Unresponsive,
    /// The caller has no opinion; leave the record as-is.
    Ignore,
}

impl FreeOutcome {
    /// Map a free outcome to its allocation event.
    ///
    /// An `Unavailable` outcome for an endpoint whose connectivity is
    /// already `NotAvailable` maps to `FreeUnknown`: the disconnect
    /// path has handled the record, and a second demotion would
    /// misreport a transition that never happened.
    pub fn into_event(self, connectivity: ConnectivityState) -> AllocationEvent {
        match self {
            FreeOutcome::Available => AllocationEvent::FreeAvailable,
            FreeOutcome::Unresponsive => AllocationEvent::FreeUnresponsive,
            FreeOutcome::Unavailable => {
                if connectivity == ConnectivityState::NotAvailable {
                    AllocationEvent::FreeUnknown
                } else {
                    AllocationEvent::FreeUnavailable
                }
            }
            FreeOutcome::Ignore => AllocationEvent::FreeUnknown,
        }
    }
}
