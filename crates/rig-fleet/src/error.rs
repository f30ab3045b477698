//! Fleet manager error types.

use thiserror::Error;

use rig_core::TransportError;

pub type FleetResult<T> = Result<T, FleetError>;

/// Errors raised by the fleet manager.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("fleet manager is already initialized")]
    AlreadyInitialized,

    #[error("fleet manager has not been initialized")]
    NotInitialized,

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("endpoint not found: {0}")]
    UnknownEndpoint(String),

    #[error("failed to launch emulator: {0}")]
    Launch(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
