//! The transport boundary — how the control plane talks to endpoints.
//!
//! The wire protocol itself is an external collaborator; the control
//! plane depends only on pass/fail and bounded-timeout semantics of
//! these calls, never on payload formats. Responsiveness checks,
//! recovery waits, and test units all go through [`EndpointTransport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by transport calls.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint cannot be reached at all. Distinguished because the
    /// work-pool scheduler drives its recovery-or-propagate protocol
    /// off this variant.
    #[error("endpoint {0} is unreachable")]
    Unreachable(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Opaque handle used to talk to one endpoint.
///
/// Handles may be swapped on reconnect; identity lives in the serial,
/// not the handle.
#[async_trait]
pub trait EndpointTransport: Send + Sync {
    /// Serial of the endpoint this handle talks to.
    fn serial(&self) -> &str;

    /// Run a shell command, bounded by `timeout`.
    async fn execute_shell(&self, command: &str, timeout: Duration) -> TransportResult<String>;

    /// Read a property value; `None` if the endpoint does not have it.
    async fn get_property(&self, name: &str) -> TransportResult<Option<String>>;

    /// Reboot the endpoint.
    async fn reboot(&self) -> TransportResult<()>;

    /// Bounded round-trip probe. `true` means the endpoint answered
    /// within the timeout.
    async fn wait_for_responsive(&self, timeout: Duration) -> bool;

    /// Wait until the endpoint is fully usable, up to `timeout`.
    async fn wait_for_available(&self, timeout: Duration) -> TransportResult<()>;

    /// Wait until the endpoint disappears, up to `timeout`. Used after
    /// tearing an emulator down.
    async fn wait_for_gone(&self, timeout: Duration) -> TransportResult<()>;
}

/// Bridge for endpoints reached over the network: establishes or drops
/// the connection that makes a serial addressable.
#[async_trait]
pub trait ConnectivityBridge: Send + Sync {
    /// Connect to `address` and return a transport handle for it.
    async fn connect(&self, address: &str) -> TransportResult<Arc<dyn EndpointTransport>>;

    /// Drop the connection to `address`.
    async fn disconnect(&self, address: &str) -> TransportResult<()>;
}

/// Handle for synthesized endpoints (null slots, unlaunched emulator
/// slots, bootloader-mode units). Answers nothing; every probe fails
/// fast.
#[derive(Debug, Clone)]
pub struct StubTransport {
    serial: String,
}

impl StubTransport {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
        }
    }

    fn unreachable<T>(&self) -> TransportResult<T> {
        Err(TransportError::Unreachable(self.serial.clone()))
    }
}

#[async_trait]
impl EndpointTransport for StubTransport {
    fn serial(&self) -> &str {
        &self.serial
    }

    async fn execute_shell(&self, _command: &str, _timeout: Duration) -> TransportResult<String> {
        self.unreachable()
    }

    async fn get_property(&self, _name: &str) -> TransportResult<Option<String>> {
        Ok(None)
    }

    async fn reboot(&self) -> TransportResult<()> {
        self.unreachable()
    }

    async fn wait_for_responsive(&self, _timeout: Duration) -> bool {
        false
    }

    async fn wait_for_available(&self, _timeout: Duration) -> TransportResult<()> {
        self.unreachable()
    }

    async fn wait_for_gone(&self, _timeout: Duration) -> TransportResult<()> {
        Ok(())
    }
}
