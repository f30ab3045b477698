//! Emulator process lifecycle.
//!
//! Launch and teardown of emulator processes the system itself
//! spawned. Forced termination goes through the standard process
//! handle; graceful teardown gets a bounded wait before the kill.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{FleetError, FleetResult};

/// Grace period after spawn before asserting the process survived.
const SPAWN_GRACE: Duration = Duration::from_millis(500);

/// Bound on waiting for a killed process to actually exit.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Spawn an emulator process and verify it survived startup.
pub async fn launch(args: &[String]) -> FleetResult<Child> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| FleetError::Launch("empty emulator command".to_string()))?;

    info!(command = %args.join(" "), "launching emulator");
    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false)
        .spawn()
        .map_err(|e| FleetError::Launch(e.to_string()))?;

    // A bad command line usually dies within the grace period.
    tokio::time::sleep(SPAWN_GRACE).await;
    match child.try_wait() {
        Ok(None) => Ok(child),
        Ok(Some(status)) => Err(FleetError::Launch(format!(
            "emulator died after launch ({status})"
        ))),
        Err(e) => Err(FleetError::Launch(e.to_string())),
    }
}

/// Terminate a launched emulator process.
///
/// Asks the process to die and waits a bounded time for the exit. A
/// process that ignores the kill is reported, not waited on forever.
pub async fn kill(mut child: Child) -> FleetResult<()> {
    if let Err(e) = child.start_kill() {
        // Already exited is fine; anything else is worth noting.
        warn!(error = %e, "emulator kill signal failed");
    }
    match tokio::time::timeout(KILL_WAIT, child.wait()).await {
        Ok(Ok(status)) => {
            info!(%status, "emulator process exited");
            Ok(())
        }
        Ok(Err(e)) => Err(FleetError::Launch(e.to_string())),
        Err(_) => Err(FleetError::Launch(
            "emulator process still running after kill".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn launch_long_running_process_succeeds() {
        let child = launch(&["sleep".to_string(), "30".to_string()]).await.unwrap();
        assert!(child.id().is_some());
        kill(child).await.unwrap();
    }

    #[tokio::test]
    async fn launch_missing_binary_fails() {
        let result = launch(&["riglab-no-such-binary".to_string()]).await;
        assert!(matches!(result, Err(FleetError::Launch(_))));
    }

    #[tokio::test]
    async fn launch_detects_immediate_death() {
        // `false` exits immediately with a failure status.
        let result = launch(&["false".to_string()]).await;
        assert!(matches!(result, Err(FleetError::Launch(_))));
    }

    #[tokio::test]
    async fn launch_rejects_empty_command() {
        let result = launch(&[]).await;
        assert!(matches!(result, Err(FleetError::Launch(_))));
    }

    #[tokio::test]
    async fn kill_of_exited_process_is_ok() {
        let child = launch(&["sleep".to_string(), "30".to_string()]).await.unwrap();
        kill(child).await.unwrap();
    }
}
