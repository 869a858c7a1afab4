// src/analysis/process.rs — Child process probing and termination

use std::time::Duration;

use tokio::process::Child;

/// Non-blocking check that a child has not exited yet.
pub fn is_running(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

/// Ask the child to exit (SIGTERM on unix), wait up to `grace`, then kill.
pub async fn terminate(child: &mut Child, grace: Duration) {
    if !is_running(child) {
        return;
    }

    let Some(pid) = child.id() else {
        return;
    };

    #[cfg(unix)]
    {
        let signalled = tokio::process::Command::new("kill")
            .args(["-TERM", &pid.to_string()])
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);
        if !signalled {
            tracing::debug!("SIGTERM to pid {} not delivered; killing", pid);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!("pid {} exited with {}", pid, status);
        }
        Ok(Err(e)) => {
            tracing::warn!("Waiting on pid {} failed: {}", pid, e);
        }
        Err(_) => {
            tracing::warn!("pid {} ignored termination for {:?}; killing", pid, grace);
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill pid {}: {}", pid, e);
            }
        }
    }
}
