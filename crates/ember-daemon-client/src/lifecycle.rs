//! Daemon process supervision: spawning emberd and probing its status port.

use std::process::Stdio;

use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::error::{DaemonError, Result};
use crate::settings::DaemonSettings;

/// Spawns the daemon and answers the question "is anything listening on the
/// status port?".
#[derive(Debug, Clone)]
pub struct DaemonSupervisor {
    settings: DaemonSettings,
}

impl DaemonSupervisor {
    pub fn new(settings: DaemonSettings) -> Self {
        Self { settings }
    }

    /// Launch emberd detached, with the client API enabled.
    ///
    /// The daemon forks itself; we wait (bounded by `launch_timeout`) only
    /// for the launcher process to exit cleanly, not for the daemon to come
    /// up. Fails with [`DaemonError::Launch`] if the spawn fails, the
    /// launcher reports a non-zero status, or it never detaches.
    pub async fn launch(&self) -> Result<()> {
        let mut command = Command::new(&self.settings.binary);
        command.arg("-daemon").arg("-clientapi=1");
        if let Some(data_dir) = &self.settings.data_dir {
            command.arg(format!("-datadir={}", data_dir.display()));
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        info!("starting daemon {:?}", self.settings.binary);
        let mut child = command.spawn().map_err(DaemonError::Launch)?;

        match timeout(self.settings.launch_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!("successfully started daemon");
                Ok(())
            }
            Ok(Ok(status)) => {
                error!("daemon launcher exited with {status}");
                Err(DaemonError::Launch(std::io::Error::other(format!(
                    "emberd launcher exited with {status}"
                ))))
            }
            Ok(Err(e)) => {
                error!("error starting daemon: {e}");
                Err(DaemonError::Launch(e))
            }
            Err(_) => {
                let _ = child.start_kill();
                error!("daemon launcher did not detach in time");
                Err(DaemonError::Launch(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out waiting for the launcher to detach",
                )))
            }
        }
    }

    /// Whether something accepts connections on the status port.
    ///
    /// A raw transport connect with no payload, bounded by `probe_timeout`.
    /// Never errors: any failure or timeout reads as "not listening". This
    /// probe is inherently racy against a concurrently starting unmanaged
    /// daemon; the window is small and only matters after an improper
    /// shutdown.
    pub async fn is_listening(&self) -> bool {
        let addr = (self.settings.host.as_str(), self.settings.status_port);
        match timeout(self.settings.probe_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!("status port probe failed: {e}");
                false
            }
            Err(_) => {
                debug!("status port probe timed out");
                false
            }
        }
    }
}
