//! Client configuration: daemon location, transport addresses, and timeouts.
//!
//! All values default to the production constants but remain plain public
//! fields so embedders (and the test harness) can point the client at a
//! different daemon or tighten the probe cadence.

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::Network;

/// Request/event port pair for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    /// Request/reply channel port
    pub request: u16,
    /// Event publish channel port
    pub events: u16,
}

/// Settings for a [`DaemonClient`](crate::DaemonClient).
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Path to the emberd binary
    pub binary: PathBuf,
    /// Data directory passed to emberd via `-datadir`. `None` lets the
    /// daemon use its default location; the effective directory is announced
    /// back in the first status message.
    pub data_dir: Option<PathBuf>,
    /// Host the daemon listens on
    pub host: String,
    /// Port of the status publish channel
    pub status_port: u16,
    /// Control ports when the daemon reports the `main` network
    pub main_ports: PortPair,
    /// Control ports when the daemon reports the `test` network
    pub test_ports: PortPair,
    /// Control ports when the daemon reports the `regtest` network
    pub regtest_ports: PortPair,
    /// Bound on waiting for the launcher process to detach
    pub launch_timeout: Duration,
    /// Bound on a single liveness probe
    pub probe_timeout: Duration,
    /// Number of liveness probes in the connect loop
    pub probe_attempts: u32,
    /// Delay between liveness probes
    pub probe_interval: Duration,
    /// Bound on waiting for the reply to a single request
    pub reply_timeout: Duration,
    /// Delay between liveness probes while waiting for the daemon to stop
    pub stop_poll_interval: Duration,
}

impl DaemonSettings {
    /// Settings with production defaults for the given binary and data dir.
    pub fn new(binary: impl Into<PathBuf>, data_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            data_dir,
            host: "127.0.0.1".to_string(),
            status_port: 29600,
            main_ports: PortPair {
                request: 29610,
                events: 29611,
            },
            test_ports: PortPair {
                request: 29620,
                events: 29621,
            },
            regtest_ports: PortPair {
                request: 29630,
                events: 29631,
            },
            launch_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            probe_attempts: 10,
            probe_interval: Duration::from_secs(3),
            reply_timeout: Duration::from_secs(2),
            stop_poll_interval: Duration::from_secs(1),
        }
    }

    /// Control ports for the network the daemon announced.
    pub fn ports_for(&self, network: Network) -> PortPair {
        match network {
            Network::Main => self.main_ports,
            Network::Test => self.test_ports,
            Network::Regtest => self.regtest_ports,
        }
    }

    /// Total connect window in seconds, as reported by
    /// [`DaemonError::ConnectionTimeout`](crate::DaemonError::ConnectionTimeout).
    pub fn probe_window_secs(&self) -> u64 {
        u64::from(self.probe_attempts) * self.probe_interval.as_secs()
    }
}
