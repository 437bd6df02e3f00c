//! Client for a supervised emberd wallet daemon.
//!
//! A [`DaemonClient`] owns the full lifecycle of one daemon instance:
//! launching the binary, probing its status port, bootstrapping the
//! encrypted control channels from the credential files the daemon writes,
//! routing subscription events to registered handlers, and serializing
//! wallet requests over a single-flight request channel.
//!
//! ```no_run
//! use ember_daemon_client::{DaemonClient, DaemonSettings, HandlerRegistry};
//!
//! # async fn run() -> ember_daemon_client::Result<()> {
//! let handlers = HandlerRegistry::new().with_fn("transaction", |_client, data| async move {
//!     println!("transaction event: {data}");
//! });
//! let client = DaemonClient::new(DaemonSettings::new("/usr/bin/emberd", None), handlers);
//! client.start().await?;
//! client.await_block_index().await?;
//! let settings = client.get_settings().await?;
//! # let _ = settings;
//! # Ok(())
//! # }
//! ```

pub mod certs;
pub mod client;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod protocol;
pub mod router;
pub mod settings;
pub mod transport;

mod request;

pub use client::{ConnectionState, DaemonClient};
pub use error::{DaemonError, Result};
pub use gate::Gate;
pub use protocol::{ApiStatus, Network, StatusData, STATUS_TOPIC};
pub use router::{EventHandler, HandlerRegistry};
pub use settings::{DaemonSettings, PortPair};
