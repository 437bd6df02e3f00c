//! Single-flight request/reply channel.
//!
//! The daemon's request channel carries no correlation IDs: a reply is
//! attributed to whichever request was last sent. Requests are therefore
//! strictly serialized behind an ownership token; callers queue FIFO on it
//! and exactly one request is in flight at any instant.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{DaemonError, Result};
use crate::gate::Gate;
use crate::protocol::{parse_reply, RequestEnvelope};
use crate::transport::secure::SecureStream;

/// What to do with the single-flight token after an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenDisposition {
    /// Release the token as soon as the exchange finishes.
    Release,
    /// On success, keep the token held until the next connect cycle reaches
    /// Ready. Used by requests that stop or restart the daemon (and by
    /// passphrase changes), so no other request can race the restart.
    HoldOnSuccess,
}

/// Serializes requests and correlates each to the next inbound reply.
pub(crate) struct RequestChannel {
    /// Opened at the end of the first bootstrap; all senders wait on it.
    ready: Gate,
    /// The single-flight token. A fair mutex, so callers acquire it in FIFO
    /// order.
    token: Arc<AsyncMutex<()>>,
    /// The requester socket, installed by bootstrap and replaced per cycle.
    socket: StdMutex<Option<Arc<AsyncMutex<SecureStream>>>>,
    /// Token guard carried across a restart by a privileged request.
    held: StdMutex<Option<OwnedMutexGuard<()>>>,
    reply_timeout: Duration,
}

impl RequestChannel {
    pub fn new(reply_timeout: Duration) -> Self {
        Self {
            ready: Gate::new(),
            token: Arc::new(AsyncMutex::new(())),
            socket: StdMutex::new(None),
            held: StdMutex::new(None),
            reply_timeout,
        }
    }

    /// Install the requester socket for the current cycle and let senders
    /// through. Called only from bootstrap.
    pub fn install(&self, stream: SecureStream) {
        *self.socket.lock().unwrap() = Some(Arc::new(AsyncMutex::new(stream)));
        self.ready.open();
    }

    /// Drop the token guard a privileged request left behind, unblocking
    /// queued senders. Called when a cycle reaches Ready.
    pub fn release_held(&self) {
        self.held.lock().unwrap().take();
    }

    /// Discard the requester socket. Safe to call when bootstrap never
    /// completed, and idempotent.
    pub fn close(&self) {
        self.socket.lock().unwrap().take();
    }

    /// Send one request and await its reply.
    ///
    /// Blocks until the channel is ready (intentional backpressure for
    /// requests issued before bootstrap completes), then until the caller
    /// reaches the front of the token queue.
    pub async fn exchange(
        &self,
        envelope: &RequestEnvelope,
        disposition: TokenDisposition,
    ) -> Result<Value> {
        self.ready.opened().await;

        debug!("waiting for the request token");
        let guard = self.token.clone().lock_owned().await;
        debug!("acquired the request token");

        // The gate stays open after a fatal-cycle teardown, so a queued
        // sender can reach an empty socket slot; that is a dead channel,
        // not an unstarted client.
        let socket = self.socket.lock().unwrap().clone().ok_or_else(|| {
            DaemonError::Send(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "request channel is closed",
            ))
        })?;

        let raw = serde_json::to_vec(envelope)
            .map_err(|e| DaemonError::Protocol(format!("failed to encode request: {e}")))?;
        let result = self.exchange_on(&socket, &raw).await;

        if result.is_ok() && disposition == TokenDisposition::HoldOnSuccess {
            // Ownership of the token transfers to the restart sequence.
            *self.held.lock().unwrap() = Some(guard);
        }
        result
    }

    async fn exchange_on(&self, socket: &AsyncMutex<SecureStream>, raw: &[u8]) -> Result<Value> {
        let mut stream = socket.lock().await;
        stream.send(raw).await.map_err(DaemonError::Send)?;

        let reply = timeout(self.reply_timeout, stream.recv())
            .await
            .map_err(|_| {
                DaemonError::Send(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "timed out waiting for a reply",
                ))
            })?
            .map_err(DaemonError::Send)?;

        parse_reply(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certs::read_keypair;
    use crate::transport::secure::{accept, connect};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::json;
    use tokio::net::TcpListener;

    fn write_keys(dir: &std::path::Path, name: &str, fill: u8) -> crate::certs::CertificateKeyPair {
        let path = dir.join(format!("{name}.json"));
        let contents = json!({
            "type": "keys",
            "data": {
                "public": BASE64.encode([fill; 32]),
                "private": BASE64.encode([fill.wrapping_add(1); 32]),
            }
        });
        std::fs::write(&path, serde_json::to_vec(&contents).unwrap()).unwrap();
        read_keypair(&path).unwrap()
    }

    async fn connected_pair() -> (SecureStream, SecureStream) {
        let tmp = tempfile::TempDir::new().unwrap();
        let client_keys = write_keys(tmp.path(), "client", 10);
        let server_keys = write_keys(tmp.path(), "server", 20);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server_public = server_keys.public;
        let server_client_keys = client_keys.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            accept(stream, &server_keys, &server_client_keys).await
        });

        let client_side = connect("127.0.0.1", port, &client_keys, &server_public)
            .await
            .unwrap();
        let server_side = server.await.unwrap().unwrap();
        (client_side, server_side)
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let (client_side, mut server_side) = connected_pair().await;
        let channel = RequestChannel::new(Duration::from_secs(1));
        channel.install(client_side);

        let server = tokio::spawn(async move {
            let raw = server_side.recv().await.unwrap();
            let request: Value = serde_json::from_slice(&raw).unwrap();
            assert_eq!(request["collection"], "setting");
            let reply = json!({ "meta": { "status": 200 }, "error": null, "data": { "ok": true } });
            server_side
                .send(&serde_json::to_vec(&reply).unwrap())
                .await
                .unwrap();
        });

        let envelope = RequestEnvelope::new(None, "initial", "setting", Value::Null);
        let data = channel
            .exchange(&envelope, TokenDisposition::Release)
            .await
            .unwrap();
        assert_eq!(data["ok"], true);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_exchange_after_close_is_send_failure() {
        let (client_side, _server_side) = connected_pair().await;
        let channel = RequestChannel::new(Duration::from_millis(250));
        channel.install(client_side);
        channel.close();

        let envelope = RequestEnvelope::new(None, "initial", "setting", Value::Null);
        match channel.exchange(&envelope, TokenDisposition::Release).await {
            Err(DaemonError::Send(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::NotConnected);
            }
            other => panic!("expected a send failure on a closed channel, got {other:?}"),
        }
    }
}
