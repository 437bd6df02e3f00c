//! Authenticated-encrypted stream for the request and event channels.
//!
//! The daemon generates both credential files under its own data directory,
//! so both peers hold both key pairs; the keys act as pre-shared material
//! scoped by filesystem permissions. A connection starts with one plaintext
//! handshake frame carrying the client's public key and a random salt, after
//! which every frame is an AES-256-GCM ciphertext. Session keys are derived
//! per connection:
//!
//! ```text
//! HKDF-SHA256(salt, client_private ‖ server_public) -> c2s key, s2c key
//! ```
//!
//! Nonces are per-direction message counters and never travel on the wire;
//! a dropped, replayed, or reordered frame therefore fails authentication.

use std::io;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::net::TcpStream;
use tokio_util::bytes::Bytes;

use super::{decode_topic_frame, frame, FramedStream, SubscribeFrame};
use crate::certs::CertificateKeyPair;

const C2S_INFO: &[u8] = b"ember c2s";
const S2C_INFO: &[u8] = b"ember s2c";

#[derive(Debug, Serialize, Deserialize)]
struct HandshakeFrame {
    #[serde(rename = "clientKey")]
    client_key: String,
    salt: String,
}

enum Role {
    Client,
    Server,
}

/// An established secure channel. Frames sent through it are sealed; frames
/// received are opened and authenticated before they are surfaced.
pub struct SecureStream {
    framed: FramedStream,
    seal: Aes256Gcm,
    open: Aes256Gcm,
    seal_counter: u64,
    open_counter: u64,
}

/// Connect to a control port and run the client side of the handshake.
pub async fn connect(
    host: &str,
    port: u16,
    client: &CertificateKeyPair,
    server_public: &[u8; 32],
) -> io::Result<SecureStream> {
    let stream = TcpStream::connect((host, port)).await?;
    let mut framed = frame(stream);

    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);

    let handshake = HandshakeFrame {
        client_key: BASE64.encode(client.public),
        salt: BASE64.encode(salt),
    };
    framed.send(Bytes::from(serde_json::to_vec(&handshake)?)).await?;

    SecureStream::new(
        framed,
        client.private.as_bytes(),
        server_public,
        &salt,
        Role::Client,
    )
}

/// Run the server side of the handshake on an accepted connection.
///
/// Rejects peers whose announced public key does not match the client
/// credential file. This is the daemon's half of the channel; the crate
/// exposes it so a conforming peer can be built from the same code.
pub async fn accept(
    stream: TcpStream,
    server: &CertificateKeyPair,
    client: &CertificateKeyPair,
) -> io::Result<SecureStream> {
    let mut framed = frame(stream);
    let raw = framed
        .next()
        .await
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed before handshake"))??;
    let handshake: HandshakeFrame = serde_json::from_slice(&raw)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad handshake: {e}")))?;

    let announced = BASE64
        .decode(&handshake.client_key)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad client key: {e}")))?;
    if announced != client.public {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "peer announced an unknown client key",
        ));
    }
    let salt = BASE64
        .decode(&handshake.salt)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad salt: {e}")))?;

    SecureStream::new(
        framed,
        client.private.as_bytes(),
        &server.public,
        &salt,
        Role::Server,
    )
}

impl SecureStream {
    fn new(
        framed: FramedStream,
        client_private: &[u8; 32],
        server_public: &[u8; 32],
        salt: &[u8],
        role: Role,
    ) -> io::Result<Self> {
        let mut ikm = [0u8; 64];
        ikm[..32].copy_from_slice(client_private);
        ikm[32..].copy_from_slice(server_public);

        let hkdf = Hkdf::<Sha256>::new(Some(salt), &ikm);
        let mut c2s = [0u8; 32];
        let mut s2c = [0u8; 32];
        hkdf.expand(C2S_INFO, &mut c2s)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "key derivation failed"))?;
        hkdf.expand(S2C_INFO, &mut s2c)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "key derivation failed"))?;

        let c2s = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&c2s));
        let s2c = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&s2c));
        let (seal, open) = match role {
            Role::Client => (c2s, s2c),
            Role::Server => (s2c, c2s),
        };

        Ok(Self {
            framed,
            seal,
            open,
            seal_counter: 0,
            open_counter: 0,
        })
    }

    /// Seal and send one frame.
    pub async fn send(&mut self, plaintext: &[u8]) -> io::Result<()> {
        let nonce = counter_nonce(self.seal_counter);
        self.seal_counter += 1;
        let ciphertext = self
            .seal
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame encryption failed"))?;
        self.framed.send(Bytes::from(ciphertext)).await
    }

    /// Receive, open, and authenticate one frame.
    pub async fn recv(&mut self) -> io::Result<Bytes> {
        let frame = self
            .framed
            .next()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "secure channel closed"))??;
        let nonce = counter_nonce(self.open_counter);
        self.open_counter += 1;
        let plaintext = self
            .open
            .decrypt(Nonce::from_slice(&nonce), frame.as_ref())
            .map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "frame authentication failed")
            })?;
        Ok(Bytes::from(plaintext))
    }
}

fn counter_nonce(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Topic subscriber over a secure channel: the event channel counterpart of
/// [`Subscriber`](super::Subscriber).
pub struct SecureSubscriber {
    stream: SecureStream,
}

impl SecureSubscriber {
    pub fn new(stream: SecureStream) -> Self {
        Self { stream }
    }

    /// Register for the given topics.
    pub async fn subscribe(&mut self, topics: &[&str]) -> io::Result<()> {
        let frame = SubscribeFrame {
            subscribe: topics.iter().map(|t| t.to_string()).collect(),
        };
        self.stream.send(&serde_json::to_vec(&frame)?).await
    }

    /// Receive the next topic frame, in arrival order.
    pub async fn next(&mut self) -> io::Result<(String, Bytes)> {
        let frame = self.stream.recv().await?;
        decode_topic_frame(frame[..].into())
    }
}
