//! Credential files for the secure control channels.
//!
//! emberd writes two key files under its data directory when the client API
//! is enabled: `certificates/client/keys.json` and
//! `certificates/server/keys.json`. Each must decode to
//! `{"type": "keys", "data": {"public": <b64>, "private": <b64>}}` with
//! 32-byte keys. The files live inside the daemon's own data directory, so
//! access to them is what authenticates a peer.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{DaemonError, Result};

/// A 32-byte private key, wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// A public/private key pair loaded from a credential file.
///
/// Immutable once loaded; its lifetime is one connection cycle.
#[derive(Debug, Clone)]
pub struct CertificateKeyPair {
    pub public: [u8; 32],
    pub private: SecretKey,
}

/// Path of the client key file under the daemon's data directory.
pub fn client_keys_path(data_dir: &Path) -> PathBuf {
    data_dir.join("certificates").join("client").join("keys.json")
}

/// Path of the server key file under the daemon's data directory.
pub fn server_keys_path(data_dir: &Path) -> PathBuf {
    data_dir.join("certificates").join("server").join("keys.json")
}

#[derive(Deserialize)]
struct KeyFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<KeyData>,
}

#[derive(Deserialize)]
struct KeyData {
    public: Option<String>,
    private: Option<String>,
}

/// Read and validate a credential file.
///
/// Both halves must be present and decode to 32 bytes even when the caller
/// only needs the public one, so a truncated or hand-edited file is caught
/// before any socket is configured with it.
pub fn read_keypair(path: &Path) -> Result<CertificateKeyPair> {
    let invalid = |reason: String| DaemonError::InvalidCertificate {
        path: path.to_path_buf(),
        reason,
    };

    let raw = std::fs::read(path).map_err(|e| invalid(e.to_string()))?;
    let file: KeyFile =
        serde_json::from_slice(&raw).map_err(|e| invalid(format!("not valid JSON: {e}")))?;

    if file.kind.as_deref() != Some("keys") {
        return Err(invalid("type is not \"keys\"".to_string()));
    }
    let data = file.data.ok_or_else(|| invalid("missing data".to_string()))?;
    let public = data
        .public
        .ok_or_else(|| invalid("missing data.public".to_string()))?;
    let private = data
        .private
        .ok_or_else(|| invalid("missing data.private".to_string()))?;

    Ok(CertificateKeyPair {
        public: decode_key(&public).map_err(|e| invalid(format!("data.public: {e}")))?,
        private: SecretKey(decode_key(&private).map_err(|e| invalid(format!("data.private: {e}")))?),
    })
}

fn decode_key(encoded: &str) -> std::result::Result<[u8; 32], String> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| format!("invalid base64: {e}"))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}
