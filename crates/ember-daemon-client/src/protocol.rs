//! Wire envelope types for the emberd client API.
//!
//! Requests travel as `{auth, type, collection, data}`; replies and
//! subscription events travel as `{meta: {status}, error, data}`. The status
//! feed publishes the same reply shape under the reserved topic
//! [`STATUS_TOPIC`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DaemonError, Result};

/// Reserved topic of the status publish channel. Also the handler-registry
/// key for the status handler; it is never subscribed on the event channel.
pub const STATUS_TOPIC: &str = "apiStatus";

/// Network the daemon is running on, as announced in its status envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Main,
    Test,
    Regtest,
}

impl Network {
    /// Parse the `network` member of a status envelope. An unknown name is a
    /// fatal protocol error: the port table has no entry for it.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "main" => Ok(Network::Main),
            "test" => Ok(Network::Test),
            "regtest" => Ok(Network::Regtest),
            other => Err(DaemonError::Protocol(format!(
                "connected to unknown network type {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
        };
        write!(f, "{name}")
    }
}

/// Authentication block of a request envelope.
///
/// `passphrase` is always present on the wire (null when the call needs no
/// auth); `newPassphrase` only appears in passphrase-change requests.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuth {
    pub passphrase: Option<String>,
    #[serde(rename = "newPassphrase", skip_serializing_if = "Option::is_none")]
    pub new_passphrase: Option<String>,
}

/// Outbound request envelope.
///
/// An API call is identified by *both* `type` and `collection`; `data` is the
/// call-specific payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    pub auth: RequestAuth,
    #[serde(rename = "type")]
    pub kind: String,
    pub collection: String,
    pub data: Value,
}

impl RequestEnvelope {
    pub fn new(
        auth: Option<&str>,
        kind: impl Into<String>,
        collection: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            auth: RequestAuth {
                passphrase: auth.map(str::to_owned),
                new_passphrase: None,
            },
            kind: kind.into(),
            collection: collection.into(),
            data,
        }
    }
}

/// `meta` member of a reply or event envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Meta {
    pub status: i64,
}

/// Typed view of a status envelope published on [`STATUS_TOPIC`].
#[derive(Debug, Clone, Deserialize)]
pub struct ApiStatus {
    pub meta: Meta,
    #[serde(default)]
    pub error: Value,
    pub data: Option<StatusData>,
}

/// Payload of a status envelope. Ephemeral: derived per received message.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub network: String,
    /// Block height; -1 while the daemon is still loading its block index.
    #[serde(default = "blocks_unloaded")]
    pub blocks: i64,
    #[serde(rename = "dataDir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub synced: bool,
    #[serde(rename = "walletLock", default)]
    pub wallet_lock: bool,
}

fn blocks_unloaded() -> i64 {
    -1
}

impl ApiStatus {
    /// Validate and type a status envelope.
    ///
    /// Fatal for the cycle when the envelope carries an error or a status
    /// outside [200, 400).
    pub fn from_envelope(envelope: &Value) -> Result<Self> {
        let status: ApiStatus = serde_json::from_value(envelope.clone())
            .map_err(|e| DaemonError::Protocol(format!("malformed status envelope: {e}")))?;

        if !status.error.is_null() {
            return Err(DaemonError::Protocol(format!(
                "status envelope carries an error: {}",
                status.error
            )));
        }
        if !(200..400).contains(&status.meta.status) {
            return Err(DaemonError::Protocol(format!(
                "status envelope has bad status {}",
                status.meta.status
            )));
        }
        Ok(status)
    }

    /// Block height from the payload, or -1 when the payload is absent.
    pub fn blocks(&self) -> i64 {
        self.data.as_ref().map_or(-1, |d| d.blocks)
    }
}

/// Validate a raw reply frame and extract its `data` member.
///
/// Success requires a JSON object with no `error`, `meta.status == 200`, and
/// a non-null `data`. Invalid JSON is a [`DaemonError::Protocol`]; any other
/// well-formed shape is returned whole as [`DaemonError::Remote`] so callers
/// can inspect the remote error code.
pub fn parse_reply(raw: &[u8]) -> Result<Value> {
    let mut envelope: Value = serde_json::from_slice(raw)
        .map_err(|e| DaemonError::Protocol(format!("emberd sent invalid JSON: {e}")))?;

    if !envelope.is_object() {
        return Err(DaemonError::Protocol(format!(
            "emberd reply is not an object: {envelope}"
        )));
    }

    let error_clear = envelope.get("error").map_or(true, Value::is_null);
    let status_ok = envelope.pointer("/meta/status").and_then(Value::as_i64) == Some(200);
    let has_data = envelope.get("data").map_or(false, |d| !d.is_null());

    if error_clear && status_ok && has_data {
        Ok(envelope
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Remote(envelope))
    }
}
