//! Error types for the daemon client

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for daemon client operations
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors that can occur while supervising or talking to emberd.
///
/// Every failure path in the crate is classified into one of these kinds.
/// Subscription payload problems are not represented here: malformed or
/// unhandled events are logged and dropped without surfacing a fault.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Spawning the daemon binary failed or the launcher did not detach in time
    #[error("failed to launch emberd: {0}")]
    Launch(#[source] std::io::Error),

    /// A listener already exists on the status port before we launched anything
    #[error("another emberd instance with the client API enabled is already running")]
    AlreadyRunning,

    /// The daemon never opened its status port within the connect window.
    /// A common cause is an unmanaged emberd instance shutting down uncleanly.
    #[error("unable to connect to emberd within {0}s; another emberd instance not managed by this client may be running")]
    ConnectionTimeout(u64),

    /// A credential file was missing, unreadable, or did not decode to a key pair
    #[error("invalid certificate file {path}: {reason}")]
    InvalidCertificate { path: PathBuf, reason: String },

    /// Malformed envelope or an unknown network name
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The daemon answered with a well-formed error envelope.
    /// The full envelope is preserved so callers can inspect the remote code.
    #[error("emberd replied with an error: {0}")]
    Remote(serde_json::Value),

    /// Named sub-case of a remote error: the wallet passphrase was wrong
    #[error("incorrect passphrase")]
    IncorrectPassphrase,

    /// The request could not be transmitted, or the reply never arrived
    #[error("failed to exchange a request with emberd: {0}")]
    Send(#[source] std::io::Error),

    /// An operation that requires a started client was called before `start()`
    #[error("emberd must be started before this call")]
    NotStarted,

    /// The daemon restarted before the awaited condition was reached
    #[error("emberd restarted without loading the block index")]
    RestartInterrupted,
}

impl DaemonError {
    /// Remote error code carried by a [`DaemonError::Remote`] envelope, if any.
    ///
    /// emberd reports errors either as a plain string or as an object with
    /// `code` and `message` members; only the latter carries a code.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            DaemonError::Remote(envelope) => envelope.get("error")?.get("code")?.as_i64(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_code_extracted_from_envelope() {
        let err = DaemonError::Remote(json!({
            "meta": { "status": 400 },
            "error": { "code": -14, "message": "incorrect passphrase" },
            "data": null
        }));
        assert_eq!(err.remote_code(), Some(-14));
    }

    #[test]
    fn test_remote_code_absent_for_string_error() {
        let err = DaemonError::Remote(json!({
            "meta": { "status": 400 },
            "error": "something went wrong",
            "data": null
        }));
        assert_eq!(err.remote_code(), None);
    }

    #[test]
    fn test_remote_code_absent_for_other_variants() {
        assert_eq!(DaemonError::AlreadyRunning.remote_code(), None);
        assert_eq!(DaemonError::NotStarted.remote_code(), None);
    }

    #[test]
    fn test_connection_timeout_message_includes_window() {
        let msg = DaemonError::ConnectionTimeout(30).to_string();
        assert!(msg.contains("30s"));
    }
}
