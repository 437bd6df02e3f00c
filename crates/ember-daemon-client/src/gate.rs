//! One-shot open signal with multiple waiters.
//!
//! A [`Gate`] starts closed and can be opened exactly once; every task
//! waiting on it (and every later waiter) observes the open state. Gates are
//! scoped to a single connect cycle; code that needs the signal again after
//! a restart creates a fresh `Gate` rather than re-closing an old one.

use tokio::sync::watch;

/// A one-shot, per-cycle open signal.
///
/// Cloning a `Gate` yields another handle to the same signal, so one side can
/// open it while any number of tasks wait on their own clones.
#[derive(Debug, Clone)]
pub struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    /// Create a closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Open the gate, waking all waiters. Idempotent: opening an already-open
    /// gate is a no-op. A gate never closes again once opened.
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the gate has been opened.
    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is open. Returns immediately if it already is.
    pub async fn opened(&self) {
        let mut rx = self.tx.subscribe();
        // The sender is owned by `self`, so the channel cannot close here.
        let _ = rx.wait_for(|open| *open).await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}
