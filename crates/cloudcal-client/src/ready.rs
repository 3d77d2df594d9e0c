//! Readiness signal with any number of waiters.

use tokio::sync::watch;

use crate::error::{ClientError, ClientResult};

/// Latch that flips once the session handshake finishes.
///
/// Any number of tasks can hold a [`ReadyWaiter`]; none of them triggers
/// the underlying login, and dropping one never disturbs the others. The
/// latch is lowered again when a stale session forces a re-login.
#[derive(Debug)]
pub struct ReadySignal {
    tx: watch::Sender<bool>,
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Raises the latch. Idempotent; waiters past and future all resolve.
    pub fn set_ready(&self) {
        self.tx.send_replace(true);
    }

    /// Lowers the latch while a re-login is in flight.
    pub fn set_not_ready(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Hands out an independent waiter. May be called before or after the
    /// latch is raised.
    pub fn waiter(&self) -> ReadyWaiter {
        ReadyWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

/// One waiter on a [`ReadySignal`].
#[derive(Debug, Clone)]
pub struct ReadyWaiter {
    rx: watch::Receiver<bool>,
}

impl ReadyWaiter {
    /// Resolves once the session is ready, immediately if it already is.
    ///
    /// # Errors
    ///
    /// Fails when the signal's owner was dropped before ever raising the
    /// latch, which means the session can never become ready.
    pub async fn wait(mut self) -> ClientResult<()> {
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::internal("session was dropped before becoming ready"))
    }
}
