//! Interruptible waiting for poll loops
//!
//! A [`ShutdownToken`] is shared by every loop in the process; firing it
//! makes every [`Sleeper`] return at once. A sleeper can also be woken
//! individually, which ends the current wait early without stopping the
//! loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};

/// Process-wide cancellation signal
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the token; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token has been fired
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// How a [`Sleeper::sleep`] call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepResult {
    /// The full duration passed
    Elapsed,
    /// [`Sleeper::wake`] was called
    Woken,
    /// The shutdown token fired
    Cancelled,
}

/// Timed wait that can be cut short
///
/// Intended for a single waiting loop. A `wake()` issued while nobody is
/// sleeping is kept and ends the next `sleep()` immediately.
#[derive(Debug)]
pub struct Sleeper {
    shutdown: ShutdownToken,
    wake: Notify,
}

impl Sleeper {
    pub fn new(shutdown: ShutdownToken) -> Self {
        Self {
            shutdown,
            wake: Notify::new(),
        }
    }

    /// Waits for at most `duration`
    pub async fn sleep(&self, duration: Duration) -> SleepResult {
        if self.shutdown.is_cancelled() {
            return SleepResult::Cancelled;
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => SleepResult::Cancelled,
            _ = self.wake.notified() => SleepResult::Woken,
            _ = tokio::time::sleep(duration) => SleepResult::Elapsed,
        }
    }

    /// Ends the current (or next) wait early
    pub fn wake(&self) {
        self.wake.notify_one();
    }
}
