//! A single-shot gate that releases all workers at once.
//!
//! The [`ReleaseSignal`] is owned by the orchestrator and starts closed. Workers hold a
//! [`ReleaseGate`] and suspend in [`ReleaseGate::wait`] until the signal is opened. Opening
//! consumes the signal, so the closed-to-open transition happens exactly once.

use thiserror::Error;
use tokio::sync::watch;

/// The signal was dropped without being opened.
#[derive(Clone, Copy, Debug, Error)]
#[error("release signal dropped before it was opened")]
pub struct Abandoned;

/// The orchestrator side of the release gate.
#[derive(Debug)]
pub struct ReleaseSignal {
    sender: watch::Sender<bool>,
}

impl ReleaseSignal {
    /// Creates a closed signal.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Returns a gate that waits for this signal.
    pub fn gate(&self) -> ReleaseGate {
        ReleaseGate {
            receiver: self.sender.subscribe(),
        }
    }

    /// Opens the gate, releasing every current and future waiter.
    pub fn open(self) {
        self.sender.send_replace(true);
    }
}

impl Default for ReleaseSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker side of the release gate.
#[derive(Clone, Debug)]
pub struct ReleaseGate {
    receiver: watch::Receiver<bool>,
}

impl ReleaseGate {
    /// Suspends until the signal is opened.
    ///
    /// Returns immediately if the signal was opened already. Fails if the signal is dropped while
    /// still closed.
    pub async fn wait(&mut self) -> Result<(), Abandoned> {
        self.receiver
            .wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| Abandoned)
    }
}
