use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    #[error("shutdown requested")]
    Requested,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation token that remembers the cause of the first cancellation.
///
/// Clones share state: cancelling any clone cancels them all. Later causes
/// never overwrite the first one.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancelled whenever `parent` is, in addition to its own
    /// `cancel` calls. A parent-driven cancellation reports `Requested`.
    pub fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            reason: Arc::default(),
        }
    }

    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Requested);
    }

    pub fn cancel_with(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// Arm a timer that cancels with [`CancelReason::DeadlineExceeded`]
    /// after `timeout`, unless the signal is cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_deadline(self, timeout: Duration) -> Self {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = signal.token.cancelled() => {},
                _ = tokio::time::sleep(timeout) => {
                    signal.cancel_with(CancelReason::DeadlineExceeded);
                },
            }
        });
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn reason(&self) -> CancelReason {
        self.reason
            .get()
            .copied()
            .unwrap_or(CancelReason::Requested)
    }
}
