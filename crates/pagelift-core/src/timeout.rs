//! Preparation-phase watchdog.
//!
//! Armed when a session enters Preparing, disarmed the instant the first
//! page-count report is accepted. No per-page watchdog exists after that;
//! the orchestrator records `last_message_at` instead so hosts can layer
//! their own stall detection.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::SessionId;

pub struct TimeoutGuard {
    fired: CancellationToken,
    timer: JoinHandle<()>,
}

impl TimeoutGuard {
    /// Arm the watchdog. The cancellation signal trips once `deadline`
    /// elapses, unless [`disarm`](Self::disarm) is called first.
    pub fn arm(session_id: SessionId, deadline: Duration) -> Self {
        let fired = CancellationToken::new();
        let signal = fired.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            tracing::warn!(%session_id, ?deadline, "preparation deadline elapsed");
            signal.cancel();
        });
        Self { fired, timer }
    }

    /// Resolves when the deadline elapses. Never resolves after `disarm`.
    pub fn fired(&self) -> WaitForCancellationFuture<'_> {
        self.fired.cancelled()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.is_cancelled()
    }

    /// Stop the watchdog. Idempotent; a signal that already fired stays fired.
    pub fn disarm(&self) {
        self.timer.abort();
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_once_deadline_elapses() {
        let guard = TimeoutGuard::arm(SessionId::next(), Duration::from_secs(15));
        assert!(!guard.has_fired());
        guard.fired().await;
        assert!(guard.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_prevents_firing() {
        let guard = TimeoutGuard::arm(SessionId::next(), Duration::from_secs(15));
        guard.disarm();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!guard.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_exactly_once() {
        let guard = TimeoutGuard::arm(SessionId::next(), Duration::from_secs(10));
        guard.fired().await;
        // a second await observes the same signal, not a new firing
        guard.fired().await;
        assert!(guard.has_fired());
    }
}
