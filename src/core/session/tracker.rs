//! Live session bookkeeping and shutdown drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use super::call::{CallSession, SessionReport};
use crate::core::telephony::TelephonyEvents;

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Spawns sessions, counts the live ones and drains them on shutdown.
///
/// Media transports hold a child of [`shutdown_token`](Self::shutdown_token).
/// Cancelling it closes every carrier socket, which each session observes as
/// an ordinary hang-up and tears down normally.
#[derive(Debug, Clone, Default)]
pub struct SessionTracker {
    tasks: TaskTracker,
    shutdown: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, session: CallSession, events: TelephonyEvents) -> JoinHandle<SessionReport> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));
        self.tasks.spawn(async move {
            let _guard = guard;
            session.run(events).await
        })
    }

    pub fn active_sessions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Close all media legs and wait for sessions to finish their teardown.
    /// Returns false if the timeout elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let live = self.active_sessions();
        info!(active_sessions = live, "Draining call sessions");

        self.shutdown.cancel();
        self.tasks.close();

        match tokio::time::timeout(timeout, self.tasks.wait()).await {
            Ok(()) => {
                info!("All call sessions drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.active_sessions(),
                    "Drain timeout elapsed with sessions still running"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drain_with_no_sessions() {
        let tracker = SessionTracker::new();
        let token = tracker.shutdown_token();
        assert!(!tracker.is_shutting_down());

        assert!(tracker.drain(Duration::from_millis(100)).await);
        assert!(tracker.is_shutting_down());
        assert!(token.is_cancelled());
        assert_eq!(tracker.active_sessions(), 0);
    }
}
