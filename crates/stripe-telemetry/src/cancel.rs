//! Cooperative cancellation for in-flight telemetry sends

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable cancellation token.
///
/// All clones observe the same state. A token may also carry a deadline,
/// after which it behaves as if `cancel()` had been called.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token that is not cancelled and has no deadline
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
            deadline: None,
        }
    }

    /// Create a token that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            ..Self::new()
        }
    }

    /// Request cancellation. Wakes every task waiting in [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Whether cancellation was requested or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        if *self.state.borrow() {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Resolves once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let requested = async move {
            // The sender lives as long as `self`, so this only errors if the
            // token is torn down mid-wait.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = requested => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => requested.await,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
