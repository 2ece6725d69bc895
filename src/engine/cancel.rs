//! Combined cancellation signal for one invocation.
//!
//! A request may carry a caller-owned [`CancellationToken`]; the engine owns
//! another one that fires on disposal.  [`CancelSignal`] observes both without
//! spawning a forwarding task.

use tokio_util::sync::CancellationToken;

/// Fires when either the caller's token or the engine's shutdown token does.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    caller: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl CancelSignal {
    pub fn new(caller: Option<CancellationToken>, shutdown: CancellationToken) -> Self {
        Self { caller, shutdown }
    }

    /// A signal that only fires when `token` does.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            caller: None,
            shutdown: token,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
            || self
                .caller
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    /// Resolves once either token is cancelled.
    pub async fn cancelled(&self) {
        match &self.caller {
            Some(caller) => {
                tokio::select! {
                    _ = caller.cancelled() => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
            None => self.shutdown.cancelled().await,
        }
    }
}
