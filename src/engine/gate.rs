//! Single-slot concurrency gate.
//!
//! Wraps a one-permit `tokio::sync::Semaphore`.  Closing the semaphore on
//! [`ConcurrencyGate::shutdown`] wakes every pending acquirer with an error,
//! which is how engine disposal unblocks queued callers.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::cancel::CancelSignal;
use super::error::RewriteError;

// ---------------------------------------------------------------------------
// GateError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GateError {
    /// The waiter's cancellation signal fired.
    #[error("gate acquisition cancelled")]
    Cancelled,
    /// The gate was shut down.
    #[error("gate has been shut down")]
    Closed,
}

impl From<GateError> for RewriteError {
    fn from(_: GateError) -> Self {
        // A shut-down gate means the engine is being disposed, which callers
        // observe as cancellation of their pending request.
        RewriteError::Cancelled
    }
}

// ---------------------------------------------------------------------------
// ConcurrencyGate
// ---------------------------------------------------------------------------

/// Exclusive permit; the gate reopens when it is dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Admits one holder at a time.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
}

impl ConcurrencyGate {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait for the permit, giving up as soon as `cancel` fires.
    ///
    /// An already-cancelled signal fails even when the permit is free.
    pub async fn acquire(&self, cancel: &CancelSignal) -> Result<GatePermit, GateError> {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GateError::Cancelled),
            permit = semaphore.acquire_owned() => permit
                .map(|permit| GatePermit { _permit: permit })
                .map_err(|_| GateError::Closed),
        }
    }

    /// Give the permit back.  Equivalent to dropping it.
    pub fn release(&self, permit: GatePermit) {
        drop(permit);
    }

    /// Fail all pending and future acquisitions.  Idempotent.
    pub fn shutdown(&self) {
        self.semaphore.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.semaphore.is_closed()
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn idle_signal() -> CancelSignal {
        CancelSignal::from_token(CancellationToken::new())
    }

    #[tokio::test]
    async fn second_acquirer_waits_for_release() {
        let gate = Arc::new(ConcurrencyGate::new());
        let first = gate.acquire(&idle_signal()).await.expect("first permit");

        let gate2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move { gate2.acquire(&idle_signal()).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished(), "second acquirer must block");

        gate.release(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("join");
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn cancelled_waiter_is_released_promptly() {
        let gate = Arc::new(ConcurrencyGate::new());
        let _held = gate.acquire(&idle_signal()).await.expect("permit");

        let token = CancellationToken::new();
        let signal = CancelSignal::from_token(token.clone());
        let gate2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move { gate2.acquire(&signal).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("cancellation should unblock the waiter")
            .expect("join");
        assert_eq!(result.unwrap_err(), GateError::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_signal_fails_even_when_free() {
        let gate = ConcurrencyGate::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = gate.acquire(&CancelSignal::from_token(token)).await;
        assert_eq!(result.unwrap_err(), GateError::Cancelled);
    }

    #[tokio::test]
    async fn shutdown_fails_pending_and_future_acquirers() {
        let gate = Arc::new(ConcurrencyGate::new());
        let held = gate.acquire(&idle_signal()).await.expect("permit");

        let gate2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move { gate2.acquire(&idle_signal()).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        gate.shutdown();
        gate.shutdown();
        assert!(gate.is_shut_down());

        let pending = waiter.await.expect("join");
        assert_eq!(pending.unwrap_err(), GateError::Closed);

        drop(held);
        let later = gate.acquire(&idle_signal()).await;
        assert_eq!(later.unwrap_err(), GateError::Closed);
    }

    #[test]
    fn gate_errors_surface_as_cancellation() {
        assert!(matches!(
            RewriteError::from(GateError::Closed),
            RewriteError::Cancelled
        ));
    }
}
