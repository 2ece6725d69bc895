//! Exit / timeout / cancellation race and bounded disposal.

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::time::{timeout, timeout_at, Instant};

use super::buffer::CapturedOutput;
use super::cancel::CancelSignal;
use super::error::RewriteError;
use super::runner::RunningProcess;

/// Wall-clock budget for one tool run.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(120);
/// Budget for reaping the process and joining its I/O tasks.
pub const DISPOSAL_BUDGET: Duration = Duration::from_millis(2000);

/// Extra time granted to the readers after leftover descendants are killed.
const LINGER_GRACE: Duration = Duration::from_millis(250);

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Which event won the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

// ---------------------------------------------------------------------------
// LifecycleController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LifecycleController {
    timeout: Duration,
    disposal_budget: Duration,
}

impl LifecycleController {
    pub fn new(timeout: Duration, disposal_budget: Duration) -> Self {
        Self {
            timeout,
            disposal_budget,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Race process exit against the timeout and `cancel`.
    ///
    /// Cancellation wins ties.  On `TimedOut` or `Cancelled` the process
    /// tree has already been sent a kill when this returns.
    ///
    /// # Errors
    ///
    /// [`RewriteError::Unexpected`] when waiting on the child fails; the
    /// process may still be running and the caller must terminate it.
    pub async fn await_completion(
        &self,
        process: &mut RunningProcess,
        cancel: &CancelSignal,
    ) -> Result<Completion, RewriteError> {
        let completion = tokio::select! {
            biased;
            _ = cancel.cancelled() => Completion::Cancelled,
            status = process.wait() => {
                let status = status.map_err(|e| {
                    RewriteError::Unexpected(format!("waiting for rewrite tool failed: {e}"))
                })?;
                Completion::Exited(status)
            }
            _ = tokio::time::sleep(self.timeout) => Completion::TimedOut,
        };

        match completion {
            Completion::Exited(status) => {
                log::debug!("lifecycle: pid {:?} exited with {status}", process.pid());
            }
            Completion::TimedOut => {
                log::warn!(
                    "lifecycle: pid {:?} still running after {:?}, killing",
                    process.pid(),
                    self.timeout
                );
                self.terminate(process);
            }
            Completion::Cancelled => {
                log::debug!("lifecycle: cancelled, killing pid {:?}", process.pid());
                self.terminate(process);
            }
        }
        Ok(completion)
    }

    /// Kill the process tree.  Failures are logged and otherwise ignored.
    pub fn terminate(&self, process: &mut RunningProcess) {
        if let Err(e) = process.kill_tree() {
            log::warn!("lifecycle: kill of pid {:?} failed: {e}", process.pid());
        }
    }

    /// Reap the process and collect its output within the disposal budget.
    ///
    /// Returns `Ok(None)` when the budget runs out; the process handle is
    /// then abandoned (dropping it re-sends the kill and aborts the readers).
    ///
    /// # Errors
    ///
    /// [`RewriteError::Cancelled`] when `cancel` fires before disposal
    /// finishes.  The process tree is killed first and whatever output was
    /// gathered is discarded.
    pub async fn dispose(
        &self,
        mut process: RunningProcess,
        cancel: &CancelSignal,
    ) -> Result<Option<CapturedOutput>, RewriteError> {
        let deadline = Instant::now() + self.disposal_budget;

        match until_cancelled(cancel, timeout_at(deadline, process.wait())).await {
            Some(Ok(Ok(_))) => {}
            Some(Ok(Err(e))) => {
                log::warn!("lifecycle: reaping pid {:?} failed: {e}", process.pid());
                return Ok(None);
            }
            Some(Err(_)) => {
                log::warn!(
                    "lifecycle: pid {:?} not reclaimed within {:?}, abandoning",
                    process.pid(),
                    self.disposal_budget
                );
                return Ok(None);
            }
            None => return Err(self.abandon_cancelled(process, deadline).await),
        }

        match until_cancelled(cancel, timeout_at(deadline, process.collect_output())).await {
            Some(Ok(captured)) => return Ok(Some(captured)),
            Some(Err(_)) => {}
            None => return Err(self.abandon_cancelled(process, deadline).await),
        }

        // The tool exited but a descendant still holds its pipes open.
        log::warn!(
            "lifecycle: output pipes of pid {:?} still open after exit, killing leftovers",
            process.pid()
        );
        self.terminate(&mut process);
        match until_cancelled(cancel, timeout(LINGER_GRACE, process.collect_output())).await {
            Some(captured) => Ok(captured.ok()),
            None => Err(self.abandon_cancelled(process, deadline).await),
        }
    }

    /// Kill the tree after a cancellation seen during disposal and reap
    /// within what is left of the budget.
    async fn abandon_cancelled(&self, mut process: RunningProcess, deadline: Instant) -> RewriteError {
        log::debug!(
            "lifecycle: cancelled during disposal, killing pid {:?}",
            process.pid()
        );
        self.terminate(&mut process);
        if timeout_at(deadline, process.wait()).await.is_err() {
            log::warn!("lifecycle: pid {:?} not reclaimed after cancellation", process.pid());
        }
        RewriteError::Cancelled
    }
}

/// Run `fut` unless `cancel` fires first; cancellation wins ties.
async fn until_cancelled<F: Future>(cancel: &CancelSignal, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new(PROCESS_TIMEOUT, DISPOSAL_BUDGET)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::PayloadDelivery;
    use crate::engine::invocation::{InvocationBuilder, InvocationConfig, ModelRef};
    use crate::engine::request::RewriteRequest;
    use crate::engine::runner::ProcessRunner;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    fn launch(script: &str) -> RunningProcess {
        let config = InvocationConfig {
            executable: PathBuf::from("/bin/sh"),
            model: ModelRef::Identifier("mock".into()),
            temperature: 0.7,
            max_tokens: 1024,
            delivery: PayloadDelivery::Argument,
            leading_args: vec!["-c".into(), script.into(), "tool".into()],
        };
        let spec = InvocationBuilder::new()
            .build(&RewriteRequest::new("x", "p"), &config)
            .expect("build");
        ProcessRunner::new(4096, 4096).launch(&spec).expect("launch")
    }

    fn idle() -> CancelSignal {
        CancelSignal::from_token(CancellationToken::new())
    }

    #[tokio::test]
    async fn exit_wins_when_process_finishes() {
        let controller = LifecycleController::default();
        let mut process = launch("echo out; echo err >&2; exit 3");

        let completion = controller
            .await_completion(&mut process, &idle())
            .await
            .expect("race");
        let Completion::Exited(status) = completion else {
            panic!("expected exit, got {completion:?}");
        };
        assert_eq!(status.code(), Some(3));

        let captured = controller
            .dispose(process, &idle())
            .await
            .expect("disposal")
            .expect("captured");
        assert_eq!(captured.stdout.into_string().trim(), "out");
        assert_eq!(captured.stderr.into_string().trim(), "err");
    }

    #[tokio::test]
    async fn timeout_wins_and_kills() {
        let controller = LifecycleController::new(Duration::from_millis(100), DISPOSAL_BUDGET);
        let mut process = launch("sleep 30");

        let started = std::time::Instant::now();
        let completion = controller
            .await_completion(&mut process, &idle())
            .await
            .expect("race");
        assert_eq!(completion, Completion::TimedOut);

        let disposed = controller.dispose(process, &idle()).await.expect("disposal");
        assert!(disposed.is_some());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancellation_wins_and_kills() {
        let controller = LifecycleController::default();
        let mut process = launch("sleep 30");
        let token = CancellationToken::new();
        let signal = CancelSignal::from_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let completion = controller
            .await_completion(&mut process, &signal)
            .await
            .expect("race");
        assert_eq!(completion, Completion::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));

        let disposed = controller.dispose(process, &signal).await;
        assert!(matches!(disposed, Err(RewriteError::Cancelled)));
        canceller.await.expect("join");
    }

    #[tokio::test]
    async fn lingering_descendant_does_not_stall_disposal() {
        let controller = LifecycleController::new(PROCESS_TIMEOUT, Duration::from_millis(300));
        // The shell exits at once; its background sleep keeps stdout open.
        let mut process = launch("sleep 30 & echo started");

        let completion = controller
            .await_completion(&mut process, &idle())
            .await
            .expect("race");
        assert!(matches!(completion, Completion::Exited(_)));

        let started = std::time::Instant::now();
        let captured = controller
            .dispose(process, &idle())
            .await
            .expect("disposal")
            .expect("captured");
        assert_eq!(captured.stdout.into_string().trim(), "started");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cancellation_during_disposal_is_reported() {
        let controller = LifecycleController::new(PROCESS_TIMEOUT, Duration::from_secs(5));
        let mut process = launch("sleep 30 & echo started");
        let token = CancellationToken::new();
        let signal = CancelSignal::from_token(token.clone());

        let completion = controller
            .await_completion(&mut process, &signal)
            .await
            .expect("race");
        assert!(matches!(completion, Completion::Exited(_)));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let started = std::time::Instant::now();
        let disposed = controller.dispose(process, &signal).await;
        assert!(matches!(disposed, Err(RewriteError::Cancelled)), "{disposed:?}");
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "disposal ignored cancellation for {:?}",
            started.elapsed()
        );
        canceller.await.expect("join");
    }
}
