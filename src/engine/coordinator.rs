//! [`RewriteEngine`]: the single-flight rewrite coordinator.
//!
//! # Flow
//!
//! ```text
//! rewrite(text, prompt, cancel)
//!   ├─ disposed?                  → Err(Disposed)
//!   ├─ blank text                 → Ok(text)            (no gate, no spawn)
//!   └─ Acquiring ─gate─▶ Building ─▶ Launching ─▶ Running
//!                                                   ├─ Completed (exit 0)
//!                                                   ├─ Failed    (exit ≠ 0)
//!                                                   ├─ TimedOut
//!                                                   └─ Cancelled
//!                                               ─▶ CleaningUp ─▶ Terminal ─▶ Idle
//! ```
//!
//! `CleaningUp` always runs once a process exists: kill if still running,
//! bounded disposal, prompt file deletion, permit release.  Drop guards on
//! the process, the prompt file and the permit cover panics and callers that
//! drop the future mid-flight.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{AppPaths, RewriteConfig, SharedSettings};
use crate::llm::TextRewriter;

use super::buffer::{STDERR_CAP_BYTES, STDOUT_CAP_BYTES};
use super::cancel::CancelSignal;
use super::error::RewriteError;
use super::gate::ConcurrencyGate;
use super::invocation::{InvocationBuilder, InvocationConfig, InvocationSpec};
use super::lifecycle::{Completion, LifecycleController, DISPOSAL_BUDGET, PROCESS_TIMEOUT};
use super::request::{RewriteRequest, RewriteResult};
use super::runner::ProcessRunner;

// ---------------------------------------------------------------------------
// RewriteState
// ---------------------------------------------------------------------------

/// Phases of one admitted invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteState {
    Idle,
    Acquiring,
    Building,
    Launching,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    CleaningUp,
    Terminal,
}

impl RewriteState {
    /// `true` while an admitted invocation is in progress.
    pub fn is_busy(&self) -> bool {
        !matches!(self, RewriteState::Idle | RewriteState::Terminal)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RewriteState::Idle => "Idle",
            RewriteState::Acquiring => "Acquiring",
            RewriteState::Building => "Building",
            RewriteState::Launching => "Launching",
            RewriteState::Running => "Running",
            RewriteState::Completed => "Completed",
            RewriteState::Failed => "Failed",
            RewriteState::TimedOut => "TimedOut",
            RewriteState::Cancelled => "Cancelled",
            RewriteState::CleaningUp => "CleaningUp",
            RewriteState::Terminal => "Terminal",
        }
    }
}

// ---------------------------------------------------------------------------
// EngineOptions
// ---------------------------------------------------------------------------

/// Limits applied to every invocation.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Wall-clock budget per tool run.
    pub process_timeout: Duration,
    /// Budget for reaping the process and joining its readers.
    pub disposal_budget: Duration,
    pub stdout_cap: usize,
    pub stderr_cap: usize,
    /// Directory for prompt files; the system temp dir when `None`.
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            process_timeout: PROCESS_TIMEOUT,
            disposal_budget: DISPOSAL_BUDGET,
            stdout_cap: STDOUT_CAP_BYTES,
            stderr_cap: STDERR_CAP_BYTES,
            temp_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RewriteEngine
// ---------------------------------------------------------------------------

/// Runs the external rewrite tool, one request at a time.
///
/// ```rust,no_run
/// use voice_rewrite::config::{new_shared_settings, AppConfig, AppPaths};
/// use voice_rewrite::engine::RewriteEngine;
///
/// # async fn example() {
/// let config = AppConfig::load().unwrap_or_default();
/// let engine = RewriteEngine::new(new_shared_settings(config.rewrite), AppPaths::new());
///
/// let result = engine.rewrite("um so the meeting is uh tomorrow", "", None).await;
/// println!("{:?}", result.map(|r| r.text));
///
/// engine.dispose();
/// # }
/// ```
pub struct RewriteEngine {
    settings: SharedSettings,
    paths: AppPaths,
    gate: ConcurrencyGate,
    shutdown: CancellationToken,
    disposed: AtomicBool,
    builder: InvocationBuilder,
    runner: ProcessRunner,
    lifecycle: LifecycleController,
    state: Mutex<RewriteState>,
}

impl RewriteEngine {
    pub fn new(settings: SharedSettings, paths: AppPaths) -> Self {
        Self::with_options(settings, paths, EngineOptions::default())
    }

    pub fn with_options(settings: SharedSettings, paths: AppPaths, options: EngineOptions) -> Self {
        let builder = match options.temp_dir {
            Some(dir) => InvocationBuilder::with_temp_dir(dir),
            None => InvocationBuilder::new(),
        };
        Self {
            settings,
            paths,
            gate: ConcurrencyGate::new(),
            shutdown: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            builder,
            runner: ProcessRunner::new(options.stdout_cap, options.stderr_cap),
            lifecycle: LifecycleController::new(options.process_timeout, options.disposal_budget),
            state: Mutex::new(RewriteState::Idle),
        }
    }

    /// Rewrite `text` following `prompt`.
    ///
    /// # Errors
    ///
    /// See [`RewriteError`]; cancellation always surfaces as
    /// [`RewriteError::Cancelled`].
    pub async fn rewrite(
        &self,
        text: &str,
        prompt: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<RewriteResult, RewriteError> {
        let mut request = RewriteRequest::new(text, prompt);
        if let Some(token) = cancel {
            request = request.with_cancel(token.clone());
        }
        self.execute(&request).await
    }

    /// Run a prepared request.
    pub async fn execute(&self, request: &RewriteRequest) -> Result<RewriteResult, RewriteError> {
        if self.is_disposed() {
            return Err(RewriteError::Disposed);
        }

        let started = Instant::now();
        if request.text().trim().is_empty() {
            return Ok(RewriteResult {
                text: request.text().to_string(),
                elapsed: started.elapsed(),
            });
        }

        let signal = CancelSignal::new(request.cancel_token().cloned(), self.shutdown.clone());

        // Queued callers are only logged; the stored state belongs to the
        // admitted invocation.
        log::debug!("engine: {}", RewriteState::Acquiring.label());
        let permit = self.gate.acquire(&signal).await?;
        // Declared after the permit so it drops first if the future is
        // dropped mid-flight.
        let reset = IdleOnDrop(&self.state);

        let outcome = if signal.is_cancelled() {
            Err(RewriteError::Cancelled)
        } else {
            self.run_admitted(request, &signal).await
        };

        self.set_state(RewriteState::Terminal);
        drop(reset);
        self.gate.release(permit);

        match outcome {
            Ok(text) => Ok(RewriteResult {
                text,
                elapsed: started.elapsed(),
            }),
            Err(RewriteError::Unexpected(detail)) => {
                log::error!("engine: unexpected failure: {detail}");
                Err(RewriteError::Unexpected(detail))
            }
            Err(err) => {
                log::debug!("engine: rewrite failed: {err}");
                Err(err)
            }
        }
    }

    /// Building → Launching → Running → CleaningUp.
    async fn run_admitted(
        &self,
        request: &RewriteRequest,
        signal: &CancelSignal,
    ) -> Result<String, RewriteError> {
        self.set_state(RewriteState::Building);
        let config = InvocationConfig::resolve(&self.snapshot_settings(), &self.paths)?;
        let mut spec = self.builder.build(request, &config)?;

        let outcome = self.run_process(request, &spec, signal).await;

        spec.discard_artifact();
        outcome
    }

    async fn run_process(
        &self,
        request: &RewriteRequest,
        spec: &InvocationSpec,
        signal: &CancelSignal,
    ) -> Result<String, RewriteError> {
        self.set_state(RewriteState::Launching);
        let mut process = self.runner.launch(spec)?;

        self.set_state(RewriteState::Running);
        let completion = self.lifecycle.await_completion(&mut process, signal).await;

        self.set_state(match &completion {
            Ok(Completion::Exited(status)) if status.success() => RewriteState::Completed,
            Ok(Completion::Exited(_)) | Err(_) => RewriteState::Failed,
            Ok(Completion::TimedOut) => RewriteState::TimedOut,
            Ok(Completion::Cancelled) => RewriteState::Cancelled,
        });

        self.set_state(RewriteState::CleaningUp);
        if completion.is_err() {
            self.lifecycle.terminate(&mut process);
        }
        // Cancellation seen during disposal overrides every other outcome.
        let captured = self.lifecycle.dispose(process, signal).await?;

        let status = match completion? {
            Completion::Exited(status) => status,
            Completion::TimedOut => {
                return Err(RewriteError::Timeout {
                    after: self.lifecycle.timeout(),
                })
            }
            Completion::Cancelled => return Err(RewriteError::Cancelled),
        };

        let captured = captured.ok_or_else(|| {
            RewriteError::Unexpected("rewrite tool exited but its output was not collected".into())
        })?;

        if !status.success() {
            return Err(RewriteError::process_failure(
                status.code(),
                &captured.stderr.into_string(),
            ));
        }

        let output = captured.stdout.into_string();
        let trimmed = output.trim();
        if trimmed.is_empty() {
            log::debug!("engine: tool produced no output, keeping input text");
            return Ok(request.text().to_string());
        }
        Ok(trimmed.to_string())
    }

    /// Cancel pending and in-flight requests and refuse new ones.
    /// Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("engine: disposing");
        self.shutdown.cancel();
        self.gate.shutdown();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Phase of the admitted invocation, `Idle` when none is running.
    pub fn state(&self) -> RewriteState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Processes started over the engine's lifetime.
    pub fn spawn_count(&self) -> usize {
        self.runner.spawn_count()
    }

    fn snapshot_settings(&self) -> RewriteConfig {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: RewriteState) {
        log::debug!("engine: {}", state.label());
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Puts the engine state back to `Idle` when the admitted call ends, however
/// it ends.
struct IdleOnDrop<'a>(&'a Mutex<RewriteState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != RewriteState::Idle {
            log::debug!("engine: {}", RewriteState::Idle.label());
        }
        *state = RewriteState::Idle;
    }
}

impl Drop for RewriteEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[async_trait]
impl TextRewriter for RewriteEngine {
    async fn rewrite(
        &self,
        text: &str,
        prompt: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<RewriteResult, RewriteError> {
        RewriteEngine::rewrite(self, text, prompt, cancel).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
