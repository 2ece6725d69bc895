//! Rewrite engine: drives the external text-generation tool.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    RewriteEngine                              │
//! │                                                              │
//! │  ConcurrencyGate ─▶ InvocationBuilder ─▶ ProcessRunner        │
//! │  (one at a time)    (args + payload)     (spawn, drain I/O)   │
//! │                                               │               │
//! │                                               ▼               │
//! │                                   LifecycleController         │
//! │                            (exit | timeout | cancel, dispose) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! * [`RewriteEngine`]: public entry point and state machine.
//! * [`ConcurrencyGate`]: cancellable single-slot admission.
//! * [`InvocationBuilder`]: argument vector and payload delivery.
//! * [`ProcessRunner`]: process-group spawn with bounded output capture.
//! * [`LifecycleController`]: completion race and bounded disposal.
//! * [`RewriteError`]: failure taxonomy.

pub mod buffer;
pub mod cancel;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod invocation;
pub mod lifecycle;
pub mod request;
pub mod runner;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use buffer::{BoundedBuffer, CapturedOutput, STDERR_CAP_BYTES, STDOUT_CAP_BYTES};
pub use cancel::CancelSignal;
pub use coordinator::{EngineOptions, RewriteEngine, RewriteState};
pub use error::{RewriteError, STDERR_EXCERPT_CHARS};
pub use gate::{ConcurrencyGate, GateError, GatePermit};
pub use invocation::{InvocationBuilder, InvocationConfig, InvocationSpec, ModelRef};
pub use lifecycle::{Completion, LifecycleController, DISPOSAL_BUDGET, PROCESS_TIMEOUT};
pub use request::{RewriteRequest, RewriteResult};
pub use runner::{ProcessRunner, RunningProcess};
