//! Error taxonomy for rewrite invocations.

use std::time::Duration;

use thiserror::Error;

/// Longest stderr excerpt (in characters) carried by [`RewriteError::ProcessFailure`].
pub const STDERR_EXCERPT_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// RewriteError
// ---------------------------------------------------------------------------

/// Every way a rewrite can fail.
#[derive(Debug, Clone, Error)]
pub enum RewriteError {
    /// The tool or a required resource could not be resolved, or the
    /// process could not be started.  No process is running.
    #[error("rewrite configuration error: {0}")]
    Configuration(String),

    /// The tool did not exit within the wall-clock budget.  The process
    /// tree has been killed.
    #[error("rewrite tool timed out after {after:?}")]
    Timeout { after: Duration },

    /// The tool exited unsuccessfully.
    #[error("rewrite tool failed ({}): {stderr}", exit_label(.exit_code))]
    ProcessFailure {
        /// Exit code, `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        /// Tail of the captured stderr, at most [`STDERR_EXCERPT_CHARS`].
        stderr: String,
    },

    /// The caller or the engine's disposal cancelled the request.
    #[error("rewrite cancelled")]
    Cancelled,

    /// The engine has been disposed and accepts no further requests.
    #[error("rewrite engine has been disposed")]
    Disposed,

    /// Anything else.
    #[error("unexpected rewrite error: {0}")]
    Unexpected(String),
}

impl RewriteError {
    /// Build a [`RewriteError::ProcessFailure`] from raw stderr text.
    pub fn process_failure(exit_code: Option<i32>, stderr: &str) -> Self {
        RewriteError::ProcessFailure {
            exit_code,
            stderr: stderr_excerpt(stderr),
        }
    }

    /// `true` for [`RewriteError::Cancelled`] and [`RewriteError::Disposed`].
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RewriteError::Cancelled | RewriteError::Disposed)
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Trim `stderr` and keep its last [`STDERR_EXCERPT_CHARS`] characters.
///
/// Tool diagnostics usually end with the actual error, so the tail is kept.
pub fn stderr_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
