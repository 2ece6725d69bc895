//! Request and result values exchanged with [`RewriteEngine`](super::RewriteEngine).

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// One rewrite call.  Immutable once created.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    text: String,
    prompt: String,
    cancel: Option<CancellationToken>,
}

impl RewriteRequest {
    pub fn new(text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt: prompt.into(),
            cancel: None,
        }
    }

    /// Attach a caller-owned cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }
}

/// Outcome of a successful rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    /// Rewritten text, trimmed.  The original input when the tool produced
    /// nothing.
    pub text: String,
    /// Wall time of the whole call, including the wait for the gate.
    pub elapsed: Duration,
}
