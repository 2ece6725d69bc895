//! Fallback rewriter: wraps any [`TextRewriter`] and returns the input text
//! when the tool fails.
//!
//! Tool failures (`Timeout`, `ProcessFailure`, `Configuration`, `Unexpected`)
//! turn into the original text so dictation still lands somewhere.
//! `Cancelled` and `Disposed` are passed through: the caller asked to stop.

use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::{RewriteError, RewriteResult};
use crate::llm::rewriter::TextRewriter;

// ---------------------------------------------------------------------------
// FallbackRewriter
// ---------------------------------------------------------------------------

/// A wrapper around any [`TextRewriter`] that only fails on cancellation.
pub struct FallbackRewriter<R: TextRewriter> {
    inner: R,
}

impl<R: TextRewriter> FallbackRewriter<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Return a reference to the wrapped rewriter.
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: TextRewriter> TextRewriter for FallbackRewriter<R> {
    async fn rewrite(
        &self,
        text: &str,
        prompt: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<RewriteResult, RewriteError> {
        let started = Instant::now();
        match self.inner.rewrite(text, prompt, cancel).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_cancellation() => Err(err),
            Err(err) => {
                log::warn!(
                    "rewrite failed, returning input text (len={}): {err}",
                    text.len()
                );
                Ok(RewriteResult {
                    text: text.to_string(),
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
