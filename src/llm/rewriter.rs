//! The [`TextRewriter`] seam between callers and rewrite backends.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::engine::{RewriteError, RewriteResult};

/// Async trait for rewrite backends.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// (e.g. wrapped in `Arc<dyn TextRewriter>`).
///
/// # Arguments
/// * `text`   – Dictated text to rewrite.
/// * `prompt` – Instruction template; may contain `{text}`.
/// * `cancel` – Optional caller cancellation.
#[async_trait]
pub trait TextRewriter: Send + Sync {
    async fn rewrite(
        &self,
        text: &str,
        prompt: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<RewriteResult, RewriteError>;
}

#[async_trait]
impl<T: TextRewriter + ?Sized> TextRewriter for Arc<T> {
    async fn rewrite(
        &self,
        text: &str,
        prompt: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<RewriteResult, RewriteError> {
        (**self).rewrite(text, prompt, cancel).await
    }
}
