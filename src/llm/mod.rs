//! Rewrite front-end types.
//!
//! This module provides:
//! * [`TextRewriter`]: async trait implemented by rewrite backends.
//! * [`FallbackRewriter`]: wraps any rewriter; returns the input on tool failure.
//! * [`PromptBuilder`]: composes the instruction template with the text.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_rewrite::config::{new_shared_settings, AppConfig, AppPaths};
//! use voice_rewrite::engine::RewriteEngine;
//! use voice_rewrite::llm::{FallbackRewriter, TextRewriter};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::load().unwrap_or_default();
//!     let engine = RewriteEngine::new(new_shared_settings(config.rewrite), AppPaths::new());
//!
//!     // Tool failures fall back to the dictated text.
//!     let rewriter = FallbackRewriter::new(engine);
//!
//!     let result = rewriter
//!         .rewrite("so um the deploy is on friday", "", None)
//!         .await
//!         .unwrap();
//!     println!("{}", result.text);
//! }
//! ```

pub mod fallback;
pub mod prompt;
pub mod rewriter;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use fallback::FallbackRewriter;
pub use prompt::{PromptBuilder, DEFAULT_INSTRUCTION, TEXT_PLACEHOLDER};
pub use rewriter::TextRewriter;
