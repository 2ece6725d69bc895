//! Dictation rewriting through a local llama.cpp command-line tool.
//!
//! * [`config`]: settings, persisted as TOML, and platform paths.
//! * [`engine`]: the process-driving [`engine::RewriteEngine`].
//! * [`llm`]: prompt composition and the [`llm::TextRewriter`] seam.

pub mod config;
pub mod engine;
pub mod llm;
