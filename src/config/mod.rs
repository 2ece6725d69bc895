//! Configuration module for the rewrite engine.
//!
//! Provides `AppConfig` (top-level settings), `RewriteConfig` for the
//! external tool, `AppPaths` for cross-platform data directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    new_shared_settings, AppConfig, PayloadDelivery, RewriteConfig, SharedSettings,
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
