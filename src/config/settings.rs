//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// PayloadDelivery
// ---------------------------------------------------------------------------

/// How the composed prompt reaches the rewrite tool.
///
/// | Variant      | Channel                                   | Parsed by launcher |
/// |--------------|-------------------------------------------|--------------------|
/// | Stdin        | piped standard input                      | No                 |
/// | PromptFile   | temporary file passed with `-f <path>`    | No                 |
/// | Argument     | escaped `-p <prompt>` argument (with `-e`)| Yes (escaped)      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadDelivery {
    /// Write the prompt to the child's standard input, then close it.
    Stdin,
    /// Materialise the prompt as a temporary file; deleted after the run.
    PromptFile,
    /// Embed the prompt in the argument list after escaping it.
    Argument,
}

impl Default for PayloadDelivery {
    fn default() -> Self {
        Self::PromptFile
    }
}

// ---------------------------------------------------------------------------
// RewriteConfig
// ---------------------------------------------------------------------------

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default output token budget.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Settings for the external rewrite tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Tool executable.  `None` searches for `llama-cli` in the tools
    /// directory, then on `PATH`.
    pub executable: Option<PathBuf>,
    /// Model identifier or GGUF file path (relative paths resolve against
    /// the models directory).
    pub model: String,
    /// Sampling temperature, clamped to 0.0 – 1.5.
    pub temperature: f32,
    /// Maximum generated tokens, clamped to 128 – 4096.
    pub max_tokens: u32,
    /// Prompt delivery strategy.
    pub delivery: PayloadDelivery,
    /// Arguments placed before the generated ones (e.g. a script path when
    /// the executable is an interpreter or wrapper).
    pub leading_args: Vec<String>,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            executable: None,
            model: "qwen2.5-3b-instruct-q4_k_m.gguf".into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            delivery: PayloadDelivery::default(),
            leading_args: Vec::new(),
        }
    }
}

/// Mutable settings shared with the rest of the application.
///
/// The engine clones the inner value once per invocation; edits made while
/// a rewrite is running only affect the next one.
pub type SharedSettings = Arc<RwLock<RewriteConfig>>;

/// Wrap `config` for sharing with a [`RewriteEngine`](crate::engine::RewriteEngine).
pub fn new_shared_settings(config: RewriteConfig) -> SharedSettings {
    Arc::new(RwLock::new(config))
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use voice_rewrite::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// println!("{}", config.rewrite.model);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Rewrite tool settings.
    pub rewrite: RewriteConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
