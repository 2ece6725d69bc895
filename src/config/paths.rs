//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-rewrite\
//!   macOS:   ~/Library/Application Support/voice-rewrite/
//!   Linux:   ~/.config/voice-rewrite/
//!
//! Data dir (models + bundled tool binaries):
//!   Windows: %LOCALAPPDATA%\voice-rewrite\
//!   macOS:   ~/Library/Application Support/voice-rewrite/
//!   Linux:   ~/.local/share/voice-rewrite/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for downloaded GGUF model files.
    pub models_dir: PathBuf,
    /// Directory searched first for the rewrite tool executable.
    pub tools_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-rewrite";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path (should be extremely rare in practice).
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self::with_roots(config_dir, data_dir)
    }

    /// Build the layout under explicit config and data roots.
    pub fn with_roots(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let settings_file = config_dir.join("settings.toml");
        let models_dir = data_dir.join("models");
        let tools_dir = data_dir.join("bin");

        Self {
            config_dir,
            settings_file,
            models_dir,
            tools_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths.models_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
    }

    #[test]
    fn with_roots_places_models_and_tools_under_data_dir() {
        let paths = AppPaths::with_roots("/cfg".into(), "/data".into());
        assert_eq!(paths.settings_file, PathBuf::from("/cfg/settings.toml"));
        assert_eq!(paths.models_dir, PathBuf::from("/data/models"));
        assert_eq!(paths.tools_dir, PathBuf::from("/data/bin"));
    }
}
