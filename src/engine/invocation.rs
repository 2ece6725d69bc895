//! Invocation building: configuration snapshot → executable + arguments +
//! payload.
//!
//! The tool is always started directly, never through a shell, so argument
//! strings are not subject to shell parsing.  The prompt reaches the tool
//! through one of the [`PayloadDelivery`] strategies:
//!
//! ```text
//! <leading args…> -m <model> --temp 0.70 -n 1024 --no-display-prompt -no-cnv
//!     PromptFile → -f <temp file>
//!     Argument   → -e -p <escaped prompt>
//!     Stdin      → (prompt piped on standard input)
//! ```

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::config::{AppPaths, PayloadDelivery, RewriteConfig, DEFAULT_TEMPERATURE};
use crate::llm::PromptBuilder;

use super::error::RewriteError;
use super::request::RewriteRequest;

/// Temperature bounds accepted by the tool.
pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 1.5);
/// Output token bounds.
pub const MAX_TOKENS_RANGE: (u32, u32) = (128, 4096);

#[cfg(windows)]
const DEFAULT_TOOL_NAME: &str = "llama-cli.exe";
#[cfg(not(windows))]
const DEFAULT_TOOL_NAME: &str = "llama-cli";

// ---------------------------------------------------------------------------
// InvocationConfig
// ---------------------------------------------------------------------------

/// Model passed to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelRef {
    /// Opaque identifier handed to the tool as-is.
    Identifier(String),
    /// Resolved model file.
    File(PathBuf),
}

/// Resolved, clamped, read-only view of [`RewriteConfig`] for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationConfig {
    pub executable: PathBuf,
    pub model: ModelRef,
    pub temperature: f32,
    pub max_tokens: u32,
    pub delivery: PayloadDelivery,
    pub leading_args: Vec<String>,
}

impl InvocationConfig {
    /// Resolve `settings` against the filesystem.
    ///
    /// # Errors
    ///
    /// [`RewriteError::Configuration`] when the executable or a model file
    /// cannot be found, or no model is configured.
    pub fn resolve(settings: &RewriteConfig, paths: &AppPaths) -> Result<Self, RewriteError> {
        Ok(Self {
            executable: resolve_executable(settings.executable.as_deref(), paths)?,
            model: resolve_model(&settings.model, paths)?,
            temperature: clamp_temperature(settings.temperature),
            max_tokens: clamp_max_tokens(settings.max_tokens),
            delivery: settings.delivery,
            leading_args: settings.leading_args.clone(),
        })
    }
}

/// Clamp to [`TEMPERATURE_RANGE`]; non-finite values become the default.
pub fn clamp_temperature(value: f32) -> f32 {
    if !value.is_finite() {
        return DEFAULT_TEMPERATURE;
    }
    value.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)
}

pub fn clamp_max_tokens(value: u32) -> u32 {
    value.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1)
}

fn is_bare_name(path: &Path) -> bool {
    !path.is_absolute() && path.components().count() == 1
}

fn resolve_executable(configured: Option<&Path>, paths: &AppPaths) -> Result<PathBuf, RewriteError> {
    let candidate = configured.unwrap_or_else(|| Path::new(DEFAULT_TOOL_NAME));

    if !is_bare_name(candidate) {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(RewriteError::Configuration(format!(
            "rewrite tool not found at {}",
            candidate.display()
        )));
    }

    let mut search = vec![paths.tools_dir.clone()];
    if let Some(path_var) = std::env::var_os("PATH") {
        search.extend(std::env::split_paths(&path_var));
    }

    for dir in search {
        let full = dir.join(candidate);
        if full.is_file() {
            return Ok(full);
        }
        #[cfg(windows)]
        {
            let exe = full.with_extension("exe");
            if exe.is_file() {
                return Ok(exe);
            }
        }
    }

    Err(RewriteError::Configuration(format!(
        "rewrite tool `{}` not found in {} or on PATH",
        candidate.display(),
        paths.tools_dir.display()
    )))
}

fn resolve_model(model: &str, paths: &AppPaths) -> Result<ModelRef, RewriteError> {
    let model = model.trim();
    if model.is_empty() {
        return Err(RewriteError::Configuration("no model configured".into()));
    }

    let path = Path::new(model);
    let path_like = !is_bare_name(path)
        || path
            .extension()
            .is_some_and(|ext| ext == "gguf" || ext == "bin");
    if !path_like {
        return Ok(ModelRef::Identifier(model.to_string()));
    }

    let full = if path.is_absolute() {
        path.to_path_buf()
    } else {
        paths.models_dir.join(path)
    };
    if full.is_file() {
        Ok(ModelRef::File(full))
    } else {
        Err(RewriteError::Configuration(format!(
            "model file not found: {}",
            full.display()
        )))
    }
}

// ---------------------------------------------------------------------------
// InvocationSpec
// ---------------------------------------------------------------------------

/// Everything needed to start one tool process.
///
/// Owns the temporary prompt file, if any; dropping the spec deletes it.
#[derive(Debug)]
pub struct InvocationSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Bytes written to the child's stdin; `None` leaves stdin closed.
    pub stdin: Option<Vec<u8>>,
    artifact: Option<TempPath>,
}

impl InvocationSpec {
    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// Delete the prompt file now.  Failures are logged, never returned.
    pub fn discard_artifact(&mut self) {
        if let Some(artifact) = self.artifact.take() {
            let path = artifact.to_path_buf();
            if let Err(e) = artifact.close() {
                log::warn!("could not delete prompt file {}: {e}", path.display());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// InvocationBuilder
// ---------------------------------------------------------------------------

/// Turns a request plus configuration snapshot into an [`InvocationSpec`].
#[derive(Debug, Clone, Default)]
pub struct InvocationBuilder {
    temp_dir: Option<PathBuf>,
}

impl InvocationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create prompt files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: Some(dir.into()),
        }
    }

    /// Build the spec.  Only [`PayloadDelivery::PromptFile`] touches the
    /// filesystem.
    pub fn build(
        &self,
        request: &RewriteRequest,
        config: &InvocationConfig,
    ) -> Result<InvocationSpec, RewriteError> {
        let prompt = PromptBuilder::new(request.prompt()).build(request.text());

        let mut args: Vec<OsString> = config.leading_args.iter().map(OsString::from).collect();
        args.push("-m".into());
        args.push(match &config.model {
            ModelRef::Identifier(id) => OsString::from(id),
            ModelRef::File(path) => path.clone().into_os_string(),
        });
        args.push("--temp".into());
        args.push(format_temperature(config.temperature).into());
        args.push("-n".into());
        args.push(config.max_tokens.to_string().into());
        args.push("--no-display-prompt".into());
        args.push("-no-cnv".into());

        let mut stdin = None;
        let mut artifact = None;

        match config.delivery {
            PayloadDelivery::Stdin => {
                stdin = Some(prompt.into_bytes());
            }
            PayloadDelivery::PromptFile => {
                let path = self.write_prompt_file(&prompt)?;
                args.push("-f".into());
                args.push(path.to_path_buf().into_os_string());
                artifact = Some(path);
            }
            PayloadDelivery::Argument => {
                args.push("-e".into());
                args.push("-p".into());
                args.push(escape_prompt_argument(&prompt).into());
            }
        }

        Ok(InvocationSpec {
            program: config.executable.clone(),
            args,
            stdin,
            artifact,
        })
    }

    fn write_prompt_file(&self, prompt: &str) -> Result<TempPath, RewriteError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("voice-rewrite-").suffix(".txt");
        let created = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut file = created
            .map_err(|e| RewriteError::Configuration(format!("cannot create prompt file: {e}")))?;

        file.write_all(prompt.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| RewriteError::Configuration(format!("cannot write prompt file: {e}")))?;

        Ok(file.into_temp_path())
    }
}

/// Fixed two-decimal formatting; Rust formatting never consults the locale.
pub fn format_temperature(value: f32) -> String {
    format!("{value:.2}")
}

/// Escape `text` for the tool's `-e` escape processing.
///
/// Backslashes are doubled and newline, carriage return and tab become
/// `\n`, `\r` and `\t`, so the argument is a single line the tool decodes
/// back to the original.  NUL bytes cannot appear in an argument and are
/// removed.  Quotes need no treatment because no shell is involved.
pub fn escape_prompt_argument(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => {}
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Decoder matching the tool's `-e` handling for the escapes we emit.
    fn unescape(arg: &str) -> String {
        let mut out = String::new();
        let mut chars = arg.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }

    fn config(delivery: PayloadDelivery) -> InvocationConfig {
        InvocationConfig {
            executable: PathBuf::from("/usr/bin/llama-cli"),
            model: ModelRef::Identifier("tiny".into()),
            temperature: 0.7,
            max_tokens: 1024,
            delivery,
            leading_args: Vec::new(),
        }
    }

    fn arg_strings(spec: &InvocationSpec) -> Vec<String> {
        spec.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn escape_flattens_control_characters() {
        let escaped = escape_prompt_argument("line one\nline\ttwo\r\n");
        assert_eq!(escaped, "line one\\nline\\ttwo\\r\\n");
        assert!(!escaped.contains('\n'));
    }

    #[test]
    fn escape_doubles_backslashes_so_sequences_survive() {
        let raw = r"C:\new\table and a literal \n";
        let escaped = escape_prompt_argument(raw);
        assert_eq!(unescape(&escaped), raw);
    }

    #[test]
    fn escape_leaves_shell_metacharacters_alone() {
        let raw = r#"$(rm -rf /) `id` "quoted" 'single' & | ; > %PATH% ^"#;
        assert_eq!(escape_prompt_argument(raw), raw);
    }

    #[test]
    fn escape_strips_nul() {
        assert_eq!(escape_prompt_argument("a\0b"), "ab");
    }

    #[test]
    fn numbers_are_clamped_and_formatted() {
        assert_eq!(clamp_temperature(3.0), 1.5);
        assert_eq!(clamp_temperature(-1.0), 0.0);
        assert_eq!(clamp_temperature(f32::NAN), DEFAULT_TEMPERATURE);
        assert_eq!(clamp_max_tokens(1), 128);
        assert_eq!(clamp_max_tokens(100_000), 4096);
        assert_eq!(format_temperature(0.7), "0.70");
        assert_eq!(format_temperature(1.5), "1.50");
    }

    #[test]
    fn stdin_delivery_pipes_prompt_and_adds_no_payload_args() {
        let request = RewriteRequest::new("hello world", "Improve: {text}");
        let spec = InvocationBuilder::new()
            .build(&request, &config(PayloadDelivery::Stdin))
            .expect("build");

        assert_eq!(spec.program, PathBuf::from("/usr/bin/llama-cli"));
        assert_eq!(
            arg_strings(&spec),
            vec!["-m", "tiny", "--temp", "0.70", "-n", "1024", "--no-display-prompt", "-no-cnv"]
        );
        assert_eq!(spec.stdin.as_deref(), Some(&b"Improve: hello world"[..]));
        assert!(spec.artifact_path().is_none());
    }

    #[test]
    fn argument_delivery_embeds_escaped_prompt() {
        let request = RewriteRequest::new("two\nlines", "Fix: {text}");
        let spec = InvocationBuilder::new()
            .build(&request, &config(PayloadDelivery::Argument))
            .expect("build");

        let args = arg_strings(&spec);
        assert_eq!(&args[args.len() - 3..], ["-e", "-p", "Fix: two\\nlines"]);
        assert!(spec.stdin.is_none());
    }

    #[test]
    fn prompt_file_delivery_writes_and_discards_artifact() {
        let dir = tempdir().expect("temp dir");
        let request = RewriteRequest::new("dictated", "Fix: {text}");
        let mut spec = InvocationBuilder::with_temp_dir(dir.path())
            .build(&request, &config(PayloadDelivery::PromptFile))
            .expect("build");

        let path = spec.artifact_path().expect("artifact").to_path_buf();
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "Fix: dictated");

        let args = arg_strings(&spec);
        assert_eq!(args[args.len() - 2], "-f");
        assert_eq!(args[args.len() - 1], path.to_string_lossy());

        spec.discard_artifact();
        assert!(!path.exists());
        spec.discard_artifact();
    }

    #[test]
    fn dropping_spec_deletes_artifact() {
        let dir = tempdir().expect("temp dir");
        let request = RewriteRequest::new("dictated", "p");
        let spec = InvocationBuilder::with_temp_dir(dir.path())
            .build(&request, &config(PayloadDelivery::PromptFile))
            .expect("build");
        let path = spec.artifact_path().expect("artifact").to_path_buf();

        drop(spec);
        assert!(!path.exists());
    }

    #[test]
    fn leading_args_come_first() {
        let mut cfg = config(PayloadDelivery::Stdin);
        cfg.leading_args = vec!["wrapper.sh".into()];
        let spec = InvocationBuilder::new()
            .build(&RewriteRequest::new("x", "p"), &cfg)
            .expect("build");
        assert_eq!(arg_strings(&spec)[0], "wrapper.sh");
    }

    #[test]
    fn resolve_rejects_missing_explicit_executable() {
        let dir = tempdir().expect("temp dir");
        let paths = AppPaths::with_roots(dir.path().join("cfg"), dir.path().join("data"));
        let settings = RewriteConfig {
            executable: Some(dir.path().join("missing-tool")),
            model: "tiny".into(),
            ..RewriteConfig::default()
        };

        let err = InvocationConfig::resolve(&settings, &paths).unwrap_err();
        assert!(matches!(err, RewriteError::Configuration(_)));
    }

    #[test]
    fn resolve_finds_bare_name_in_tools_dir_and_model_file() {
        let dir = tempdir().expect("temp dir");
        let paths = AppPaths::with_roots(dir.path().join("cfg"), dir.path().join("data"));
        std::fs::create_dir_all(&paths.tools_dir).expect("mkdir");
        std::fs::create_dir_all(&paths.models_dir).expect("mkdir");
        std::fs::write(paths.tools_dir.join("my-tool"), b"").expect("write tool");
        std::fs::write(paths.models_dir.join("tiny.gguf"), b"").expect("write model");

        let settings = RewriteConfig {
            executable: Some(PathBuf::from("my-tool")),
            model: "tiny.gguf".into(),
            temperature: 9.0,
            max_tokens: 10,
            ..RewriteConfig::default()
        };
        let resolved = InvocationConfig::resolve(&settings, &paths).expect("resolve");

        assert_eq!(resolved.executable, paths.tools_dir.join("my-tool"));
        assert_eq!(resolved.model, ModelRef::File(paths.models_dir.join("tiny.gguf")));
        assert_eq!(resolved.temperature, 1.5);
        assert_eq!(resolved.max_tokens, 128);
    }

    #[test]
    fn resolve_rejects_missing_model_file_and_empty_model() {
        let dir = tempdir().expect("temp dir");
        let tool = dir.path().join("tool");
        std::fs::write(&tool, b"").expect("write tool");
        let paths = AppPaths::with_roots(dir.path().join("cfg"), dir.path().join("data"));

        let mut settings = RewriteConfig {
            executable: Some(tool),
            model: "absent.gguf".into(),
            ..RewriteConfig::default()
        };
        assert!(matches!(
            InvocationConfig::resolve(&settings, &paths),
            Err(RewriteError::Configuration(_))
        ));

        settings.model = "  ".into();
        assert!(matches!(
            InvocationConfig::resolve(&settings, &paths),
            Err(RewriteError::Configuration(_))
        ));

        settings.model = "qwen2.5:3b".into();
        let resolved = InvocationConfig::resolve(&settings, &paths).expect("identifier");
        assert_eq!(resolved.model, ModelRef::Identifier("qwen2.5:3b".into()));
    }
}
