//! Command-line entry point: rewrite one piece of dictated text.
//!
//! # Startup sequence
//!
//! 1. Parse arguments.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`] (from `--config` or the platform settings file) and
//!    apply command-line overrides.
//! 4. Create the tokio runtime and the [`RewriteEngine`].
//! 5. Read the input text (`--text` or stdin).
//! 6. Run the rewrite; Ctrl-C cancels it.
//! 7. Print the result and dispose the engine.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use voice_rewrite::{
    config::{new_shared_settings, AppConfig, AppPaths, PayloadDelivery},
    engine::{RewriteEngine, RewriteError, RewriteResult},
    llm::{FallbackRewriter, TextRewriter},
};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeliveryArg {
    Stdin,
    PromptFile,
    Argument,
}

impl From<DeliveryArg> for PayloadDelivery {
    fn from(arg: DeliveryArg) -> Self {
        match arg {
            DeliveryArg::Stdin => PayloadDelivery::Stdin,
            DeliveryArg::PromptFile => PayloadDelivery::PromptFile,
            DeliveryArg::Argument => PayloadDelivery::Argument,
        }
    }
}

/// Rewrite dictated text with a local llama.cpp model.
#[derive(Debug, Parser)]
#[command(name = "voice-rewrite", version, about)]
struct Cli {
    /// Text to rewrite; read from stdin when omitted.
    #[arg(short, long)]
    text: Option<String>,

    /// Instruction template; `{text}` is replaced by the input.
    #[arg(short, long, default_value = "")]
    prompt: String,

    /// Settings file to use instead of the platform default.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model file name, path or identifier.
    #[arg(short, long)]
    model: Option<String>,

    /// How the prompt reaches the tool.
    #[arg(long, value_enum)]
    delivery: Option<DeliveryArg>,

    /// Path to the llama-cli executable.
    #[arg(long)]
    executable: Option<PathBuf>,

    /// Print the input text instead of failing when the tool fails.
    #[arg(long)]
    fallback: bool,

    /// Emit the result as JSON.
    #[arg(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Report {
    Ok { text: String, elapsed_ms: u128 },
    Error { kind: &'static str, message: String },
}

impl Report {
    fn from_outcome(outcome: &Result<RewriteResult, RewriteError>) -> Self {
        match outcome {
            Ok(result) => Report::Ok {
                text: result.text.clone(),
                elapsed_ms: result.elapsed.as_millis(),
            },
            Err(err) => Report::Error {
                kind: error_kind(err),
                message: err.to_string(),
            },
        }
    }
}

fn error_kind(err: &RewriteError) -> &'static str {
    match err {
        RewriteError::Configuration(_) => "configuration",
        RewriteError::Timeout { .. } => "timeout",
        RewriteError::ProcessFailure { .. } => "process_failure",
        RewriteError::Cancelled => "cancelled",
        RewriteError::Disposed => "disposed",
        RewriteError::Unexpected(_) => "unexpected",
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    // 1. Arguments
    let cli = Cli::parse();

    // 2. Logging (to stderr; stdout carries only the result)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 3. Configuration
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    if let Some(model) = cli.model.clone() {
        config.rewrite.model = model;
    }
    if let Some(delivery) = cli.delivery {
        config.rewrite.delivery = delivery.into();
    }
    if let Some(executable) = cli.executable.clone() {
        config.rewrite.executable = Some(executable);
    }

    // 4. Runtime + engine
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let engine = Arc::new(RewriteEngine::new(
        new_shared_settings(config.rewrite),
        AppPaths::new(),
    ));

    let outcome = rt.block_on(run(&cli, Arc::clone(&engine)));
    engine.dispose();
    let outcome = outcome?;

    // 7. Output
    if cli.json {
        println!("{}", serde_json::to_string(&Report::from_outcome(&outcome))?);
    }
    match outcome {
        Ok(result) => {
            if !cli.json {
                println!("{}", result.text);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            if !cli.json {
                eprintln!("error: {err}");
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(
    cli: &Cli,
    engine: Arc<RewriteEngine>,
) -> Result<Result<RewriteResult, RewriteError>> {
    // 5. Input
    let text = match &cli.text {
        Some(text) => text.clone(),
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read text from stdin")?;
            buf
        }
    };

    // 6. Ctrl-C cancels the in-flight rewrite
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, cancelling rewrite");
                cancel.cancel();
            }
        })
    };

    let rewriter: Arc<dyn TextRewriter> = if cli.fallback {
        Arc::new(FallbackRewriter::new(engine))
    } else {
        engine
    };
    let outcome = rewriter.rewrite(&text, &cli.prompt, Some(&cancel)).await;

    watcher.abort();
    Ok(outcome)
}
