//! Artifex CLI
//!
//! The `artifex` command runs the artifact pipeline locally.
//!
//! ## Commands
//!
//! - `extract`: Print the artifact consolidated from a model response
//! - `deps`: Print the packages an artifact depends on
//! - `build`: Install dependencies, bundle, write a preview document
//! - `stream`: Replay a response through a full streaming session (SSE on stdout)
//! - `cache-clear`: Remove the on-disk dependency cache

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use artifex_build::{ArtifactBuilder, BuildConfig, PackageInstaller, TokioCommandRunner};
use artifex_core::analysis::title;
use artifex_core::{detect_artifact, resolve, ConsolidatedArtifact, Language};
use artifex_state::{
    ArtifactCache, ArtifactRecord, ArtifactRepository, CacheConfig, FsObjectStore, StorageResult,
};
use artifex_stream::{ArtifactPipeline, ChannelSink, SessionConfig, SessionManager};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "artifex")]
#[command(version = artifex_core::VERSION)]
#[command(about = "Turn model output into bundled, previewable artifacts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Shared dependency cache directory
    #[arg(long, global = true, env = "ARTIFEX_DEPS_DIR")]
    deps_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the consolidated artifact of a model response as JSON
    Extract {
        /// File holding the model response
        file: PathBuf,
    },

    /// Print the dependency set of a model response
    Deps {
        file: PathBuf,
    },

    /// Build a model response (or a plain source file) into a preview document
    Build {
        file: PathBuf,

        /// Where to write the preview HTML (default: print the result JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Language of a plain source file (default: from its extension)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Replay a response as a model stream and print the session's SSE frames
    Stream {
        file: PathBuf,

        /// Characters per simulated chunk
        #[arg(long, default_value = "64")]
        chunk_size: usize,

        /// Pause between chunks, in milliseconds
        #[arg(long, default_value = "0")]
        delay_ms: u64,

        /// Object store directory (default: .artifex/objects)
        #[arg(long)]
        store_dir: Option<PathBuf>,
    },

    /// Remove the on-disk dependency cache
    CacheClear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    artifex_core::init_tracing(cli.json, level);

    let build_config = match cli.deps_dir {
        Some(dir) => BuildConfig::new(dir),
        None => BuildConfig::from_env(),
    };

    match cli.command {
        Commands::Extract { file } => cmd_extract(&file),
        Commands::Deps { file } => cmd_deps(&file),
        Commands::Build {
            file,
            output,
            language,
        } => cmd_build(build_config, &file, output.as_deref(), language.as_deref()).await,
        Commands::Stream {
            file,
            chunk_size,
            delay_ms,
            store_dir,
        } => {
            let store_dir = store_dir.unwrap_or_else(|| PathBuf::from(".artifex/objects"));
            cmd_stream(build_config, &file, chunk_size, delay_ms, &store_dir).await
        }
        Commands::CacheClear => cmd_cache_clear(build_config).await,
    }
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

fn cmd_extract(file: &Path) -> Result<()> {
    let text = read_text(file)?;
    match detect_artifact(&text) {
        Some(artifact) => println!("{}", serde_json::to_string_pretty(&artifact)?),
        None => bail!("No code found in {:?}", file),
    }
    Ok(())
}

fn cmd_deps(file: &Path) -> Result<()> {
    let text = read_text(file)?;
    let code = detect_artifact(&text).map(|a| a.code).unwrap_or(text);
    println!("{}", serde_json::to_string_pretty(&resolve(&code))?);
    Ok(())
}

/// The artifact to build: a source file as-is, or the artifact consolidated
/// from a model response.
fn build_input(
    file: &Path,
    text: String,
    language: Option<&str>,
) -> Result<(String, Language, String)> {
    let hints = [file.display().to_string()];
    let explicit = match language {
        Some(tag) => {
            Some(Language::from_tag(tag).with_context(|| format!("Unknown language: {:?}", tag))?)
        }
        None => file
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
            .filter(|l| *l != Language::Markdown),
    };
    if let Some(language) = explicit {
        let name = title(&text, &language, &hints);
        return Ok((text, language, name));
    }
    match detect_artifact(&text) {
        Some(ConsolidatedArtifact {
            code,
            language,
            title,
            ..
        }) => Ok((code, language, title)),
        None => bail!("No code found in {:?}; pass --language to build it as source", file),
    }
}

async fn cmd_build(
    config: BuildConfig,
    file: &Path,
    output: Option<&Path>,
    language: Option<&str>,
) -> Result<()> {
    let text = read_text(file)?;
    let (code, language, name) = build_input(file, text, language)?;
    info!(title = %name, language = %language, "building artifact");

    let builder = ArtifactBuilder::from_config(config, Arc::new(TokioCommandRunner));
    let result = builder.build_titled(&code, &language, &name).await;

    for warning in &result.warnings {
        eprintln!("warning: {}", warning.text);
    }
    for error in &result.errors {
        eprintln!("error: {}", error.text);
    }

    match (output, &result.preview_html) {
        (Some(path), Some(html)) => {
            std::fs::write(path, html).with_context(|| format!("Failed to write {:?}", path))?;
            println!(
                "Wrote {:?} ({} bytes bundled in {} ms)",
                path,
                result.bundle_size_bytes.unwrap_or_default(),
                result.build_time_ms
            );
        }
        (Some(_), None) => {}
        (None, _) => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    if !result.success {
        bail!("Build failed with {} error(s)", result.errors.len());
    }
    Ok(())
}

/// Appends finalized artifacts to `records.jsonl` in the store directory.
struct JsonLinesRepository {
    path: PathBuf,
}

#[async_trait]
impl ArtifactRepository for JsonLinesRepository {
    async fn save(&self, record: &ArtifactRecord) -> StorageResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

async fn cmd_stream(
    config: BuildConfig,
    file: &Path,
    chunk_size: usize,
    delay_ms: u64,
    store_dir: &Path,
) -> Result<()> {
    let text = read_text(file)?;
    let chars: Vec<char> = text.chars().collect();
    let chunks: Vec<String> = chars
        .chunks(chunk_size.max(1))
        .map(|c| c.iter().collect())
        .collect();

    let store = FsObjectStore::new(store_dir)
        .with_context(|| format!("Failed to open object store at {:?}", store_dir))?;
    let cache = ArtifactCache::new(Arc::new(store), CacheConfig::from_env());
    let repository = Arc::new(JsonLinesRepository {
        path: store_dir.join("records.jsonl"),
    });
    let builder = ArtifactBuilder::from_config(config, Arc::new(TokioCommandRunner));
    let manager = SessionManager::new(
        SessionConfig::from_env(),
        ArtifactPipeline::new(builder, cache, repository),
    );

    let (sink, mut rx) = ChannelSink::new(64);
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = rx.recv().await {
            if stdout.write_all(event.to_sse().as_bytes()).await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    let delay = Duration::from_millis(delay_ms);
    let model = futures::stream::iter(chunks)
        .then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, std::io::Error>(chunk)
        })
        .boxed();

    let summary = manager.run(Arc::new(sink), model).await;
    drop(manager);
    let _ = printer.await;

    eprintln!(
        "session {} ended {} after {} ms: {} artifact(s), {} event(s)",
        summary.session_id,
        summary.state,
        summary.duration_ms,
        summary.artifacts_processed,
        summary.events_emitted
    );
    Ok(())
}

async fn cmd_cache_clear(config: BuildConfig) -> Result<()> {
    let dir = config.cache_dir.clone();
    let installer = PackageInstaller::new(config, Arc::new(TokioCommandRunner));
    installer
        .purge()
        .await
        .with_context(|| format!("Failed to remove {:?}", dir))?;
    println!("Removed dependency cache {:?}", dir);
    Ok(())
}
