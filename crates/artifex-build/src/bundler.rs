//! Bundler adapter.
//!
//! The bundler runs as an external process fed from stdin, with the shared
//! dependency cache as its working directory so bare imports resolve against
//! `<cache_dir>/node_modules`.

use std::collections::BTreeMap;
use std::sync::Arc;

use artifex_core::analysis::has_jsx;
use artifex_core::{BuildMessage, Language};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::BuildConfig;
use crate::diagnostics::parse_diagnostics;
use crate::error::{BuildError, Result};
use crate::runner::{CommandRunner, CommandSpec};

/// Source loader selected for the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
}

impl Loader {
    /// Loader for a script language; markup in plain script upgrades it.
    pub fn for_source(code: &str, language: &Language) -> Option<Self> {
        let jsx = has_jsx(code, language);
        match language {
            Language::Tsx => Some(Loader::Tsx),
            Language::TypeScript if jsx => Some(Loader::Tsx),
            Language::TypeScript => Some(Loader::Ts),
            Language::Jsx => Some(Loader::Jsx),
            Language::JavaScript if jsx => Some(Loader::Jsx),
            Language::JavaScript => Some(Loader::Js),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Loader::Js => "js",
            Loader::Jsx => "jsx",
            Loader::Ts => "ts",
            Loader::Tsx => "tsx",
        }
    }

    pub fn supports_jsx(&self) -> bool {
        matches!(self, Loader::Jsx | Loader::Tsx)
    }
}

/// In-memory bundle input.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub source: String,
    pub loader: Loader,
}

impl BundleRequest {
    pub fn new(source: impl Into<String>, loader: Loader) -> Self {
        Self {
            source: source.into(),
            loader,
        }
    }
}

/// What the bundler produced. `code` is `None` when it failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleOutput {
    pub code: Option<String>,
    pub errors: Vec<BuildMessage>,
    pub warnings: Vec<BuildMessage>,
    /// Input files the bundle pulled in, from the metafile.
    pub inputs: Vec<String>,
    pub duration_ms: u64,
}

impl BundleOutput {
    pub fn succeeded(&self) -> bool {
        self.code.is_some() && self.errors.is_empty()
    }
}

#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundle one entry. Diagnostics are data; `Err` means the adapter itself
    /// could not run.
    async fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput>;
}

#[derive(Debug, Deserialize)]
struct Metafile {
    #[serde(default)]
    inputs: BTreeMap<String, serde_json::Value>,
}

/// `esbuild` driven through a [`CommandRunner`].
pub struct EsbuildBundler {
    config: BuildConfig,
    runner: Arc<dyn CommandRunner>,
}

impl EsbuildBundler {
    pub fn new(config: BuildConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// Full invocation for a request, writing the metafile to `metafile`.
    pub fn command(&self, request: &BundleRequest, metafile: &std::path::Path) -> CommandSpec {
        let loader = request.loader;
        let mut spec = CommandSpec::new(&self.config.bundler, self.config.bundle_timeout)
            .args([
                "--bundle".to_string(),
                "--format=iife".to_string(),
                "--platform=browser".to_string(),
                format!("--target={}", self.config.targets.join(",")),
                "--minify".to_string(),
                "--sourcemap=inline".to_string(),
                format!("--loader={}", loader.as_str()),
                format!("--sourcefile=artifact.{}", loader.as_str()),
            ]);
        if loader.supports_jsx() {
            spec = spec.arg("--jsx=automatic");
        }
        spec.args([
            format!("--metafile={}", metafile.display()),
            "--log-level=warning".to_string(),
            "--color=false".to_string(),
        ])
        .current_dir(&self.config.cache_dir)
        .stdin(request.source.clone())
    }
}

#[async_trait]
impl Bundler for EsbuildBundler {
    async fn bundle(&self, request: &BundleRequest) -> Result<BundleOutput> {
        tokio::fs::create_dir_all(&self.config.cache_dir).await?;
        let scratch = tempfile::tempdir()?;
        let metafile = scratch.path().join("meta.json");
        let spec = self.command(request, &metafile);
        debug!(command = %spec.display(), "running bundler");

        let output = self.runner.run(&spec).await?;
        let (mut errors, warnings) = parse_diagnostics(&output.stderr);

        if !output.passed() {
            if errors.is_empty() {
                let text = output.stderr.trim();
                errors.push(BuildMessage::new(if text.is_empty() {
                    format!("bundler exited with code {}", output.exit_code)
                } else {
                    text.to_string()
                }));
            }
            return Ok(BundleOutput {
                code: None,
                errors,
                warnings,
                inputs: Vec::new(),
                duration_ms: output.duration_ms,
            });
        }

        let inputs = match tokio::fs::read(&metafile).await {
            Ok(bytes) => serde_json::from_slice::<Metafile>(&bytes)
                .map_err(BuildError::from)?
                .inputs
                .into_keys()
                .collect(),
            Err(e) => {
                warn!(error = %e, "bundler wrote no metafile");
                Vec::new()
            }
        };

        Ok(BundleOutput {
            code: Some(output.stdout),
            errors,
            warnings,
            inputs,
            duration_ms: output.duration_ms,
        })
    }
}
