//! Artifact build: resolve, install, pre-process, bundle, wrap.

use std::sync::Arc;
use std::time::Instant;

use artifex_core::analysis::title;
use artifex_core::obs::emit_build_finished;
use artifex_core::{resolve, BuildMessage, BuildResult, ContentDigest, Language};
use tracing::{info_span, warn, Instrument};

use crate::bundler::{BundleRequest, Bundler, EsbuildBundler, Loader};
use crate::config::BuildConfig;
use crate::diagnostics::summarize;
use crate::error::BuildError;
use crate::installer::{InstallReport, PackageInstaller};
use crate::prepare::prepare_entry;
use crate::preview::preview_document;
use crate::runner::CommandRunner;

/// Builds single-file artifacts into previewable bundles.
///
/// Clones share the installer state and the bundler.
#[derive(Clone)]
pub struct ArtifactBuilder {
    installer: PackageInstaller,
    bundler: Arc<dyn Bundler>,
}

impl ArtifactBuilder {
    pub fn new(installer: PackageInstaller, bundler: Arc<dyn Bundler>) -> Self {
        Self { installer, bundler }
    }

    /// Installer and `esbuild` adapter over one runner.
    pub fn from_config(config: BuildConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let installer = PackageInstaller::new(config.clone(), runner.clone());
        let bundler = Arc::new(EsbuildBundler::new(config, runner));
        Self::new(installer, bundler)
    }

    pub fn installer(&self) -> &PackageInstaller {
        &self.installer
    }

    /// Build `code`, titling the preview from the code itself.
    pub async fn build(&self, code: &str, language: &Language) -> BuildResult {
        let title = title(code, language, &[]);
        self.build_titled(code, language, &title).await
    }

    /// Build `code` with an explicit preview title. Never fails: every
    /// problem ends up in the returned result.
    pub async fn build_titled(&self, code: &str, language: &Language, title: &str) -> BuildResult {
        let digest = ContentDigest::compute(code.as_bytes());
        let artifact_id = digest.artifact_id().to_string();
        let span = info_span!("build", artifact_id = %artifact_id, language = %language);
        let result = self.run(code, language, title).instrument(span).await;
        if !result.success {
            warn!(
                artifact_id = %artifact_id,
                diagnostics = %summarize(&result.errors, &result.warnings),
                first_error = result.errors.first().map(|e| e.text.as_str()).unwrap_or_default(),
                "build failed"
            );
        }
        emit_build_finished(
            &artifact_id,
            result.success,
            result.build_time_ms,
            result.errors.len(),
        );
        result
    }

    async fn run(&self, code: &str, language: &Language, title: &str) -> BuildResult {
        let started = Instant::now();
        let elapsed = |s: Instant| s.elapsed().as_millis() as u64;

        let Some(loader) = Loader::for_source(code, language) else {
            let err = BuildError::NotBuildable(language.to_string());
            return BuildResult::failed(err.to_string(), elapsed(started));
        };

        // Resolve on the prepared entry so injected runtime imports get installed.
        let entry = prepare_entry(code, language);
        let dependencies = resolve(&entry).into_vec();
        let report = if dependencies.is_empty() {
            InstallReport::default()
        } else {
            self.installer.ensure_installed(&dependencies).await
        };
        let install_errors: Vec<BuildMessage> = report
            .failed
            .iter()
            .map(|name| BuildMessage::new(format!("package `{name}` could not be installed")))
            .collect();

        let request = BundleRequest::new(entry, loader);
        let output = match self.bundler.bundle(&request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "bundler adapter failed");
                let mut result = BuildResult::failed(e.to_string(), elapsed(started))
                    .with_dependencies(dependencies, report.installed);
                result.errors.extend(install_errors);
                return result;
            }
        };

        let succeeded = output.succeeded();
        let mut errors = output.errors;
        errors.extend(install_errors);
        let (bundled_code, preview_html, bundle_size_bytes) = match output.code {
            Some(bundle) if succeeded => {
                let size = bundle.len() as u64;
                let preview = preview_document(&bundle, title);
                (Some(bundle), Some(preview), Some(size))
            }
            _ => (None, None, None),
        };

        BuildResult {
            success: succeeded,
            bundled_code,
            preview_html,
            dependencies,
            installed_packages: report.installed,
            errors,
            warnings: output.warnings,
            build_time_ms: elapsed(started),
            bundle_size_bytes,
        }
    }
}
