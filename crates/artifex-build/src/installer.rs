//! Package installation into the shared dependency cache.
//!
//! Install state is process-wide and shared by every session through clones of
//! one [`PackageInstaller`]. A name moves `unknown -> installing -> installed`
//! and never back, except through an explicit [`PackageInstaller::clear`].
//!
//! State checks and state mutation happen under one lock with no await in
//! between. Names already in flight are never re-issued; their callers wait on
//! the batch that owns them.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use artifex_core::deps::package_name;
use artifex_core::obs::emit_install_finished;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::runner::{CommandRunner, CommandSpec};

/// Cached knowledge about one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInstallState {
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

/// Outcome of [`PackageInstaller::ensure_installed`], in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Requested names present in the cache afterwards.
    pub installed: Vec<String>,
    /// Requested names that are still missing.
    pub failed: Vec<String>,
    /// Whether this call launched a package-manager process.
    pub invoked: bool,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    installed: HashSet<String>,
    invoked: bool,
}

type BatchReceiver = watch::Receiver<Option<Arc<BatchOutcome>>>;

#[derive(Default)]
struct InstallerState {
    known: HashMap<String, PackageInstallState>,
    in_flight: HashMap<String, BatchReceiver>,
}

struct Inner {
    config: BuildConfig,
    runner: Arc<dyn CommandRunner>,
    state: Mutex<InstallerState>,
}

/// Process-wide dependency cache service. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PackageInstaller {
    inner: Arc<Inner>,
}

impl PackageInstaller {
    pub fn new(config: BuildConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                runner,
                state: Mutex::new(InstallerState::default()),
            }),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, InstallerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `name` is recorded as installed.
    pub fn is_known(&self, name: &str) -> bool {
        self.state().known.get(name).is_some_and(|s| s.installed)
    }

    pub fn install_state(&self, name: &str) -> Option<PackageInstallState> {
        self.state().known.get(name).cloned()
    }

    /// Names with an install currently in flight.
    pub fn in_flight(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().in_flight.keys().cloned().collect();
        names.sort();
        names
    }

    /// Forget every recorded install. Files on disk are left alone.
    pub fn clear(&self) {
        self.state().known.clear();
    }

    /// Remove the on-disk cache and forget all state.
    pub async fn purge(&self) -> std::io::Result<()> {
        self.clear();
        match tokio::fs::remove_dir_all(&self.inner.config.cache_dir).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Create the cache directory and a minimal `package.json` when missing.
    pub async fn bootstrap(&self) -> std::io::Result<()> {
        let dir = &self.inner.config.cache_dir;
        tokio::fs::create_dir_all(dir).await?;
        let manifest = dir.join("package.json");
        if !tokio::fs::try_exists(&manifest).await? {
            let body = serde_json::json!({
                "name": "artifex-dependency-cache",
                "private": true,
                "description": "Packages installed on demand for artifact builds"
            });
            tokio::fs::write(&manifest, format!("{body:#}\n")).await?;
        }
        Ok(())
    }

    /// Make sure every name is in the dependency cache.
    ///
    /// Fails softly: names that cannot be installed land in
    /// `InstallReport::failed` and the rest still succeed.
    pub async fn ensure_installed(&self, names: &[String]) -> InstallReport {
        let mut requested: Vec<String> = Vec::new();
        let mut invalid: Vec<String> = Vec::new();
        for name in names {
            if requested.contains(name) || invalid.contains(name) {
                continue;
            }
            if package_name(name).as_deref() == Some(name.as_str()) {
                requested.push(name.clone());
            } else {
                warn!(package = %name, "refusing to install invalid package name");
                invalid.push(name.clone());
            }
        }

        let mut waits: Vec<BatchReceiver> = Vec::new();
        let mut own_batch: Option<BatchReceiver> = None;
        {
            let mut state = self.state();
            let mut unknown: Vec<String> = Vec::new();
            for name in &requested {
                if state.known.get(name).is_some_and(|s| s.installed) {
                    continue;
                }
                match state.in_flight.get(name) {
                    Some(rx) => waits.push(rx.clone()),
                    None => unknown.push(name.clone()),
                }
            }
            if !unknown.is_empty() {
                let (tx, rx) = watch::channel(None);
                for name in &unknown {
                    state.in_flight.insert(name.clone(), rx.clone());
                }
                own_batch = Some(rx);
                let installer = self.clone();
                tokio::spawn(async move {
                    let outcome = installer.run_batch(&unknown).await;
                    tx.send_replace(Some(Arc::new(outcome)));
                });
            }
        }

        let mut invoked = false;
        if let Some(rx) = own_batch {
            if let Some(outcome) = wait_batch(rx).await {
                invoked = outcome.invoked;
            }
        }
        for rx in waits {
            wait_batch(rx).await;
        }

        let state = self.state();
        let (installed, mut failed): (Vec<String>, Vec<String>) = requested
            .into_iter()
            .partition(|n| state.known.get(n).is_some_and(|s| s.installed));
        failed.extend(invalid);
        InstallReport {
            installed,
            failed,
            invoked,
        }
    }

    /// Check disk, install what is missing in one process, re-verify, record.
    async fn run_batch(&self, names: &[String]) -> BatchOutcome {
        let start = Instant::now();
        let config = &self.inner.config;
        let mut outcome = BatchOutcome::default();

        let mut missing: Vec<String> = Vec::new();
        for name in names {
            if is_on_disk(config, name).await {
                outcome.installed.insert(name.clone());
            } else {
                missing.push(name.clone());
            }
        }
        if !outcome.installed.is_empty() {
            debug!(count = outcome.installed.len(), "packages already on disk");
        }

        if !missing.is_empty() {
            outcome.invoked = true;
            if self.install_missing(&missing).await {
                for name in &missing {
                    if is_on_disk(config, name).await {
                        outcome.installed.insert(name.clone());
                    } else {
                        warn!(package = %name, "package manager succeeded but package is missing");
                    }
                }
            }
        }

        {
            let mut state = self.state();
            let now = Utc::now();
            for name in &outcome.installed {
                state.known.insert(
                    name.clone(),
                    PackageInstallState {
                        installed: true,
                        installed_at: Some(now),
                    },
                );
            }
            for name in names {
                state.in_flight.remove(name);
            }
        }

        emit_install_finished(
            names.len(),
            outcome.installed.len(),
            names.len() - outcome.installed.len(),
            start.elapsed().as_millis() as u64,
        );
        outcome
    }

    async fn install_missing(&self, missing: &[String]) -> bool {
        let config = &self.inner.config;
        if let Err(e) = self.bootstrap().await {
            warn!(error = %e, dir = %config.cache_dir.display(), "cannot prepare dependency cache");
            return false;
        }
        let spec = install_command(config, missing);
        info!(packages = ?missing, "installing packages");
        match self.inner.runner.run(&spec).await {
            Ok(output) if output.passed() => true,
            Ok(output) => {
                warn!(
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "package install failed"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "package install did not complete");
                false
            }
        }
    }
}

/// One package-manager invocation for the whole batch.
pub fn install_command(config: &BuildConfig, names: &[String]) -> CommandSpec {
    let prefix = config.cache_dir.display().to_string();
    CommandSpec::new(&config.package_manager, config.install_timeout)
        .args([
            "install",
            "--no-save",
            "--no-audit",
            "--no-fund",
            "--no-package-lock",
            "--prefix",
            prefix.as_str(),
        ])
        .args(names.iter().cloned())
        .current_dir(&config.cache_dir)
}

async fn is_on_disk(config: &BuildConfig, name: &str) -> bool {
    tokio::fs::try_exists(config.package_manifest(name))
        .await
        .unwrap_or(false)
}

async fn wait_batch(mut rx: BatchReceiver) -> Option<Arc<BatchOutcome>> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => {
            warn!("install batch ended without reporting");
            None
        }
    };
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{failed_output, ok_output, FakeCommandRunner};
    use crate::runner::CommandOutput;
    use std::path::Path;

    /// Simulates the package manager writing each requested package.
    fn writing_runner() -> FakeCommandRunner {
        FakeCommandRunner::new(|spec| {
            let prefix = spec.cwd.clone().expect("install runs in the cache dir");
            let names = spec.args.iter().skip_while(|a| *a != "--prefix").skip(2);
            for name in names {
                write_manifest(&prefix, name);
            }
            Ok(ok_output("added packages"))
        })
    }

    fn write_manifest(root: &Path, name: &str) {
        let dir = root.join("node_modules").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.json"), "{}").unwrap();
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_install_command_shape() {
        let config = BuildConfig::new("/tmp/deps").with_package_manager("npm");
        let spec = install_command(&config, &names(&["left-pad", "@scope/pkg"]));
        assert_eq!(
            spec.display(),
            "npm install --no-save --no-audit --no-fund --no-package-lock --prefix /tmp/deps left-pad @scope/pkg"
        );
        assert_eq!(spec.timeout, crate::config::DEFAULT_INSTALL_TIMEOUT);
    }

    #[tokio::test]
    async fn test_installs_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(writing_runner());
        let installer = PackageInstaller::new(BuildConfig::new(dir.path()), runner.clone());

        let report = installer.ensure_installed(&names(&["left-pad"])).await;
        assert_eq!(report.installed, vec!["left-pad"]);
        assert!(report.invoked);
        assert!(installer.is_known("left-pad"));
        assert!(installer.install_state("left-pad").unwrap().installed_at.is_some());
        assert!(dir.path().join("package.json").exists());

        let again = installer.ensure_installed(&names(&["left-pad"])).await;
        assert!(!again.invoked);
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_disk_presence_skips_process() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "react");
        let runner = Arc::new(FakeCommandRunner::succeeding());
        let installer = PackageInstaller::new(BuildConfig::new(dir.path()), runner.clone());

        let report = installer.ensure_installed(&names(&["react"])).await;
        assert_eq!(report.installed, vec!["react"]);
        assert!(!report.invoked);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_successful_batch_is_reverified() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeCommandRunner::new(|spec| {
            // Only one of the two packages actually lands.
            write_manifest(spec.cwd.as_deref().unwrap(), "lodash");
            Ok(ok_output(""))
        }));
        let installer = PackageInstaller::new(BuildConfig::new(dir.path()), runner);

        let report = installer.ensure_installed(&names(&["lodash", "ghost-pkg"])).await;
        assert_eq!(report.installed, vec!["lodash"]);
        assert_eq!(report.failed, vec!["ghost-pkg"]);
        assert!(!installer.is_known("ghost-pkg"));
    }

    #[tokio::test]
    async fn test_failed_batch_is_soft() {
        let dir = tempfile::tempdir().unwrap();
        let runner: Arc<FakeCommandRunner> = Arc::new(FakeCommandRunner::new(|_| {
            Ok::<CommandOutput, _>(failed_output(1, "npm ERR! 404"))
        }));
        let installer = PackageInstaller::new(BuildConfig::new(dir.path()), runner);

        let report = installer.ensure_installed(&names(&["no-such-package-xyz"])).await;
        assert!(report.installed.is_empty());
        assert_eq!(report.failed, vec!["no-such-package-xyz"]);
        assert!(installer.in_flight().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_names_rejected_without_process() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeCommandRunner::succeeding());
        let installer = PackageInstaller::new(BuildConfig::new(dir.path()), runner.clone());

        let report = installer.ensure_installed(&names(&["../evil", "Bad Name"])).await;
        assert_eq!(report.failed, vec!["../evil", "Bad Name"]);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_forgets_state() {
        let dir = tempfile::tempdir().unwrap();
        let installer =
            PackageInstaller::new(BuildConfig::new(dir.path()), Arc::new(writing_runner()));
        installer.ensure_installed(&names(&["left-pad"])).await;
        installer.clear();
        assert!(!installer.is_known("left-pad"));
        installer.purge().await.unwrap();
        assert!(!dir.path().exists());
    }
}
