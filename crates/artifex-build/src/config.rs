//! Toolchain configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hard limit on one package-manager batch.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_BUNDLE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TARGETS: &[&str] = &["es2020", "chrome90", "firefox88", "safari14", "edge90"];

/// Configuration for installing dependencies and bundling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Shared on-disk dependency cache (`<cache_dir>/node_modules`).
    pub cache_dir: PathBuf,
    /// Package-manager executable.
    pub package_manager: String,
    /// Bundler executable.
    pub bundler: String,
    pub install_timeout: Duration,
    pub bundle_timeout: Duration,
    /// Browser baselines passed to the bundler.
    pub targets: Vec<String>,
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            cache_dir: std::env::var("ARTIFEX_DEPS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("artifex-deps")),
            package_manager: std::env::var("ARTIFEX_NPM").unwrap_or_else(|_| "npm".to_string()),
            bundler: std::env::var("ARTIFEX_ESBUILD").unwrap_or_else(|_| "esbuild".to_string()),
            install_timeout: env_secs("ARTIFEX_INSTALL_TIMEOUT_SECS", DEFAULT_INSTALL_TIMEOUT),
            bundle_timeout: env_secs("ARTIFEX_BUNDLE_TIMEOUT_SECS", DEFAULT_BUNDLE_TIMEOUT),
            targets: std::env::var("ARTIFEX_BUNDLE_TARGETS")
                .map(|v| v.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect())
                .unwrap_or_else(|_| DEFAULT_TARGETS.iter().map(|t| t.to_string()).collect()),
        }
    }
}

impl BuildConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Defaults with an explicit cache directory.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_package_manager(mut self, program: &str) -> Self {
        self.package_manager = program.to_string();
        self
    }

    pub fn with_bundler(mut self, program: &str) -> Self {
        self.bundler = program.to_string();
        self
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn with_bundle_timeout(mut self, timeout: Duration) -> Self {
        self.bundle_timeout = timeout;
        self
    }

    pub fn with_targets(mut self, targets: &[&str]) -> Self {
        self.targets = targets.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn node_modules(&self) -> PathBuf {
        self.cache_dir.join("node_modules")
    }

    /// `package.json` of an installed package.
    pub fn package_manifest(&self, name: &str) -> PathBuf {
        self.node_modules().join(name).join("package.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_path_for_scoped_package() {
        let config = BuildConfig::new("/tmp/deps");
        assert_eq!(
            config.package_manifest("@scope/pkg"),
            PathBuf::from("/tmp/deps/node_modules/@scope/pkg/package.json")
        );
    }

    #[test]
    fn test_builders() {
        let config = BuildConfig::new("/tmp/deps")
            .with_install_timeout(Duration::from_secs(5))
            .with_targets(&["es2019"]);
        assert_eq!(config.install_timeout, Duration::from_secs(5));
        assert_eq!(config.targets, vec!["es2019"]);
    }
}
