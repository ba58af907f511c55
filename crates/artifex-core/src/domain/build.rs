//! Build outcome types shared by the bundler and the stream orchestrator.

use serde::{Deserialize, Serialize};

/// Source position reported by the bundler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// One bundler diagnostic (error or warning).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<BuildLocation>,
}

impl BuildMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }
}

/// Result of one build attempt. Never mutated; a re-build supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundled_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_html: Option<String>,
    /// Dependencies resolved from the source.
    pub dependencies: Vec<String>,
    /// Subset of `dependencies` present in the dependency cache.
    pub installed_packages: Vec<String>,
    pub errors: Vec<BuildMessage>,
    pub warnings: Vec<BuildMessage>,
    pub build_time_ms: u64,
    /// Output size; omitted on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_size_bytes: Option<u64>,
}

impl BuildResult {
    /// A failed result carrying a single synthetic error.
    pub fn failed(message: impl Into<String>, build_time_ms: u64) -> Self {
        Self {
            success: false,
            bundled_code: None,
            preview_html: None,
            dependencies: Vec::new(),
            installed_packages: Vec::new(),
            errors: vec![BuildMessage::new(message)],
            warnings: Vec::new(),
            build_time_ms,
            bundle_size_bytes: None,
        }
    }

    /// Attach the dependency view of the pipeline that produced this result.
    pub fn with_dependencies(mut self, dependencies: Vec<String>, installed: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self.installed_packages = installed;
        self
    }

    /// Dependencies that were requested but never made it into the cache.
    pub fn missing_packages(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| !self.installed_packages.contains(d))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_has_single_error_and_no_size() {
        let result = BuildResult::failed("bundler crashed", 12);
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.build_time_ms, 12);
        assert!(result.bundle_size_bytes.is_none());
    }

    #[test]
    fn test_missing_packages() {
        let result = BuildResult::failed("x", 0).with_dependencies(
            vec!["react".into(), "left-pad".into()],
            vec!["react".into()],
        );
        assert_eq!(result.missing_packages(), vec!["left-pad"]);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(BuildResult::failed("x", 5)).unwrap();
        assert_eq!(json["buildTimeMs"], 5);
        assert!(json.get("bundleSizeBytes").is_none());
    }
}
