//! The consolidated artifact: one finalized single-file unit per detection.

use serde::{Deserialize, Serialize};

use super::language::Language;
use crate::digest::ContentDigest;

/// Coarse complexity estimate from line and branch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// What kind of runnable thing the artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    ReactComponent,
    WebPage,
    Stylesheet,
    Script,
    Snippet,
}

/// Derived facts about an artifact's source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    pub has_jsx: bool,
    pub line_count: usize,
    pub complexity: Complexity,
    pub buildable: bool,
    pub previewable: bool,
    #[serde(default)]
    pub file_hints: Vec<String>,
    pub block_count: usize,
}

/// One artifact derived from a model response. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedArtifact {
    /// Content hash prefix.
    pub id: String,
    pub title: String,
    pub language: Language,
    pub code: String,
    /// Short content hash of `code`; determines the stored object.
    pub hash: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub metadata: ArtifactMetadata,
}

impl ConsolidatedArtifact {
    /// Build an artifact, deriving `id` and `hash` from `code`.
    pub fn new(
        title: String,
        language: Language,
        code: String,
        artifact_type: ArtifactType,
        metadata: ArtifactMetadata,
    ) -> Self {
        let digest = ContentDigest::compute(code.as_bytes());
        Self {
            id: digest.artifact_id().to_string(),
            hash: digest.short().to_string(),
            title,
            language,
            code,
            artifact_type,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ArtifactMetadata {
        ArtifactMetadata {
            dependencies: vec![],
            framework: None,
            has_jsx: false,
            line_count: 1,
            complexity: Complexity::Low,
            buildable: true,
            previewable: true,
            file_hints: vec![],
            block_count: 1,
        }
    }

    #[test]
    fn test_id_is_hash_prefix() {
        let a = ConsolidatedArtifact::new(
            "t".into(),
            Language::JavaScript,
            "console.log(1)".into(),
            ArtifactType::Script,
            metadata(),
        );
        assert!(a.hash.starts_with(&a.id));
        assert_eq!(a.hash.len(), 16);
    }

    #[test]
    fn test_serialized_shape() {
        let a = ConsolidatedArtifact::new(
            "t".into(),
            Language::Jsx,
            "x".into(),
            ArtifactType::ReactComponent,
            metadata(),
        );
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "react-component");
        assert_eq!(json["language"], "jsx");
        assert_eq!(json["metadata"]["hasJsx"], false);
    }
}
