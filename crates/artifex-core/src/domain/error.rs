//! Domain-level error taxonomy for Artifex.

/// Artifex domain errors.
///
/// Parsing never produces these: extraction, consolidation and dependency
/// resolution are best-effort and degrade to "nothing found".
#[derive(Debug, thiserror::Error)]
pub enum ArtifexError {
    #[error("invalid content digest: {0}")]
    InvalidDigest(String),
}

/// Result type for Artifex domain operations.
pub type Result<T> = std::result::Result<T, ArtifexError>;
