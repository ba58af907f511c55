//! Artifex core library.
//!
//! Pure text pipeline for model output: fenced-block extraction, language
//! inference, consolidation into a single artifact, and dependency resolution.
//! Nothing in this crate performs I/O.

pub mod analysis;
pub mod consolidate;
pub mod deps;
pub mod digest;
pub mod domain;
pub mod extract;
pub mod inference;
pub mod obs;
pub mod similarity;
pub mod telemetry;

pub use consolidate::consolidate;
pub use deps::{resolve, DependencySet};
pub use digest::{short_hash, ContentDigest};
pub use domain::{
    ArtifactMetadata, ArtifactType, ArtifexError, BlockOrigin, BuildLocation, BuildMessage,
    BuildResult, CodeBlock, Complexity, ConsolidatedArtifact, Language, LanguageFamily, Result,
};
pub use extract::extract;
pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extract and consolidate in one step.
pub fn detect_artifact(text: &str) -> Option<ConsolidatedArtifact> {
    consolidate(&extract(text))
}
