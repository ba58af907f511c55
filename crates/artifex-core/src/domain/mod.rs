//! Artifex domain model.

pub mod artifact;
pub mod block;
pub mod build;
pub mod error;
pub mod language;

pub use artifact::{ArtifactMetadata, ArtifactType, Complexity, ConsolidatedArtifact};
pub use block::{BlockOrigin, CodeBlock};
pub use build::{BuildLocation, BuildMessage, BuildResult};
pub use error::{ArtifexError, Result};
pub use language::{Language, LanguageFamily};
