//! Code blocks produced by a single extraction pass.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::language::Language;

/// How a block was found in the model text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockOrigin {
    /// A closed fenced region.
    Fenced,
    /// The whole text, classified by keyword signatures (no fences present).
    Inferred,
}

/// A candidate code block. Ephemeral: never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: Language,
    pub body: String,
    /// File path named on the line after the opening fence, if any.
    pub file_hint: Option<String>,
    /// Byte range of the whole region (fences included) in the source text.
    pub span: Range<usize>,
    pub origin: BlockOrigin,
}

impl CodeBlock {
    /// Whether the block names the file it belongs to.
    pub fn is_file_oriented(&self) -> bool {
        self.file_hint.is_some()
    }

    /// Character mass used when ranking language families.
    pub fn mass(&self) -> usize {
        self.body.chars().count()
    }
}
