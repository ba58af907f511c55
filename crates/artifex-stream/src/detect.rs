//! Incremental artifact detection over a growing response buffer.
//!
//! The whole buffer is re-extracted on every chunk. Artifacts are identified
//! by content hash, never by position: a block whose bytes changed between
//! parses is a different artifact, and a hash already seen is never reported
//! twice. Only closed fences count while streaming, so a block cut at a chunk
//! boundary surfaces once it is complete.

use std::collections::HashSet;

use artifex_core::{consolidate, extract, BlockOrigin, CodeBlock, ConsolidatedArtifact};

use crate::events::ProjectFile;

#[derive(Debug, Default)]
pub struct ArtifactDetector {
    buffer: String,
    seen: HashSet<String>,
}

impl ArtifactDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Number of distinct artifacts reported so far.
    pub fn seen(&self) -> usize {
        self.seen.len()
    }

    /// Append a chunk and return artifacts that appeared, in buffer order.
    pub fn push(&mut self, chunk: &str) -> Vec<ConsolidatedArtifact> {
        self.buffer.push_str(chunk);
        let mut found = Vec::new();
        for block in extract(&self.buffer) {
            if block.origin != BlockOrigin::Fenced {
                continue;
            }
            if let Some(artifact) = consolidate(std::slice::from_ref(&block)) {
                if self.seen.insert(artifact.hash.clone()) {
                    found.push(artifact);
                }
            }
        }
        found
    }

    /// Consolidate the complete response. Returns it only if its hash is new.
    pub fn finish(&mut self) -> Option<ConsolidatedArtifact> {
        let artifact = consolidate(&extract(&self.buffer))?;
        self.seen
            .insert(artifact.hash.clone())
            .then_some(artifact)
    }

    /// Distinct hinted files in the buffer, in order of first appearance.
    pub fn project_files(&self) -> Vec<ProjectFile> {
        let mut paths: HashSet<String> = HashSet::new();
        extract(&self.buffer)
            .into_iter()
            .filter_map(|block: CodeBlock| {
                let path = block.file_hint.clone()?;
                paths.insert(path.clone()).then(|| ProjectFile {
                    path,
                    line_count: block.body.lines().count(),
                    language: block.language,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &str = "```jsx\nexport default function Widget() {\n  return <div>hello</div>;\n}\n```\n";

    #[test]
    fn test_block_surfaces_only_when_closed() {
        let mut d = ArtifactDetector::new();
        let (head, tail) = COMPONENT.split_at(40);
        assert!(d.push("Here you go:\n").is_empty());
        assert!(d.push(head).is_empty());
        let found = d.push(tail);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Widget");
    }

    #[test]
    fn test_same_block_never_reported_twice() {
        let mut d = ArtifactDetector::new();
        assert_eq!(d.push(COMPONENT).len(), 1);
        assert!(d.push("\nThat's it.").is_empty());
        // Single-block response consolidates to the streamed artifact.
        assert!(d.finish().is_none());
        assert_eq!(d.seen(), 1);
    }

    #[test]
    fn test_multi_block_finish_is_new() {
        let mut d = ArtifactDetector::new();
        d.push("```html\n<div class=\"card\">Hello there</div>\n```\n");
        d.push("```css\n.card { color: red; padding: 4px; }\n```\n");
        let merged = d.finish().expect("merged page");
        assert!(merged.code.contains("<style>"));
        assert_eq!(d.seen(), 3);
    }

    #[test]
    fn test_unfenced_code_found_at_finish() {
        let mut d = ArtifactDetector::new();
        assert!(d.push("def greet(name):\n    return f'hi {name}'\n").is_empty());
        let artifact = d.finish().expect("inferred artifact");
        assert_eq!(artifact.language.as_str(), "python");
    }

    #[test]
    fn test_project_files_distinct() {
        let mut d = ArtifactDetector::new();
        d.push("```jsx\n// App.jsx\nexport default function App() { return <p/>; }\n```\n");
        d.push("```css\n/* styles.css */\n.app { margin: 0 auto; }\n```\n");
        let files = d.project_files();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["App.jsx", "styles.css"]);
    }
}
